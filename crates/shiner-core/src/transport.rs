//! Transport abstractions.
//!
//! The engine never talks to a Bluetooth stack directly. [`Transport`] covers
//! the central role (readiness, scanning, connecting) and [`Link`] covers one
//! established connection (endpoint discovery, reads, writes, notifications).
//! [`BleTransport`](crate::ble::BleTransport) implements both on top of
//! btleplug; [`MockTransport`](crate::mock::MockTransport) implements them in
//! memory for tests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;

/// Something the transport observed while scanning or connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The radio became usable or unusable.
    StateChanged {
        /// Whether scanning and connecting are possible now.
        ready: bool,
    },
    /// A peripheral advertising the service was seen.
    ///
    /// Sent for every advertisement, not just the first one.
    Advertisement {
        /// Transport identifier.
        id: String,
        /// Advertised local name.
        name: Option<String>,
        /// Signal strength in dBm.
        rssi: Option<i16>,
    },
    /// A peripheral stopped advertising.
    Lost {
        /// Transport identifier.
        id: String,
    },
    /// A connected peripheral dropped its link.
    Disconnected {
        /// Transport identifier.
        id: String,
    },
}

/// An endpoint exposed by a connected core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointInfo {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// The endpoint supports reads.
    pub readable: bool,
    /// The endpoint supports writes with response.
    pub writable: bool,
    /// The endpoint can push value notifications.
    pub notifiable: bool,
}

impl EndpointInfo {
    /// An endpoint supporting reads, writes and notifications.
    pub fn full(uuid: Uuid) -> Self {
        Self {
            uuid,
            readable: true,
            writable: true,
            notifiable: true,
        }
    }
}

/// A value pushed by the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointValue {
    /// The endpoint the value belongs to.
    pub endpoint: Uuid,
    /// Raw payload.
    pub value: Vec<u8>,
}

/// The central side of the radio.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the radio is powered on and authorized.
    async fn is_ready(&self) -> bool;

    /// Start scanning for peripherals advertising `service`.
    ///
    /// Returns [`Error::TransportUnavailable`](crate::Error::TransportUnavailable)
    /// when the radio is not ready.
    async fn start_scan(&self, service: Uuid) -> Result<()>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Stream of scan and link events.
    ///
    /// Called once by the manager's event pump.
    async fn events(&self) -> Result<BoxStream<'static, TransportEvent>>;

    /// Connect to a peripheral by identifier.
    async fn connect(&self, id: &str) -> Result<Arc<dyn Link>>;
}

/// One established connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Transport identifier of the peer.
    fn id(&self) -> &str;

    /// Discover the endpoints the peer exposes under the Shiner service.
    async fn discover_endpoints(&self) -> Result<Vec<EndpointInfo>>;

    /// Read an endpoint.
    async fn read(&self, endpoint: Uuid) -> Result<Vec<u8>>;

    /// Write an endpoint, waiting for the response.
    async fn write(&self, endpoint: Uuid, value: &[u8]) -> Result<()>;

    /// Enable notifications on an endpoint.
    async fn subscribe(&self, endpoint: Uuid) -> Result<()>;

    /// Stream of values pushed by the peer.
    async fn notifications(&self) -> Result<BoxStream<'static, EndpointValue>>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<()>;
}
