//! In-memory transport for testing.
//!
//! This module provides a [`MockTransport`] and [`MockLink`] that implement
//! the [`Transport`] and [`Link`] traits without requiring BLE hardware, so
//! the manager and cores can be driven end to end in tests and demos.
//!
//! # Features
//!
//! - **Scripted peripherals**: Each [`MockLink`] exposes a chosen set of endpoints with initial values
//! - **Event injection**: Advertisements, loss, link drops and radio state changes on demand
//! - **Write log**: Every write that reached the "device" is recorded in order
//! - **Failure injection**: Failing connects, reads and writes
//! - **Latency simulation**: Artificial delays on connect, read and write

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{EndpointInfo, EndpointValue, Link, Transport, TransportEvent};

async fn simulate_latency(latency_ms: &AtomicU64) {
    let latency = latency_ms.load(Ordering::Relaxed);
    if latency > 0 {
        tokio::time::sleep(Duration::from_millis(latency)).await;
    }
}

/// A scripted peripheral.
///
/// # Example
///
/// ```
/// use shiner_core::mock::MockLink;
/// use shiner_core::transport::Link;
/// use shiner_types::uuids;
///
/// # #[tokio::main]
/// # async fn main() {
/// let link = MockLink::builder()
///     .value(uuids::COLOR, "255 0 0")
///     .value(uuids::SPEED, "1.5")
///     .build();
///
/// link.write(uuids::SPEED, b"2").await.unwrap();
/// assert_eq!(link.writes_to(uuids::SPEED).await, ["2"]);
/// # }
/// ```
pub struct MockLink {
    id: String,
    endpoints: Vec<EndpointInfo>,
    values: RwLock<HashMap<Uuid, Vec<u8>>>,
    writes: RwLock<Vec<(Uuid, String)>>,
    subscribed: RwLock<HashSet<Uuid>>,
    listeners: RwLock<Vec<mpsc::UnboundedSender<EndpointValue>>>,
    connected: AtomicBool,
    echo_writes: bool,
    read_count: AtomicU32,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_disconnect: AtomicBool,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    /// Simulated write latency in milliseconds (0 = no delay).
    write_latency_ms: AtomicU64,
    /// Simulated disconnect latency in milliseconds (0 = no delay).
    disconnect_latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("id", &self.id)
            .field("endpoints", &self.endpoints.len())
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockLink {
    /// Start building a mock peripheral.
    pub fn builder() -> MockLinkBuilder {
        MockLinkBuilder::default()
    }

    /// Whether a transport connect is currently holding this link.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    fn check_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    async fn sever(&self) {
        self.set_connected(false);
        self.subscribed.write().await.clear();
        // ends every notification stream
        self.listeners.write().await.clear();
    }

    fn has_endpoint(&self, endpoint: Uuid) -> bool {
        self.endpoints.iter().any(|e| e.uuid == endpoint)
    }

    /// Current device-side value of an endpoint.
    pub async fn stored(&self, endpoint: Uuid) -> Option<Vec<u8>> {
        self.values.read().await.get(&endpoint).cloned()
    }

    /// Change a device-side value without notifying.
    pub async fn set_value(&self, endpoint: Uuid, value: impl Into<Vec<u8>>) {
        self.values.write().await.insert(endpoint, value.into());
    }

    /// Change a device-side value and push it to subscribers.
    ///
    /// The value is pushed regardless of whether notifications were enabled
    /// on the endpoint.
    pub async fn notify(&self, endpoint: Uuid, value: impl Into<Vec<u8>>) {
        let value = value.into();
        self.values.write().await.insert(endpoint, value.clone());
        self.push(EndpointValue { endpoint, value }).await;
    }

    async fn push(&self, notification: EndpointValue) {
        let mut listeners = self.listeners.write().await;
        listeners.retain(|tx| tx.unbounded_send(notification.clone()).is_ok());
    }

    /// Every write that reached this peripheral, in order.
    pub async fn writes(&self) -> Vec<(Uuid, String)> {
        self.writes.read().await.clone()
    }

    /// Writes to one endpoint, in order.
    pub async fn writes_to(&self, endpoint: Uuid) -> Vec<String> {
        self.writes
            .read()
            .await
            .iter()
            .filter(|(uuid, _)| *uuid == endpoint)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Forget recorded writes.
    pub async fn clear_writes(&self) {
        self.writes.write().await.clear();
    }

    /// Endpoints with notifications enabled.
    pub async fn subscriptions(&self) -> HashSet<Uuid> {
        self.subscribed.read().await.clone()
    }

    /// Number of reads served.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Make reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Make disconnects fail, leaving the link up.
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::Relaxed);
    }

    /// Set simulated disconnect latency.
    pub fn set_disconnect_latency(&self, latency: Duration) {
        self.disconnect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated read latency.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated write latency.
    ///
    /// The write is recorded after the delay.
    pub fn set_write_latency(&self, latency: Duration) {
        self.write_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl Link for MockLink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn discover_endpoints(&self) -> Result<Vec<EndpointInfo>> {
        self.check_connected()?;
        Ok(self.endpoints.clone())
    }

    async fn read(&self, endpoint: Uuid) -> Result<Vec<u8>> {
        self.check_connected()?;
        simulate_latency(&self.read_latency_ms).await;
        self.read_count.fetch_add(1, Ordering::Relaxed);

        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::InvalidData("Mock read failure".to_string()));
        }
        Ok(self.stored(endpoint).await.unwrap_or_default())
    }

    async fn write(&self, endpoint: Uuid, value: &[u8]) -> Result<()> {
        self.check_connected()?;
        simulate_latency(&self.write_latency_ms).await;
        self.check_connected()?;

        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::InvalidData("Mock write failure".to_string()));
        }
        if !self.has_endpoint(endpoint) {
            return Err(Error::InvalidData(format!("No endpoint {}", endpoint)));
        }

        self.writes
            .write()
            .await
            .push((endpoint, String::from_utf8_lossy(value).into_owned()));
        self.values.write().await.insert(endpoint, value.to_vec());

        if self.echo_writes && self.subscribed.read().await.contains(&endpoint) {
            self.push(EndpointValue {
                endpoint,
                value: value.to_vec(),
            })
            .await;
        }
        Ok(())
    }

    async fn subscribe(&self, endpoint: Uuid) -> Result<()> {
        self.check_connected()?;
        self.subscribed.write().await.insert(endpoint);
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, EndpointValue>> {
        self.check_connected()?;
        let (tx, rx) = mpsc::unbounded();
        self.listeners.write().await.push(tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&self) -> Result<()> {
        simulate_latency(&self.disconnect_latency_ms).await;
        if self.fail_disconnect.load(Ordering::Relaxed) {
            return Err(Error::InvalidData("Mock disconnect failure".to_string()));
        }
        self.sever().await;
        Ok(())
    }
}

/// Builder for [`MockLink`].
#[derive(Debug, Default)]
pub struct MockLinkBuilder {
    id: Option<String>,
    endpoints: Vec<EndpointInfo>,
    values: HashMap<Uuid, Vec<u8>>,
    echo_writes: bool,
}

impl MockLinkBuilder {
    /// Set the transport identifier.
    #[must_use]
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Expose a readable, writable, notifiable endpoint with an initial value.
    #[must_use]
    pub fn value(self, endpoint: Uuid, value: &str) -> Self {
        self.endpoint(EndpointInfo::full(endpoint), value.as_bytes())
    }

    /// Expose an endpoint with explicit capabilities and raw initial value.
    #[must_use]
    pub fn endpoint(mut self, info: EndpointInfo, value: &[u8]) -> Self {
        self.endpoints.retain(|e| e.uuid != info.uuid);
        self.endpoints.push(info);
        self.values.insert(info.uuid, value.to_vec());
        self
    }

    /// Push every successful write back as a notification, like firmware
    /// that confirms writes.
    #[must_use]
    pub fn echo_writes(mut self, echo: bool) -> Self {
        self.echo_writes = echo;
        self
    }

    /// Build the link.
    ///
    /// The link starts connected so it can be handed straight to
    /// [`Core::begin_sync`](crate::Core::begin_sync); when registered with a
    /// [`MockTransport`] it starts disconnected until the transport connects
    /// it.
    pub fn build(self) -> Arc<MockLink> {
        Arc::new(MockLink {
            id: self.id.unwrap_or_else(|| "MOCK-000001".to_string()),
            endpoints: self.endpoints,
            values: RwLock::new(self.values),
            writes: RwLock::new(Vec::new()),
            subscribed: RwLock::new(HashSet::new()),
            listeners: RwLock::new(Vec::new()),
            connected: AtomicBool::new(true),
            echo_writes: self.echo_writes,
            read_count: AtomicU32::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            read_latency_ms: AtomicU64::new(0),
            write_latency_ms: AtomicU64::new(0),
            disconnect_latency_ms: AtomicU64::new(0),
        })
    }
}

/// A scripted radio.
///
/// Peripherals are registered with [`add_peripheral`](Self::add_peripheral)
/// and become visible to a manager only once advertised.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use shiner_core::mock::{MockLink, MockTransport};
/// use shiner_core::CoreManager;
/// use shiner_types::uuids;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(MockTransport::new());
/// transport
///     .add_peripheral(MockLink::builder().id("core-1").value(uuids::NAME, "Ada").build())
///     .await;
///
/// let manager = Arc::new(CoreManager::new(transport.clone()));
/// manager.start().await?;
/// manager.start_scanning().await?;
/// transport.advertise("core-1", Some("Ada's core"), Some(-50)).await;
/// # Ok(())
/// # }
/// ```
pub struct MockTransport {
    ready: AtomicBool,
    scanning: AtomicBool,
    scan_starts: AtomicU32,
    scan_service: RwLock<Option<Uuid>>,
    peripherals: RwLock<HashMap<String, Arc<MockLink>>>,
    listeners: RwLock<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    connect_count: AtomicU32,
    should_fail_connect: AtomicBool,
    /// Number of connects to fail before succeeding.
    remaining_failures: AtomicU32,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .field("scanning", &self.scanning.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A ready radio with no peripherals.
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            scanning: AtomicBool::new(false),
            scan_starts: AtomicU32::new(0),
            scan_service: RwLock::new(None),
            peripherals: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            connect_count: AtomicU32::new(0),
            should_fail_connect: AtomicBool::new(false),
            remaining_failures: AtomicU32::new(0),
            connect_latency_ms: AtomicU64::new(0),
        }
    }

    /// A radio that is off until [`set_ready`](Self::set_ready) is called.
    pub fn powered_off() -> Self {
        let transport = Self::new();
        transport.ready.store(false, Ordering::Relaxed);
        transport
    }

    async fn emit(&self, event: TransportEvent) {
        let mut listeners = self.listeners.write().await;
        listeners.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    /// Register a peripheral that can be connected to by its link id.
    pub async fn add_peripheral(&self, link: Arc<MockLink>) {
        link.set_connected(false);
        self.peripherals
            .write()
            .await
            .insert(link.id().to_string(), link);
    }

    /// A registered peripheral.
    pub async fn peripheral(&self, id: &str) -> Option<Arc<MockLink>> {
        self.peripherals.read().await.get(id).cloned()
    }

    /// Turn the radio on or off.
    ///
    /// Turning it off stops any scan.
    pub async fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
        if !ready {
            self.scanning.store(false, Ordering::Relaxed);
        }
        self.emit(TransportEvent::StateChanged { ready }).await;
    }

    /// Report an advertisement. Ignored unless scanning.
    pub async fn advertise(&self, id: &str, name: Option<&str>, rssi: Option<i16>) {
        if !self.is_scanning() {
            return;
        }
        self.emit(TransportEvent::Advertisement {
            id: id.to_string(),
            name: name.map(str::to_string),
            rssi,
        })
        .await;
    }

    /// Report that a peripheral stopped advertising.
    pub async fn lose(&self, id: &str) {
        self.emit(TransportEvent::Lost { id: id.to_string() }).await;
    }

    /// Drop the link of a connected peripheral, as if it went out of range.
    pub async fn drop_link(&self, id: &str) {
        if let Some(link) = self.peripheral(id).await {
            // the dead link can no longer carry anything
            link.sever().await;
        }
        self.emit(TransportEvent::Disconnected { id: id.to_string() })
            .await;
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    /// Number of times a scan was started.
    pub fn scan_starts(&self) -> u32 {
        self.scan_starts.load(Ordering::Relaxed)
    }

    /// Service UUID of the last scan.
    pub async fn scan_service(&self) -> Option<Uuid> {
        *self.scan_service.read().await
    }

    /// Number of connect attempts.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// Make every connect fail.
    pub fn set_should_fail_connect(&self, fail: bool) {
        self.should_fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` connects, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    async fn start_scan(&self, service: Uuid) -> Result<()> {
        if !self.is_ready().await {
            return Err(Error::TransportUnavailable);
        }
        *self.scan_service.write().await = Some(service);
        self.scanning.store(true, Ordering::Relaxed);
        self.scan_starts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scanning.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, TransportEvent>> {
        let (tx, rx) = mpsc::unbounded();
        self.listeners.write().await.push(tx);
        Ok(rx.boxed())
    }

    async fn connect(&self, id: &str) -> Result<Arc<dyn Link>> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
        simulate_latency(&self.connect_latency_ms).await;

        if !self.is_ready().await {
            return Err(Error::TransportUnavailable);
        }

        // Check for transient failures first
        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::Timeout,
            ));
        }
        if self.should_fail_connect.load(Ordering::Relaxed) {
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::Other("Mock connect failure".to_string()),
            ));
        }

        let Some(link) = self.peripheral(id).await else {
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::OutOfRange,
            ));
        };
        link.set_connected(true);
        Ok(link as Arc<dyn Link>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiner_types::uuids;

    #[tokio::test]
    async fn test_link_read_write() {
        let link = MockLink::builder().value(uuids::NAME, "Ada").build();
        assert_eq!(link.read(uuids::NAME).await.unwrap(), b"Ada");

        link.write(uuids::NAME, b"Grace").await.unwrap();
        assert_eq!(link.read(uuids::NAME).await.unwrap(), b"Grace");
        assert_eq!(link.writes().await, vec![(uuids::NAME, "Grace".to_string())]);
        assert_eq!(link.read_count(), 2);
    }

    #[tokio::test]
    async fn test_link_write_unknown_endpoint() {
        let link = MockLink::builder().value(uuids::NAME, "Ada").build();
        assert!(link.write(uuids::COLOR, b"1 2 3").await.is_err());
        assert!(link.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_link_failure_injection() {
        let link = MockLink::builder().value(uuids::NAME, "Ada").build();
        link.set_fail_writes(true);
        link.set_fail_reads(true);
        assert!(link.write(uuids::NAME, b"x").await.is_err());
        assert!(link.read(uuids::NAME).await.is_err());
    }

    #[tokio::test]
    async fn test_link_notifications() {
        let link = MockLink::builder()
            .value(uuids::NAME, "Ada")
            .echo_writes(true)
            .build();
        let mut stream = link.notifications().await.unwrap();
        link.subscribe(uuids::NAME).await.unwrap();

        link.notify(uuids::NAME, "Grace").await;
        link.write(uuids::NAME, b"Hedy").await.unwrap();

        assert_eq!(stream.next().await.unwrap().value, b"Grace");
        assert_eq!(stream.next().await.unwrap().value, b"Hedy");

        link.disconnect().await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnected_link_rejects_operations() {
        let link = MockLink::builder().value(uuids::NAME, "Ada").build();
        link.disconnect().await.unwrap();
        assert!(matches!(link.read(uuids::NAME).await, Err(Error::NotConnected)));
        assert!(matches!(
            link.write(uuids::NAME, b"x").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_transport_scan_requires_ready() {
        let transport = MockTransport::powered_off();
        assert!(matches!(
            transport.start_scan(uuids::SHINER_SERVICE).await,
            Err(Error::TransportUnavailable)
        ));

        transport.set_ready(true).await;
        transport.start_scan(uuids::SHINER_SERVICE).await.unwrap();
        assert!(transport.is_scanning());
        assert_eq!(transport.scan_service().await, Some(uuids::SHINER_SERVICE));
    }

    #[tokio::test]
    async fn test_transport_events() {
        let transport = MockTransport::new();
        let mut events = transport.events().await.unwrap();

        // not scanning yet
        transport.advertise("a", None, None).await;
        transport.start_scan(uuids::SHINER_SERVICE).await.unwrap();
        transport.advertise("b", Some("Desk"), Some(-40)).await;
        transport.lose("b").await;

        assert_eq!(
            events.next().await.unwrap(),
            TransportEvent::Advertisement {
                id: "b".to_string(),
                name: Some("Desk".to_string()),
                rssi: Some(-40)
            }
        );
        assert_eq!(
            events.next().await.unwrap(),
            TransportEvent::Lost { id: "b".to_string() }
        );
    }

    #[tokio::test]
    async fn test_transport_connect() {
        let transport = MockTransport::new();
        transport
            .add_peripheral(MockLink::builder().id("a").value(uuids::NAME, "Ada").build())
            .await;
        assert!(!transport.peripheral("a").await.unwrap().is_connected());

        let link = transport.connect("a").await.unwrap();
        assert_eq!(link.id(), "a");
        assert!(transport.peripheral("a").await.unwrap().is_connected());

        assert!(matches!(
            transport.connect("missing").await,
            Err(Error::ConnectionFailed {
                reason: ConnectionFailureReason::OutOfRange,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_transport_transient_failures() {
        let transport = MockTransport::new();
        transport
            .add_peripheral(MockLink::builder().id("a").build())
            .await;
        transport.set_transient_failures(1);

        assert!(transport.connect("a").await.is_err());
        assert!(transport.connect("a").await.is_ok());
        assert_eq!(transport.connect_count(), 2);
    }
}
