//! Discovery and property synchronization for Shiner lighting cores.
//!
//! A Shiner core is an LED controller that exposes its settings (color,
//! brightness, animation, speed, ...) as BLE characteristics carrying UTF-8
//! text. This crate finds cores, connects to one at a time, and keeps a local
//! copy of every property in sync with the device.
//!
//! # Features
//!
//! - **Discovery**: Scan filtered to the Shiner service, with cores appearing
//!   and disappearing as [`ManagerEvent`]s
//! - **Availability**: Properties the firmware does not expose are reported as
//!   unavailable instead of failing
//! - **Optimistic writes**: Local changes apply immediately and reach the
//!   device through a per-property [`Throttler`], so a slider drag becomes a
//!   handful of writes carrying the latest value
//! - **Typed values**: Raw text converts to integers, reals, strings and
//!   colors through `shiner-types`
//! - **Testable**: [`mock::MockTransport`] drives the whole engine without
//!   hardware
//!
//! # Architecture
//!
//! | Layer | Type |
//! |-------|------|
//! | Discovery and connection | [`CoreManager`] |
//! | One device | [`Core`] |
//! | One property | [`PropertyState`] |
//! | Write pacing | [`Throttler`] |
//! | Radio | [`Transport`] / [`Link`] ([`BleTransport`] over btleplug) |
//!
//! # Platform Differences
//!
//! Core identifiers come from the transport. On Linux and Windows they are
//! Bluetooth MAC addresses (`AA:BB:CC:DD:EE:FF`). On macOS, where
//! CoreBluetooth hides the address, they are UUIDs that are stable for one
//! core on one Mac only.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shiner_core::{BleTransport, CoreManager, ManagerEvent, Property};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BleTransport::new().await?);
//!     let manager = Arc::new(CoreManager::new(transport));
//!     let mut events = manager.subscribe();
//!
//!     manager.start().await?;
//!     manager.start_scanning().await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let ManagerEvent::Found { core, .. } = event {
//!             let core = manager.connect(&core.id).await?;
//!             core.write(Property::Brightness, "128").await?;
//!             break;
//!         }
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod device;
pub mod error;
pub mod events;
pub mod manager;
pub mod mock;
pub mod state;
pub mod throttle;
pub mod transport;
pub mod util;

pub use shiner_types::uuids;
pub use shiner_types::{
    Documentation, OptionList, Property, PropertyDescriptor, PropertyKind, PropertyType,
    PropertyValue, Rgb,
};

// Core exports
pub use ble::{BleConfig, BleLink, BleTransport};
pub use device::{Core, CoreConfig};
pub use error::{ConnectionFailureReason, Error, Result};
pub use events::{CoreEvent, CoreId, DisconnectReason, EventDispatcher, EventReceiver, ManagerEvent};
pub use manager::{CoreManager, ManagerConfig};
pub use state::{PropertySnapshot, PropertyState};
pub use throttle::{SlotRelease, Throttler};
pub use transport::{EndpointInfo, EndpointValue, Link, Transport, TransportEvent};

/// Type alias for a shared core reference.
///
/// Cores are always shared: the manager keeps one in its registry and
/// spawned write and notification tasks reach back into it.
pub type SharedCore = std::sync::Arc<Core>;
