//! btleplug-backed transport.
//!
//! [`BleTransport`] drives the first Bluetooth adapter of the host: it scans
//! for peripherals advertising the Shiner service, turns btleplug's central
//! events into [`TransportEvent`]s, and connects peripherals into
//! [`BleLink`]s.
//!
//! btleplug does not report when a peripheral stops advertising, so the
//! event pump tracks when each peripheral was last seen and reports it lost
//! after [`BleConfig::advertisement_timeout`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shiner_types::uuids::SHINER_SERVICE;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{EndpointInfo, EndpointValue, Link, Transport, TransportEvent};
use crate::util::create_identifier;

/// Default timeout for BLE characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE characteristic write operations.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time without advertisements before a peripheral is reported lost.
const DEFAULT_ADVERTISEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for BLE timeouts.
///
/// Use this to customize timeout values for different environments.
/// For example, increase timeouts in challenging RF environments
/// (concrete walls, electromagnetic interference).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use shiner_core::BleConfig;
///
/// let config = BleConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .read_timeout(Duration::from_secs(15));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for BLE write operations.
    pub write_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// Time without advertisements before a peripheral is reported lost.
    pub advertisement_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            advertisement_timeout: DEFAULT_ADVERTISEMENT_TIMEOUT,
        }
    }
}

impl BleConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate signal interference,
    /// thick walls, or long distances.
    pub fn challenging_environment() -> Self {
        Self {
            connection_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(15),
            advertisement_timeout: Duration::from_secs(20),
        }
    }

    /// Create a config for fast, reliable environments.
    ///
    /// Uses shorter timeouts for quicker failure detection
    /// when devices are nearby with strong signals.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(8),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(5),
            advertisement_timeout: Duration::from_secs(6),
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the advertisement loss timeout.
    #[must_use]
    pub fn advertisement_timeout(mut self, timeout: Duration) -> Self {
        self.advertisement_timeout = timeout;
        self
    }

    /// Validate the config and return an error if invalid.
    ///
    /// Every timeout must be > 0.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("connection_timeout", self.connection_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("advertisement_timeout", self.advertisement_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(Error::InvalidConfig(format!("{name} must be > 0")));
        }
        Ok(())
    }
}

/// Peripherals seen while scanning.
///
/// Generic so expiry can be tested without a radio.
struct Registry<P = Peripheral, K = PeripheralId> {
    peripherals: HashMap<String, P>,
    identifiers: HashMap<K, String>,
    last_seen: HashMap<String, Instant>,
}

impl<P, K> Default for Registry<P, K> {
    fn default() -> Self {
        Self {
            peripherals: HashMap::new(),
            identifiers: HashMap::new(),
            last_seen: HashMap::new(),
        }
    }
}

impl<P, K: Eq + Hash> Registry<P, K> {
    fn record(&mut self, identifier: &str, key: K, peripheral: P) {
        self.identifiers.insert(key, identifier.to_string());
        self.peripherals.insert(identifier.to_string(), peripheral);
        self.last_seen.insert(identifier.to_string(), Instant::now());
    }

    /// Forget peripherals not seen within `max_age`, returning their ids.
    ///
    /// Connected peripherals stop advertising, so they are kept.
    fn expire(&mut self, max_age: Duration, connected: &[String]) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(id, seen)| {
                now.duration_since(**seen) > max_age && !connected.contains(*id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.last_seen.remove(id);
            self.peripherals.remove(id);
        }
        self.identifiers.retain(|_, id| !expired.contains(id));
        expired
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::TransportUnavailable)
}

/// Transport over the host's Bluetooth adapter.
pub struct BleTransport {
    adapter: Adapter,
    config: BleConfig,
    registry: Arc<RwLock<Registry>>,
    /// Identifiers with a live link; exempt from advertisement expiry.
    connected: Arc<RwLock<Vec<String>>>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Open the first adapter with default timeouts.
    pub async fn new() -> Result<Self> {
        Self::with_config(BleConfig::default()).await
    }

    /// Open the first adapter with custom timeouts.
    pub async fn with_config(config: BleConfig) -> Result<Self> {
        config.validate()?;
        let adapter = get_adapter().await?;
        Ok(Self {
            adapter,
            config,
            registry: Arc::new(RwLock::new(Registry::default())),
            connected: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// The transport's config.
    pub fn config(&self) -> &BleConfig {
        &self.config
    }
}

/// Translate one central event, recording advertisers.
async fn translate(
    adapter: &Adapter,
    registry: &RwLock<Registry>,
    event: CentralEvent,
) -> Option<TransportEvent> {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            let peripheral = adapter.peripheral(&id).await.ok()?;
            let properties = peripheral.properties().await.ok()??;
            // platforms without scan filtering report everything
            if !properties.services.contains(&SHINER_SERVICE) {
                return None;
            }

            let identifier = create_identifier(&properties.address.to_string(), &id);
            registry
                .write()
                .await
                .record(&identifier, peripheral.id(), peripheral);
            Some(TransportEvent::Advertisement {
                id: identifier,
                name: properties.local_name,
                rssi: properties.rssi,
            })
        }
        CentralEvent::DeviceDisconnected(id) => {
            let identifier = registry.read().await.identifiers.get(&id).cloned()?;
            Some(TransportEvent::Disconnected { id: identifier })
        }
        CentralEvent::StateUpdate(state) => {
            info!("Adapter state: {:?}", state);
            Some(TransportEvent::StateChanged {
                ready: is_powered_on(&state),
            })
        }
        _ => None,
    }
}

fn is_powered_on(state: &CentralState) -> bool {
    matches!(state, CentralState::PoweredOn)
}

#[async_trait]
impl Transport for BleTransport {
    async fn is_ready(&self) -> bool {
        match self.adapter.adapter_state().await {
            Ok(state) => is_powered_on(&state),
            Err(e) => {
                debug!("Adapter state unavailable: {}", e);
                false
            }
        }
    }

    async fn start_scan(&self, service: Uuid) -> Result<()> {
        if !self.is_ready().await {
            return Err(Error::TransportUnavailable);
        }
        info!("Starting BLE scan for service {}", service);
        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        info!("Stopping BLE scan");
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, TransportEvent>> {
        let mut central_events = self.adapter.events().await?;
        let (tx, rx) = mpsc::unbounded();

        let adapter = self.adapter.clone();
        let registry = Arc::clone(&self.registry);
        let connected = Arc::clone(&self.connected);
        let max_age = self.config.advertisement_timeout;

        tokio::spawn(async move {
            let mut sweep = tokio::time::interval((max_age / 2).max(Duration::from_millis(500)));

            loop {
                tokio::select! {
                    event = central_events.next() => {
                        let Some(event) = event else {
                            warn!("Central event stream ended");
                            break;
                        };
                        let Some(event) = translate(&adapter, &registry, event).await else {
                            continue;
                        };
                        if let TransportEvent::Disconnected { id } = &event {
                            connected.write().await.retain(|c| c != id);
                        }
                        if tx.unbounded_send(event).is_err() {
                            break;
                        }
                    }
                    _ = sweep.tick() => {
                        let connected = connected.read().await.clone();
                        let expired = registry.write().await.expire(max_age, &connected);
                        for id in expired {
                            debug!("No advertisement from {} for {:?}", id, max_age);
                            if tx.unbounded_send(TransportEvent::Lost { id }).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx.boxed())
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(&self, id: &str) -> Result<Arc<dyn Link>> {
        if !self.is_ready().await {
            return Err(Error::TransportUnavailable);
        }

        let peripheral = self
            .registry
            .read()
            .await
            .peripherals
            .get(id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(id))?;

        info!("Connecting to device...");
        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to device", self.config.connection_timeout))??;
        info!("Connected!");

        let link = match BleLink::discover(id, peripheral.clone(), self.config.clone()).await {
            Ok(link) => link,
            Err(e) => {
                // best-effort cleanup; the discovery error is what matters
                let _ = peripheral.disconnect().await;
                return Err(e);
            }
        };

        self.connected.write().await.push(id.to_string());
        Ok(Arc::new(link))
    }
}

/// A connected peripheral.
pub struct BleLink {
    id: String,
    peripheral: Peripheral,
    /// Characteristics of the Shiner service by UUID.
    characteristics: HashMap<Uuid, Characteristic>,
    config: BleConfig,
}

impl std::fmt::Debug for BleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleLink")
            .field("id", &self.id)
            .field("characteristics", &self.characteristics.len())
            .finish_non_exhaustive()
    }
}

impl BleLink {
    async fn discover(id: &str, peripheral: Peripheral, config: BleConfig) -> Result<Self> {
        info!("Discovering services...");
        timeout(config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", config.discovery_timeout))??;

        let services = peripheral.services();
        debug!("Found {} services", services.len());

        let Some(service) = services.iter().find(|s| s.uuid == SHINER_SERVICE) else {
            return Err(Error::connection_failed(
                Some(id.to_string()),
                ConnectionFailureReason::ServiceNotFound,
            ));
        };

        let characteristics: HashMap<Uuid, Characteristic> = service
            .characteristics
            .iter()
            .map(|c| {
                debug!("  Characteristic: {} {:?}", c.uuid, c.properties);
                (c.uuid, c.clone())
            })
            .collect();
        debug!(
            "Cached {} characteristics for fast lookup",
            characteristics.len()
        );

        Ok(Self {
            id: id.to_string(),
            peripheral,
            characteristics,
            config,
        })
    }

    fn find_characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or(Error::CharacteristicNotFound(uuid))
    }
}

fn endpoint_info(characteristic: &Characteristic) -> EndpointInfo {
    let flags = characteristic.properties;
    EndpointInfo {
        uuid: characteristic.uuid,
        readable: flags.contains(CharPropFlags::READ),
        writable: flags.contains(CharPropFlags::WRITE),
        notifiable: flags.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
    }
}

#[async_trait]
impl Link for BleLink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn discover_endpoints(&self) -> Result<Vec<EndpointInfo>> {
        Ok(self.characteristics.values().map(endpoint_info).collect())
    }

    async fn read(&self, endpoint: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.find_characteristic(endpoint)?;
        let data = timeout(self.config.read_timeout, self.peripheral.read(characteristic))
            .await
            .map_err(|_| {
                Error::timeout(format!("read characteristic {}", endpoint), self.config.read_timeout)
            })??;
        Ok(data)
    }

    async fn write(&self, endpoint: Uuid, value: &[u8]) -> Result<()> {
        let characteristic = self.find_characteristic(endpoint)?;
        timeout(
            self.config.write_timeout,
            self.peripheral
                .write(characteristic, value, WriteType::WithResponse),
        )
        .await
        .map_err(|_| {
            Error::timeout(format!("write characteristic {}", endpoint), self.config.write_timeout)
        })??;
        Ok(())
    }

    async fn subscribe(&self, endpoint: Uuid) -> Result<()> {
        let characteristic = self.find_characteristic(endpoint)?;
        self.peripheral.subscribe(characteristic).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, EndpointValue>> {
        let stream = self.peripheral.notifications().await?;
        Ok(stream
            .map(|n| EndpointValue {
                endpoint: n.uuid,
                value: n.value,
            })
            .boxed())
    }

    #[tracing::instrument(level = "info", skip(self), fields(id = %self.id))]
    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from device...");
        timeout(self.config.connection_timeout, self.peripheral.disconnect())
            .await
            .map_err(|_| {
                Error::timeout("disconnect from device", self.config.connection_timeout)
            })??;
        Ok(())
    }
}
