//! Discovery and connection management.
//!
//! [`CoreManager`] owns the registry of advertising cores. A single pump task
//! consumes [`TransportEvent`]s, so registry mutations and the
//! [`ManagerEvent`]s they produce happen in one order. At most one core is
//! intentionally connected at a time.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shiner_core::{BleTransport, CoreManager, ManagerEvent};
//!
//! let transport = Arc::new(BleTransport::new().await?);
//! let manager = Arc::new(CoreManager::new(transport));
//! let mut events = manager.subscribe();
//!
//! manager.start().await?;
//! manager.start_scanning().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let ManagerEvent::Found { core, .. } = event {
//!         let core = manager.connect(&core.id).await?;
//!         core.set_lights_on(true).await?;
//!         break;
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shiner_types::uuids::SHINER_SERVICE;

use crate::device::{Core, CoreConfig};
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{
    CoreId, DEFAULT_EVENT_CAPACITY, DisconnectReason, EventDispatcher, EventReceiver, ManagerEvent,
};
use crate::transport::{Link, Transport, TransportEvent};

/// Configuration for the core manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Config given to every discovered core.
    pub core: CoreConfig,
    /// Manager event channel capacity.
    pub event_capacity: usize,
    /// How often transport readiness is polled.
    ///
    /// Transports that report readiness changes as events are picked up
    /// immediately; polling covers those that don't.
    pub ready_poll_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            ready_poll_interval: Duration::from_secs(1),
        }
    }
}

impl ManagerConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config for discovered cores.
    #[must_use]
    pub fn core(mut self, core: CoreConfig) -> Self {
        self.core = core;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the readiness poll interval.
    #[must_use]
    pub fn ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval;
        self
    }

    /// Validate the config and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.core.validate()?;
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be > 0".to_string(),
            ));
        }
        if self.ready_poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "ready_poll_interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a connect in progress was called off.
#[derive(Debug, Clone, Copy)]
enum Abort {
    Requested,
    LinkLost,
}

impl Abort {
    fn into_error(self, id: &str) -> Error {
        match self {
            Abort::Requested => Error::Cancelled,
            Abort::LinkLost => {
                Error::connection_failed(Some(id.to_string()), ConnectionFailureReason::LinkLost)
            }
        }
    }
}

/// The single connection slot.
///
/// Reserved as soon as a connect starts. `Connected` is emitted only once the
/// sync finished, and `Disconnected` only for a slot that was announced; a
/// slot that ends before that is reported by its connect as `ConnectFailed`.
#[derive(Debug)]
struct Active {
    id: String,
    announced: bool,
    aborted: Option<Abort>,
}

impl Active {
    /// Record the first reason the connect was called off.
    fn abort(&mut self, abort: Abort) {
        if self.aborted.is_none() {
            self.aborted = Some(abort);
        }
    }
}

#[derive(Default)]
struct Registry {
    cores: HashMap<String, Arc<Core>>,
    active: Option<Active>,
    scan_requested: bool,
    scanning: bool,
    ready: Option<bool>,
}

impl Registry {
    fn is_active(&self, id: &str) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Take the abort recorded for a connect to `id`. A slot that no longer
    /// belongs to the connect counts as a requested abort.
    fn take_abort(&mut self, id: &str) -> Option<Abort> {
        match self.active.as_mut() {
            Some(active) if active.id == id => active.aborted.take(),
            _ => Some(Abort::Requested),
        }
    }
}

/// Manager for discovered Shiner cores.
pub struct CoreManager {
    transport: Arc<dyn Transport>,
    config: ManagerConfig,
    registry: Mutex<Registry>,
    events: EventDispatcher<ManagerEvent>,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CoreManager {
    /// Create a manager with default config.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::build(transport, ManagerConfig::default())
    }

    /// Create a manager with a validated config.
    pub fn with_config(transport: Arc<dyn Transport>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: Arc<dyn Transport>, config: ManagerConfig) -> Self {
        Self {
            transport,
            registry: Mutex::new(Registry::default()),
            events: EventDispatcher::new(config.event_capacity.max(1)),
            cancel: CancellationToken::new(),
            pump: Mutex::new(None),
            config,
        }
    }

    /// The manager config.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Subscribe to discovery and connection events.
    pub fn subscribe(&self) -> EventReceiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Start consuming transport events.
    ///
    /// Must be called before discovery events are produced. Calling it again
    /// is a no-op; calling it after [`shutdown`](Self::shutdown) fails with
    /// [`Error::Cancelled`].
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            return Ok(());
        }

        let mut events = self.transport.events().await?;
        let ready = self.transport.is_ready().await;
        self.registry.lock().await.ready = Some(ready);

        let manager = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let poll_every = self.config.ready_poll_interval;

        *pump = Some(tokio::spawn(async move {
            let mut ready_poll = interval(poll_every);
            ready_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Transport pump cancelled");
                        break;
                    }
                    event = events.next() => {
                        let Some(event) = event else {
                            warn!("Transport event stream ended");
                            break;
                        };
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.handle_transport_event(event).await;
                    }
                    _ = ready_poll.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let ready = manager.transport.is_ready().await;
                        manager.on_transport_state(ready).await;
                    }
                }
            }
        }));

        info!(ready, "Core manager started");
        Ok(())
    }

    // --- Scanning ---

    /// Scan for advertising cores.
    ///
    /// Idempotent. If the transport is not ready the request is remembered
    /// and the scan starts once it becomes ready.
    pub async fn start_scanning(&self) -> Result<()> {
        let mut registry = self.registry.lock().await;
        registry.scan_requested = true;
        if registry.scanning {
            return Ok(());
        }
        self.try_start_scan(&mut registry).await
    }

    /// Stop scanning and forget any deferred scan request.
    pub async fn stop_scanning(&self) -> Result<()> {
        let mut registry = self.registry.lock().await;
        registry.scan_requested = false;
        if registry.scanning {
            registry.scanning = false;
            self.transport.stop_scan().await?;
            info!("Stopped scanning");
        }
        Ok(())
    }

    /// Whether a scan is running.
    pub async fn scanning(&self) -> bool {
        self.registry.lock().await.scanning
    }

    async fn try_start_scan(&self, registry: &mut Registry) -> Result<()> {
        match self.transport.start_scan(SHINER_SERVICE).await {
            Ok(()) => {
                registry.scanning = true;
                info!("Scanning for cores");
                Ok(())
            }
            Err(Error::TransportUnavailable) => {
                debug!("Transport not ready, scan deferred");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // --- Transport events ---

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged { ready } => self.on_transport_state(ready).await,
            TransportEvent::Advertisement { id, name, rssi } => {
                self.on_advertisement(id, name, rssi).await
            }
            TransportEvent::Lost { id } => self.on_lost(&id).await,
            TransportEvent::Disconnected { id } => self.on_disconnected(&id).await,
        }
    }

    async fn on_transport_state(&self, ready: bool) {
        let mut registry = self.registry.lock().await;
        if registry.ready == Some(ready) {
            return;
        }
        registry.ready = Some(ready);
        info!(ready, "Transport state changed");
        self.events.send(ManagerEvent::TransportStateChanged { ready });

        if !ready {
            registry.scanning = false;
        } else if registry.scan_requested
            && !registry.scanning
            && let Err(e) = self.try_start_scan(&mut registry).await
        {
            warn!("Deferred scan failed to start: {}", e);
        }
    }

    async fn on_advertisement(&self, id: String, name: Option<String>, rssi: Option<i16>) {
        let mut registry = self.registry.lock().await;
        if registry.cores.contains_key(&id) {
            return;
        }

        let core_id = CoreId { id: id.clone(), name };
        info!(core = %core_id, ?rssi, "Found core");
        registry.cores.insert(
            id,
            Arc::new(Core::new(core_id.clone(), self.config.core.clone())),
        );
        self.events.send(ManagerEvent::Found {
            core: core_id,
            rssi,
        });
    }

    async fn on_lost(&self, id: &str) {
        let mut registry = self.registry.lock().await;
        Self::evict(&self.events, &mut registry, id);
    }

    /// Remove a core that is neither connected nor connecting.
    fn evict(events: &EventDispatcher<ManagerEvent>, registry: &mut Registry, id: &str) {
        if registry.is_active(id) {
            debug!("Keeping connected core {}", id);
            return;
        }
        if let Some(core) = registry.cores.remove(id) {
            info!(core = %core.id(), "Lost core");
            events.send(ManagerEvent::Lost {
                core: core.id().clone(),
            });
        }
    }

    async fn on_disconnected(&self, id: &str) {
        let mut registry = self.registry.lock().await;
        let Some(announced) = registry
            .active
            .as_ref()
            .filter(|a| a.id == id)
            .map(|a| a.announced)
        else {
            Self::evict(&self.events, &mut registry, id);
            return;
        };
        let Some(core) = registry.cores.get(id).cloned() else {
            return;
        };

        core.end_sync().await;
        if !announced {
            // the connect still owns the slot and reports the failure
            if let Some(active) = registry.active.as_mut() {
                active.abort(Abort::LinkLost);
            }
            warn!(core = %core.id(), "Link lost while connecting");
            return;
        }

        registry.active = None;
        warn!(core = %core.id(), "Link lost");
        self.events.send(ManagerEvent::Disconnected {
            core: core.id().clone(),
            reason: DisconnectReason::LinkLost,
        });
    }

    // --- Connection ---

    /// Connect to a discovered core and synchronize its properties.
    ///
    /// Connecting the core that is already connected returns it again; while
    /// its first connect is still syncing, a second one fails with
    /// [`Error::ConnectInProgress`]. Failures, including a link lost or a
    /// [`disconnect`](Self::disconnect) before the sync finished, are
    /// reported as [`ManagerEvent::ConnectFailed`] and are not retried.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn connect(&self, id: &str) -> Result<Arc<Core>> {
        let core = {
            let mut registry = self.registry.lock().await;
            let core = registry
                .cores
                .get(id)
                .cloned()
                .ok_or_else(|| Error::device_not_found(id))?;
            match &registry.active {
                Some(active) if active.id == id && active.announced => {
                    debug!("Already connected");
                    return Ok(core);
                }
                Some(active) if active.id == id => {
                    return Err(Error::ConnectInProgress(id.to_string()));
                }
                Some(active) => return Err(Error::AlreadyConnected(active.id.clone())),
                None => {}
            }
            registry.active = Some(Active {
                id: id.to_string(),
                announced: false,
                aborted: None,
            });
            core
        };
        // The slot is reserved; the lock is released for the BLE work

        let link = match self.transport.connect(id).await {
            Ok(link) => link,
            Err(e) => {
                let e = self.abort_error(id, e).await;
                self.connect_failed(&core, &e).await;
                return Err(e);
            }
        };

        if let Err(e) = core.begin_sync(Arc::clone(&link)).await {
            Self::abandon(&core, &link).await;
            let e = self.abort_error(id, e).await;
            self.connect_failed(&core, &e).await;
            return Err(e);
        }

        let mut registry = self.registry.lock().await;
        if let Some(abort) = registry.take_abort(id) {
            drop(registry);
            Self::abandon(&core, &link).await;
            let e = abort.into_error(id);
            self.connect_failed(&core, &e).await;
            return Err(e);
        }
        if let Some(active) = registry.active.as_mut() {
            active.announced = true;
        }

        info!("Connected");
        self.events.send(ManagerEvent::Connected {
            core: core.id().clone(),
        });
        Ok(core)
    }

    /// The error a failed connect reports: why it was called off, if it was.
    async fn abort_error(&self, id: &str, error: Error) -> Error {
        match self.registry.lock().await.take_abort(id) {
            Some(abort) => abort.into_error(id),
            None => error,
        }
    }

    /// Detach a core from a link that will not be announced, and drop it.
    async fn abandon(core: &Core, link: &Arc<dyn Link>) {
        core.end_sync().await;
        if let Err(e) = link.disconnect().await {
            debug!("Disconnect after failed connect: {}", e);
        }
    }

    async fn connect_failed(&self, core: &Core, error: &Error) {
        let mut registry = self.registry.lock().await;
        if registry
            .active
            .as_ref()
            .is_some_and(|a| a.id == core.id().id && !a.announced)
        {
            registry.active = None;
        }
        warn!(core = %core.id(), "Connect failed: {}", error);
        self.events.send(ManagerEvent::ConnectFailed {
            core: core.id().clone(),
            reason: error.to_string(),
        });
    }

    /// Disconnect the connected core.
    ///
    /// Pending throttled writes are cancelled before the link is torn down,
    /// so none of them reach the device. [`ManagerEvent::Disconnected`] is
    /// emitted once teardown has finished. If teardown fails the core is
    /// still detached and the event still emitted, and the teardown error is
    /// returned.
    ///
    /// Disconnecting a core whose connect is still syncing cancels that
    /// connect, which then fails with [`Error::Cancelled`]. Disconnecting a
    /// known core that is not connected is a no-op.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn disconnect(&self, id: &str) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let core = registry
            .cores
            .get(id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(id))?;
        match registry.active.as_mut() {
            Some(active) if active.id == id && active.announced => {}
            Some(active) if active.id == id => {
                info!("Cancelling connect in progress");
                active.abort(Abort::Requested);
                core.end_sync().await;
                return Ok(());
            }
            _ => return Ok(()),
        }

        let link = core.end_sync().await;
        registry.active = None;

        // teardown runs under the lock so the link's own disconnect event
        // cannot be handled before ours is sent
        let result = match link {
            Some(link) => link.disconnect().await,
            None => Ok(()),
        };
        match &result {
            Ok(()) => info!("Disconnected"),
            Err(e) => warn!("Teardown failed, core detached anyway: {}", e),
        }
        self.events.send(ManagerEvent::Disconnected {
            core: core.id().clone(),
            reason: DisconnectReason::UserRequested,
        });
        result
    }

    /// Stop the pump, disconnect and forget every core.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.pump.lock().await.take() {
            let _ = handle.await;
        }

        let mut registry = self.registry.lock().await;
        if let Some(active) = registry.active.take()
            && let Some(core) = registry.cores.get(&active.id).cloned()
        {
            if let Some(link) = core.end_sync().await
                && let Err(e) = link.disconnect().await
            {
                warn!("Disconnect during shutdown failed: {}", e);
            }
            // a connect still syncing finds its slot gone and fails
            if active.announced {
                self.events.send(ManagerEvent::Disconnected {
                    core: core.id().clone(),
                    reason: DisconnectReason::Shutdown,
                });
            }
        }

        if registry.scanning
            && let Err(e) = self.transport.stop_scan().await
        {
            warn!("Failed to stop scan: {}", e);
        }
        registry.scanning = false;
        registry.scan_requested = false;
        registry.cores.clear();
        info!("Core manager shut down");
    }

    // --- Registry ---

    /// All known cores.
    pub async fn cores(&self) -> Vec<Arc<Core>> {
        self.registry.lock().await.cores.values().cloned().collect()
    }

    /// A known core by identifier.
    pub async fn core(&self, id: &str) -> Option<Arc<Core>> {
        self.registry.lock().await.cores.get(id).cloned()
    }

    /// The intentionally connected core, if any.
    ///
    /// A core whose connect is still syncing is not connected yet.
    pub async fn connected(&self) -> Option<Arc<Core>> {
        let registry = self.registry.lock().await;
        registry
            .active
            .as_ref()
            .filter(|a| a.announced)
            .and_then(|a| registry.cores.get(&a.id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLink, MockTransport};
    use shiner_types::uuids;

    async fn started(transport: &Arc<MockTransport>) -> Arc<CoreManager> {
        let manager = Arc::new(CoreManager::new(transport.clone()));
        manager.start().await.unwrap();
        manager
    }

    /// Let the pump task drain pending transport events.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_config_validation() {
        assert!(ManagerConfig::default().validate().is_ok());
        assert!(ManagerConfig::default().event_capacity(0).validate().is_err());
        assert!(
            ManagerConfig::default()
                .ready_poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_with_config_rejects_invalid() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let result = CoreManager::with_config(transport, ManagerConfig::new().event_capacity(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_scan_is_filtered_and_idempotent() {
        let transport = Arc::new(MockTransport::new());
        let manager = started(&transport).await;

        manager.start_scanning().await.unwrap();
        manager.start_scanning().await.unwrap();

        assert!(manager.scanning().await);
        assert_eq!(transport.scan_starts(), 1);
        assert_eq!(transport.scan_service().await, Some(SHINER_SERVICE));

        manager.stop_scanning().await.unwrap();
        assert!(!transport.is_scanning());
    }

    #[tokio::test]
    async fn test_advertisement_creates_core_once() {
        let transport = Arc::new(MockTransport::new());
        let manager = started(&transport).await;
        let mut events = manager.subscribe();
        manager.start_scanning().await.unwrap();

        transport.advertise("core-1", Some("Ada"), Some(-40)).await;
        transport.advertise("core-1", Some("Ada"), Some(-42)).await;
        settle().await;

        assert_eq!(manager.cores().await.len(), 1);
        let event = events.try_recv().unwrap();
        assert_eq!(
            event,
            ManagerEvent::Found {
                core: CoreId::with_name("core-1", "Ada"),
                rssi: Some(-40),
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_unknown_core() {
        let transport = Arc::new(MockTransport::new());
        let manager = started(&transport).await;
        assert!(matches!(
            manager.connect("nope").await,
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let transport = Arc::new(MockTransport::new());
        transport
            .add_peripheral(MockLink::builder().id("core-1").value(uuids::NAME, "Ada").build())
            .await;
        let manager = started(&transport).await;
        manager.start_scanning().await.unwrap();
        transport.advertise("core-1", None, None).await;
        settle().await;

        let core = manager.connect("core-1").await.unwrap();
        assert!(core.is_connected().await);
        assert_eq!(core.raw(shiner_types::Property::Name).await.as_deref(), Some("Ada"));
        assert!(manager.connected().await.is_some());

        // connecting again returns the same core
        let again = manager.connect("core-1").await.unwrap();
        assert!(Arc::ptr_eq(&core, &again));

        manager.disconnect("core-1").await.unwrap();
        assert!(!core.is_connected().await);
        assert!(manager.connected().await.is_none());
        assert!(!transport.peripheral("core-1").await.unwrap().is_connected());
    }

    /// A started, scanning manager that has found `core-1`.
    async fn with_core() -> (Arc<MockTransport>, Arc<CoreManager>, Arc<MockLink>) {
        let transport = Arc::new(MockTransport::new());
        let link = MockLink::builder().id("core-1").value(uuids::NAME, "Ada").build();
        transport.add_peripheral(Arc::clone(&link)).await;
        let manager = started(&transport).await;
        manager.start_scanning().await.unwrap();
        transport.advertise("core-1", None, None).await;
        settle().await;
        (transport, manager, link)
    }

    fn spawn_connect(manager: &Arc<CoreManager>) -> JoinHandle<Result<Arc<Core>>> {
        let manager = Arc::clone(manager);
        tokio::spawn(async move { manager.connect("core-1").await })
    }

    fn drain(events: &mut EventReceiver<ManagerEvent>) -> Vec<ManagerEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_event_follows_teardown() {
        let (_transport, manager, link) = with_core().await;
        manager.connect("core-1").await.unwrap();
        let mut events = manager.subscribe();

        link.set_disconnect_latency(Duration::from_millis(50));
        let disconnecting = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.disconnect("core-1").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(link.is_connected());
        assert!(drain(&mut events).is_empty());

        disconnecting.await.unwrap().unwrap();
        assert!(!link.is_connected());
        assert_eq!(
            drain(&mut events),
            vec![ManagerEvent::Disconnected {
                core: CoreId::new("core-1"),
                reason: DisconnectReason::UserRequested,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_teardown_still_detaches() {
        let (_transport, manager, link) = with_core().await;
        let core = manager.connect("core-1").await.unwrap();
        let mut events = manager.subscribe();

        link.set_fail_disconnect(true);
        assert!(manager.disconnect("core-1").await.is_err());

        assert!(!core.is_connected().await);
        assert!(manager.connected().await.is_none());
        assert!(matches!(
            drain(&mut events).as_slice(),
            [ManagerEvent::Disconnected {
                reason: DisconnectReason::UserRequested,
                ..
            }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_lost_while_syncing_fails_connect() {
        let (transport, manager, link) = with_core().await;
        let mut events = manager.subscribe();
        link.set_read_latency(Duration::from_millis(100));

        let connecting = spawn_connect(&manager);
        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.drop_link("core-1").await;

        let result = connecting.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::ConnectionFailed {
                reason: ConnectionFailureReason::LinkLost,
                ..
            })
        ));
        settle().await;

        let events = drain(&mut events);
        assert!(matches!(
            events.as_slice(),
            [ManagerEvent::ConnectFailed { .. }]
        ));
        assert!(manager.connected().await.is_none());
        // still known, ready for another attempt
        let core = manager.core("core-1").await.unwrap();
        assert!(!core.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_while_syncing_is_rejected() {
        let (_transport, manager, link) = with_core().await;
        link.set_read_latency(Duration::from_millis(100));

        let connecting = spawn_connect(&manager);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.connected().await.is_none());
        assert!(matches!(
            manager.connect("core-1").await,
            Err(Error::ConnectInProgress(_))
        ));

        let core = connecting.await.unwrap().unwrap();
        assert!(core.is_connected().await);
        assert!(Arc::ptr_eq(&core, &manager.connected().await.unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_syncing_cancels_connect() {
        let (_transport, manager, link) = with_core().await;
        let mut events = manager.subscribe();
        link.set_read_latency(Duration::from_millis(100));

        let connecting = spawn_connect(&manager);
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.disconnect("core-1").await.unwrap();

        assert!(matches!(connecting.await.unwrap(), Err(Error::Cancelled)));
        assert!(!link.is_connected());
        assert!(matches!(
            drain(&mut events).as_slice(),
            [ManagerEvent::ConnectFailed { .. }]
        ));

        // the slot is free again
        link.set_read_latency(Duration::ZERO);
        assert!(manager.connect("core-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry() {
        let transport = Arc::new(MockTransport::new());
        let manager = started(&transport).await;
        manager.start_scanning().await.unwrap();
        transport.advertise("core-1", None, None).await;
        settle().await;
        assert_eq!(manager.cores().await.len(), 1);

        manager.shutdown().await;
        assert!(manager.cores().await.is_empty());
        assert!(!transport.is_scanning());
        assert!(matches!(manager.start().await, Err(Error::Cancelled)));
    }
}
