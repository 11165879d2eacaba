//! A Shiner core and its synchronized properties.
//!
//! A [`Core`] exists for every advertising device the manager knows about.
//! While connected it owns a [`Link`], binds each known property to the
//! endpoint the firmware exposes for it, and keeps a raw value per property
//! in sync with the device: incoming reads and notifications overwrite it,
//! local writes update it optimistically and are then sent through a
//! per-property [`Throttler`].
//!
//! # Example
//!
//! ```ignore
//! let core = manager.connect("AA:BB:CC:DD:EE:FF").await?;
//!
//! core.write(Property::Brightness, "128").await?;
//! core.write_value(Property::Color, PropertyValue::Color(Rgb::new(255, 0, 0))).await?;
//!
//! let speed: Option<f64> = core.typed_value(Property::Speed).await;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shiner_types::{Documentation, Property, PropertyType, PropertyValue};

use crate::error::{Error, Result};
use crate::events::{CoreEvent, CoreId, DEFAULT_EVENT_CAPACITY, EventDispatcher, EventReceiver};
use crate::state::{PropertySnapshot, PropertyState};
use crate::throttle::{DEFAULT_WRITE_DELAY, SlotRelease, Throttler};
use crate::transport::Link;

/// Configuration for property synchronization.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use shiner_core::CoreConfig;
/// use shiner_types::Property;
///
/// let config = CoreConfig::default()
///     .write_delay(Duration::from_millis(50))
///     .property_write_delay(Property::Name, Duration::from_millis(500));
/// assert_eq!(config.delay_for(Property::Name), Duration::from_millis(500));
/// assert_eq!(config.delay_for(Property::Color), Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Delay before a throttled write fires.
    pub write_delay: Duration,
    /// Per-property overrides of `write_delay`.
    pub write_delays: HashMap<Property, Duration>,
    /// Capacity of the per-core event channel.
    pub event_capacity: usize,
    /// Re-read a property after a write to it failed.
    pub refresh_after_failed_write: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            write_delay: DEFAULT_WRITE_DELAY,
            write_delays: HashMap::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            refresh_after_failed_write: true,
        }
    }
}

impl CoreConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default write delay.
    #[must_use]
    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Override the write delay of one property.
    #[must_use]
    pub fn property_write_delay(mut self, property: Property, delay: Duration) -> Self {
        self.write_delays.insert(property, delay);
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set whether failed writes trigger a re-read.
    #[must_use]
    pub fn refresh_after_failed_write(mut self, refresh: bool) -> Self {
        self.refresh_after_failed_write = refresh;
        self
    }

    /// Effective write delay of a property.
    pub fn delay_for(&self, property: Property) -> Duration {
        self.write_delays
            .get(&property)
            .copied()
            .unwrap_or(self.write_delay)
    }

    /// Validate the config and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig("event_capacity must be > 0".to_string()));
        }
        if let Some(property) = self.write_delays.keys().find(|p| !p.is_writable()) {
            return Err(Error::InvalidConfig(format!(
                "write delay set for read-only property '{property}'"
            )));
        }
        Ok(())
    }
}

/// State guarded by the core's lock.
struct Inner {
    /// Indexed by `Property as usize`.
    states: Vec<PropertyState>,
    link: Option<Arc<dyn Link>>,
    /// Bumped on every connection and teardown; results of an older session
    /// are discarded.
    session: u64,
}

impl Inner {
    fn state(&self, property: Property) -> &PropertyState {
        &self.states[property as usize]
    }

    fn state_mut(&mut self, property: Property) -> &mut PropertyState {
        &mut self.states[property as usize]
    }
}

/// One Shiner core.
///
/// Always used behind an `Arc`: throttled writes and the notification pump
/// run on spawned tasks that need to reach back into the core.
pub struct Core {
    id: CoreId,
    config: CoreConfig,
    inner: RwLock<Inner>,
    /// Endpoint UUID to property, built once.
    directory: HashMap<Uuid, Property>,
    /// Indexed by `Property as usize`.
    throttlers: Vec<Throttler>,
    notification_task: Mutex<Option<JoinHandle<()>>>,
    events: EventDispatcher<CoreEvent>,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Core {
    /// Create a disconnected core.
    pub fn new(id: CoreId, config: CoreConfig) -> Self {
        let directory = Property::ALL.iter().map(|p| (p.endpoint(), *p)).collect();
        let throttlers = Property::ALL
            .iter()
            .map(|p| Throttler::new(config.delay_for(*p)))
            .collect();

        Self {
            inner: RwLock::new(Inner {
                states: Property::ALL.iter().map(|p| PropertyState::new(*p)).collect(),
                link: None,
                session: 0,
            }),
            directory,
            throttlers,
            notification_task: Mutex::new(None),
            events: EventDispatcher::new(config.event_capacity.max(1)),
            id,
            config,
        }
    }

    /// Identity of the core.
    pub fn id(&self) -> &CoreId {
        &self.id
    }

    /// The advertised name, or `"Unknown"`.
    pub fn name(&self) -> &str {
        self.id.display_name()
    }

    /// The config the core was created with.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Subscribe to property events.
    pub fn subscribe(&self) -> EventReceiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Whether the core currently holds a link.
    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.link.is_some()
    }

    // --- Synchronization ---

    /// Bind properties on a fresh link and load their values.
    ///
    /// Every property is reset first, so nothing learned on a previous
    /// connection survives. Properties whose endpoint the link does not
    /// expose stay unavailable. A failed initial read is reported as
    /// [`CoreEvent::ReadFailed`] and does not fail the sync.
    #[tracing::instrument(level = "info", skip_all, fields(core = %self.id.id))]
    pub async fn begin_sync(self: &Arc<Self>, link: Arc<dyn Link>) -> Result<()> {
        self.stop_background().await;

        let session = {
            let mut inner = self.inner.write().await;
            inner.session = inner.session.wrapping_add(1);
            for state in &mut inner.states {
                if state.is_available() {
                    self.events.send(CoreEvent::AvailabilityChanged {
                        property: state.property(),
                        available: false,
                    });
                }
                if state.raw().is_some() {
                    self.events.send(CoreEvent::PropertyChanged {
                        property: state.property(),
                        raw: None,
                    });
                }
                state.reset();
            }
            inner.link = Some(Arc::clone(&link));
            inner.session
        };

        info!("Discovering endpoints...");
        let endpoints = link.discover_endpoints().await?;
        debug!("Link exposes {} endpoints", endpoints.len());

        let (readable, notifiable) = {
            let mut inner = self.inner.write().await;
            if inner.session != session {
                return Err(Error::Cancelled);
            }

            let mut readable = Vec::new();
            let mut notifiable = Vec::new();
            for endpoint in endpoints {
                let Some(&property) = self.directory.get(&endpoint.uuid) else {
                    debug!("Ignoring unknown endpoint {}", endpoint.uuid);
                    continue;
                };
                if inner.state_mut(property).bind(endpoint) {
                    self.events.send(CoreEvent::AvailabilityChanged {
                        property,
                        available: true,
                    });
                }
                if endpoint.readable {
                    readable.push(property);
                }
                if endpoint.notifiable {
                    notifiable.push((property, endpoint.uuid));
                }
            }
            (readable, notifiable)
        };

        if !notifiable.is_empty() {
            self.start_notifications(&link, session, &notifiable).await;
        }

        // failures are reported per property by refresh()
        let _ = join_all(readable.iter().map(|p| self.refresh(*p))).await;

        let available = self.available_properties().await;
        info!("Synced {} properties", available.len());
        self.events.send(CoreEvent::SyncComplete { available });
        Ok(())
    }

    async fn start_notifications(
        self: &Arc<Self>,
        link: &Arc<dyn Link>,
        session: u64,
        endpoints: &[(Property, Uuid)],
    ) {
        let mut stream = match link.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Notifications unavailable: {}", e);
                return;
            }
        };

        for (property, uuid) in endpoints {
            if let Err(e) = link.subscribe(*uuid).await {
                warn!("Failed to subscribe to {}: {}", property, e);
            }
        }

        let core: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let Some(core) = core.upgrade() else {
                    break;
                };
                core.apply_value(Some(session), notification.endpoint, &notification.value)
                    .await;
            }
            debug!("Notification stream ended");
        });

        *self.notification_task.lock().await = Some(handle);
    }

    /// Detach from the current link.
    ///
    /// Cancels every throttled write, stops the notification pump and clears
    /// all bindings. Raw values are kept until the next connection. Returns
    /// the link so the caller can tear it down; no write reaches it after
    /// this returns.
    #[tracing::instrument(level = "info", skip(self), fields(core = %self.id.id))]
    pub async fn end_sync(&self) -> Option<Arc<dyn Link>> {
        self.stop_background().await;

        let mut inner = self.inner.write().await;
        inner.session = inner.session.wrapping_add(1);
        for state in &mut inner.states {
            if state.unbind() {
                self.events.send(CoreEvent::AvailabilityChanged {
                    property: state.property(),
                    available: false,
                });
            }
        }
        inner.link.take()
    }

    async fn stop_background(&self) {
        for throttler in &self.throttlers {
            throttler.cancel();
        }
        if let Some(handle) = self.notification_task.lock().await.take() {
            handle.abort();
        }
    }

    // --- Incoming values ---

    /// Handle a value received from an endpoint.
    ///
    /// Values that are not UTF-8 are dropped with a
    /// [`CoreEvent::DecodeError`]; the previous value is kept. Values for
    /// unknown or unbound endpoints are ignored. A change event is emitted
    /// only when the raw value actually changed.
    pub async fn on_endpoint_value(&self, endpoint: Uuid, bytes: &[u8]) {
        self.apply_value(None, endpoint, bytes).await;
    }

    async fn apply_value(&self, session: Option<u64>, endpoint: Uuid, bytes: &[u8]) {
        let Some(&property) = self.directory.get(&endpoint) else {
            debug!("Ignoring value for unknown endpoint {}", endpoint);
            return;
        };

        let raw = match String::from_utf8(bytes.to_vec()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Dropping non-UTF-8 value for {}: {}", property, e);
                self.events.send(CoreEvent::DecodeError {
                    endpoint,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let mut inner = self.inner.write().await;
        if session.is_some_and(|s| s != inner.session) {
            debug!("Dropping stale value for {}", property);
            return;
        }
        let state = inner.state_mut(property);
        if !state.is_available() {
            debug!("Dropping value for unbound property {}", property);
            return;
        }
        if state.set_raw(raw.clone()) {
            self.events.send(CoreEvent::PropertyChanged {
                property,
                raw: Some(raw),
            });
        }
    }

    // --- Reads ---

    /// Read a property from the device.
    ///
    /// The result flows through the same path as notifications.
    #[tracing::instrument(level = "debug", skip(self), fields(core = %self.id.id))]
    pub async fn refresh(&self, property: Property) -> Result<()> {
        let (link, endpoint, session) = {
            let inner = self.inner.read().await;
            let state = inner.state(property);
            let Some(binding) = state.binding().filter(|b| b.readable) else {
                return Err(Error::PropertyUnavailable { property });
            };
            let link = inner.link.clone().ok_or(Error::NotConnected)?;
            (link, binding.uuid, inner.session)
        };

        match link.read(endpoint).await {
            Ok(bytes) => {
                self.apply_value(Some(session), endpoint, &bytes).await;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to read {}: {}", property, e);
                self.events.send(CoreEvent::ReadFailed {
                    property,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    // --- Writes ---

    /// Write a raw value.
    ///
    /// The local value is updated and observers notified right away; the
    /// transport write happens after the property's write delay and carries
    /// whatever the value is at that moment.
    ///
    /// Fails with [`Error::PropertyUnavailable`] before touching anything if
    /// the property is not bound on the current connection.
    pub async fn write(
        self: &Arc<Self>,
        property: Property,
        raw: impl Into<String>,
    ) -> Result<()> {
        // submitting under the state lock keeps a running flush from freeing
        // its slot between our local update and our submission
        let mut inner = self.inner.write().await;
        let session = self.apply_local_write(&mut inner, property, raw.into())?;

        let core = Arc::clone(self);
        let submitted = self.throttlers[property as usize].submit(move |release| async move {
            core.flush_write(session, property, release).await
        });
        if submitted.is_none() {
            debug!("Write to {} coalesced into pending write", property);
        }
        Ok(())
    }

    /// Write a typed value after checking it matches the property's kind.
    pub async fn write_value(
        self: &Arc<Self>,
        property: Property,
        value: PropertyValue,
    ) -> Result<()> {
        let raw = self.encode(property, &value)?;
        self.write(property, raw).await
    }

    /// Encode a typed value for a property.
    pub fn encode(&self, property: Property, value: &PropertyValue) -> Result<String> {
        if value.kind() != property.kind() {
            return Err(Error::KindMismatch {
                property,
                expected: property.kind(),
                actual: value.kind(),
            });
        }
        Ok(value.encode())
    }

    /// Validate a write and apply it to the local state.
    fn apply_local_write(
        &self,
        inner: &mut Inner,
        property: Property,
        raw: String,
    ) -> Result<u64> {
        let session = inner.session;
        let state = inner.state_mut(property);

        let Some(binding) = state.binding() else {
            return Err(Error::PropertyUnavailable { property });
        };
        if !binding.writable || !property.is_writable() {
            return Err(Error::NotWritable { property });
        }

        if state.set_raw(raw.clone()) {
            self.events.send(CoreEvent::PropertyChanged {
                property,
                raw: Some(raw),
            });
        }
        state.set_pending_write(true);
        Ok(session)
    }

    /// Send the current value of a property.
    ///
    /// Runs inside the property's throttler slot. If the value changed while
    /// the transport write was in progress, the newer value is sent too. The
    /// slot is freed under the state lock, in the same step that finds
    /// nothing left to send, so a concurrent [`Core::write`] either lands
    /// before that check or schedules a fresh flush.
    async fn flush_write(
        self: Arc<Self>,
        session: u64,
        property: Property,
        release: SlotRelease,
    ) -> Result<()> {
        let mut last_sent: Option<String> = None;

        loop {
            let (link, endpoint, raw) = {
                let mut inner = self.inner.write().await;
                if inner.session != session {
                    return Err(Error::Cancelled);
                }
                let link = inner.link.clone().ok_or(Error::NotConnected)?;
                let state = inner.state_mut(property);
                let Some(endpoint) = state.binding().map(|b| b.uuid) else {
                    return Err(Error::PropertyUnavailable { property });
                };
                let raw = state.raw().unwrap_or_default().to_string();
                if last_sent.as_deref() == Some(raw.as_str()) {
                    state.set_pending_write(false);
                    release.release();
                    return Ok(());
                }
                (link, endpoint, raw)
            };

            debug!("Writing {} = {:?}", property, raw);
            if let Err(e) = link.write(endpoint, raw.as_bytes()).await {
                let reason = e.to_string();
                {
                    let mut inner = self.inner.write().await;
                    if inner.session == session {
                        inner.state_mut(property).set_pending_write(false);
                    }
                    release.release();
                }
                self.report_write_failure(property, &reason).await;
                return Err(Error::write_failed(property, reason));
            }
            last_sent = Some(raw);
        }
    }

    /// Report a failed write.
    ///
    /// The optimistic local value is not rolled back. When
    /// [`CoreConfig::refresh_after_failed_write`] is set, the property is
    /// re-read so the local value converges on the device's.
    pub async fn on_write_failed(&self, property: Property, reason: &str) {
        self.inner
            .write()
            .await
            .state_mut(property)
            .set_pending_write(false);
        self.report_write_failure(property, reason).await;
    }

    async fn report_write_failure(&self, property: Property, reason: &str) {
        warn!("Write to {} failed: {}", property, reason);
        self.events.send(CoreEvent::WriteFailed {
            property,
            reason: reason.to_string(),
        });

        if self.config.refresh_after_failed_write
            && let Err(e) = self.refresh(property).await
        {
            debug!("Refresh after failed write to {} failed: {}", property, e);
        }
    }

    /// Write a value now, bypassing the throttler.
    async fn write_now(&self, property: Property, raw: String) -> Result<()> {
        self.throttlers[property as usize].cancel();

        let (link, endpoint) = {
            let mut inner = self.inner.write().await;
            self.apply_local_write(&mut inner, property, raw.clone())?;
            let link = inner.link.clone().ok_or(Error::NotConnected)?;
            let endpoint = inner
                .state(property)
                .binding()
                .map(|b| b.uuid)
                .ok_or(Error::PropertyUnavailable { property })?;
            (link, endpoint)
        };

        let result = link.write(endpoint, raw.as_bytes()).await;
        match result {
            Ok(()) => {
                self.inner
                    .write()
                    .await
                    .state_mut(property)
                    .set_pending_write(false);
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.on_write_failed(property, &reason).await;
                Err(Error::write_failed(property, reason))
            }
        }
    }

    // --- Typed accessors ---

    /// Raw value of a property.
    pub async fn raw(&self, property: Property) -> Option<String> {
        self.inner.read().await.state(property).raw().map(str::to_string)
    }

    /// Decoded value of a property; `None` when absent or malformed.
    pub async fn value(&self, property: Property) -> Option<PropertyValue> {
        self.inner.read().await.state(property).value()
    }

    /// Decoded value as a concrete type; `None` when absent, malformed or of
    /// a different kind.
    pub async fn typed_value<T: PropertyType>(&self, property: Property) -> Option<T> {
        self.inner.read().await.state(property).typed()
    }

    /// Whether a property is bound on the current connection.
    pub async fn is_available(&self, property: Property) -> bool {
        self.inner.read().await.state(property).is_available()
    }

    /// Properties bound on the current connection.
    pub async fn available_properties(&self) -> Vec<Property> {
        self.inner
            .read()
            .await
            .states
            .iter()
            .filter(|s| s.is_available())
            .map(PropertyState::property)
            .collect()
    }

    /// Snapshot of one property.
    pub async fn snapshot(&self, property: Property) -> PropertySnapshot {
        self.inner.read().await.state(property).snapshot()
    }

    /// Snapshots of every property, in table order.
    pub async fn snapshots(&self) -> Vec<PropertySnapshot> {
        self.inner
            .read()
            .await
            .states
            .iter()
            .map(PropertyState::snapshot)
            .collect()
    }

    // --- Domain helpers ---

    /// Option lists published by the firmware, if any.
    pub async fn documentation(&self) -> Option<Documentation> {
        let raw = self.raw(Property::Documentation).await?;
        match Documentation::parse(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!("Ignoring documentation: {}", e);
                None
            }
        }
    }

    /// Valid options of an enum-like property.
    ///
    /// Empty when the property is not enum-like or the firmware published no
    /// documentation for it.
    pub async fn options(&self, property: Property) -> Vec<String> {
        let Some(list) = property.option_list() else {
            return Vec::new();
        };
        self.documentation()
            .await
            .map(|doc| doc.options(list).to_vec())
            .unwrap_or_default()
    }

    /// Switch the active layer and reload the layer-scoped properties.
    #[tracing::instrument(level = "debug", skip(self), fields(core = %self.id.id))]
    pub async fn switch_layer(&self, layer: i64) -> Result<()> {
        self.write_now(Property::Layer, layer.to_string()).await?;

        let mut scoped = Vec::new();
        {
            let inner = self.inner.read().await;
            for property in Property::LAYER_SCOPED {
                if inner.state(property).is_readable() {
                    scoped.push(property);
                }
            }
        }
        let _ = join_all(scoped.into_iter().map(|p| self.refresh(p))).await;
        Ok(())
    }

    /// Turn the lights on or off.
    pub async fn set_lights_on(self: &Arc<Self>, on: bool) -> Result<()> {
        self.write(Property::Mode, if on { "1" } else { "0" }).await
    }

    /// Whether the lights are on, if known.
    pub async fn lights_on(&self) -> Option<bool> {
        self.typed_value::<i64>(Property::Mode).await.map(|m| m > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLink;
    use shiner_types::{Rgb, uuids};

    fn core() -> Arc<Core> {
        Arc::new(Core::new(CoreId::new("core-1"), CoreConfig::default()))
    }

    #[test]
    fn test_config_validate() {
        assert!(CoreConfig::default().validate().is_ok());
        assert!(CoreConfig::default().event_capacity(0).validate().is_err());
        assert!(
            CoreConfig::default()
                .property_write_delay(Property::Documentation, Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_new_core_has_nothing_available() {
        let core = core();
        assert!(!core.is_connected().await);
        assert!(core.available_properties().await.is_empty());
        assert_eq!(core.snapshots().await.len(), Property::COUNT);
        assert_eq!(core.name(), "Unknown");
    }

    #[tokio::test]
    async fn test_write_unavailable_fails_without_side_effects() {
        let core = core();
        let mut rx = core.subscribe();

        let err = core.write(Property::Color, "1 2 3").await.unwrap_err();
        assert!(matches!(
            err,
            Error::PropertyUnavailable {
                property: Property::Color
            }
        ));
        assert_eq!(core.raw(Property::Color).await, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_begin_sync_binds_and_reads() {
        let link = MockLink::builder()
            .value(uuids::COLOR, "255 0 0")
            .value(uuids::SPEED, "2.5")
            .build();
        let core = core();

        core.begin_sync(link).await.unwrap();

        assert!(core.is_available(Property::Color).await);
        assert!(core.is_available(Property::Speed).await);
        assert!(!core.is_available(Property::BlendMode).await);
        assert_eq!(
            core.typed_value::<Rgb>(Property::Color).await,
            Some(Rgb::new(255, 0, 0))
        );
        assert_eq!(core.typed_value::<f64>(Property::Speed).await, Some(2.5));
    }

    #[tokio::test]
    async fn test_resync_withdraws_missing_endpoints() {
        let core = core();
        core.begin_sync(
            MockLink::builder()
                .value(uuids::COLOR, "255 0 0")
                .value(uuids::SPEED, "2.5")
                .build(),
        )
        .await
        .unwrap();
        let mut rx = core.subscribe();

        core.begin_sync(MockLink::builder().value(uuids::COLOR, "0 0 255").build())
            .await
            .unwrap();

        let events: Vec<CoreEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.contains(&CoreEvent::AvailabilityChanged {
            property: Property::Speed,
            available: false,
        }));
        assert!(events.contains(&CoreEvent::PropertyChanged {
            property: Property::Speed,
            raw: None,
        }));
        assert!(!events.contains(&CoreEvent::AvailabilityChanged {
            property: Property::Speed,
            available: true,
        }));
        assert!(!core.is_available(Property::Speed).await);
        assert_eq!(core.raw(Property::Speed).await, None);
        assert_eq!(core.raw(Property::Color).await.as_deref(), Some("0 0 255"));
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_ignored() {
        let link = MockLink::builder().value(uuids::NAME, "Ada").build();
        let core = core();
        core.begin_sync(link).await.unwrap();

        let mut rx = core.subscribe();
        core.on_endpoint_value(Uuid::nil(), b"x").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_utf8_keeps_previous_value() {
        let link = MockLink::builder().value(uuids::NAME, "Ada").build();
        let core = core();
        core.begin_sync(link).await.unwrap();

        let mut rx = core.subscribe();
        core.on_endpoint_value(uuids::NAME, &[0xff, 0xfe]).await;

        assert_eq!(core.raw(Property::Name).await.as_deref(), Some("Ada"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoreEvent::DecodeError { endpoint, .. } if endpoint == uuids::NAME
        ));
    }

    #[tokio::test]
    async fn test_same_value_emits_no_event() {
        let link = MockLink::builder().value(uuids::BRIGHTNESS, "10").build();
        let core = core();
        core.begin_sync(link).await.unwrap();

        let mut rx = core.subscribe();
        core.on_endpoint_value(uuids::BRIGHTNESS, b"10").await;
        assert!(rx.try_recv().is_err());

        core.on_endpoint_value(uuids::BRIGHTNESS, b"11").await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CoreEvent::PropertyChanged {
                property: Property::Brightness,
                raw: Some("11".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_encode_checks_kind() {
        let core = core();
        assert_eq!(
            core.encode(Property::Speed, &PropertyValue::Real(0.5)).unwrap(),
            "0.5"
        );
        assert!(matches!(
            core.encode(Property::Speed, &PropertyValue::Int(1)),
            Err(Error::KindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_documentation_options() {
        let link = MockLink::builder()
            .value(uuids::ANIMATION, "0")
            .value(
                uuids::DOCUMENTATION,
                r#"{"animations":["Solid","Rainbow"],"blendModes":["Add"]}"#,
            )
            .build();
        let core = core();
        core.begin_sync(link).await.unwrap();

        assert_eq!(core.options(Property::Animation).await, ["Solid", "Rainbow"]);
        assert_eq!(core.options(Property::BlendMode).await, ["Add"]);
        assert!(core.options(Property::LedOrder).await.is_empty());
        assert!(core.options(Property::Speed).await.is_empty());
    }

    #[tokio::test]
    async fn test_options_empty_without_documentation() {
        let link = MockLink::builder().value(uuids::BLEND_MODE, "Add").build();
        let core = core();
        core.begin_sync(link).await.unwrap();

        assert!(core.is_available(Property::BlendMode).await);
        assert!(core.documentation().await.is_none());
        assert!(core.options(Property::BlendMode).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_only_property_rejects_writes() {
        let link = MockLink::builder().value(uuids::DOCUMENTATION, "{}").build();
        let core = core();
        core.begin_sync(link).await.unwrap();

        assert!(matches!(
            core.write(Property::Documentation, "{}").await,
            Err(Error::NotWritable { .. })
        ));
    }

    #[tokio::test]
    async fn test_end_sync_clears_bindings_keeps_values() {
        let link = MockLink::builder().value(uuids::NAME, "Ada").build();
        let core = core();
        core.begin_sync(link).await.unwrap();

        assert!(core.end_sync().await.is_some());
        assert!(!core.is_connected().await);
        assert!(!core.is_available(Property::Name).await);
        assert_eq!(core.raw(Property::Name).await.as_deref(), Some("Ada"));
        assert!(core.end_sync().await.is_none());
    }
}
