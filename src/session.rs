//! Session with a single thermometer.
//!
//! A [`SessionManager`] owns the link to one device address. It subscribes
//! to measurement notifications, decodes each frame, and hands valid
//! readings to the registered callback in arrival order. Commands go out
//! through the same link.
//!
//! State transitions:
//! - `Disconnected -> Connecting -> Connected` on a successful `connect()`
//! - `Connecting -> Disconnected` when retries run out or the call is cancelled
//! - `Connected -> Disconnecting -> Disconnected` on `disconnect()`
//! - `Connected -> Disconnected` when the transport drops the link; the next
//!   command then fails with [`CommandError::ConnectionLost`]

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use futures::future::BoxFuture;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::ble::connection::ConnectionState;
use crate::ble::retry::{with_retry_counted, RetryPolicy};
use crate::ble::transport::{Connection, NotificationStream, Transport};
use crate::ble::uuids::{COMMAND_CHARACTERISTIC_UUID, NOTIFY_CHARACTERISTIC_UUID};
use crate::data::{Measurement, TemperatureUnit};
use crate::error::{
    CommandError, ConnectError, DecodeError, DisconnectError, EncodeError, Error, Result,
};
use crate::protocol::commands::{Command, TimeSyncCommand, UnitSyncCommand};
use crate::protocol::notification::decode_notification;
use crate::utils::hex_frame;

/// Handler invoked for every decoded measurement.
pub type MeasurementCallback = Arc<dyn Fn(Measurement) + Send + Sync>;

/// Event emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The connection state changed.
    StateChanged {
        /// Device address.
        address: String,
        /// The new connection state.
        state: ConnectionState,
    },
    /// A notification frame was malformed and dropped.
    FrameRejected {
        /// Device address.
        address: String,
        /// Why the frame was rejected.
        error: DecodeError,
    },
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Retry policy applied to link establishment.
    pub retry: RetryPolicy,
    /// Write the host's local time to the device after connecting.
    pub sync_time_on_connect: bool,
    /// Unit to select on the device after connecting, if any.
    pub unit_on_connect: Option<TemperatureUnit>,
    /// Re-establish the link after the transport drops it.
    pub auto_reconnect: bool,
    /// Capacity of the event and measurement broadcast channels, and of the
    /// queue feeding the measurement callback.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::for_connect(),
            sync_time_on_connect: true,
            unit_on_connect: None,
            auto_reconnect: false,
            channel_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Set the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable or disable the clock sync after connecting.
    pub fn with_time_sync(mut self, enabled: bool) -> Self {
        self.sync_time_on_connect = enabled;
        self
    }

    /// Select a unit on the device after connecting.
    pub fn with_unit_on_connect(mut self, unit: Option<TemperatureUnit>) -> Self {
        self.unit_on_connect = unit;
        self
    }

    /// Enable or disable reconnecting after a dropped link.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the broadcast channel and callback queue capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// A live link and the tasks draining it.
struct Link {
    connection: Arc<dyn Connection>,
    pump: JoinHandle<()>,
    delivery: Option<JoinHandle<()>>,
}

impl Link {
    fn stop_tasks(&self) {
        self.pump.abort();
        if let Some(ref delivery) = self.delivery {
            delivery.abort();
        }
    }
}

struct SessionState {
    connection: ConnectionState,
    link: Option<Link>,
    /// Set when the transport dropped the link; cleared once reported.
    connection_lost: bool,
    /// Bumped on every new link and every explicit disconnect.
    generation: u64,
    reconnect: Option<JoinHandle<()>>,
}

impl SessionState {
    fn transition(&mut self, new_state: ConnectionState) -> Option<ConnectionState> {
        let old_state = std::mem::replace(&mut self.connection, new_state);
        if old_state == new_state {
            return None;
        }
        debug!("Connection state changed: {} -> {}", old_state, new_state);
        Some(new_state)
    }
}

struct SessionInner<T: Transport> {
    address: String,
    transport: T,
    config: SessionConfig,
    state: RwLock<SessionState>,
    /// Serializes connect, disconnect and command calls.
    op_lock: tokio::sync::Mutex<()>,
    callback: RwLock<Option<MeasurementCallback>>,
    event_tx: broadcast::Sender<SessionEvent>,
    measurement_tx: broadcast::Sender<Measurement>,
}

/// Forces the session back to Disconnected if an operation is abandoned
/// part way, closing any link it had opened.
struct LinkGuard<'a, T: Transport> {
    inner: &'a SessionInner<T>,
    pending: Mutex<Option<Arc<dyn Connection>>>,
    armed: bool,
}

impl<'a, T: Transport> LinkGuard<'a, T> {
    fn new(inner: &'a SessionInner<T>) -> Self {
        Self {
            inner,
            pending: Mutex::new(None),
            armed: true,
        }
    }

    fn hold(&self, connection: Arc<dyn Connection>) {
        *self.pending.lock() = Some(connection);
    }

    fn release(&self) {
        self.pending.lock().take();
    }

    fn disarm(mut self) {
        self.release();
        self.armed = false;
    }
}

impl<T: Transport> Drop for LinkGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        if let Some(connection) = self.pending.get_mut().take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = connection.close().await;
                });
            }
        }

        let changed = self
            .inner
            .state
            .write()
            .transition(ConnectionState::Disconnected);
        self.inner.emit_state(changed);
    }
}

impl<T: Transport> SessionInner<T> {
    fn emit_state(&self, changed: Option<ConnectionState>) {
        if let Some(state) = changed {
            let _ = self.event_tx.send(SessionEvent::StateChanged {
                address: self.address.clone(),
                state,
            });
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.read();
        state.generation == generation && state.connection.is_connected()
    }

    /// Open a link and subscribe, closing the link again if subscribing fails.
    async fn establish(
        &self,
        guard: &LinkGuard<'_, T>,
    ) -> Result<(Arc<dyn Connection>, NotificationStream)> {
        let connection: Arc<dyn Connection> =
            Arc::from(self.transport.open_connection(&self.address).await?);
        guard.hold(connection.clone());

        match connection.subscribe(NOTIFY_CHARACTERISTIC_UUID).await {
            Ok(stream) => Ok((connection, stream)),
            Err(e) => {
                guard.release();
                if let Err(close_err) = connection.close().await {
                    debug!("Closing half-open link failed: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn write_command(
        &self,
        connection: &Arc<dyn Connection>,
        command: &Command,
    ) -> Result<()> {
        let frame = command.to_bytes();
        debug!(
            "Sending {:?} to {}: [{}]",
            command.command_type(),
            self.address,
            hex_frame(&frame)
        );
        connection.write(COMMAND_CHARACTERISTIC_UUID, &frame).await
    }

    async fn initial_sync(&self, connection: &Arc<dyn Connection>) {
        if self.config.sync_time_on_connect {
            let now = Local::now().naive_local();
            let sent = match TimeSyncCommand::from_datetime(&now) {
                Ok(cmd) => self.write_command(connection, &Command::TimeSync(cmd)).await,
                Err(e) => Err(Error::Encode(e)),
            };
            if let Err(e) = sent {
                warn!("Initial time sync with {} failed: {}", self.address, e);
            }
        }

        if let Some(unit) = self.config.unit_on_connect {
            let command = Command::UnitSync(unit.into());
            if let Err(e) = self.write_command(connection, &command).await {
                warn!("Initial unit sync with {} failed: {}", self.address, e);
            }
        }
    }

    /// Connect while holding the operation lock.
    async fn connect_locked(self: &Arc<Self>) -> std::result::Result<(), ConnectError> {
        let current = self.state.read().connection;
        if current.is_connected() {
            debug!("Already connected to {}", self.address);
            return Ok(());
        }

        let changed = self.state.write().transition(ConnectionState::Connecting);
        self.emit_state(changed);
        info!("Connecting to {}", self.address);

        let guard = LinkGuard::new(self);
        let (connection, stream) =
            match with_retry_counted(&self.config.retry, "connect", || self.establish(&guard))
                .await
            {
                Ok(link) => link,
                Err((attempts, e)) => {
                    warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        self.address, attempts, e
                    );
                    return Err(ConnectError::Unreachable {
                        attempts,
                        reason: e.to_string(),
                    });
                }
            };

        self.initial_sync(&connection).await;

        let changed = {
            let mut state = self.state.write();
            state.generation += 1;
            let generation = state.generation;

            let callback = self.callback.read().clone();
            let (delivery_tx, delivery) = match callback {
                Some(callback) => {
                    let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
                    (Some(tx), Some(tokio::spawn(deliver(rx, callback))))
                }
                None => (None, None),
            };

            let pump = tokio::spawn(pump(
                Arc::downgrade(self),
                generation,
                stream,
                delivery_tx,
            ));

            state.link = Some(Link {
                connection,
                pump,
                delivery,
            });
            state.connection_lost = false;
            state.transition(ConnectionState::Connected)
        };
        guard.disarm();
        self.emit_state(changed);

        info!("Connected to {}", self.address);

        Ok(())
    }

    /// React to the notification stream ending.
    fn handle_link_lost(self: Arc<Self>, generation: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let (changed, link) = {
                let mut state = self.state.write();
                if state.generation != generation || !state.connection.is_connected() {
                    return;
                }
                state.connection_lost = true;
                let changed = state.transition(ConnectionState::Disconnected);
                (changed, state.link.take())
            };
            self.emit_state(changed);
            warn!("Link to {} lost", self.address);

            if let Some(link) = link {
                if let Err(e) = link.connection.close().await {
                    debug!("Closing lost link failed: {}", e);
                }
            }

            if self.config.auto_reconnect {
                let session = Arc::downgrade(&self);
                let handle = tokio::spawn(async move {
                    let Some(inner) = session.upgrade() else {
                        return;
                    };
                    let _op = inner.op_lock.lock().await;
                    {
                        let state = inner.state.read();
                        if state.generation != generation
                            || state.connection != ConnectionState::Disconnected
                        {
                            return;
                        }
                    }

                    info!("Reconnecting to {}", inner.address);
                    match inner.connect_locked().await {
                        Ok(()) => info!("Reconnected to {}", inner.address),
                        Err(e) => warn!("Reconnect to {} failed: {}", inner.address, e),
                    }
                });
                self.state.write().reconnect = Some(handle);
            }
        })
    }

    fn command_link(&self) -> std::result::Result<Arc<dyn Connection>, CommandError> {
        let mut state = self.state.write();
        if state.connection.is_connected() {
            if let Some(ref link) = state.link {
                return Ok(link.connection.clone());
            }
        }
        if std::mem::take(&mut state.connection_lost) {
            return Err(CommandError::ConnectionLost);
        }
        Err(CommandError::NotConnected)
    }
}

/// Decode frames from the link until it ends.
async fn pump<T: Transport>(
    session: Weak<SessionInner<T>>,
    generation: u64,
    mut stream: NotificationStream,
    delivery: Option<mpsc::Sender<Measurement>>,
) {
    while let Some(frame) = stream.next().await {
        let Some(inner) = session.upgrade() else {
            return;
        };
        if !inner.is_current(generation) {
            return;
        }

        match decode_notification(&frame) {
            Ok(measurement) => {
                trace!("Measurement from {}: {:?}", inner.address, measurement);
                let _ = inner.measurement_tx.send(measurement);
                // A full queue holds back the stream until the callback catches up
                if let Some(ref tx) = delivery {
                    let _ = tx.send(measurement).await;
                }
            }
            Err(error) => {
                warn!(
                    "Dropping malformed notification from {}: {} [{}]",
                    inner.address,
                    error,
                    hex_frame(&frame)
                );
                let _ = inner.event_tx.send(SessionEvent::FrameRejected {
                    address: inner.address.clone(),
                    error,
                });
            }
        }
    }

    drop(delivery);
    debug!("Notification stream ended");

    if let Some(inner) = session.upgrade() {
        inner.handle_link_lost(generation).await;
    }
}

/// Hand measurements to the callback one at a time, in order.
async fn deliver(mut rx: mpsc::Receiver<Measurement>, callback: MeasurementCallback) {
    while let Some(measurement) = rx.recv().await {
        callback(measurement);
    }
}

/// Session with one thermometer.
///
/// # Example
///
/// ```
/// use easyhome_ble::mock::MockTransport;
/// use easyhome_ble::{ConnectionState, SessionConfig, SessionManager};
///
/// # #[tokio::main]
/// # async fn main() -> easyhome_ble::Result<()> {
/// let session = SessionManager::new("AA:BB:CC:DD:EE:FF", MockTransport::new(), SessionConfig::default());
/// session.set_measurement_callback(|m| println!("{:.2} at {}", m.temperature(), m.timestamp()))?;
///
/// session.connect().await?;
/// assert_eq!(session.connection_state(), ConnectionState::Connected);
///
/// session.set_unit(true).await?;
/// session.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<T: Transport> {
    inner: Arc<SessionInner<T>>,
}

impl<T: Transport> SessionManager<T> {
    /// Create a session for `address`, starting Disconnected.
    pub fn new(address: impl Into<String>, transport: T, config: SessionConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (event_tx, _) = broadcast::channel(capacity);
        let (measurement_tx, _) = broadcast::channel(capacity);

        Self {
            inner: Arc::new(SessionInner {
                address: address.into(),
                transport,
                config,
                state: RwLock::new(SessionState {
                    connection: ConnectionState::Disconnected,
                    link: None,
                    connection_lost: false,
                    generation: 0,
                    reconnect: None,
                }),
                op_lock: tokio::sync::Mutex::new(()),
                callback: RwLock::new(None),
                event_tx,
                measurement_tx,
            }),
        }
    }

    /// Create a session with a measurement callback already registered.
    pub fn with_callback<F>(
        address: impl Into<String>,
        transport: T,
        config: SessionConfig,
        callback: F,
    ) -> Self
    where
        F: Fn(Measurement) + Send + Sync + 'static,
    {
        let session = Self::new(address, transport, config);
        *session.inner.callback.write() = Some(Arc::new(callback));
        session
    }

    // === Identification ===

    /// The device address this session is bound to.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // === Connection ===

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.read().connection
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Connect, subscribe to measurements, and start delivering them.
    ///
    /// Link establishment is retried per the configured [`RetryPolicy`].
    /// Connecting an already connected session is a no-op. Dropping the
    /// returned future cancels the attempt and leaves the session
    /// Disconnected.
    pub async fn connect(&self) -> std::result::Result<(), ConnectError> {
        let _op = self.inner.op_lock.lock().await;
        self.inner.connect_locked().await
    }

    /// Like [`connect`](Self::connect), but gives up after `limit`.
    pub async fn connect_timeout(&self, limit: Duration) -> std::result::Result<(), ConnectError> {
        match tokio::time::timeout(limit, self.connect()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Connect to {} timed out after {:?}", self.inner.address, limit);
                Err(ConnectError::Cancelled)
            }
        }
    }

    /// Unsubscribe and close the link.
    ///
    /// Always leaves the session Disconnected, even when teardown reports an
    /// error. Disconnecting a disconnected session succeeds and also cancels
    /// any pending automatic reconnect.
    pub async fn disconnect(&self) -> std::result::Result<(), DisconnectError> {
        if let Some(reconnect) = self.inner.state.write().reconnect.take() {
            reconnect.abort();
        }

        let _op = self.inner.op_lock.lock().await;

        let (changed, link) = {
            let mut state = self.inner.state.write();
            state.generation += 1;
            state.connection_lost = false;
            if state.connection == ConnectionState::Disconnected {
                debug!("Already disconnected from {}", self.inner.address);
                return Ok(());
            }
            let changed = state.transition(ConnectionState::Disconnecting);
            (changed, state.link.take())
        };
        self.inner.emit_state(changed);

        info!("Disconnecting from {}", self.inner.address);

        let guard = LinkGuard::new(&self.inner);
        let mut failure: Option<String> = None;

        if let Some(link) = link {
            link.stop_tasks();
            guard.hold(link.connection.clone());

            if let Err(e) = link.connection.unsubscribe(NOTIFY_CHARACTERISTIC_UUID).await {
                warn!("Unsubscribe from {} failed: {}", self.inner.address, e);
                failure = Some(e.to_string());
            }
            guard.release();
            if let Err(e) = link.connection.close().await {
                warn!("Close of {} failed: {}", self.inner.address, e);
                failure.get_or_insert(e.to_string());
            }
        }

        // Dropping the armed guard forces Disconnected
        drop(guard);
        info!("Disconnected from {}", self.inner.address);

        match failure {
            Some(reason) => Err(DisconnectError::TeardownFailed { reason }),
            None => Ok(()),
        }
    }

    // === Commands ===

    /// Set the device clock.
    ///
    /// The device has no timezone; pass local wall-clock time, e.g.
    /// `Local::now().naive_local()`.
    pub async fn set_datetime(
        &self,
        timestamp: NaiveDateTime,
    ) -> std::result::Result<(), CommandError> {
        self.send_command(|| TimeSyncCommand::from_datetime(&timestamp).map(Command::TimeSync))
            .await
    }

    /// Set the device clock to the host's current local time.
    pub async fn sync_clock(&self) -> std::result::Result<(), CommandError> {
        self.set_datetime(Local::now().naive_local()).await
    }

    /// Select Celsius (`true`) or Fahrenheit (`false`) on the device.
    ///
    /// Measurements carry no unit; remember what was configured to interpret
    /// them.
    pub async fn set_unit(&self, celsius: bool) -> std::result::Result<(), CommandError> {
        self.send_command(|| Ok(Command::UnitSync(UnitSyncCommand::new(celsius))))
            .await
    }

    async fn send_command<F>(&self, build: F) -> std::result::Result<(), CommandError>
    where
        F: FnOnce() -> std::result::Result<Command, EncodeError>,
    {
        let _op = self.inner.op_lock.lock().await;
        let connection = self.inner.command_link()?;
        let command = build()?;

        self.inner
            .write_command(&connection, &command)
            .await
            .map_err(|e| {
                warn!(
                    "{:?} to {} failed: {}",
                    command.command_type(),
                    self.inner.address,
                    e
                );
                CommandError::WriteFailed {
                    reason: e.to_string(),
                }
            })
    }

    // === Measurements ===

    /// Register the measurement callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the session is Disconnected.
    pub fn set_measurement_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Measurement) + Send + Sync + 'static,
    {
        self.replace_callback(Some(Arc::new(callback)))
    }

    /// Remove the measurement callback.
    pub fn clear_measurement_callback(&self) -> Result<()> {
        self.replace_callback(None)
    }

    fn replace_callback(&self, callback: Option<MeasurementCallback>) -> Result<()> {
        let state = self.inner.state.read();
        if state.connection != ConnectionState::Disconnected {
            return Err(Error::InvalidState {
                state: state.connection,
            });
        }
        *self.inner.callback.write() = callback;
        Ok(())
    }

    /// Subscribe to decoded measurements.
    ///
    /// Slow receivers may lag and miss values; the callback never does.
    pub fn subscribe_measurements(&self) -> broadcast::Receiver<Measurement> {
        self.inner.measurement_tx.subscribe()
    }

    /// Subscribe to state changes and rejected frames.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }
}

impl<T: Transport> Drop for SessionManager<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.write();
        if let Some(reconnect) = state.reconnect.take() {
            reconnect.abort();
        }
        if let Some(link) = state.link.take() {
            link.stop_tasks();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let address = self.inner.address.clone();
                handle.spawn(async move {
                    if let Err(e) = link.connection.close().await {
                        debug!("Closing link to {} on drop failed: {}", address, e);
                    }
                });
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for SessionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("address", &self.inner.address)
            .field("connection_state", &self.connection_state())
            .finish()
    }
}
