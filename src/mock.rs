//! In-memory transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] without any Bluetooth
//! hardware. Clones share state, so a test keeps one handle to script the
//! device while the session owns another.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N link attempts, every write, or teardown
//! - **Latency simulation**: delay link establishment or writes
//! - **Frame injection**: push raw notification frames to the subscriber
//! - **Link loss**: end the notification stream as a dropped device would

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::ble::transport::{Connection, NotificationStream, Transport};
use crate::error::{Error, Result};
use crate::protocol::commands::{CommandType, COMMAND_HEADER};

#[derive(Default)]
struct MockState {
    open_attempts: AtomicU32,
    remaining_open_failures: AtomicU32,
    fail_writes: AtomicBool,
    fail_teardown: AtomicBool,
    unsubscribe_count: AtomicU32,
    close_count: AtomicU32,
    open_latency: Mutex<Duration>,
    write_latency: Mutex<Duration>,
    written: Mutex<Vec<(Uuid, Vec<u8>)>>,
    notifier: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

/// A scriptable transport for tests.
///
/// # Example
///
/// ```
/// use easyhome_ble::mock::MockTransport;
///
/// let transport = MockTransport::new();
/// transport.fail_next_opens(2);
/// assert_eq!(transport.open_attempts(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("open_attempts", &self.open_attempts())
            .field("link_open", &self.is_link_open())
            .finish()
    }
}

impl MockTransport {
    /// Create a transport whose links always succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` link attempts fail with a transient error.
    pub fn fail_next_opens(&self, count: u32) {
        self.state
            .remaining_open_failures
            .store(count, Ordering::SeqCst);
    }

    /// Make every write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make unsubscribe and close fail (or succeed again).
    pub fn set_fail_teardown(&self, fail: bool) {
        self.state.fail_teardown.store(fail, Ordering::SeqCst);
    }

    /// Delay every link attempt by `latency`.
    pub fn set_open_latency(&self, latency: Duration) {
        *self.state.open_latency.lock() = latency;
    }

    /// Delay every write by `latency`.
    pub fn set_write_latency(&self, latency: Duration) {
        *self.state.write_latency.lock() = latency;
    }

    /// Number of link attempts so far.
    pub fn open_attempts(&self) -> u32 {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    /// Number of unsubscribe calls so far.
    pub fn unsubscribe_count(&self) -> u32 {
        self.state.unsubscribe_count.load(Ordering::SeqCst)
    }

    /// Number of close calls so far.
    pub fn close_count(&self) -> u32 {
        self.state.close_count.load(Ordering::SeqCst)
    }

    /// Frames written to any characteristic, oldest first.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.state
            .written
            .lock()
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Command types of the command frames written so far, oldest first.
    pub fn written_commands(&self) -> Vec<CommandType> {
        self.state
            .written
            .lock()
            .iter()
            .filter(|(_, data)| data.first() == Some(&COMMAND_HEADER))
            .filter_map(|(_, data)| data.get(1).copied().and_then(CommandType::from_raw))
            .collect()
    }

    /// Frames written, with the characteristic each went to.
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state.written.lock().clone()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.state.written.lock().clear();
    }

    /// Whether a subscriber is currently attached.
    pub fn is_link_open(&self) -> bool {
        self.state.notifier.lock().is_some()
    }

    /// Deliver a raw notification frame. Returns false if nobody is subscribed.
    pub fn push_notification(&self, frame: &[u8]) -> bool {
        match self.state.notifier.lock().as_ref() {
            Some(tx) => tx.unbounded_send(frame.to_vec()).is_ok(),
            None => false,
        }
    }

    /// End the notification stream as if the device went out of range.
    pub fn drop_link(&self) {
        if self.state.notifier.lock().take().is_some() {
            debug!("Mock link dropped");
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_connection(&self, address: &str) -> Result<Box<dyn Connection>> {
        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);

        let latency = *self.state.open_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let should_fail = self
            .state
            .remaining_open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::ConnectionFailed {
                reason: format!("simulated failure reaching {}", address),
            });
        }

        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }
}

/// A link opened by [`MockTransport`].
pub struct MockConnection {
    state: Arc<MockState>,
}

impl MockConnection {
    fn teardown_result(&self, step: &str) -> Result<()> {
        if self.state.fail_teardown.load(Ordering::SeqCst) {
            Err(Error::ConnectionFailed {
                reason: format!("simulated {} failure", step),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn subscribe(&self, _characteristic: Uuid) -> Result<NotificationStream> {
        let (tx, rx) = mpsc::unbounded();
        *self.state.notifier.lock() = Some(tx);
        Ok(Box::pin(rx))
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> Result<()> {
        self.state.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
        self.teardown_result("unsubscribe")
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let latency = *self.state.write_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailed {
                reason: "simulated write failure".to_string(),
            });
        }
        self.state
            .written
            .lock()
            .push((characteristic, data.to_vec()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.close_count.fetch_add(1, Ordering::SeqCst);
        self.state.notifier.lock().take();
        self.teardown_result("close")
    }
}
