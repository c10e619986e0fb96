//! In-memory transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] without BLE hardware. Clones
//! share state, so a test keeps one handle to inject failures, push
//! notifications and inspect what the session wrote while the session owns
//! another.
//!
//! # Example
//!
//! ```
//! use flow_core::{MockTransport, Session, SessionState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     let mut session = Session::new(mock.clone(), "MOCK-01");
//!     session.connect().await.unwrap();
//!     assert_eq!(session.state(), SessionState::Authenticated);
//!     assert_eq!(mock.connect_count(), 1);
//!     session.disconnect().await;
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::WriteType;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{Link, NotificationHandler, Transport};

/// A write the link accepted or refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Target characteristic.
    pub characteristic: Uuid,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// How it was written.
    pub write_type: WriteType,
    /// Whether the write succeeded.
    pub succeeded: bool,
}

#[derive(Debug, Clone)]
struct WriteRule {
    characteristic: Uuid,
    write_type: Option<WriteType>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl WriteRule {
    fn matches(&self, characteristic: Uuid, write_type: WriteType) -> bool {
        self.characteristic == characteristic
            && self.write_type.is_none_or(|wt| wt == write_type)
    }
}

#[derive(Default)]
struct MockState {
    connected: AtomicBool,
    connect_failure: Mutex<Option<String>>,
    connect_delay: Mutex<Option<Duration>>,
    write_rules: Mutex<Vec<WriteRule>>,
    writes: Mutex<Vec<WriteRecord>>,
    read_values: Mutex<HashMap<Uuid, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    handlers: Mutex<HashMap<Uuid, NotificationHandler>>,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
    subscribe_count: AtomicU32,
    unsubscribe_count: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`Transport`] with failure injection.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("connected", &self.state.connected.load(Ordering::Relaxed))
            .field("connect_count", &self.connect_count())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Create a transport whose links accept everything.
    pub fn new() -> Self {
        Self::default()
    }

    // --- failure injection ---

    /// Make subsequent connects fail with `reason`.
    pub fn fail_connect(&self, reason: impl Into<String>) {
        *lock(&self.state.connect_failure) = Some(reason.into());
    }

    /// Delay connects, so a short connection timeout fires.
    pub fn delay_connect(&self, delay: Duration) {
        *lock(&self.state.connect_delay) = Some(delay);
    }

    /// Make writes to `characteristic` fail. `None` matches any write type.
    pub fn fail_writes(
        &self,
        characteristic: Uuid,
        write_type: Option<WriteType>,
        reason: impl Into<String>,
    ) {
        lock(&self.state.write_rules).push(WriteRule {
            characteristic,
            write_type,
            failure: Some(reason.into()),
            delay: None,
        });
    }

    /// Make writes to `characteristic` take `delay` before completing.
    pub fn delay_writes(
        &self,
        characteristic: Uuid,
        write_type: Option<WriteType>,
        delay: Duration,
    ) {
        lock(&self.state.write_rules).push(WriteRule {
            characteristic,
            write_type,
            failure: None,
            delay: Some(delay),
        });
    }

    /// Remove all write rules.
    pub fn clear_write_rules(&self) {
        lock(&self.state.write_rules).clear();
    }

    /// Make every read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subscribe fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make unsubscribe fail.
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.state.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Simulate the device going out of range.
    pub fn drop_connection(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
    }

    // --- device behaviour ---

    /// Value returned by reads of `characteristic`.
    pub fn set_read_value(&self, characteristic: Uuid, value: impl Into<Vec<u8>>) {
        lock(&self.state.read_values).insert(characteristic, value.into());
    }

    /// Deliver a notification on `characteristic`.
    ///
    /// Returns whether anything was subscribed to it.
    pub fn notify(&self, characteristic: Uuid, payload: &[u8]) -> bool {
        let handler = lock(&self.state.handlers).get(&characteristic).cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    // --- inspection ---

    /// Every write attempt, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.state.writes).clone()
    }

    /// Number of successful writes to `characteristic` of `write_type`.
    pub fn write_count(&self, characteristic: Uuid, write_type: WriteType) -> usize {
        lock(&self.state.writes)
            .iter()
            .filter(|w| w.characteristic == characteristic && w.write_type == write_type)
            .filter(|w| w.succeeded)
            .count()
    }

    /// Number of write attempts to `characteristic` of `write_type`,
    /// successful or not.
    pub fn write_attempts(&self, characteristic: Uuid, write_type: WriteType) -> usize {
        lock(&self.state.writes)
            .iter()
            .filter(|w| w.characteristic == characteristic && w.write_type == write_type)
            .count()
    }

    /// Whether a handler is registered for `characteristic`.
    pub fn is_subscribed(&self, characteristic: Uuid) -> bool {
        lock(&self.state.handlers).contains_key(&characteristic)
    }

    /// Whether the simulated link is up.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u32 {
        self.state.connect_count.load(Ordering::SeqCst)
    }

    /// Number of link disconnects.
    pub fn disconnect_count(&self) -> u32 {
        self.state.disconnect_count.load(Ordering::SeqCst)
    }

    /// Number of successful subscribes.
    pub fn subscribe_count(&self) -> u32 {
        self.state.subscribe_count.load(Ordering::SeqCst)
    }

    /// Number of unsubscribe attempts, successful or not.
    pub fn unsubscribe_count(&self) -> u32 {
        self.state.unsubscribe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Link = MockLink;

    async fn connect(&self, address: &str, budget: Duration) -> Result<MockLink> {
        let delay = *lock(&self.state.connect_delay);
        if let Some(delay) = delay
            && timeout(budget, sleep(delay)).await.is_err()
        {
            return Err(Error::timeout("connect to device", budget));
        }

        let failure = lock(&self.state.connect_failure).clone();
        if let Some(reason) = failure {
            return Err(Error::connection_failed_str(Some(address.to_string()), reason));
        }

        self.state.connected.store(true, Ordering::SeqCst);
        self.state.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(MockLink {
            state: Arc::clone(&self.state),
        })
    }
}

/// Link produced by [`MockTransport`].
pub struct MockLink {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("connected", &self.state.connected.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl Link for MockLink {
    async fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Bluetooth(btleplug::Error::Other(
                "mock read failure".into(),
            )));
        }
        lock(&self.state.read_values)
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(characteristic.to_string(), 0))
    }

    async fn write(&self, characteristic: Uuid, data: &[u8], write_type: WriteType) -> Result<()> {
        let rules: Vec<WriteRule> = lock(&self.state.write_rules)
            .iter()
            .filter(|r| r.matches(characteristic, write_type))
            .cloned()
            .collect();

        for delay in rules.iter().filter_map(|r| r.delay) {
            sleep(delay).await;
        }

        let failure = rules.iter().find_map(|r| r.failure.clone()).or_else(|| {
            (!self.state.connected.load(Ordering::SeqCst)).then(|| "not connected".to_string())
        });

        lock(&self.state.writes).push(WriteRecord {
            characteristic,
            data: data.to_vec(),
            write_type,
            succeeded: failure.is_none(),
        });

        match failure {
            Some(reason) => Err(Error::write_failed(characteristic.to_string(), reason)),
            None => Ok(()),
        }
    }

    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::Bluetooth(btleplug::Error::Other(
                "mock subscribe failure".into(),
            )));
        }
        lock(&self.state.handlers).insert(characteristic, handler);
        self.state.subscribe_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.state.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(Error::Bluetooth(btleplug::Error::Other(
                "mock unsubscribe failure".into(),
            )));
        }
        lock(&self.state.handlers).remove(&characteristic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        lock(&self.state.handlers).clear();
        self.state.disconnect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::uuid::{COMMAND, DATA};

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let mock = MockTransport::new();
        let link = mock.connect("AA", Duration::from_secs(1)).await.unwrap();
        assert!(link.is_connected().await);
        assert_eq!(mock.connect_count(), 1);

        link.disconnect().await.unwrap();
        assert!(!mock.is_connected());
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mock = MockTransport::new();
        mock.fail_connect("out of range");
        let err = mock.connect("AA", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { .. }));
        assert_eq!(mock.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_delay_times_out() {
        let mock = MockTransport::new();
        mock.delay_connect(Duration::from_secs(60));
        let err = mock.connect("AA", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_write_rules_match_type() {
        let mock = MockTransport::new();
        mock.fail_writes(COMMAND, Some(WriteType::WithoutResponse), "nope");
        let link = mock.connect("AA", Duration::from_secs(1)).await.unwrap();

        assert!(link.write(COMMAND, &[1], WriteType::WithResponse).await.is_ok());
        assert!(
            link.write(COMMAND, &[1], WriteType::WithoutResponse)
                .await
                .is_err()
        );

        assert_eq!(mock.write_count(COMMAND, WriteType::WithResponse), 1);
        assert_eq!(mock.write_count(COMMAND, WriteType::WithoutResponse), 0);
        assert_eq!(mock.write_attempts(COMMAND, WriteType::WithoutResponse), 1);
    }

    #[tokio::test]
    async fn test_notify_reaches_handler() {
        let mock = MockTransport::new();
        let link = mock.connect("AA", Duration::from_secs(1)).await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        assert!(!mock.notify(DATA, &[1]));
        link.subscribe(DATA, Arc::new(move |p: &[u8]| sink.lock().unwrap().push(p.to_vec())))
            .await
            .unwrap();
        assert!(mock.notify(DATA, &[1, 2]));
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);

        link.unsubscribe(DATA).await.unwrap();
        assert!(!mock.is_subscribed(DATA));
    }

    #[tokio::test]
    async fn test_reads() {
        let mock = MockTransport::new();
        let link = mock.connect("AA", Duration::from_secs(1)).await.unwrap();
        mock.set_read_value(COMMAND, vec![7]);
        assert_eq!(link.read(COMMAND).await.unwrap(), vec![7]);

        mock.fail_reads(true);
        assert!(link.read(COMMAND).await.is_err());
    }
}
