//! Notification dispatch.
//!
//! Every payload on the data characteristic goes through
//! [`Dispatcher::dispatch`], which classifies it by length, runs the codec and
//! hands the result to the registered observer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, trace};

use flow_types::{HistoryBlock, Notification, PacketKind, decode_live_reading};

/// Observer callback receiving decoded notifications.
pub type Observer = Arc<dyn Fn(Notification) + Send + Sync>;

/// Single-slot observer registry shared between a session and its
/// notification handler.
///
/// Cloning is cheap and all clones share the same slot.
#[derive(Clone, Default)]
pub struct Dispatcher {
    observer: Arc<Mutex<Option<Observer>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("has_observer", &self.has_observer())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with no observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`, replacing any previous one.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        *self.slot() = Some(Arc::new(observer));
    }

    /// Whether an observer is registered.
    pub fn has_observer(&self) -> bool {
        self.slot().is_some()
    }

    /// Route one raw notification.
    ///
    /// - exactly 20 bytes: decoded as a live reading; undecodable payloads are dropped
    /// - more than 20 bytes: forwarded unmodified as a history block
    /// - anything shorter: dropped
    pub fn dispatch(&self, payload: &[u8]) {
        match PacketKind::classify(payload.len()) {
            PacketKind::Live => match decode_live_reading(payload) {
                Ok(value) => {
                    trace!(pm25 = value, "Live reading");
                    self.notify(Notification::Live(value));
                }
                Err(e) => trace!(error = %e, "Dropping undecodable live packet"),
            },
            PacketKind::History => {
                trace!(len = payload.len(), "History block");
                let block = HistoryBlock::new(Bytes::copy_from_slice(payload));
                self.notify(Notification::History(block));
            }
            PacketKind::Unknown => {
                debug!(len = payload.len(), "Unknown packet size");
            }
        }
    }

    // The observer runs outside the lock so a slow one cannot stall
    // `set_observer`.
    fn notify(&self, notification: Notification) {
        let observer = self.slot().clone();
        if let Some(observer) = observer {
            observer(notification);
        }
    }

    // A panicking observer must not take dispatch down with it.
    fn slot(&self) -> MutexGuard<'_, Option<Observer>> {
        self.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (Dispatcher, Arc<Mutex<Vec<Notification>>>) {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.set_observer(move |n| sink.lock().unwrap().push(n));
        (dispatcher, seen)
    }

    #[test]
    fn test_live_packet_reaches_observer() {
        let (dispatcher, seen) = collecting();
        let mut packet = vec![0u8; 8];
        packet.extend_from_slice(&35.5f32.to_le_bytes());
        packet.extend_from_slice(&[0u8; 8]);

        dispatcher.dispatch(&packet);

        assert_eq!(*seen.lock().unwrap(), vec![Notification::Live(35.5)]);
    }

    #[test]
    fn test_history_packet_is_passed_through() {
        let (dispatcher, seen) = collecting();
        let mut packet = vec![0x64, 0x00, 0x00, 0x00];
        packet.extend((0..21).map(|i| i as u8));

        dispatcher.dispatch(&packet);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let block = seen[0].history().expect("history block");
        assert_eq!(block.as_bytes(), packet.as_slice());
        assert_eq!(block.timestamp().unwrap().unix_timestamp(), 100);
    }

    #[test]
    fn test_short_packets_are_dropped() {
        let (dispatcher, seen) = collecting();
        for len in 0..20 {
            dispatcher.dispatch(&vec![0xFF; len]);
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let (dispatcher, seen) = collecting();
        for value in [1.0f32, 2.0, 3.0] {
            let mut packet = [0u8; 20];
            packet[8..12].copy_from_slice(&value.to_le_bytes());
            dispatcher.dispatch(&packet);
        }
        dispatcher.dispatch(&[0u8; 30]);

        let kinds: Vec<_> = seen.lock().unwrap().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["live", "live", "live", "history"]);
        let values: Vec<_> = seen.lock().unwrap().iter().filter_map(|n| n.pm25()).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_observer_is_replaced() {
        let dispatcher = Dispatcher::new();
        let first = Arc::new(Mutex::new(0u32));
        let second = Arc::new(Mutex::new(0u32));

        let counter = Arc::clone(&first);
        dispatcher.set_observer(move |_| *counter.lock().unwrap() += 1);
        let counter = Arc::clone(&second);
        dispatcher.set_observer(move |_| *counter.lock().unwrap() += 1);

        dispatcher.dispatch(&[0u8; 20]);

        assert_eq!(*first.lock().unwrap(), 0);
        assert_eq!(*second.lock().unwrap(), 1);
    }

    #[test]
    fn test_dispatch_without_observer_is_noop() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.has_observer());
        dispatcher.dispatch(&[0u8; 20]);
        dispatcher.dispatch(&[0u8; 40]);
    }

    #[test]
    fn test_observer_may_replace_itself() {
        let dispatcher = Dispatcher::new();
        let replaced = Arc::new(Mutex::new(false));

        let inner = dispatcher.clone();
        let flag = Arc::clone(&replaced);
        dispatcher.set_observer(move |_| {
            let flag = Arc::clone(&flag);
            inner.set_observer(move |_| *flag.lock().unwrap() = true);
        });

        dispatcher.dispatch(&[0u8; 20]);
        assert!(!*replaced.lock().unwrap());
        dispatcher.dispatch(&[0u8; 20]);
        assert!(*replaced.lock().unwrap());
    }

    #[test]
    fn test_slow_observer_does_not_block_replacement() {
        let dispatcher = Dispatcher::new();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        dispatcher.set_observer(move |_| {
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
        });

        let worker = dispatcher.clone();
        let pump = std::thread::spawn(move || worker.dispatch(&[0u8; 20]));
        entered_rx.recv().unwrap();

        // Would deadlock if the slot stayed locked during the callback.
        dispatcher.set_observer(|_| {});
        assert!(dispatcher.has_observer());

        release_tx.send(()).unwrap();
        pump.join().unwrap();
    }
}
