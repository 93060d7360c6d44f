use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::reconciliation::{ReconcileResult, ReconciliationEngine, SeatStatusSnapshot};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Anything that can produce a fresh snapshot for a trip.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn snapshot(&self, trip_id: Uuid) -> ReconcileResult<SeatStatusSnapshot>;
}

#[async_trait]
impl StatusSource for ReconciliationEngine {
    async fn snapshot(&self, trip_id: Uuid) -> ReconcileResult<SeatStatusSnapshot> {
        self.compute_status(trip_id).await
    }
}

struct Poller {
    trip_id: Uuid,
    handle: JoinHandle<()>,
}

/// Re-computes one trip's seat status on a fixed interval and publishes it
/// on a watch channel.
///
/// Every enable/disable bumps a generation counter; a poll that finishes
/// after its generation has passed is dropped instead of published.
pub struct LiveMonitor {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Option<SeatStatusSnapshot>>>,
    poller: Mutex<Option<Poller>>,
}

impl LiveMonitor {
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            source,
            interval,
            generation: Arc::new(AtomicU64::new(0)),
            tx: Arc::new(tx),
            poller: Mutex::new(None),
        }
    }

    /// Starts polling `trip_id`, replacing any trip already being watched.
    pub fn enable(&self, trip_id: Uuid) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = poller.take() {
            previous.handle.abort();
        }

        // Bumped under the channel lock so no stale publish can land after it.
        let mut generation = 0;
        self.tx.send_if_modified(|value| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if value.as_ref().is_some_and(|s| s.trip_id != trip_id) {
                *value = None;
                return true;
            }
            false
        });

        let source = self.source.clone();
        let tx = self.tx.clone();
        let current = self.generation.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match source.snapshot(trip_id).await {
                    Ok(snapshot) => {
                        if !publish_if_current(&tx, &current, generation, snapshot) {
                            debug!("Discarding stale poll for trip {}", trip_id);
                            break;
                        }
                    }
                    Err(_) if current.load(Ordering::SeqCst) != generation => break,
                    Err(e) => warn!("Live status poll for trip {} failed: {}", trip_id, e),
                }
            }
        });

        *poller = Some(Poller { trip_id, handle });
        debug!("Live monitoring enabled for trip {}", trip_id);
    }

    /// Stops polling. The last published snapshot stays readable.
    pub fn disable(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        self.tx.send_if_modified(|_| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            false
        });

        if let Some(previous) = poller.take() {
            previous.handle.abort();
            debug!("Live monitoring disabled for trip {}", previous.trip_id);
        }
    }

    pub fn active_trip(&self) -> Option<Uuid> {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|p| p.trip_id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SeatStatusSnapshot>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<SeatStatusSnapshot> {
        self.tx.borrow().clone()
    }

    /// Polls the active trip right now. Unlike the background loop, errors
    /// are returned. `Ok(None)` when monitoring is disabled.
    pub async fn refresh(&self) -> ReconcileResult<Option<SeatStatusSnapshot>> {
        let (trip_id, generation) = {
            let poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
            match poller.as_ref() {
                Some(p) => (p.trip_id, self.generation.load(Ordering::SeqCst)),
                None => return Ok(None),
            }
        };

        let snapshot = self.source.snapshot(trip_id).await?;
        publish_if_current(&self.tx, &self.generation, generation, snapshot.clone());
        Ok(Some(snapshot))
    }
}

/// Publishes `snapshot` only if `generation` is still current. The check runs
/// inside the channel lock, the same lock `enable`/`disable` bump under.
fn publish_if_current(
    tx: &watch::Sender<Option<SeatStatusSnapshot>>,
    current: &AtomicU64,
    generation: u64,
    snapshot: SeatStatusSnapshot,
) -> bool {
    let mut is_current = false;
    tx.send_if_modified(|value| {
        is_current = current.load(Ordering::SeqCst) == generation;
        if is_current {
            *value = Some(snapshot);
        }
        is_current
    });
    is_current
}

impl Drop for LiveMonitor {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let poller = self.poller.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = poller.take() {
            previous.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::{reconcile, ReconcileError};
    use busline_core::CoreError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    const INTERVAL: Duration = Duration::from_millis(3000);

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        failing: AtomicBool,
        /// Parks the next call until `gate` is notified.
        hold_next: AtomicBool,
        entered: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl StatusSource for FakeSource {
        async fn snapshot(&self, trip_id: Uuid) -> ReconcileResult<SeatStatusSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hold_next.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.gate.notified().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReconcileError::Core(CoreError::StorageError("ledger offline".to_string())));
            }
            Ok(reconcile(trip_id, Uuid::nil(), &[], None, &HashSet::new()))
        }
    }

    fn monitor() -> (Arc<FakeSource>, LiveMonitor) {
        let source = Arc::new(FakeSource::default());
        let monitor = LiveMonitor::new(source.clone(), INTERVAL);
        (source, monitor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval() {
        let (source, monitor) = monitor();
        let trip_id = Uuid::new_v4();
        let mut rx = monitor.subscribe();

        monitor.enable(trip_id);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|s| s.trip_id), Some(trip_id));

        tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_stops_polling() {
        let (source, monitor) = monitor();
        monitor.enable(Uuid::new_v4());
        tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;

        monitor.disable();
        let calls = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(INTERVAL * 5).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
        assert!(monitor.active_trip().is_none());
        assert!(monitor.latest().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_keep_last_snapshot() {
        let (source, monitor) = monitor();
        let trip_id = Uuid::new_v4();
        let mut rx = monitor.subscribe();

        monitor.enable(trip_id);
        rx.changed().await.unwrap();
        source.failing.store(true, Ordering::SeqCst);

        tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(10)).await;
        assert!(source.calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(monitor.latest().map(|s| s.trip_id), Some(trip_id));

        assert!(monitor.refresh().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_trip_clears_old_snapshot() {
        let (_source, monitor) = monitor();
        let mut rx = monitor.subscribe();

        monitor.enable(Uuid::new_v4());
        rx.changed().await.unwrap();

        let second = Uuid::new_v4();
        monitor.enable(second);
        assert!(monitor.latest().is_none());

        let refreshed = monitor.refresh().await.unwrap();
        assert_eq!(refreshed.map(|s| s.trip_id), Some(second));
        assert_eq!(monitor.active_trip(), Some(second));
    }

    #[tokio::test]
    async fn test_refresh_when_disabled() {
        let (source, monitor) = monitor();
        assert!(monitor.refresh().await.unwrap().is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_outlived_by_trip_switch_is_not_published() {
        let source = Arc::new(FakeSource::default());
        let monitor = Arc::new(LiveMonitor::new(source.clone(), INTERVAL));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut rx = monitor.subscribe();

        monitor.enable(first);
        rx.changed().await.unwrap();

        source.hold_next.store(true, Ordering::SeqCst);
        let pending = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.refresh().await }
        });
        source.entered.notified().await;

        monitor.enable(second);
        source.gate.notify_one();

        let refreshed = pending.await.unwrap().unwrap();
        assert_eq!(refreshed.map(|s| s.trip_id), Some(first));
        assert_ne!(monitor.latest().map(|s| s.trip_id), Some(first));

        rx.wait_for(|v| v.as_ref().is_some_and(|s| s.trip_id == second)).await.unwrap();
    }
}
