//! Feed Manager
//!
//! Owns one polling task per venue, each with an independent state
//! machine (DISCONNECTED -> CONNECTING -> CONNECTED | FAILED), failure
//! counting, backoff-driven reconnects and quality scoring. Validated
//! snapshots fan out to all subscribers over a broadcast channel; a slow
//! subscriber only lags its own receiver and never stalls polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::VenueAdapter;
use crate::config::{FeedSettings, ReconnectSettings};
use crate::feed::quality::QualityTracker;
use crate::feed::reconnect::ReconnectPolicy;
use crate::models::{OrderbookSnapshot, VenueConnectionState, VenueStatus};

// ============================================================================
// Events
// ============================================================================

/// Events fanned out to feed subscribers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A validated snapshot from one venue.
    Snapshot(Arc<OrderbookSnapshot>),
    /// A venue moved to a new connection state.
    StateChanged {
        /// Venue identifier.
        venue: String,
        /// The state entered.
        state: VenueConnectionState,
    },
}

// ============================================================================
// Manager
// ============================================================================

/// Multi-venue feed manager.
///
/// Cheap to clone; all clones share the same venues, channel and
/// cancellation token.
#[derive(Clone)]
pub struct FeedManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    feed: FeedSettings,
    reconnect: ReconnectSettings,
    events: broadcast::Sender<FeedEvent>,
    venues: RwLock<Vec<Arc<VenueRuntime>>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

struct VenueRuntime {
    venue: String,
    adapters: Vec<Arc<dyn VenueAdapter>>,
    poll_interval: Duration,
    state: Mutex<VenueState>,
}

struct VenueState {
    connection: VenueConnectionState,
    quality: QualityTracker,
    policy: ReconnectPolicy,
    last_update: Option<DateTime<Utc>>,
    permanently_failed: bool,
}

impl FeedManager {
    /// Create a manager with no venues registered yet.
    #[must_use]
    pub fn new(feed: FeedSettings, reconnect: ReconnectSettings, channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity);
        Self {
            inner: Arc::new(ManagerInner {
                feed,
                reconnect,
                events,
                venues: RwLock::new(Vec::new()),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register a venue with its adapters (one per symbol).
    ///
    /// Venues added after [`start`](Self::start) begin polling
    /// immediately without a stagger offset.
    pub fn add_venue(
        &self,
        venue: impl Into<String>,
        adapters: Vec<Arc<dyn VenueAdapter>>,
        poll_interval: Duration,
    ) {
        let runtime = Arc::new(VenueRuntime {
            venue: venue.into(),
            adapters,
            poll_interval,
            state: Mutex::new(VenueState {
                connection: VenueConnectionState::Disconnected,
                quality: QualityTracker::new(
                    self.inner.feed.expected_depth,
                    self.inner.feed.max_spread_pct,
                ),
                policy: ReconnectPolicy::new(&self.inner.reconnect),
                last_update: None,
                permanently_failed: false,
            }),
        });
        self.inner.venues.write().push(Arc::clone(&runtime));

        if self.inner.started.load(Ordering::SeqCst) {
            spawn_venue(Arc::clone(&self.inner), runtime, Duration::ZERO);
        }
    }

    /// Spawn all venue poll tasks and the quality decay sweep.
    ///
    /// Venue tasks start with staggered offsets so poll cycles do not
    /// align across venues. Calling `start` twice is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("feed manager already started");
            return;
        }

        let venues = self.inner.venues.read().clone();
        info!(venues = venues.len(), "starting feed manager");
        for (index, runtime) in venues.into_iter().enumerate() {
            let stagger = self.inner.feed.stagger_offset * u32::try_from(index).unwrap_or(u32::MAX);
            spawn_venue(Arc::clone(&self.inner), runtime, stagger);
        }

        tokio::spawn(run_decay_sweep(Arc::clone(&self.inner)));
    }

    /// Subscribe to the event stream. Dropping the receiver unsubscribes;
    /// there is no history replay.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.events.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    /// Status of one venue.
    #[must_use]
    pub fn venue_status(&self, venue: &str) -> Option<VenueStatus> {
        self.inner
            .venues
            .read()
            .iter()
            .find(|r| r.venue == venue)
            .map(|r| r.status())
    }

    /// Status of every registered venue, in registration order.
    #[must_use]
    pub fn all_statuses(&self) -> Vec<VenueStatus> {
        self.inner.venues.read().iter().map(|r| r.status()).collect()
    }

    /// Stop all polling, reconnect waits and the decay sweep. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        info!("shutting down feed manager");
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for FeedManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedManager")
            .field("venues", &self.inner.venues.read().len())
            .field("receivers", &self.receiver_count())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl ManagerInner {
    fn send_event(&self, event: FeedEvent) -> Option<usize> {
        self.events.send(event).ok()
    }

    fn send_snapshot(&self, snapshot: OrderbookSnapshot) {
        // No receivers yet is fine; snapshots are not replayed.
        let _ = self.send_event(FeedEvent::Snapshot(Arc::new(snapshot)));
    }
}

impl VenueRuntime {
    fn transition(&self, next: VenueConnectionState, events: &broadcast::Sender<FeedEvent>) {
        let prev = {
            let mut state = self.state.lock();
            if state.connection == next {
                return;
            }
            let prev = state.connection;
            state.connection = next;
            prev
        };
        info!(venue = %self.venue, from = %prev, to = %next, "venue state changed");
        let _ = events.send(FeedEvent::StateChanged {
            venue: self.venue.clone(),
            state: next,
        });
    }

    fn record_success(&self, latency: Duration, snapshot: &OrderbookSnapshot) {
        let mut state = self.state.lock();
        state.quality.record_success(latency, snapshot);
        state.last_update = Some(Utc::now());
    }

    /// One failed poll cycle; returns the consecutive failure count.
    fn record_cycle_failure(&self) -> u32 {
        let mut state = self.state.lock();
        state.quality.record_failure();
        state.quality.consecutive_errors()
    }

    fn next_backoff(&self) -> Option<Duration> {
        self.state.lock().policy.next_backoff()
    }

    fn reconnect_attempt(&self) -> u32 {
        self.state.lock().policy.current_attempt()
    }

    fn max_reconnect_attempts(&self) -> u32 {
        self.state.lock().policy.max_attempts()
    }

    fn reset_reconnect(&self) {
        self.state.lock().policy.reset();
    }

    fn mark_permanently_failed(&self) {
        self.state.lock().permanently_failed = true;
    }

    fn status(&self) -> VenueStatus {
        let state = self.state.lock();
        VenueStatus {
            venue: self.venue.clone(),
            state: state.connection,
            quality: state.quality.record(),
            last_update: state.last_update,
            reconnect_attempts: state.policy.current_attempt(),
            permanently_failed: state.permanently_failed,
        }
    }
}

// ============================================================================
// Venue poll task
// ============================================================================

fn spawn_venue(inner: Arc<ManagerInner>, runtime: Arc<VenueRuntime>, stagger: Duration) {
    tokio::spawn(run_venue(inner, runtime, stagger));
}

async fn run_venue(inner: Arc<ManagerInner>, runtime: Arc<VenueRuntime>, stagger: Duration) {
    if !stagger.is_zero() {
        tokio::select! {
            () = inner.cancel.cancelled() => return,
            () = tokio::time::sleep(stagger) => {}
        }
    }

    info!(
        venue = %runtime.venue,
        symbols = runtime.adapters.len(),
        interval_ms = runtime.poll_interval.as_millis() as u64,
        "starting venue poll task"
    );
    runtime.transition(VenueConnectionState::Connecting, &inner.events);

    let mut ticker = tokio::time::interval(runtime.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = inner.cancel.cancelled() => {
                runtime.transition(VenueConnectionState::Disconnected, &inner.events);
                return;
            }
            _ = ticker.tick() => {}
        }

        if fetch_all(&inner, &runtime).await {
            runtime.transition(VenueConnectionState::Connected, &inner.events);
            continue;
        }

        let failures = runtime.record_cycle_failure();
        if failures < inner.feed.failure_threshold {
            continue;
        }

        runtime.transition(VenueConnectionState::Failed, &inner.events);
        if !run_reconnect(&inner, &runtime).await {
            return;
        }
        ticker.reset();
    }
}

/// Fetch every adapter of one venue once.
///
/// Successful snapshots are scored and broadcast as they arrive; the
/// cycle counts as clean only when every fetch succeeded.
async fn fetch_all(inner: &ManagerInner, runtime: &VenueRuntime) -> bool {
    let mut clean = true;
    for adapter in &runtime.adapters {
        let started = Instant::now();
        match adapter.fetch().await {
            Ok(snapshot) => {
                let latency = started.elapsed();
                runtime.record_success(latency, &snapshot);
                debug!(
                    venue = %runtime.venue,
                    symbol = %adapter.symbol(),
                    latency_ms = latency.as_millis() as u64,
                    bids = snapshot.bids.len(),
                    asks = snapshot.asks.len(),
                    "snapshot accepted"
                );
                inner.send_snapshot(snapshot);
            }
            Err(feed_error) => {
                clean = false;
                warn!(
                    venue = %runtime.venue,
                    symbol = %adapter.symbol(),
                    kind = feed_error.kind(),
                    error = %feed_error,
                    "poll failed"
                );
            }
        }
    }
    clean
}

/// Run the backoff schedule until the venue recovers.
///
/// Returns `false` when the task must exit: shutdown, or attempts
/// exhausted (the venue is then permanently failed and never retried).
async fn run_reconnect(inner: &ManagerInner, runtime: &VenueRuntime) -> bool {
    loop {
        let Some(delay) = runtime.next_backoff() else {
            runtime.mark_permanently_failed();
            error!(
                venue = %runtime.venue,
                attempts = runtime.reconnect_attempt(),
                "reconnect attempts exhausted, venue permanently failed"
            );
            return false;
        };

        warn!(
            venue = %runtime.venue,
            attempt = runtime.reconnect_attempt(),
            max_attempts = runtime.max_reconnect_attempts(),
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        tokio::select! {
            () = inner.cancel.cancelled() => {
                runtime.transition(VenueConnectionState::Disconnected, &inner.events);
                return false;
            }
            () = tokio::time::sleep(delay) => {}
        }

        runtime.transition(VenueConnectionState::Connecting, &inner.events);
        if fetch_all(inner, runtime).await {
            runtime.reset_reconnect();
            runtime.transition(VenueConnectionState::Connected, &inner.events);
            info!(venue = %runtime.venue, "venue reconnected");
            return true;
        }

        let _ = runtime.record_cycle_failure();
        runtime.transition(VenueConnectionState::Failed, &inner.events);
    }
}

/// Re-apply freshness bands on a fixed cadence so idle venues decay
/// without anyone reading their status.
async fn run_decay_sweep(inner: Arc<ManagerInner>) {
    let mut ticker = tokio::time::interval(inner.feed.quality_decay_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = inner.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let venues = inner.venues.read().clone();
        for venue in venues {
            venue.state.lock().quality.decay();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::adapters::MockVenueAdapter;
    use crate::error::FeedError;

    fn fast_feed() -> FeedSettings {
        FeedSettings {
            stagger_offset: Duration::ZERO,
            failure_threshold: 3,
            quality_decay_interval: Duration::from_millis(50),
            ..FeedSettings::default()
        }
    }

    fn fast_reconnect() -> ReconnectSettings {
        ReconnectSettings {
            initial_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: Duration::ZERO,
            max_delay: Duration::from_millis(50),
            max_attempts: 8,
        }
    }

    async fn wait_for_state(
        rx: &mut broadcast::Receiver<FeedEvent>,
        venue: &str,
        target: VenueConnectionState,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(FeedEvent::StateChanged { venue: v, state })
                        if v == venue && state == target =>
                    {
                        return;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for state change");
    }

    async fn wait_for_snapshot(rx: &mut broadcast::Receiver<FeedEvent>) -> Arc<OrderbookSnapshot> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(FeedEvent::Snapshot(snapshot)) => return snapshot,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for snapshot")
    }

    #[test]
    fn statuses_start_disconnected() {
        let manager = FeedManager::new(fast_feed(), fast_reconnect(), 64);
        let adapter = Arc::new(MockVenueAdapter::new("mock", "BTC-USD"));
        manager.add_venue("mock", vec![adapter], Duration::from_millis(10));

        let status = manager.venue_status("mock").unwrap();
        assert_eq!(status.state, VenueConnectionState::Disconnected);
        assert!(status.last_update.is_none());
        assert!(!status.permanently_failed);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(manager.venue_status("nope").is_none());
    }

    #[tokio::test]
    async fn polling_broadcasts_snapshots_and_connects() {
        let manager = FeedManager::new(fast_feed(), fast_reconnect(), 64);
        let adapter = Arc::new(MockVenueAdapter::new("mock", "BTC-USD"));
        adapter.set_default_snapshot(adapter.snapshot_around(dec!(50000), 5, dec!(1)));
        manager.add_venue("mock", vec![adapter], Duration::from_millis(10));

        let mut rx = manager.subscribe();
        manager.start();

        wait_for_state(&mut rx, "mock", VenueConnectionState::Connected).await;
        let snapshot = wait_for_snapshot(&mut rx).await;
        assert_eq!(snapshot.venue, "mock");
        assert_eq!(snapshot.bids.len(), 5);

        let status = manager.venue_status("mock").unwrap();
        assert_eq!(status.state, VenueConnectionState::Connected);
        assert!(status.last_update.is_some());
        assert!(status.quality.score() > 0.5);

        manager.shutdown();
        wait_for_state(&mut rx, "mock", VenueConnectionState::Disconnected).await;
        // Idempotent.
        manager.shutdown();
    }

    #[tokio::test]
    async fn three_failures_demote_then_reconnect_recovers() {
        let manager = FeedManager::new(fast_feed(), fast_reconnect(), 64);
        let adapter = Arc::new(MockVenueAdapter::new("mock", "BTC-USD"));
        for _ in 0..3 {
            adapter.push_failure(FeedError::Network("refused".to_string()));
        }
        adapter.set_default_snapshot(adapter.snapshot_around(dec!(50000), 5, dec!(1)));
        manager.add_venue("mock", vec![adapter], Duration::from_millis(10));

        let mut rx = manager.subscribe();
        manager.start();

        wait_for_state(&mut rx, "mock", VenueConnectionState::Failed).await;
        wait_for_state(&mut rx, "mock", VenueConnectionState::Connected).await;

        let status = manager.venue_status("mock").unwrap();
        assert_eq!(status.quality.consecutive_errors, 0);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(!status.permanently_failed);

        manager.shutdown();
    }

    #[tokio::test]
    async fn subscriber_count_tracks_receivers() {
        let manager = FeedManager::new(fast_feed(), fast_reconnect(), 64);
        assert_eq!(manager.receiver_count(), 0);
        let rx1 = manager.subscribe();
        let rx2 = manager.subscribe();
        assert_eq!(manager.receiver_count(), 2);
        drop(rx1);
        drop(rx2);
        assert_eq!(manager.receiver_count(), 0);
    }
}
