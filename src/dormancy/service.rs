//! Background dormancy monitoring
//!
//! Two producers feed one consumer task: motion samples arrive through an
//! mpsc channel and a periodic ticker drives the dormancy check. The task
//! owns the [`DormancyMonitor`], so no state is shared with the sensors.
//!
//! Start and stop are idempotent. Stopping drops the monitor, the ticker
//! and the sample channel.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{DormancyEvent, DormancyMonitor, MonitorConfig};
use crate::clock::Clock;
use crate::motion::{MotionSample, Vector3};

/// Buffered samples before the feed starts dropping readings
const SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Buffered dormancy events per subscriber
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Why a reading did not reach the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The queue was full and the reading was dropped; monitoring goes on
    #[error("Sample queue full, reading dropped")]
    Full,

    /// Monitoring has stopped
    #[error("Dormancy monitoring stopped")]
    Closed,
}

/// Handle for pushing sensor readings into a running monitor
#[derive(Clone)]
pub struct SampleFeed {
    tx: mpsc::Sender<MotionSample>,
    clock: Arc<dyn Clock>,
}

impl SampleFeed {
    /// Queues a sample
    ///
    /// Never blocks, so it can be called from sensor callbacks.
    pub fn push(&self, sample: MotionSample) -> Result<(), FeedError> {
        self.tx.try_send(sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!("Sample queue full, dropping reading");
                FeedError::Full
            }
            mpsc::error::TrySendError::Closed(_) => FeedError::Closed,
        })
    }

    /// Queues an accelerometer reading stamped with the current time
    pub fn push_acceleration(&self, acceleration: Vector3) -> Result<(), FeedError> {
        self.push(MotionSample::from_acceleration(acceleration, self.clock.now()))
    }

    /// Queues a gyroscope reading stamped with the current time
    pub fn push_rotation(&self, rotation: Vector3) -> Result<(), FeedError> {
        self.push(MotionSample::from_rotation(rotation, self.clock.now()))
    }

    /// Whether the monitor behind this feed is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct RunningMonitor {
    feed: SampleFeed,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Runs a [`DormancyMonitor`] in the background
pub struct DormancyService {
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<DormancyEvent>,
    running: Mutex<Option<RunningMonitor>>,
}

impl DormancyService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            clock,
            events,
            running: Mutex::new(None),
        }
    }

    /// Starts monitoring. Returns false if it was already running.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(&self, config: MonitorConfig) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            tracing::debug!("Dormancy monitoring already active");
            return false;
        }

        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let monitor = DormancyMonitor::new(config, self.clock.now());

        // First check one interval after start, not after the first poll
        let period = config.check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(run_monitor(
            monitor,
            ticker,
            rx,
            shutdown_rx,
            self.events.clone(),
            self.clock.clone(),
        ));

        *running = Some(RunningMonitor {
            feed: SampleFeed {
                tx,
                clock: self.clock.clone(),
            },
            shutdown: shutdown_tx,
            task,
        });

        tracing::info!(
            "Dormancy monitoring started (threshold={}s, check every {}s)",
            config.threshold.as_secs(),
            config.check_interval.as_secs()
        );
        true
    }

    /// Stops monitoring. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };

        let _ = running.shutdown.send(());
        running.task.abort();
        tracing::info!("Dormancy monitoring stopped");
        true
    }

    pub fn is_active(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Feed for the current session, if monitoring
    pub fn sample_feed(&self) -> Option<SampleFeed> {
        self.running.lock().as_ref().map(|r| r.feed.clone())
    }

    /// Receives every dormancy event raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DormancyEvent> {
        self.events.subscribe()
    }
}

impl Drop for DormancyService {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_monitor(
    mut monitor: DormancyMonitor,
    mut ticker: Interval,
    mut samples: mpsc::Receiver<MotionSample>,
    mut shutdown: oneshot::Receiver<()>,
    events: broadcast::Sender<DormancyEvent>,
    clock: Arc<dyn Clock>,
) {
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            sample = samples.recv() => match sample {
                Some(sample) => {
                    monitor.record_sample(&sample);
                }
                None => break,
            },

            _ = ticker.tick() => {
                if let Some(event) = monitor.check_dormancy(clock.now()) {
                    tracing::info!(
                        "Dormancy detected: no movement for {}s",
                        event.time_since_movement().as_secs()
                    );
                    // No subscribers is fine; the event is simply dropped
                    let _ = events.send(event);
                }
            }
        }
    }

    tracing::debug!("Dormancy monitor task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::motion::STANDARD_GRAVITY;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn setup() -> (Arc<ManualClock>, DormancyService) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap(),
        ));
        let service = DormancyService::new(clock.clone());
        (clock, service)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let (_clock, service) = setup();

        assert!(!service.stop());
        assert!(service.start(MonitorConfig::default()));
        assert!(!service.start(MonitorConfig::default()));
        assert!(service.is_active());

        let feed = service.sample_feed().unwrap();
        assert!(service.stop());
        assert!(!service.stop());
        assert!(!service.is_active());
        assert!(service.sample_feed().is_none());

        settle().await;
        assert!(feed.is_closed());
        assert_eq!(
            feed.push_rotation(Vector3::new(1.0, 0.0, 0.0)),
            Err(FeedError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_reports_dropped_reading() {
        let (_clock, service) = setup();
        service.start(MonitorConfig::default());
        let feed = service.sample_feed().unwrap();

        // The monitor task has not been polled yet, so nothing drains
        for _ in 0..SAMPLE_CHANNEL_CAPACITY {
            assert!(feed.push_rotation(Vector3::new(1.0, 0.0, 0.0)).is_ok());
        }
        assert_eq!(
            feed.push_rotation(Vector3::new(1.0, 0.0, 0.0)),
            Err(FeedError::Full)
        );

        settle().await;
        assert!(feed.push_rotation(Vector3::new(1.0, 0.0, 0.0)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_after_threshold() {
        let (clock, service) = setup();
        let mut events = service.subscribe();
        service.start(MonitorConfig::default());

        clock.advance(Duration::from_secs(16 * 60));
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;

        let event = events.try_recv().unwrap();
        assert_eq!(event.time_since_movement_ms, 960_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_movement_prevents_event() {
        let (clock, service) = setup();
        let mut events = service.subscribe();
        service.start(MonitorConfig::default());
        let feed = service.sample_feed().unwrap();

        clock.advance(Duration::from_secs(10 * 60));
        assert!(feed
            .push_acceleration(Vector3::new(0.0, 0.0, STANDARD_GRAVITY + 2.0))
            .is_ok());
        settle().await;

        clock.advance(Duration::from_secs(10 * 60));
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;

        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_events_after_stop() {
        let (clock, service) = setup();
        let mut events = service.subscribe();
        service.start(MonitorConfig::default());
        service.stop();

        clock.advance(Duration::from_secs(60 * 60));
        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;

        assert!(events.try_recv().is_err());
    }
}
