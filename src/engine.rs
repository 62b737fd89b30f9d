use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::models::Target;
use crate::notifier::NotificationSender;
use crate::prober::Prober;
use crate::tracker::HealthTracker;

pub type SharedTracker = Arc<Mutex<HealthTracker>>;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct Monitor {
    targets: Vec<Target>,
    interval: Duration,
    pub tracker: SharedTracker,
    prober: Arc<dyn Prober>,
    clock: Arc<dyn Clock>,
    notifications: NotificationSender,
}

impl Monitor {
    pub fn new(
        targets: Vec<Target>,
        interval: Duration,
        prober: Arc<dyn Prober>,
        clock: Arc<dyn Clock>,
        notifications: NotificationSender,
    ) -> Self {
        let tracker = Arc::new(Mutex::new(HealthTracker::from_targets(&targets)));
        Self { targets, interval, tracker, prober, clock, notifications }
    }

    /// Polls forever. Ticks never overlap: a slow cycle makes the loop skip
    /// the missed ticks instead of bursting to catch up.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.interval.as_secs(),
            endpoints = self.targets.len(),
            "API monitor active"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One polling cycle: probe every target concurrently, then apply the
    /// results in target order. Returns how many notifications were queued.
    pub async fn tick(&self) -> usize {
        let started = std::time::Instant::now();

        let results = join_all(self.targets.iter().map(|target| async move {
            (target.name.as_str(), self.prober.probe(target).await)
        }))
        .await;

        let now = self.clock.now();
        let mut queued = 0;
        let mut tracker = self.tracker.lock().await;
        for (name, up) in results {
            debug!(endpoint = name, up, "probe result");
            if let Some(notification) = tracker.evaluate(name, up, now) {
                if self.notifications.send(notification).is_err() {
                    warn!(endpoint = name, "notification dispatcher is gone, message dropped");
                } else {
                    queued += 1;
                }
            }
        }
        drop(tracker);

        debug!(
            "cycle completed {} checks in {:.2}s",
            self.targets.len(),
            started.elapsed().as_secs_f64()
        );
        queued
    }
}
