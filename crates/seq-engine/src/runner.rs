//! Fixed-rate heartbeat runner
//!
//! Drives a shared sequencer at a fixed tick rate on the tokio runtime.
//! The engine itself is synchronous; the runner is the only place that
//! owns a clock. A before-tick hook lets the host advance its plant models
//! (simulated servos) by the elapsed time before each tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::info;

use crate::sequencer::Sequencer;

type BeforeTick = Box<dyn Fn(f32) + Send + Sync>;

/// Ticks a sequencer at a fixed rate
pub struct Runner {
    sequencer: Arc<Mutex<Sequencer>>,
    period: Duration,
    before_tick: Option<BeforeTick>,
}

impl Runner {
    /// Create a runner ticking `sequencer` every `period`
    pub fn new(sequencer: Arc<Mutex<Sequencer>>, period: Duration) -> Self {
        Self {
            sequencer,
            period,
            before_tick: None,
        }
    }

    /// Install a hook called with the elapsed seconds before every tick
    pub fn with_before_tick(mut self, hook: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.before_tick = Some(Box::new(hook));
        self
    }

    /// Handle to the shared sequencer
    pub fn sequencer(&self) -> Arc<Mutex<Sequencer>> {
        self.sequencer.clone()
    }

    /// Run the heartbeat until the task is cancelled
    pub async fn run(&self) {
        info!(
            period_ms = self.period.as_millis() as u64,
            "Sequencer heartbeat started"
        );
        let mut interval = self.interval();
        let mut last = Utc::now();
        loop {
            self.beat(&mut interval, &mut last).await;
        }
    }

    /// Run exactly `ticks` heartbeats, then return
    pub async fn run_ticks(&self, ticks: usize) {
        let mut interval = self.interval();
        let mut last = Utc::now();
        for _ in 0..ticks {
            self.beat(&mut interval, &mut last).await;
        }
    }

    fn interval(&self) -> Interval {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// One heartbeat: wait for the tick, advance the plant, tick the engine
    async fn beat(&self, interval: &mut Interval, last: &mut DateTime<Utc>) {
        interval.tick().await;
        let now = Utc::now();
        let dt = (now - *last)
            .to_std()
            .map(|elapsed| elapsed.as_secs_f32())
            .unwrap_or(0.0);
        *last = now;

        if let Some(hook) = &self.before_tick {
            hook(dt);
        }
        self.sequencer.lock().await.tick(now);
    }
}
