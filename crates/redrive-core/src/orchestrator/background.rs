//! Periodic redrive task owned by one orchestrator.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::control::CancelToken;

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Runs `tick` every interval until stopped. The interval can be changed
/// while running; the next tick is then one new interval away.
pub(crate) struct BackgroundTask {
    stop: CancelToken,
    interval: watch::Sender<Duration>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    pub(crate) fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let stop = CancelToken::new();
        let (interval, mut interval_rx) = watch::channel(period);
        let task_stop = stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = ticker(period);
            loop {
                tokio::select! {
                    _ = task_stop.cancelled() => break,
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let period = *interval_rx.borrow_and_update();
                        tracing::debug!(interval_ms = period.as_millis() as u64, "redrive interval changed");
                        ticks = ticker(period);
                    }
                    _ = ticks.tick() => {
                        tokio::select! {
                            _ = tick() => {}
                            _ = task_stop.cancelled() => break,
                        }
                    }
                }
            }
            tracing::debug!("redrive task stopped");
        });
        Self {
            stop,
            interval,
            handle: Some(handle),
        }
    }

    pub(crate) fn set_interval(&self, period: Duration) {
        // Only fails once the task has exited.
        let _ = self.interval.send(period);
    }

    /// Signal the task and wait until it has exited.
    pub(crate) async fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("redrive task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
