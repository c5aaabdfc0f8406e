use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

/// Runs `tick` every `interval` on the current tokio runtime until the
/// returned handle is aborted. The first tick happens one interval after
/// spawning.
pub fn spawn_poll<F>(name: &'static str, interval: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            trace!(poll = name, "poll tick");
            tick();
        }
    })
}
