//! Recurring background jobs.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn `job` every `every`, starting one period from now.
///
/// The caller is expected to have run the job once already (the startup
/// refresh), so the interval's immediate first tick is consumed. Runs never
/// overlap: a slow run delays the next tick instead of piling up. A failed
/// run is logged and the loop carries on with whatever data the job left in
/// place.
pub fn spawn_periodic<F, Fut, E>(name: String, every: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!(job = %name, "Running scheduled refresh");
            if let Err(e) = job().await {
                warn!(job = %name, error = %e, "Scheduled refresh failed, keeping previous data");
            }
        }
    })
}
