//! Expiration Sweep Task
//!
//! Background task that periodically evicts expired cache entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

// == Sweep Target ==
/// Something the sweep task can purge.
pub(crate) trait Sweep: Send + Sync + 'static {
    /// Evicts every expired entry, returning how many were evicted.
    fn purge_expired(&self) -> usize;
}

/// Spawns a background task that purges expired entries every `interval`.
///
/// The task only holds a weak reference to its target and ends on its own
/// once the target is dropped. The returned handle aborts it earlier.
pub(crate) fn spawn_sweep_task<T: Sweep>(
    target: Weak<T>,
    interval: Duration,
    runtime: &Handle,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        info!(
            "Starting expiration sweep with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(target) = target.upgrade() else {
                debug!("Sweep target dropped, stopping expiration sweep");
                break;
            };
            let removed = target.purge_expired();

            if removed > 0 {
                info!("Expiration sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiration sweep: no expired entries found");
            }
        }
    })
}
