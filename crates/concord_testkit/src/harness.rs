//! Async test helpers.

use concord_sync_engine::{Observation, SyncResult};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// Default time a helper waits before giving up.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Installs a `tracing` subscriber driven by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or `limit` elapses.
///
/// Returns the final value of the condition.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Waits for a snapshot that satisfies `predicate`.
///
/// Returns `None` if the observation ends, fails, or `limit` elapses first.
pub async fn next_matching<C>(
    observation: &mut Observation<C>,
    limit: Duration,
    mut predicate: impl FnMut(&[C]) -> bool,
) -> Option<Vec<C>> {
    let search = async {
        while let Some(snapshot) = observation.next().await {
            let snapshot: SyncResult<Vec<C>> = snapshot;
            match snapshot {
                Ok(objects) if predicate(&objects) => return Some(objects),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    };
    timeout(limit, search).await.ok().flatten()
}
