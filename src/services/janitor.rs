//! Background maintenance: the startup cache warm and the periodic sweep of
//! abandoned start handshakes.

use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::{dao::storage::StorageError, state::SharedState};

/// Cadence of the stale-handshake sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Age beyond which a start handshake is considered abandoned.
pub const START_HANDSHAKE_TTL: Duration = Duration::from_secs(5 * 60);

/// Seed the nomination cache from the selections persisted for IN_PROGRESS
/// challenges. Runs once before the listener opens; a failure here aborts
/// bring-up, since a stale cache is worse than no service.
pub async fn warm_nomination_cache(state: &SharedState) -> Result<usize, StorageError> {
    let rows = state.store().load_active_selections().await?;
    let count = rows.len();
    state.nominations().seed(rows);
    info!(count, "warmed nomination cache");
    Ok(count)
}

/// Fixed-tick sweep dropping start handshakes older than the TTL.
pub async fn run(state: SharedState) {
    let mut ticker = interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let evicted = state
            .starts()
            .evict_stale(Instant::now(), START_HANDSHAKE_TTL);
        if evicted > 0 {
            debug!(evicted, "evicted stale start handshakes");
        }
    }
}
