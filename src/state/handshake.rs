//! Transient per-challenge registries: the start handshake and the winner
//! nomination cache.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::dao::models::WinnerSelectionEntity;

/// Which participant touched the start handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRole {
    Creator,
    Invitee,
}

#[derive(Debug, Clone)]
/// Progress of one challenge's start handshake.
pub struct StartHandshake {
    pub creator_started: bool,
    pub invitee_started: bool,
    pub first_touch_at: Instant,
}

/// Start-handshake progress per challenge. Entries are transient; the janitor
/// evicts any older than the TTL.
#[derive(Default)]
pub struct StartRegistry {
    starts: DashMap<String, StartHandshake>,
}

impl StartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_started(&self, challenge_id: &str, role: StartRole, now: Instant) {
        let mut entry = self
            .starts
            .entry(challenge_id.to_owned())
            .or_insert_with(|| StartHandshake {
                creator_started: false,
                invitee_started: false,
                first_touch_at: now,
            });
        match role {
            StartRole::Creator => entry.creator_started = true,
            StartRole::Invitee => entry.invitee_started = true,
        }
    }

    pub fn get(&self, challenge_id: &str) -> Option<StartHandshake> {
        self.starts
            .get(challenge_id)
            .map(|entry| entry.value().clone())
    }

    pub fn clear(&self, challenge_id: &str) {
        self.starts.remove(challenge_id);
    }

    /// Drop entries whose first touch is older than `ttl`, returning how many
    /// were evicted.
    pub fn evict_stale(&self, now: Instant, ttl: Duration) -> usize {
        let before = self.starts.len();
        self.starts
            .retain(|_, handshake| now.saturating_duration_since(handshake.first_touch_at) < ttl);
        before - self.starts.len()
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

/// Process-local mirror of persisted winner selections, keyed by challenge
/// then player. Rebuilt from the store on startup; a subset of the persisted
/// rows in between.
#[derive(Default)]
pub struct NominationRegistry {
    nominations: DashMap<String, HashMap<String, String>>,
}

impl NominationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one player's pick; repeated picks overwrite.
    pub fn record(&self, challenge_id: &str, player_id: &str, winner_id: &str) {
        self.nominations
            .entry(challenge_id.to_owned())
            .or_default()
            .insert(player_id.to_owned(), winner_id.to_owned());
    }

    /// The nomination map for a challenge; empty when none are recorded.
    pub fn selections_for(&self, challenge_id: &str) -> HashMap<String, String> {
        self.nominations
            .get(challenge_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn drop_challenge(&self, challenge_id: &str) {
        self.nominations.remove(challenge_id);
    }

    /// Seed the cache from persisted rows (startup warm).
    pub fn seed(&self, rows: impl IntoIterator<Item = WinnerSelectionEntity>) {
        for row in rows {
            self.record(&row.challenge_id, &row.player_id, &row.selected_winner);
        }
    }

    /// Full snapshot for the `allWinnerSelections` reply.
    pub fn snapshot_all(&self) -> HashMap<String, HashMap<String, String>> {
        self.nominations
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nominations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nominations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn handshake_tracks_both_roles() {
        let registry = StartRegistry::new();
        let now = Instant::now();

        registry.note_started("c1", StartRole::Invitee, now);
        let handshake = registry.get("c1").unwrap();
        assert!(handshake.invitee_started);
        assert!(!handshake.creator_started);

        registry.note_started("c1", StartRole::Creator, now);
        let handshake = registry.get("c1").unwrap();
        assert!(handshake.creator_started && handshake.invitee_started);
    }

    #[test]
    fn eviction_drops_only_stale_entries() {
        let registry = StartRegistry::new();
        let start = Instant::now();

        registry.note_started("old", StartRole::Invitee, start);
        registry.note_started("fresh", StartRole::Invitee, start + Duration::from_secs(240));

        // Six minutes after the first touch: "old" is past the TTL, "fresh" is not.
        let evicted = registry.evict_stale(start + Duration::from_secs(360), TTL);
        assert_eq!(evicted, 1);
        assert!(registry.get("old").is_none());
        assert!(registry.get("fresh").is_some());
    }

    #[test]
    fn clear_removes_the_entry() {
        let registry = StartRegistry::new();
        registry.note_started("c1", StartRole::Invitee, Instant::now());
        registry.clear("c1");
        assert!(registry.is_empty());
    }

    #[test]
    fn repeated_nominations_overwrite() {
        let registry = NominationRegistry::new();
        registry.record("c1", "u1", "u1");
        registry.record("c1", "u1", "u2");

        let selections = registry.selections_for("c1");
        assert_eq!(selections.len(), 1);
        assert_eq!(selections["u1"], "u2");
    }

    #[test]
    fn drop_challenge_purges_all_nominations() {
        let registry = NominationRegistry::new();
        registry.record("c1", "u1", "u1");
        registry.record("c1", "u2", "u1");
        registry.record("c2", "u3", "u3");

        registry.drop_challenge("c1");
        assert!(registry.selections_for("c1").is_empty());
        assert_eq!(registry.selections_for("c2").len(), 1);
    }

    #[test]
    fn seed_restores_persisted_rows() {
        let registry = NominationRegistry::new();
        registry.seed(vec![
            WinnerSelectionEntity {
                challenge_id: "c1".into(),
                player_id: "u1".into(),
                selected_winner: "u1".into(),
                updated_at: Utc::now(),
            },
            WinnerSelectionEntity {
                challenge_id: "c1".into(),
                player_id: "u2".into(),
                selected_winner: "u1".into(),
                updated_at: Utc::now(),
            },
        ]);

        let selections = registry.selections_for("c1");
        assert_eq!(selections.len(), 2);
        assert_eq!(selections["u1"], "u1");
        assert_eq!(selections["u2"], "u1");

        let all = registry.snapshot_all();
        assert_eq!(all.len(), 1);
    }
}
