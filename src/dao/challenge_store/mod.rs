pub mod postgres;

#[cfg(test)]
pub mod memory;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::dao::models::{ChallengeEntity, ChallengePatch, UserEntity, WinnerSelectionEntity};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for users, challenges, and winner
/// selections. The store is authoritative; in-memory caches mirror it.
pub trait ChallengeStore: Send + Sync {
    fn find_user(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;

    fn find_challenge(&self, id: &str)
        -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;

    fn create_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>>;

    /// Apply a partial update, returning the updated row when it exists.
    fn update_challenge(
        &self,
        id: &str,
        patch: ChallengePatch,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;

    /// Atomically bind `user_id` as invitee of an open PENDING challenge and
    /// move it to ACCEPTED. Returns `None` when the slot was already taken or
    /// the challenge left the open PENDING state, so racing joiners cannot
    /// both win.
    fn claim_open_slot(
        &self,
        challenge_id: &str,
        user_id: &str,
        accepted_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;

    /// Insert or overwrite one player's winner nomination.
    fn upsert_selection(
        &self,
        challenge_id: &str,
        player_id: &str,
        selected_winner: &str,
        updated_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// All winner selections belonging to IN_PROGRESS challenges.
    fn load_active_selections(&self)
        -> BoxFuture<'static, StorageResult<Vec<WinnerSelectionEntity>>>;

    fn delete_selections_for(&self, challenge_id: &str) -> BoxFuture<'static, StorageResult<()>>;

    /// Within one transaction: move an IN_PROGRESS challenge to COMPLETED with
    /// the agreed winner and purge its winner selections. Returns `None` when
    /// the challenge was not IN_PROGRESS.
    fn complete_challenge(
        &self,
        challenge_id: &str,
        winner_id: &str,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
