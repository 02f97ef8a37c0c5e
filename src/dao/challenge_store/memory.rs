//! In-memory [`ChallengeStore`] used by the service-layer tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use super::ChallengeStore;
use crate::dao::{
    models::{ChallengeEntity, ChallengePatch, ChallengeStatus, UserEntity, WinnerSelectionEntity},
    storage::StorageResult,
};

/// Synchronous map-backed store. Mutex poisoning panics, which is acceptable
/// in test code.
#[derive(Clone, Default)]
pub struct MemoryChallengeStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, UserEntity>,
    challenges: HashMap<String, ChallengeEntity>,
    selections: HashMap<(String, String), WinnerSelectionEntity>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("mutex poisoned")
    }

    pub fn insert_user(&self, id: &str, name: &str, coins: i64) {
        self.lock().users.insert(
            id.to_owned(),
            UserEntity {
                id: id.to_owned(),
                name: name.to_owned(),
                coins,
                image: None,
            },
        );
    }

    pub fn challenge(&self, id: &str) -> Option<ChallengeEntity> {
        self.lock().challenges.get(id).cloned()
    }

    pub fn selection_count_for(&self, challenge_id: &str) -> usize {
        self.lock()
            .selections
            .keys()
            .filter(|(cid, _)| cid == challenge_id)
            .count()
    }
}

fn ready<T: Send + 'static>(value: StorageResult<T>) -> BoxFuture<'static, StorageResult<T>> {
    Box::pin(std::future::ready(value))
}

impl ChallengeStore for MemoryChallengeStore {
    fn find_user(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        ready(Ok(self.lock().users.get(id).cloned()))
    }

    fn find_challenge(
        &self,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        ready(Ok(self.lock().challenges.get(id).cloned()))
    }

    fn create_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.lock()
            .challenges
            .insert(challenge.id.clone(), challenge);
        ready(Ok(()))
    }

    fn update_challenge(
        &self,
        id: &str,
        patch: ChallengePatch,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let mut inner = self.lock();
        let updated = inner.challenges.get_mut(id).map(|challenge| {
            if let Some(status) = patch.status {
                challenge.status = status;
            }
            if let Some(invitee_id) = patch.invitee_id {
                challenge.invitee_id = Some(invitee_id);
            }
            if let Some(is_open) = patch.is_open {
                challenge.is_open = is_open;
            }
            if let Some(winner_id) = patch.winner_id {
                challenge.winner_id = Some(winner_id);
            }
            if let Some(accepted_at) = patch.accepted_at {
                challenge.accepted_at = Some(accepted_at);
            }
            if let Some(completed_at) = patch.completed_at {
                challenge.completed_at = Some(completed_at);
            }
            if let Some(claim_time) = patch.claim_time {
                challenge.claim_time = Some(claim_time);
            }
            challenge.updated_at = Utc::now();
            challenge.clone()
        });
        drop(inner);
        ready(Ok(updated))
    }

    fn claim_open_slot(
        &self,
        challenge_id: &str,
        user_id: &str,
        accepted_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let mut inner = self.lock();
        let claimed = match inner.challenges.get_mut(challenge_id) {
            Some(challenge)
                if challenge.status == ChallengeStatus::Pending
                    && challenge.is_open
                    && challenge.invitee_id.is_none() =>
            {
                challenge.invitee_id = Some(user_id.to_owned());
                challenge.status = ChallengeStatus::Accepted;
                challenge.is_open = false;
                challenge.accepted_at = Some(accepted_at);
                challenge.updated_at = accepted_at;
                Some(challenge.clone())
            }
            _ => None,
        };
        drop(inner);
        ready(Ok(claimed))
    }

    fn upsert_selection(
        &self,
        challenge_id: &str,
        player_id: &str,
        selected_winner: &str,
        updated_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.lock().selections.insert(
            (challenge_id.to_owned(), player_id.to_owned()),
            WinnerSelectionEntity {
                challenge_id: challenge_id.to_owned(),
                player_id: player_id.to_owned(),
                selected_winner: selected_winner.to_owned(),
                updated_at,
            },
        );
        ready(Ok(()))
    }

    fn load_active_selections(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<WinnerSelectionEntity>>> {
        let inner = self.lock();
        let selections = inner
            .selections
            .values()
            .filter(|selection| {
                inner
                    .challenges
                    .get(&selection.challenge_id)
                    .is_some_and(|challenge| challenge.status == ChallengeStatus::InProgress)
            })
            .cloned()
            .collect();
        drop(inner);
        ready(Ok(selections))
    }

    fn delete_selections_for(&self, challenge_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.lock()
            .selections
            .retain(|(cid, _), _| cid != challenge_id);
        ready(Ok(()))
    }

    fn complete_challenge(
        &self,
        challenge_id: &str,
        winner_id: &str,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let mut inner = self.lock();
        let completed = match inner.challenges.get_mut(challenge_id) {
            Some(challenge) if challenge.status == ChallengeStatus::InProgress => {
                challenge.status = ChallengeStatus::Completed;
                challenge.winner_id = Some(winner_id.to_owned());
                challenge.completed_at = Some(completed_at);
                challenge.claim_time = Some(completed_at);
                challenge.updated_at = completed_at;
                Some(challenge.clone())
            }
            _ => None,
        };
        if completed.is_some() {
            inner.selections.retain(|(cid, _), _| cid != challenge_id);
        }
        drop(inner);
        ready(Ok(completed))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        ready(Ok(()))
    }
}
