use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{
    config::PgConfig,
    error::{PgDaoError, PgResult},
};
use crate::dao::{
    challenge_store::ChallengeStore,
    models::{ChallengeEntity, ChallengePatch, UserEntity, WinnerSelectionEntity},
    storage::StorageResult,
};

const CHALLENGE_COLUMNS: &str = "id, creator_id, invitee_id, is_open, game, description, rules, \
     coins, xp, status, winner_id, created_at, updated_at, accepted_at, expires_at, \
     completed_at, claim_time";

/// Postgres-backed [`ChallengeStore`].
#[derive(Clone)]
pub struct PgChallengeStore {
    pool: PgPool,
}

impl PgChallengeStore {
    /// Open the connection pool and bring the schema up to date.
    pub async fn connect(config: PgConfig) -> PgResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|source| PgDaoError::Connect { source })?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|source| PgDaoError::Migrate { source })?;

        Ok(Self { pool })
    }
}

impl ChallengeStore for PgChallengeStore {
    fn find_user(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let pool = self.pool.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let user = sqlx::query_as::<_, UserEntity>(
                "SELECT id, name, coins, image FROM users WHERE id = $1",
            )
            .bind(&id)
            .fetch_optional(&pool)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "find_user",
                source,
            })?;
            Ok(user)
        })
    }

    fn find_challenge(
        &self,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let pool = self.pool.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let challenge = sqlx::query_as::<_, ChallengeEntity>(&format!(
                "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = $1"
            ))
            .bind(&id)
            .fetch_optional(&pool)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "find_challenge",
                source,
            })?;
            Ok(challenge)
        })
    }

    fn create_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO challenges (id, creator_id, invitee_id, is_open, game, description, \
                 rules, coins, xp, status, winner_id, created_at, updated_at, accepted_at, \
                 expires_at, completed_at, claim_time) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            )
            .bind(&challenge.id)
            .bind(&challenge.creator_id)
            .bind(&challenge.invitee_id)
            .bind(challenge.is_open)
            .bind(&challenge.game)
            .bind(&challenge.description)
            .bind(&challenge.rules)
            .bind(challenge.coins)
            .bind(challenge.xp)
            .bind(challenge.status)
            .bind(&challenge.winner_id)
            .bind(challenge.created_at)
            .bind(challenge.updated_at)
            .bind(challenge.accepted_at)
            .bind(challenge.expires_at)
            .bind(challenge.completed_at)
            .bind(challenge.claim_time)
            .execute(&pool)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "create_challenge",
                source,
            })?;
            Ok(())
        })
    }

    fn update_challenge(
        &self,
        id: &str,
        patch: ChallengePatch,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let pool = self.pool.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let challenge = sqlx::query_as::<_, ChallengeEntity>(&format!(
                "UPDATE challenges SET \
                   status = COALESCE($2, status), \
                   invitee_id = COALESCE($3, invitee_id), \
                   is_open = COALESCE($4, is_open), \
                   winner_id = COALESCE($5, winner_id), \
                   accepted_at = COALESCE($6, accepted_at), \
                   completed_at = COALESCE($7, completed_at), \
                   claim_time = COALESCE($8, claim_time), \
                   updated_at = now() \
                 WHERE id = $1 RETURNING {CHALLENGE_COLUMNS}"
            ))
            .bind(&id)
            .bind(patch.status)
            .bind(&patch.invitee_id)
            .bind(patch.is_open)
            .bind(&patch.winner_id)
            .bind(patch.accepted_at)
            .bind(patch.completed_at)
            .bind(patch.claim_time)
            .fetch_optional(&pool)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "update_challenge",
                source,
            })?;
            Ok(challenge)
        })
    }

    fn claim_open_slot(
        &self,
        challenge_id: &str,
        user_id: &str,
        accepted_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let pool = self.pool.clone();
        let challenge_id = challenge_id.to_owned();
        let user_id = user_id.to_owned();
        Box::pin(async move {
            // The WHERE guards make the claim first-wins under concurrency.
            let challenge = sqlx::query_as::<_, ChallengeEntity>(&format!(
                "UPDATE challenges SET \
                   invitee_id = $2, status = 'ACCEPTED', is_open = FALSE, \
                   accepted_at = $3, updated_at = $3 \
                 WHERE id = $1 AND status = 'PENDING' AND is_open AND invitee_id IS NULL \
                 RETURNING {CHALLENGE_COLUMNS}"
            ))
            .bind(&challenge_id)
            .bind(&user_id)
            .bind(accepted_at)
            .fetch_optional(&pool)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "claim_open_slot",
                source,
            })?;
            Ok(challenge)
        })
    }

    fn upsert_selection(
        &self,
        challenge_id: &str,
        player_id: &str,
        selected_winner: &str,
        updated_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let pool = self.pool.clone();
        let challenge_id = challenge_id.to_owned();
        let player_id = player_id.to_owned();
        let selected_winner = selected_winner.to_owned();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO winner_selections (challenge_id, player_id, selected_winner, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (challenge_id, player_id) \
                 DO UPDATE SET selected_winner = EXCLUDED.selected_winner, \
                               updated_at = EXCLUDED.updated_at",
            )
            .bind(&challenge_id)
            .bind(&player_id)
            .bind(&selected_winner)
            .bind(updated_at)
            .execute(&pool)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "upsert_selection",
                source,
            })?;
            Ok(())
        })
    }

    fn load_active_selections(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<WinnerSelectionEntity>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let selections = sqlx::query_as::<_, WinnerSelectionEntity>(
                "SELECT ws.challenge_id, ws.player_id, ws.selected_winner, ws.updated_at \
                 FROM winner_selections ws \
                 JOIN challenges c ON c.id = ws.challenge_id \
                 WHERE c.status = 'IN_PROGRESS'",
            )
            .fetch_all(&pool)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "load_active_selections",
                source,
            })?;
            Ok(selections)
        })
    }

    fn delete_selections_for(&self, challenge_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let pool = self.pool.clone();
        let challenge_id = challenge_id.to_owned();
        Box::pin(async move {
            sqlx::query("DELETE FROM winner_selections WHERE challenge_id = $1")
                .bind(&challenge_id)
                .execute(&pool)
                .await
                .map_err(|source| PgDaoError::Query {
                    context: "delete_selections_for",
                    source,
                })?;
            Ok(())
        })
    }

    fn complete_challenge(
        &self,
        challenge_id: &str,
        winner_id: &str,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let pool = self.pool.clone();
        let challenge_id = challenge_id.to_owned();
        let winner_id = winner_id.to_owned();
        Box::pin(async move {
            let mut tx = pool.begin().await.map_err(|source| PgDaoError::Query {
                context: "complete_challenge.begin",
                source,
            })?;

            let challenge = sqlx::query_as::<_, ChallengeEntity>(&format!(
                "UPDATE challenges SET \
                   status = 'COMPLETED', winner_id = $2, completed_at = $3, \
                   claim_time = $3, updated_at = $3 \
                 WHERE id = $1 AND status = 'IN_PROGRESS' \
                 RETURNING {CHALLENGE_COLUMNS}"
            ))
            .bind(&challenge_id)
            .bind(&winner_id)
            .bind(completed_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|source| PgDaoError::Query {
                context: "complete_challenge.update",
                source,
            })?;

            if challenge.is_some() {
                sqlx::query("DELETE FROM winner_selections WHERE challenge_id = $1")
                    .bind(&challenge_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| PgDaoError::Query {
                        context: "complete_challenge.purge",
                        source,
                    })?;
            }

            tx.commit().await.map_err(|source| PgDaoError::Query {
                context: "complete_challenge.commit",
                source,
            })?;

            Ok(challenge)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .map_err(|source| PgDaoError::Query {
                    context: "health_check",
                    source,
                })?;
            Ok(())
        })
    }
}
