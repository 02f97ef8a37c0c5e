use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dao::models::{ChallengeEntity, ChallengeStatus};

/// Outbound view of a challenge. Every broadcast that carries a challenge
/// attaches the current nomination map as `winnerSelections`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayload {
    pub id: String,
    pub creator_id: String,
    pub invitee_id: Option<String>,
    pub is_open: bool,
    pub game: String,
    pub description: Option<String>,
    pub rules: serde_json::Value,
    pub coins: i64,
    pub xp: i64,
    pub status: ChallengeStatus,
    pub winner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claim_time: Option<DateTime<Utc>>,
    pub winner_selections: HashMap<String, String>,
}

impl ChallengePayload {
    /// Enrich a persisted challenge with the nomination map snapshotted at
    /// broadcast time.
    pub fn from_entity(
        entity: ChallengeEntity,
        winner_selections: HashMap<String, String>,
    ) -> Self {
        Self {
            id: entity.id,
            creator_id: entity.creator_id,
            invitee_id: entity.invitee_id,
            is_open: entity.is_open,
            game: entity.game,
            description: entity.description,
            rules: entity.rules,
            coins: entity.coins,
            xp: entity.xp,
            status: entity.status,
            winner_id: entity.winner_id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            accepted_at: entity.accepted_at,
            expires_at: entity.expires_at,
            completed_at: entity.completed_at,
            claim_time: entity.claim_time,
            winner_selections,
        }
    }
}
