//! Persisted row types shared by the storage backends.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A platform user. The engine reads users but never writes them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserEntity {
    pub id: String,
    pub name: String,
    pub coins: i64,
    pub image: Option<String>,
}

/// Lifecycle status of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "challenge_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Expired,
    Disputed,
}

impl ChallengeStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChallengeStatus::Completed | ChallengeStatus::Expired | ChallengeStatus::Disputed
        )
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChallengeStatus::Pending => "PENDING",
            ChallengeStatus::Accepted => "ACCEPTED",
            ChallengeStatus::InProgress => "IN_PROGRESS",
            ChallengeStatus::Completed => "COMPLETED",
            ChallengeStatus::Expired => "EXPIRED",
            ChallengeStatus::Disputed => "DISPUTED",
        };
        f.write_str(name)
    }
}

/// A two-player wager on a named game.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChallengeEntity {
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
}

/// One player's winner nomination for a challenge.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WinnerSelectionEntity {
    pub challenge_id: String,
    pub player_id: String,
    pub selected_winner: String,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to a challenge row; `None` fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct ChallengePatch {
    pub status: Option<ChallengeStatus>,
    pub invitee_id: Option<String>,
    pub is_open: Option<bool>,
    pub winner_id: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claim_time: Option<DateTime<Utc>>,
}

impl ChallengePatch {
    /// A patch that only moves the status.
    pub fn status(status: ChallengeStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
