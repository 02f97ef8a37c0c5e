use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::dto::challenge::ChallengePayload;
use crate::dto::validation::validate_identifier;

/// Messages accepted from connected clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "setOnline", rename_all = "camelCase")]
    SetOnline { user_id: String, online: bool },
    #[serde(rename = "createChallenge")]
    CreateChallenge(CreateChallengePayload),
    #[serde(rename = "acceptChallenge", rename_all = "camelCase")]
    AcceptChallenge { challenge_id: String },
    #[serde(rename = "joinOpenChallenge", rename_all = "camelCase")]
    JoinOpenChallenge {
        challenge_id: String,
        user_id: String,
    },
    #[serde(rename = "startChallenge", rename_all = "camelCase")]
    StartChallenge {
        challenge_id: String,
        user_id: String,
    },
    #[serde(rename = "selectWinner")]
    SelectWinner(SelectWinnerPayload),
    #[serde(rename = "claimVictory", rename_all = "camelCase")]
    ClaimVictory { challenge_id: String },
    #[serde(rename = "getWinnerSelections")]
    GetWinnerSelections,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Fields of a `createChallenge` frame.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChallengePayload {
    #[validate(custom(function = validate_identifier))]
    pub creator_id: String,
    #[validate(length(min = 1, max = 128))]
    pub game: String,
    #[validate(range(min = 0))]
    pub coins: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub xp: i64,
    pub invitee_id: Option<String>,
    pub description: Option<String>,
    pub rules: Option<serde_json::Value>,
    #[serde(default)]
    pub is_open: bool,
}

/// Fields of a `selectWinner` frame. `gameId` and `selectedWinner` are legacy
/// spellings still sent by older clients.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectWinnerPayload {
    #[serde(alias = "gameId")]
    #[validate(custom(function = validate_identifier))]
    pub challenge_id: String,
    #[validate(custom(function = validate_identifier))]
    pub player_id: String,
    #[serde(alias = "selectedWinner")]
    #[validate(custom(function = validate_identifier))]
    pub winner_id: String,
}

/// One roster entry in the `onlineUsers` broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct OnlineUserSummary {
    pub id: String,
    pub name: String,
}

/// Messages pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "onlineUsers")]
    OnlineUsers { users: Vec<OnlineUserSummary> },
    #[serde(rename = "challengeCreated")]
    ChallengeCreated { challenge: ChallengePayload },
    #[serde(rename = "openChallengeCreated")]
    OpenChallengeCreated { challenge: ChallengePayload },
    #[serde(rename = "challengeAccepted")]
    ChallengeAccepted { challenge: ChallengePayload },
    #[serde(rename = "challengeStartedBy", rename_all = "camelCase")]
    ChallengeStartedBy {
        challenge: ChallengePayload,
        started_by: String,
    },
    #[serde(rename = "challengeUpdate")]
    ChallengeUpdate { challenge: ChallengePayload },
    #[serde(rename = "challengeCompleted")]
    ChallengeCompleted { challenge: ChallengePayload },
    #[serde(rename = "allWinnerSelections")]
    AllWinnerSelections {
        selections: HashMap<String, HashMap<String, String>>,
    },
    #[serde(rename = "joinOpenChallengeFailed")]
    JoinOpenChallengeFailed { message: String },
    #[serde(rename = "failedToStartChallenge")]
    FailedToStartChallenge { message: String },
    #[serde(rename = "claimVictoryFailed")]
    ClaimVictoryFailed { message: String },
    #[serde(rename = "error")]
    Error { message: String },
}
