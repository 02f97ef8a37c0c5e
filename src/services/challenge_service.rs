//! Challenge lifecycle operations. Each operation checks its preconditions in
//! order, persists through the store, mirrors the result into the caches, and
//! fans the outcome out to the affected participants.

use std::time::Instant;

use axum::extract::ws::Message;
use chrono::{Duration, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ChallengeEntity, ChallengePatch, ChallengeStatus},
    dto::{
        challenge::ChallengePayload,
        ws::{CreateChallengePayload, SelectWinnerPayload, ServerMessage},
    },
    error::ServiceError,
    services::broadcast,
    state::{
        challenge_fsm::{consensus, next_status, ChallengeEvent, Consensus},
        handshake::StartRole,
        SharedState,
    },
};

/// How long a PENDING challenge stays answerable.
const CHALLENGE_TTL_HOURS: i64 = 24;

/// Create a challenge and announce it. Open challenges go to every online
/// user; targeted ones to the two participants.
pub async fn create_challenge(
    state: &SharedState,
    payload: CreateChallengePayload,
) -> Result<(), ServiceError> {
    payload.validate()?;

    if payload.is_open && payload.invitee_id.is_some() {
        return Err(ServiceError::InvalidInput(
            "an open challenge cannot name an invitee".into(),
        ));
    }
    if !payload.is_open && payload.invitee_id.is_none() {
        return Err(ServiceError::InvalidInput(
            "a targeted challenge requires an invitee".into(),
        ));
    }

    let now = Utc::now();
    let challenge = ChallengeEntity {
        id: Uuid::new_v4().to_string(),
        creator_id: payload.creator_id,
        invitee_id: payload.invitee_id,
        is_open: payload.is_open,
        game: payload.game,
        description: payload.description,
        rules: payload.rules.unwrap_or_else(|| serde_json::json!({})),
        coins: payload.coins,
        xp: payload.xp,
        status: ChallengeStatus::Pending,
        winner_id: None,
        created_at: now,
        updated_at: now,
        accepted_at: None,
        expires_at: now + Duration::hours(CHALLENGE_TTL_HOURS),
        completed_at: None,
        claim_time: None,
    };

    state.store().create_challenge(challenge.clone()).await?;
    info!(
        challenge_id = %challenge.id,
        creator_id = %challenge.creator_id,
        open = challenge.is_open,
        game = %challenge.game,
        "challenge created"
    );

    if challenge.is_open {
        let message = ServerMessage::OpenChallengeCreated {
            challenge: enriched(state, challenge),
        };
        broadcast::send_all(state, &message);
    } else {
        let creator_id = challenge.creator_id.clone();
        let invitee_id = challenge.invitee_id.clone();
        let message = ServerMessage::ChallengeCreated {
            challenge: enriched(state, challenge),
        };
        broadcast::send_targeted(state, &creator_id, invitee_id.as_deref(), &message);
    }

    Ok(())
}

/// PENDING → ACCEPTED by the invitee. The action layer upstream has already
/// checked that the acting user is the invitee.
pub async fn accept_challenge(state: &SharedState, challenge_id: &str) -> Result<(), ServiceError> {
    let challenge = require_challenge(state, challenge_id).await?;
    let challenge = expire_if_due(state, challenge).await?;

    next_status(challenge.status, ChallengeEvent::Accept)
        .map_err(|err| ServiceError::InvalidState(err.to_string()))?;

    let accepted = state
        .store()
        .update_challenge(
            &challenge.id,
            ChallengePatch {
                status: Some(ChallengeStatus::Accepted),
                accepted_at: Some(Utc::now()),
                ..ChallengePatch::default()
            },
        )
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{challenge_id}` not found")))?;

    info!(challenge_id = %accepted.id, invitee_id = ?accepted.invitee_id, "challenge accepted");
    broadcast_accepted(state, accepted);
    Ok(())
}

/// Claim the invitee slot of an open challenge. Every precondition failure is
/// reported to the originator only; a re-join by the current invitee re-emits
/// the accepted state instead of erroring.
pub async fn join_open_challenge(
    state: &SharedState,
    origin: &mpsc::UnboundedSender<Message>,
    challenge_id: &str,
    user_id: &str,
) -> Result<(), ServiceError> {
    let Some(challenge) = state.store().find_challenge(challenge_id).await? else {
        join_failed(origin, "Challenge not found");
        return Ok(());
    };
    let challenge = expire_if_due(state, challenge).await?;

    if challenge.status == ChallengeStatus::Accepted
        && challenge.invitee_id.as_deref() == Some(user_id)
    {
        debug!(challenge_id = %challenge.id, user_id, "invitee re-joined; re-emitting accepted state");
        broadcast_accepted(state, challenge);
        return Ok(());
    }

    if challenge.status == ChallengeStatus::Expired {
        join_failed(origin, "Challenge has expired");
        return Ok(());
    }
    if !challenge.is_open || challenge.status != ChallengeStatus::Pending {
        join_failed(origin, "Challenge is not open");
        return Ok(());
    }
    if user_id == challenge.creator_id {
        join_failed(origin, "You cannot join your own challenge");
        return Ok(());
    }
    if challenge.invitee_id.is_some() {
        join_failed(origin, "Challenge already has an opponent");
        return Ok(());
    }
    let Some(user) = state.store().find_user(user_id).await? else {
        join_failed(origin, "User not found");
        return Ok(());
    };
    if user.coins < challenge.coins {
        join_failed(origin, "Insufficient coins to join this challenge");
        return Ok(());
    }

    match state
        .store()
        .claim_open_slot(&challenge.id, user_id, Utc::now())
        .await?
    {
        Some(accepted) => {
            info!(challenge_id = %accepted.id, invitee_id = %user_id, "open challenge joined");
            broadcast_accepted(state, accepted);
        }
        // Another joiner won the slot between our read and the claim.
        None => join_failed(origin, "Challenge is no longer available"),
    }

    Ok(())
}

/// ACCEPTED → IN_PROGRESS, initiated by the invitee with both participants
/// online. Failures are reported to the originator as `failedToStartChallenge`.
pub async fn start_challenge(
    state: &SharedState,
    origin: &mpsc::UnboundedSender<Message>,
    challenge_id: &str,
    user_id: &str,
) -> Result<(), ServiceError> {
    let Some(challenge) = state.store().find_challenge(challenge_id).await? else {
        start_failed(origin, "Challenge not found");
        return Ok(());
    };
    let challenge = expire_if_due(state, challenge).await?;

    if challenge.invitee_id.as_deref() != Some(user_id) {
        start_failed(origin, "Only the invited player can start the challenge");
        return Ok(());
    }
    if !state.presence().is_online(user_id) {
        state
            .starts()
            .note_started(&challenge.id, StartRole::Invitee, Instant::now());
        start_failed(origin, "You must be online to start the challenge");
        return Ok(());
    }
    if !state.presence().is_online(&challenge.creator_id) {
        // The attempt leaves a handshake touch; the janitor evicts it if the
        // opponent never shows up.
        state
            .starts()
            .note_started(&challenge.id, StartRole::Invitee, Instant::now());
        start_failed(origin, "Opponent is Offline");
        return Ok(());
    }
    if challenge.status != ChallengeStatus::Accepted {
        let message = match challenge.status {
            ChallengeStatus::InProgress => "Challenge has already started".to_owned(),
            other => format!("Challenge cannot be started while {other}"),
        };
        start_failed(origin, &message);
        return Ok(());
    }

    let started = state
        .store()
        .update_challenge(
            &challenge.id,
            ChallengePatch::status(ChallengeStatus::InProgress),
        )
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{challenge_id}` not found")))?;

    state.starts().clear(&started.id);
    info!(challenge_id = %started.id, started_by = %user_id, "challenge started");

    let creator_id = started.creator_id.clone();
    let invitee_id = started.invitee_id.clone();
    let message = ServerMessage::ChallengeStartedBy {
        challenge: enriched(state, started),
        started_by: user_id.to_owned(),
    };
    broadcast::send_targeted(state, &creator_id, invitee_id.as_deref(), &message);
    Ok(())
}

/// Upsert one player's winner nomination. Never changes the challenge status.
pub async fn select_winner(
    state: &SharedState,
    payload: SelectWinnerPayload,
) -> Result<(), ServiceError> {
    payload.validate()?;

    let challenge = require_challenge(state, &payload.challenge_id).await?;
    if challenge.status != ChallengeStatus::InProgress {
        return Err(ServiceError::InvalidState(format!(
            "winner selections are only accepted while IN_PROGRESS (challenge is {})",
            challenge.status
        )));
    }

    // Store first, then cache, so readers never see acknowledged state that
    // did not persist.
    state
        .store()
        .upsert_selection(
            &challenge.id,
            &payload.player_id,
            &payload.winner_id,
            Utc::now(),
        )
        .await?;
    state
        .nominations()
        .record(&challenge.id, &payload.player_id, &payload.winner_id);

    debug!(
        challenge_id = %challenge.id,
        player_id = %payload.player_id,
        winner_id = %payload.winner_id,
        "winner nomination recorded"
    );

    let creator_id = challenge.creator_id.clone();
    let invitee_id = challenge.invitee_id.clone();
    let message = ServerMessage::ChallengeUpdate {
        challenge: enriched(state, challenge),
    };
    broadcast::send_targeted(state, &creator_id, invitee_id.as_deref(), &message);
    Ok(())
}

/// Run the consensus gate. Matching nominations settle the challenge inside
/// one transaction; anything else is reported to both participants.
pub async fn claim_victory(
    state: &SharedState,
    origin: &mpsc::UnboundedSender<Message>,
    challenge_id: &str,
) -> Result<(), ServiceError> {
    let Some(challenge) = state.store().find_challenge(challenge_id).await? else {
        broadcast::send_to_conn(
            origin,
            &ServerMessage::ClaimVictoryFailed {
                message: "Challenge not found".into(),
            },
        );
        return Ok(());
    };

    let Some(invitee_id) = challenge.invitee_id.clone() else {
        claim_failed(state, &challenge, "Challenge is not in progress");
        return Ok(());
    };
    if challenge.status != ChallengeStatus::InProgress {
        claim_failed(state, &challenge, "Challenge is not in progress");
        return Ok(());
    }

    let selections = state.nominations().selections_for(&challenge.id);
    match consensus(&selections, &challenge.creator_id, &invitee_id) {
        Consensus::Missing => {
            claim_failed(
                state,
                &challenge,
                "Both players must select a winner before victory can be claimed",
            );
        }
        Consensus::Disagree {
            creator_pick,
            invitee_pick,
        } => {
            info!(
                challenge_id = %challenge.id,
                creator_pick = %creator_pick,
                invitee_pick = %invitee_pick,
                "victory claim rejected: players disagree"
            );
            claim_failed(
                state,
                &challenge,
                "Players disagree on the winner. Both selections must match to complete the challenge",
            );
        }
        Consensus::Agreed(winner_id) => {
            match state
                .store()
                .complete_challenge(&challenge.id, &winner_id, Utc::now())
                .await?
            {
                Some(completed) => {
                    state.nominations().drop_challenge(&completed.id);
                    info!(
                        challenge_id = %completed.id,
                        winner_id = %winner_id,
                        "challenge completed"
                    );
                    let creator_id = completed.creator_id.clone();
                    let invitee_id = completed.invitee_id.clone();
                    let message = ServerMessage::ChallengeCompleted {
                        challenge: enriched(state, completed),
                    };
                    broadcast::send_targeted(state, &creator_id, invitee_id.as_deref(), &message);
                }
                None => claim_failed(state, &challenge, "Challenge is not in progress"),
            }
        }
    }

    Ok(())
}

/// Reply with the full nomination snapshot.
pub fn send_all_selections(state: &SharedState, origin: &mpsc::UnboundedSender<Message>) {
    broadcast::send_to_conn(
        origin,
        &ServerMessage::AllWinnerSelections {
            selections: state.nominations().snapshot_all(),
        },
    );
}

/// Administrative transition to DISPUTED. Deliberately not reachable from any
/// inbound frame; operators invoke it out of band.
pub async fn mark_disputed(
    state: &SharedState,
    challenge_id: &str,
) -> Result<ChallengeEntity, ServiceError> {
    let challenge = require_challenge(state, challenge_id).await?;

    next_status(challenge.status, ChallengeEvent::Dispute)
        .map_err(|err| ServiceError::InvalidState(err.to_string()))?;

    let disputed = state
        .store()
        .update_challenge(
            &challenge.id,
            ChallengePatch::status(ChallengeStatus::Disputed),
        )
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{challenge_id}` not found")))?;

    warn!(challenge_id = %disputed.id, "challenge marked disputed");
    let creator_id = disputed.creator_id.clone();
    let invitee_id = disputed.invitee_id.clone();
    let message = ServerMessage::ChallengeUpdate {
        challenge: enriched(state, disputed.clone()),
    };
    broadcast::send_targeted(state, &creator_id, invitee_id.as_deref(), &message);
    Ok(disputed)
}

async fn require_challenge(
    state: &SharedState,
    challenge_id: &str,
) -> Result<ChallengeEntity, ServiceError> {
    state
        .store()
        .find_challenge(challenge_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("challenge `{challenge_id}` not found")))
}

/// Lazily mark a PENDING challenge past its deadline as EXPIRED. The store is
/// written first; callers then fail their own precondition checks against the
/// expired status.
async fn expire_if_due(
    state: &SharedState,
    challenge: ChallengeEntity,
) -> Result<ChallengeEntity, ServiceError> {
    if challenge.status != ChallengeStatus::Pending || challenge.expires_at > Utc::now() {
        return Ok(challenge);
    }

    info!(challenge_id = %challenge.id, "challenge expired before being answered");
    let expired = state
        .store()
        .update_challenge(&challenge.id, ChallengePatch::status(ChallengeStatus::Expired))
        .await?;
    Ok(expired.unwrap_or_else(|| {
        let mut challenge = challenge;
        challenge.status = ChallengeStatus::Expired;
        challenge
    }))
}

/// Attach the nomination snapshot taken at broadcast time.
fn enriched(state: &SharedState, challenge: ChallengeEntity) -> ChallengePayload {
    let selections = state.nominations().selections_for(&challenge.id);
    ChallengePayload::from_entity(challenge, selections)
}

fn broadcast_accepted(state: &SharedState, challenge: ChallengeEntity) {
    let creator_id = challenge.creator_id.clone();
    let invitee_id = challenge.invitee_id.clone();
    let message = ServerMessage::ChallengeAccepted {
        challenge: enriched(state, challenge),
    };
    broadcast::send_targeted(state, &creator_id, invitee_id.as_deref(), &message);
}

fn join_failed(origin: &mpsc::UnboundedSender<Message>, message: &str) {
    broadcast::send_to_conn(
        origin,
        &ServerMessage::JoinOpenChallengeFailed {
            message: message.to_owned(),
        },
    );
}

fn start_failed(origin: &mpsc::UnboundedSender<Message>, message: &str) {
    broadcast::send_to_conn(
        origin,
        &ServerMessage::FailedToStartChallenge {
            message: message.to_owned(),
        },
    );
}

/// Consensus failures go to both participants.
fn claim_failed(state: &SharedState, challenge: &ChallengeEntity, message: &str) {
    broadcast::send_targeted(
        state,
        &challenge.creator_id,
        challenge.invitee_id.as_deref(),
        &ServerMessage::ClaimVictoryFailed {
            message: message.to_owned(),
        },
    );
}
