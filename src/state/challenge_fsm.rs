//! Pure challenge lifecycle rules: the status transition table and the
//! two-player victory consensus check.

use std::collections::HashMap;

use thiserror::Error;

use crate::dao::models::ChallengeStatus;

/// Events that can move a challenge along its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeEvent {
    /// Invitee accepts a targeted challenge.
    Accept,
    /// A qualifying user claims the open invitee slot.
    JoinOpen,
    /// The invitee starts the match.
    Start,
    /// Both nominations agree; the match settles.
    CompleteAgreed,
    /// The challenge sat unanswered past its deadline.
    Expire,
    /// Administrative dispute transition.
    Dispute,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from}")]
pub struct InvalidTransition {
    pub from: ChallengeStatus,
    pub event: ChallengeEvent,
}

/// Compute the status an event leads to, or reject the event.
pub fn next_status(
    from: ChallengeStatus,
    event: ChallengeEvent,
) -> Result<ChallengeStatus, InvalidTransition> {
    let next = match (from, event) {
        (ChallengeStatus::Pending, ChallengeEvent::Accept) => ChallengeStatus::Accepted,
        (ChallengeStatus::Pending, ChallengeEvent::JoinOpen) => ChallengeStatus::Accepted,
        (ChallengeStatus::Accepted, ChallengeEvent::Start) => ChallengeStatus::InProgress,
        (ChallengeStatus::InProgress, ChallengeEvent::CompleteAgreed) => ChallengeStatus::Completed,
        (ChallengeStatus::Pending, ChallengeEvent::Expire) => ChallengeStatus::Expired,
        (from, ChallengeEvent::Dispute) if !from.is_terminal() => ChallengeStatus::Disputed,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Outcome of the two-player victory consensus gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consensus {
    /// At least one participant has not nominated a winner yet.
    Missing,
    /// Both nominated, but the picks differ.
    Disagree {
        creator_pick: String,
        invitee_pick: String,
    },
    /// Both nominations name the same winner.
    Agreed(String),
}

/// Evaluate both participants' nominations for a challenge. Pure over the
/// nomination map so tests and diagnostics can reuse it.
pub fn consensus(
    selections: &HashMap<String, String>,
    creator_id: &str,
    invitee_id: &str,
) -> Consensus {
    let (Some(creator_pick), Some(invitee_pick)) =
        (selections.get(creator_id), selections.get(invitee_id))
    else {
        return Consensus::Missing;
    };

    if creator_pick == invitee_pick {
        Consensus::Agreed(creator_pick.clone())
    } else {
        Consensus::Disagree {
            creator_pick: creator_pick.clone(),
            invitee_pick: invitee_pick.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_through_lifecycle() {
        let accepted = next_status(ChallengeStatus::Pending, ChallengeEvent::Accept).unwrap();
        assert_eq!(accepted, ChallengeStatus::Accepted);

        let in_progress = next_status(accepted, ChallengeEvent::Start).unwrap();
        assert_eq!(in_progress, ChallengeStatus::InProgress);

        let completed = next_status(in_progress, ChallengeEvent::CompleteAgreed).unwrap();
        assert_eq!(completed, ChallengeStatus::Completed);
        assert!(completed.is_terminal());
    }

    #[test]
    fn open_join_reaches_accepted() {
        assert_eq!(
            next_status(ChallengeStatus::Pending, ChallengeEvent::JoinOpen).unwrap(),
            ChallengeStatus::Accepted
        );
    }

    #[test]
    fn pending_expires() {
        assert_eq!(
            next_status(ChallengeStatus::Pending, ChallengeEvent::Expire).unwrap(),
            ChallengeStatus::Expired
        );
        // Only PENDING challenges expire.
        assert!(next_status(ChallengeStatus::Accepted, ChallengeEvent::Expire).is_err());
        assert!(next_status(ChallengeStatus::InProgress, ChallengeEvent::Expire).is_err());
    }

    #[test]
    fn dispute_from_any_non_terminal_status() {
        for from in [
            ChallengeStatus::Pending,
            ChallengeStatus::Accepted,
            ChallengeStatus::InProgress,
        ] {
            assert_eq!(
                next_status(from, ChallengeEvent::Dispute).unwrap(),
                ChallengeStatus::Disputed
            );
        }
        for from in [
            ChallengeStatus::Completed,
            ChallengeStatus::Expired,
            ChallengeStatus::Disputed,
        ] {
            assert!(next_status(from, ChallengeEvent::Dispute).is_err());
        }
    }

    #[test]
    fn no_backward_or_repeated_transitions() {
        let err = next_status(ChallengeStatus::InProgress, ChallengeEvent::Start).unwrap_err();
        assert_eq!(err.from, ChallengeStatus::InProgress);
        assert_eq!(err.event, ChallengeEvent::Start);

        assert!(next_status(ChallengeStatus::Accepted, ChallengeEvent::Accept).is_err());
        assert!(next_status(ChallengeStatus::Completed, ChallengeEvent::CompleteAgreed).is_err());
        assert!(next_status(ChallengeStatus::Pending, ChallengeEvent::Start).is_err());
        assert!(next_status(ChallengeStatus::Pending, ChallengeEvent::CompleteAgreed).is_err());
    }

    fn selections(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(player, winner)| (player.to_string(), winner.to_string()))
            .collect()
    }

    #[test]
    fn consensus_requires_both_nominations() {
        assert_eq!(consensus(&selections(&[]), "u1", "u2"), Consensus::Missing);
        assert_eq!(
            consensus(&selections(&[("u1", "u1")]), "u1", "u2"),
            Consensus::Missing
        );
        assert_eq!(
            consensus(&selections(&[("u2", "u1")]), "u1", "u2"),
            Consensus::Missing
        );
    }

    #[test]
    fn consensus_detects_disagreement() {
        assert_eq!(
            consensus(&selections(&[("u1", "u1"), ("u2", "u2")]), "u1", "u2"),
            Consensus::Disagree {
                creator_pick: "u1".into(),
                invitee_pick: "u2".into(),
            }
        );
    }

    #[test]
    fn consensus_agrees_on_matching_picks() {
        assert_eq!(
            consensus(&selections(&[("u1", "u2"), ("u2", "u2")]), "u1", "u2"),
            Consensus::Agreed("u2".into())
        );
    }

    #[test]
    fn stray_nominations_do_not_affect_consensus() {
        assert_eq!(
            consensus(
                &selections(&[("u1", "u1"), ("u2", "u1"), ("intruder", "intruder")]),
                "u1",
                "u2"
            ),
            Consensus::Agreed("u1".into())
        );
    }
}
