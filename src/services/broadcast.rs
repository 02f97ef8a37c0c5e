//! Outbound frame fan-out. Recipients are resolved from the presence
//! registry; every send is per-recipient best-effort so one bad socket never
//! blocks the rest.

use axum::extract::ws::{Message, Utf8Bytes};
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    dto::ws::{OnlineUserSummary, ServerMessage},
    state::SharedState,
};

fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload.into()),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound frame");
            None
        }
    }
}

/// Queue a frame on one writer channel. A closed channel is logged and
/// ignored; the connection discovers its own brokenness on the next frame.
pub fn send_to_conn(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    let Some(payload) = encode(message) else {
        return;
    };
    if tx.send(Message::Text(payload)).is_err() {
        warn!("dropping frame for closed connection");
    }
}

/// Deliver a frame to the participants' live sockets (targeted broadcast).
pub fn send_targeted(
    state: &SharedState,
    creator_id: &str,
    invitee_id: Option<&str>,
    message: &ServerMessage,
) {
    let Some(payload) = encode(message) else {
        return;
    };

    let mut recipients = vec![creator_id];
    if let Some(invitee) = invitee_id {
        if invitee != creator_id {
            recipients.push(invitee);
        }
    }

    // Snapshot the senders first so no registry lock is held while sending.
    for sender in state.presence().senders_for(&recipients) {
        if sender.send(Message::Text(payload.clone())).is_err() {
            warn!("dropping frame for closed connection");
        }
    }
}

/// Deliver a frame to every online user.
pub fn send_all(state: &SharedState, message: &ServerMessage) {
    let Some(payload) = encode(message) else {
        return;
    };

    for sender in state.presence().all_senders() {
        if sender.send(Message::Text(payload.clone())).is_err() {
            warn!("dropping frame for closed connection");
        }
    }
}

/// Broadcast the current roster to every online user.
pub fn broadcast_online_users(state: &SharedState) {
    let users = state
        .presence()
        .snapshot()
        .into_iter()
        .map(|(id, name)| OnlineUserSummary { id, name })
        .collect();
    send_all(state, &ServerMessage::OnlineUsers { users });
}
