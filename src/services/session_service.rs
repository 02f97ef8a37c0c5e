//! Socket lifecycle and inbound frame routing. Each connection gets a
//! dedicated writer task so outbound frames keep flowing while the read loop
//! awaits inbound ones.

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::{broadcast, challenge_service},
    state::{
        presence::{ConnId, OnlineUser},
        SharedState,
    },
};

const PROCESSING_ERROR: &str = "Failed to process message";

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound frames flowing even while we await
    // inbound ones.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    state.register_connection(conn_id, outbound_tx.clone());
    info!(%conn_id, "connection opened");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&state, conn_id, &outbound_tx, text.as_str()).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%conn_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.unregister_connection(conn_id);
    if let Some((user_id, _)) = state.presence().remove_by_conn(conn_id) {
        info!(%conn_id, user_id = %user_id, "user went offline");
        broadcast::broadcast_online_users(&state);
    }
    info!(%conn_id, "connection closed");

    finalize(writer_task, outbound_tx).await;
}

/// Parse one text frame and route it. Handler errors become a generic error
/// frame to the originator; the socket stays open.
async fn handle_frame(
    state: &SharedState,
    conn_id: ConnId,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) {
    let message = match ClientMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            // Nothing to address a reply to when the frame does not parse.
            warn!(%conn_id, error = %err, "failed to parse frame");
            return;
        }
    };

    if let Err(err) = dispatch(state, conn_id, outbound_tx, message).await {
        warn!(%conn_id, error = %err, "message handler failed");
        broadcast::send_to_conn(
            outbound_tx,
            &ServerMessage::Error {
                message: PROCESSING_ERROR.to_owned(),
            },
        );
    }
}

async fn dispatch(
    state: &SharedState,
    conn_id: ConnId,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    match message {
        ClientMessage::SetOnline { user_id, online } => {
            set_online(state, conn_id, outbound_tx, user_id, online).await
        }
        ClientMessage::CreateChallenge(payload) => {
            challenge_service::create_challenge(state, payload).await
        }
        ClientMessage::AcceptChallenge { challenge_id } => {
            challenge_service::accept_challenge(state, &challenge_id).await
        }
        ClientMessage::JoinOpenChallenge {
            challenge_id,
            user_id,
        } => challenge_service::join_open_challenge(state, outbound_tx, &challenge_id, &user_id)
            .await,
        ClientMessage::StartChallenge {
            challenge_id,
            user_id,
        } => challenge_service::start_challenge(state, outbound_tx, &challenge_id, &user_id).await,
        ClientMessage::SelectWinner(payload) => {
            challenge_service::select_winner(state, payload).await
        }
        ClientMessage::ClaimVictory { challenge_id } => {
            challenge_service::claim_victory(state, outbound_tx, &challenge_id).await
        }
        ClientMessage::GetWinnerSelections => {
            challenge_service::send_all_selections(state, outbound_tx);
            Ok(())
        }
        ClientMessage::Unknown => {
            // Unknown types are dropped without a reply so malformed clients
            // are not amplified.
            debug!(%conn_id, "ignoring unknown message type");
            Ok(())
        }
    }
}

/// Bind or unbind this connection's presence entry and broadcast the roster.
async fn set_online(
    state: &SharedState,
    conn_id: ConnId,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    user_id: String,
    online: bool,
) -> Result<(), ServiceError> {
    if !online {
        if state.presence().remove_if_conn(&user_id, conn_id).is_some() {
            info!(%conn_id, user_id = %user_id, "user went offline");
            broadcast::broadcast_online_users(state);
        }
        return Ok(());
    }

    let user = state
        .store()
        .find_user(&user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user `{user_id}` not found")))?;

    let replaced = state
        .presence()
        .bind(
            user_id.clone(),
            OnlineUser {
                conn_id,
                name: user.name,
                sender: outbound_tx.clone(),
                connected_at: Utc::now(),
            },
        )
        .map_err(|err| ServiceError::InvalidState(err.to_string()))?;

    if let Some(previous) = replaced {
        debug!(
            user_id = %user_id,
            previous_conn = %previous.conn_id,
            "replaced prior presence binding"
        );
    }

    info!(%conn_id, user_id = %user_id, "user online");
    broadcast::broadcast_online_users(state);
    Ok(())
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{dao::challenge_store::memory::MemoryChallengeStore, state::AppState};

    fn channel() -> (mpsc::UnboundedSender<Message>, UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    fn frames(rx: &mut UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut received = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                received.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        received
    }

    #[tokio::test]
    async fn set_online_binds_and_broadcasts_the_roster() {
        let store = MemoryChallengeStore::new();
        store.insert_user("u1", "Ada", 100);
        let state = AppState::new(Arc::new(store));
        let conn_id = Uuid::new_v4();
        let (tx, mut rx) = channel();

        handle_frame(
            &state,
            conn_id,
            &tx,
            r#"{"type":"setOnline","userId":"u1","online":true}"#,
        )
        .await;

        assert!(state.presence().is_online("u1"));
        let received = frames(&mut rx);
        let roster = received
            .iter()
            .find(|frame| frame["type"] == "onlineUsers")
            .unwrap();
        assert_eq!(roster["users"][0]["id"], "u1");
        assert_eq!(roster["users"][0]["name"], "Ada");
    }

    #[tokio::test]
    async fn set_online_for_unknown_user_returns_an_error_frame() {
        let state = AppState::new(Arc::new(MemoryChallengeStore::new()));
        let (tx, mut rx) = channel();

        handle_frame(
            &state,
            Uuid::new_v4(),
            &tx,
            r#"{"type":"setOnline","userId":"ghost","online":true}"#,
        )
        .await;

        assert!(!state.presence().is_online("ghost"));
        let received = frames(&mut rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "error");
        assert_eq!(received[0]["message"], PROCESSING_ERROR);
    }

    #[tokio::test]
    async fn set_offline_evicts_only_the_owning_connection() {
        let store = MemoryChallengeStore::new();
        store.insert_user("u1", "Ada", 100);
        let state = AppState::new(Arc::new(store));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let (first_tx, _first_rx) = channel();
        let (second_tx, _second_rx) = channel();

        handle_frame(
            &state,
            first,
            &first_tx,
            r#"{"type":"setOnline","userId":"u1","online":true}"#,
        )
        .await;
        handle_frame(
            &state,
            second,
            &second_tx,
            r#"{"type":"setOnline","userId":"u1","online":true}"#,
        )
        .await;

        // The abandoned connection cannot sign the replacement off.
        handle_frame(
            &state,
            first,
            &first_tx,
            r#"{"type":"setOnline","userId":"u1","online":false}"#,
        )
        .await;
        assert!(state.presence().is_online("u1"));

        handle_frame(
            &state,
            second,
            &second_tx,
            r#"{"type":"setOnline","userId":"u1","online":false}"#,
        )
        .await;
        assert!(!state.presence().is_online("u1"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_dropped_silently() {
        let state = AppState::new(Arc::new(MemoryChallengeStore::new()));
        let (tx, mut rx) = channel();

        handle_frame(&state, Uuid::new_v4(), &tx, "not json at all").await;
        handle_frame(&state, Uuid::new_v4(), &tx, r#"{"type":"warpTen"}"#).await;

        assert!(frames(&mut rx).is_empty());
    }
}
