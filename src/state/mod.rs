pub mod challenge_fsm;
pub mod handshake;
pub mod presence;

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::dao::challenge_store::ChallengeStore;
use handshake::{NominationRegistry, StartRegistry};
use presence::{ConnId, PresenceRegistry};

pub type SharedState = Arc<AppState>;

/// Central application state: the store handle, the presence roster, and the
/// transient per-challenge registries.
pub struct AppState {
    store: Arc<dyn ChallengeStore>,
    presence: PresenceRegistry,
    starts: StartRegistry,
    nominations: NominationRegistry,
    connections: DashMap<ConnId, mpsc::UnboundedSender<Message>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply into connection tasks.
    pub fn new(store: Arc<dyn ChallengeStore>) -> SharedState {
        Arc::new(Self {
            store,
            presence: PresenceRegistry::new(),
            starts: StartRegistry::new(),
            nominations: NominationRegistry::new(),
            connections: DashMap::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn ChallengeStore> {
        &self.store
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn starts(&self) -> &StartRegistry {
        &self.starts
    }

    pub fn nominations(&self) -> &NominationRegistry {
        &self.nominations
    }

    /// Track a socket's writer channel for lifecycle management. Covers every
    /// accepted connection, bound to a user or not.
    pub fn register_connection(&self, conn_id: ConnId, sender: mpsc::UnboundedSender<Message>) {
        self.connections.insert(conn_id, sender);
    }

    pub fn unregister_connection(&self, conn_id: ConnId) {
        self.connections.remove(&conn_id);
    }

    /// Queue a normal close frame on every open socket (shutdown drain).
    pub fn close_all_connections(&self, reason: &str) {
        for entry in self.connections.iter() {
            let _ = entry.value().send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: reason.to_owned().into(),
            })));
        }
    }
}
