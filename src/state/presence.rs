//! Online-user presence registry.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Upper bound on concurrent presence bindings.
pub const MAX_CONNECTIONS: usize = 10_000;

/// Ephemeral identifier for one socket, minted at accept time.
pub type ConnId = Uuid;

#[derive(Clone)]
/// Handle used to push frames to one connected user.
pub struct OnlineUser {
    pub conn_id: ConnId,
    pub name: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: DateTime<Utc>,
}

/// Returned when the registry refuses a binding past [`MAX_CONNECTIONS`].
#[derive(Debug, Error)]
#[error("presence registry is at the connection limit")]
pub struct PresenceFull;

/// Live socket binding per user id. A user has at most one binding; a second
/// `bind` for the same id replaces the first, whose socket is considered
/// abandoned.
#[derive(Default)]
pub struct PresenceRegistry {
    online: DashMap<String, OnlineUser>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a user to a connection, returning any replaced binding.
    pub fn bind(&self, user_id: String, user: OnlineUser) -> Result<Option<OnlineUser>, PresenceFull> {
        if !self.online.contains_key(&user_id) && self.online.len() >= MAX_CONNECTIONS {
            return Err(PresenceFull);
        }
        Ok(self.online.insert(user_id, user))
    }

    pub fn find_by_user(&self, user_id: &str) -> Option<OnlineUser> {
        self.online.get(user_id).map(|entry| entry.value().clone())
    }

    /// Linear scan keyed by connection id; bounded by [`MAX_CONNECTIONS`].
    pub fn find_by_conn(&self, conn_id: ConnId) -> Option<(String, OnlineUser)> {
        self.online
            .iter()
            .find(|entry| entry.value().conn_id == conn_id)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }

    /// Evict the binding owned by `conn_id`, if any. A binding replaced by a
    /// newer connection is left alone.
    pub fn remove_by_conn(&self, conn_id: ConnId) -> Option<(String, OnlineUser)> {
        let user_id = self
            .online
            .iter()
            .find(|entry| entry.value().conn_id == conn_id)
            .map(|entry| entry.key().clone())?;
        self.online
            .remove_if(&user_id, |_, user| user.conn_id == conn_id)
    }

    /// Evict the binding for `user_id` only while it still belongs to `conn_id`.
    pub fn remove_if_conn(&self, user_id: &str, conn_id: ConnId) -> Option<OnlineUser> {
        self.online
            .remove_if(user_id, |_, user| user.conn_id == conn_id)
            .map(|(_, user)| user)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains_key(user_id)
    }

    /// `(user_id, name)` pairs for the roster broadcast, sorted by user id so
    /// consecutive rosters are comparable.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut users: Vec<_> = self
            .online
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().name.clone()))
            .collect();
        users.sort();
        users
    }

    /// Writer channels of the given users, skipping offline ones.
    pub fn senders_for(&self, user_ids: &[&str]) -> Vec<mpsc::UnboundedSender<Message>> {
        user_ids
            .iter()
            .filter_map(|user_id| self.online.get(*user_id))
            .map(|entry| entry.value().sender.clone())
            .collect()
    }

    /// Writer channels of every online user.
    pub fn all_senders(&self) -> Vec<mpsc::UnboundedSender<Message>> {
        self.online
            .iter()
            .map(|entry| entry.value().sender.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
