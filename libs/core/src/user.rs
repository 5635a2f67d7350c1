//! Cached workspace members, kept current from `user_change` events.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{envelope::DomainEvent, receiver::EventReceiver, team::Team};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl User {
    pub fn new(id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            team_id: team_id.into(),
            name: String::new(),
            real_name: None,
            is_admin: false,
            is_bot: false,
            deleted: false,
        }
    }
}

#[derive(Debug, Error)]
#[error("user {user_id} not found")]
pub struct UserNotFound {
    pub user_id: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<User, UserNotFound>;
    async fn find_by_team(&self, team_id: &str) -> Vec<User>;
    async fn put(&self, user: User);
    /// Inserts or replaces the user with the same id.
    async fn update(&self, user: User);
    /// Removing an unknown user is a no-op.
    async fn remove_by_id(&self, user_id: &str);
}

pub type SharedUserStore = Arc<dyn UserStore>;

#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<User, UserNotFound> {
        self.users
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn find_by_team(&self, team_id: &str) -> Vec<User> {
        self.users
            .iter()
            .filter(|entry| entry.value().team_id == team_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn put(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    async fn update(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    async fn remove_by_id(&self, user_id: &str) {
        self.users.remove(user_id);
    }
}

/// Upserts the `user` object carried by `user_change` events.
pub struct UserChangedReceiver {
    users: SharedUserStore,
}

impl UserChangedReceiver {
    pub const EVENT_TYPE: &'static str = "user_change";

    pub fn new(users: SharedUserStore) -> Self {
        Self { users }
    }
}

#[async_trait]
impl EventReceiver for UserChangedReceiver {
    fn name(&self) -> &str {
        "user_changed"
    }

    fn supports_event(&self, event: &DomainEvent) -> bool {
        event.event_type == Self::EVENT_TYPE
    }

    async fn on_receive_event(
        &self,
        event: &DomainEvent,
        _headers: &HeaderMap,
        team: &Team,
    ) -> Result<()> {
        let raw = event
            .field("user")
            .cloned()
            .context("user_change event without user object")?;
        let mut user: User = serde_json::from_value(raw).context("malformed user object")?;
        if user.team_id.is_empty() {
            user.team_id = team.team_id.clone();
        }
        info!(user_id = %user.id, team_id = %user.team_id, "user changed");
        self.users.update(user).await;
        Ok(())
    }
}
