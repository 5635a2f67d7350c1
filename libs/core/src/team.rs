//! Workspace (team) directory consulted for every domain event.

use std::{path::Path, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

/// A Slack workspace the broker delivers events for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    /// Installation data (bot ids, tokens, webhooks) the broker never inspects.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Team {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            team_name: None,
            attributes: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.team_name = Some(name.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("team {team_id} not found")]
    NotFound { team_id: String },
    #[error("team directory unavailable: {0}")]
    Unavailable(anyhow::Error),
}

/// Lookup of delivery context by team id.
///
/// Only [`find_by_id`](TeamDirectory::find_by_id) is used during dispatch;
/// `put` and `remove_by_id` serve installation and uninstallation flows.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn find_by_id(&self, team_id: &str) -> Result<Team, TeamError>;
    async fn put(&self, team: Team) -> Result<(), TeamError>;
    /// Removing an unknown team is a no-op.
    async fn remove_by_id(&self, team_id: &str) -> Result<(), TeamError>;
}

pub type SharedTeamDirectory = Arc<dyn TeamDirectory>;

#[derive(Default)]
pub struct InMemoryTeamDirectory {
    teams: DashMap<String, Team>,
}

impl InMemoryTeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_teams(teams: impl IntoIterator<Item = Team>) -> Self {
        let directory = Self::new();
        for team in teams {
            directory.teams.insert(team.team_id.clone(), team);
        }
        directory
    }

    /// Seeds a directory from a JSON array of teams.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read teams file {}", path.display()))?;
        let teams: Vec<Team> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse teams file {}", path.display()))?;
        info!(count = teams.len(), path = %path.display(), "loaded teams");
        Ok(Self::with_teams(teams))
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[async_trait]
impl TeamDirectory for InMemoryTeamDirectory {
    async fn find_by_id(&self, team_id: &str) -> Result<Team, TeamError> {
        self.teams
            .get(team_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TeamError::NotFound {
                team_id: team_id.to_string(),
            })
    }

    async fn put(&self, team: Team) -> Result<(), TeamError> {
        self.teams.insert(team.team_id.clone(), team);
        Ok(())
    }

    async fn remove_by_id(&self, team_id: &str) -> Result<(), TeamError> {
        self.teams.remove(team_id);
        Ok(())
    }
}
