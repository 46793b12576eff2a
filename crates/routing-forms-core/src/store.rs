//! Collaborator seams: where forms and team rosters come from.
//!
//! The engine never fetches anything itself. Callers hand it a [`FormStore`]
//! for router references and a [`TeamDirectory`] for pooled events; both
//! return snapshots that stay immutable for the duration of a decision.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::AttributeCatalog;
use crate::error::{Result, RoutingError};
use crate::form::Form;
use crate::hosts::TeamRoster;
use crate::route::RouteTable;

/// Read access to form definitions.
pub trait FormStore {
    fn form(&self, form_id: &str) -> Option<&Form>;

    /// Every form, ordered by id.
    fn forms(&self) -> Vec<&Form>;

    fn route_table(&self, form_id: &str) -> Result<&RouteTable> {
        self.form(form_id)
            .map(|f| &f.routes)
            .ok_or_else(|| RoutingError::FormNotFound {
                form_id: form_id.to_string(),
            })
    }
}

/// Read access to team membership.
pub trait TeamDirectory {
    /// Roster behind a team-pooled event destination. `None` means the
    /// destination is not pooled and host filtering does not apply.
    fn pooled_roster(&self, destination: &str) -> Option<&TeamRoster>;

    fn team_attributes(&self, team_id: i64) -> Option<&AttributeCatalog>;
}

// ── In-memory implementations ─────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryFormStore {
    forms: BTreeMap<String, Form>,
}

impl InMemoryFormStore {
    pub fn new(forms: impl IntoIterator<Item = Form>) -> Self {
        Self {
            forms: forms.into_iter().map(|f| (f.id.clone(), f)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl FormStore for InMemoryFormStore {
    fn form(&self, form_id: &str) -> Option<&Form> {
        self.forms.get(form_id)
    }

    fn forms(&self) -> Vec<&Form> {
        self.forms.values().collect()
    }
}

/// A team with its attribute catalog, members, and pooled event slugs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFixture {
    pub id: i64,
    #[serde(default)]
    pub pooled_events: Vec<String>,
    #[serde(flatten)]
    pub roster: TeamRoster,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTeamDirectory {
    teams: Vec<TeamFixture>,
    by_event: HashMap<String, usize>,
}

impl InMemoryTeamDirectory {
    pub fn new(teams: Vec<TeamFixture>) -> Self {
        let mut by_event = HashMap::new();
        for (i, team) in teams.iter().enumerate() {
            for event in &team.pooled_events {
                if by_event.insert(event.clone(), i).is_some() {
                    tracing::warn!(event = %event, team_id = team.id, "Event pooled by more than one team, last wins");
                }
            }
        }
        Self { teams, by_event }
    }
}

impl TeamDirectory for InMemoryTeamDirectory {
    fn pooled_roster(&self, destination: &str) -> Option<&TeamRoster> {
        self.by_event.get(destination).map(|&i| &self.teams[i].roster)
    }

    fn team_attributes(&self, team_id: i64) -> Option<&AttributeCatalog> {
        self.teams
            .iter()
            .find(|t| t.id == team_id)
            .map(|t| &t.roster.attributes)
    }
}

// ── Fixture files ─────────────────────────────────────────────

/// Forms and teams loaded from one YAML or JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub forms: Vec<Form>,
    #[serde(default)]
    pub teams: Vec<TeamFixture>,
}

impl Fixture {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RoutingError::Config(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| RoutingError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse a fixture. JSON input is accepted as YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| RoutingError::Config(e.to_string()))
    }

    pub fn into_parts(self) -> (InMemoryFormStore, InMemoryTeamDirectory) {
        (
            InMemoryFormStore::new(self.forms),
            InMemoryTeamDirectory::new(self.teams),
        )
    }
}
