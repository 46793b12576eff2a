//! Routing form definitions.

use serde::{Deserialize, Serialize};

use crate::catalog::FieldCatalog;
use crate::route::RouteTable;

/// Who owns a form: a user, optionally on behalf of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
}

impl Owner {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            team_id: None,
        }
    }

    pub fn team(user_id: i64, team_id: i64) -> Self {
        Self {
            user_id,
            team_id: Some(team_id),
        }
    }

    /// Two entities are siblings when they belong to the same team, or when
    /// neither belongs to a team and they share the owning user.
    pub fn is_sibling_of(&self, other: &Owner) -> bool {
        match (self.team_id, other.team_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.user_id == other.user_id,
            _ => false,
        }
    }
}

/// One immutable form version: its fields and its route table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner: Owner,
    #[serde(default)]
    pub fields: FieldCatalog,
    pub routes: RouteTable,
}

impl Form {
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner: Owner, routes: RouteTable) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            owner,
            fields: FieldCatalog::default(),
            routes,
        }
    }

    pub fn with_fields(mut self, fields: FieldCatalog) -> Self {
        self.fields = fields;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_siblings_same_team() {
        assert!(Owner::team(1, 10).is_sibling_of(&Owner::team(2, 10)));
        assert!(!Owner::team(1, 10).is_sibling_of(&Owner::team(1, 11)));
    }

    #[test]
    fn test_siblings_personal() {
        assert!(Owner::user(1).is_sibling_of(&Owner::user(1)));
        assert!(!Owner::user(1).is_sibling_of(&Owner::user(2)));
    }

    #[test]
    fn test_team_and_personal_are_not_siblings() {
        assert!(!Owner::team(1, 10).is_sibling_of(&Owner::user(1)));
        assert!(!Owner::user(1).is_sibling_of(&Owner::team(1, 10)));
    }
}
