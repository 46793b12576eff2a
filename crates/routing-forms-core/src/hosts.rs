//! Attribute-based host filtering for team-pooled events.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::AttributeCatalog;
use crate::condition::Condition;
use crate::evaluator::{evaluate_condition, EvalContext};
use crate::response::FieldValue;

pub type HostId = i64;

/// A bookable team member and their attribute values, keyed by attribute id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    #[serde(default)]
    pub attributes: BTreeMap<String, FieldValue>,
}

impl Host {
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, attribute_id: impl Into<String>, value: FieldValue) -> Self {
        self.attributes.insert(attribute_id.into(), value);
        self
    }
}

/// Candidate hosts of a pooled event, with the team's attribute catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRoster {
    #[serde(default)]
    pub attributes: AttributeCatalog,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// Ids of the hosts whose attributes satisfy `tree`.
///
/// An absent tree matches every host. The result may be empty; callers must
/// treat that as "no eligible host", never as "use the full roster".
pub fn filter_hosts(
    tree: Option<&Condition>,
    catalog: &AttributeCatalog,
    hosts: &[Host],
    case_sensitive: bool,
) -> BTreeSet<HostId> {
    let Some(tree) = tree else {
        return hosts.iter().map(|h| h.id).collect();
    };
    let matched: BTreeSet<HostId> = hosts
        .iter()
        .filter(|host| {
            let ctx = EvalContext::new(catalog, &host.attributes).case_sensitive(case_sensitive);
            evaluate_condition(tree, &ctx)
        })
        .map(|host| host.id)
        .collect();
    tracing::debug!(
        candidates = hosts.len(),
        matched = matched.len(),
        "Filtered hosts by attributes"
    );
    matched
}

/// What the booking collaborator must do about hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOutcome<'a> {
    /// The destination is not team-pooled; no filtering happened.
    NotApplicable,
    Eligible(&'a BTreeSet<HostId>),
    /// Attribute routing ran and nobody qualified.
    NoEligibleHost,
}

impl<'a> HostOutcome<'a> {
    pub fn from_matches(matches: Option<&'a BTreeSet<HostId>>) -> Self {
        match matches {
            None => Self::NotApplicable,
            Some(ids) if ids.is_empty() => Self::NoEligibleHost,
            Some(ids) => Self::Eligible(ids),
        }
    }
}
