//! Routing decisions.
//!
//! [`RoutingEngine::decide`] runs the whole pipeline for one submission:
//! normalize the response, resolve the route through router references,
//! filter hosts for pooled events, and build the forwarded parameters.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::chain::ChainResolver;
use crate::config::EngineConfig;
use crate::error::{Result, RoutingError};
use crate::form::Form;
use crate::forward::{build_forward_parameters, substitute_variables, ForwardParams};
use crate::hosts::{filter_hosts, HostId, HostOutcome};
use crate::response::{normalize_response, ResponseEntry};
use crate::route::Action;
use crate::selection::MatchedBy;
use crate::store::{FormStore, TeamDirectory};

/// Everything the booking or redirect step needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub form_id: String,
    pub route_id: String,
    /// Form whose table held the selected route.
    pub routed_by: String,
    pub matched_by: MatchedBy,
    /// Selected action, with slug variables substituted.
    pub action: Action,
    /// `None` when attribute routing did not apply.
    pub matched_host_ids: Option<BTreeSet<HostId>>,
    pub forward_params: ForwardParams,
}

impl RoutingDecision {
    pub fn host_outcome(&self) -> HostOutcome<'_> {
        HostOutcome::from_matches(self.matched_host_ids.as_ref())
    }

    /// Matched hosts, failing with [`RoutingError::NoEligibleHost`] when
    /// attribute routing ran and nobody qualified.
    pub fn ensure_eligible_hosts(&self) -> Result<Option<&BTreeSet<HostId>>> {
        match self.host_outcome() {
            HostOutcome::NotApplicable => Ok(None),
            HostOutcome::Eligible(ids) => Ok(Some(ids)),
            HostOutcome::NoEligibleHost => Err(RoutingError::NoEligibleHost {
                event: self
                    .action
                    .event_destination()
                    .unwrap_or_default()
                    .to_string(),
            }),
        }
    }

    /// Redirect target with the forwarded parameters appended, for external
    /// redirects.
    pub fn redirect_url(&self) -> Option<String> {
        let Action::ExternalRedirect { url } = &self.action else {
            return None;
        };
        if self.forward_params.is_empty() {
            return Some(url.clone());
        }
        let sep = if url.contains('?') { '&' } else { '?' };
        Some(format!("{url}{sep}{}", self.forward_params.to_query_string()))
    }
}

/// One submission to decide.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub form: &'a Form,
    pub entries: &'a [ResponseEntry],
    pub url_params: &'a ForwardParams,
}

pub struct RoutingEngine<'a> {
    config: EngineConfig,
    forms: &'a dyn FormStore,
    teams: &'a dyn TeamDirectory,
}

impl<'a> RoutingEngine<'a> {
    pub fn new(config: EngineConfig, forms: &'a dyn FormStore, teams: &'a dyn TeamDirectory) -> Self {
        Self {
            config,
            forms,
            teams,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn decide(&self, request: DecisionRequest<'_>) -> Result<RoutingDecision> {
        let form = request.form;
        let resolver = ChainResolver::new(self.forms).case_sensitive(self.config.case_sensitive_text);

        let chain = resolver.check_references(form)?;
        let fields = chain.fields();
        let response = normalize_response(request.entries, &fields);
        let resolution = resolver.resolve_checked(&chain, &response)?;
        let route = resolution.route;

        let action = match &route.action {
            Action::EventRedirect { destination } => Action::EventRedirect {
                destination: substitute_variables(destination, &response, &fields),
            },
            other => other.clone(),
        };

        let matched_host_ids = match (action.event_destination(), &route.attribute_query) {
            (Some(destination), Some(tree)) => self.teams.pooled_roster(destination).map(|roster| {
                filter_hosts(
                    Some(tree),
                    &roster.attributes,
                    &roster.hosts,
                    self.config.case_sensitive_text,
                )
            }),
            _ => None,
        };

        let forward_params = build_forward_parameters(
            &response,
            &fields,
            request.url_params,
            matched_host_ids.as_ref(),
            &self.config,
        );

        tracing::info!(
            form_id = %form.id,
            route_id = %route.id,
            routed_by = %resolution.form_id,
            matched_by = ?resolution.matched_by,
            action = action.kind_str(),
            hosts = ?matched_host_ids.as_ref().map(BTreeSet::len),
            "Routing decision"
        );

        Ok(RoutingDecision {
            form_id: form.id.clone(),
            route_id: route.id.clone(),
            routed_by: resolution.form_id.to_string(),
            matched_by: resolution.matched_by,
            action,
            matched_host_ids,
            forward_params,
        })
    }
}
