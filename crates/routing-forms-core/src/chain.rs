//! Router-reference chains between forms.
//!
//! Forms are nodes and router references are directed edges. Resolution
//! walks the graph depth-first with the set of forms on the current
//! delegation path; a form reappearing on that path is a cycle, reported on
//! its first repetition whatever its length.

use std::collections::HashSet;

use serde::Serialize;

use crate::catalog::{AttributeCatalog, FieldCatalog};
use crate::error::{Result, RoutingError};
use crate::evaluator::{validate_operator_compatibility, validate_references, EvalContext};
use crate::form::Form;
use crate::response::NormalizedResponse;
use crate::route::RuleRoute;
use crate::selection::{route_steps, MatchedBy, RouteSelection, RouteStep};
use crate::store::FormStore;

/// Terminal rule route reached by following router references.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    pub route: &'a RuleRoute,
    pub matched_by: MatchedBy,
    /// Form whose table holds `route`.
    pub form_id: &'a str,
    /// Forms delegated through, root first, ending at `form_id`.
    pub via: Vec<&'a str>,
}

/// Forms reachable from a root through router references, checked for
/// self references, cycles and dangling references.
#[derive(Debug, Clone)]
pub struct ReachableForms<'a> {
    root: &'a Form,
    /// Root first, then depth-first in reference order; each form once.
    forms: Vec<&'a Form>,
}

impl<'a> ReachableForms<'a> {
    pub fn root(&self) -> &'a Form {
        self.root
    }

    pub fn forms(&self) -> &[&'a Form] {
        &self.forms
    }

    /// Fields of the root followed by those of every reachable form.
    pub fn fields(&self) -> FieldCatalog {
        self.forms
            .iter()
            .skip(1)
            .fold(self.root.fields.clone(), |fields, form| {
                fields.merged_with(&form.fields)
            })
    }
}

pub struct ChainResolver<'a> {
    store: &'a dyn FormStore,
    case_sensitive: bool,
}

impl<'a> ChainResolver<'a> {
    pub fn new(store: &'a dyn FormStore) -> Self {
        Self {
            store,
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Resolve `form` to a terminal rule route.
    ///
    /// Router references are followed in place: the referenced form's
    /// non-fallback routes are tried at the reference's position, and when
    /// none match the walk continues in the referencing table. Only the root
    /// fallback is ever selected as a fallback. Every configuration error
    /// reachable from `form` fails the resolution, whichever route the
    /// response would have matched.
    pub fn resolve_destination(
        &self,
        form: &'a Form,
        response: &NormalizedResponse,
    ) -> Result<Resolution<'a>> {
        let chain = self.check_references(form)?;
        self.resolve_checked(&chain, response)
    }

    /// [`ChainResolver::resolve_destination`] for a chain already checked
    /// by [`ChainResolver::check_references`].
    pub fn resolve_checked(
        &self,
        chain: &ReachableForms<'a>,
        response: &NormalizedResponse,
    ) -> Result<Resolution<'a>> {
        let form = chain.root();
        let mut path = Vec::new();
        let (selection, form_id, via) = match self.walk(form, response, &mut path)? {
            Some((route, owner)) => (RouteSelection::rule(route), owner, path),
            None => (
                RouteSelection::fallback(&form.routes),
                form.id.as_str(),
                vec![form.id.as_str()],
            ),
        };
        tracing::debug!(
            form_id = %form.id,
            route_id = %selection.route.id,
            matched_by = ?selection.matched_by,
            via = %via.join(" -> "),
            "Resolved route"
        );
        Ok(Resolution {
            route: selection.route,
            matched_by: selection.matched_by,
            form_id,
            via,
        })
    }

    /// On success `path` holds the delegation path to the matching form.
    fn walk(
        &self,
        form: &'a Form,
        response: &NormalizedResponse,
        path: &mut Vec<&'a str>,
    ) -> Result<Option<(&'a RuleRoute, &'a str)>> {
        path.push(&form.id);
        let ctx = EvalContext::new(&form.fields, response.values()).case_sensitive(self.case_sensitive);

        for step in route_steps(form.routes.main_routes(), ctx) {
            match step {
                RouteStep::Matched(rule) => return Ok(Some((rule, form.id.as_str()))),
                RouteStep::Delegate(reference) => {
                    let target = self.follow(form, &reference.id, path)?;
                    if let Some(hit) = self.walk(target, response, path)? {
                        return Ok(Some(hit));
                    }
                }
            }
        }

        path.pop();
        Ok(None)
    }

    /// Look up the target of a reference from `form`, rejecting self
    /// references, forms already on `path`, and missing forms.
    fn follow(&self, form: &Form, target_id: &str, path: &[&str]) -> Result<&'a Form> {
        if target_id == form.id {
            tracing::warn!(form_id = %form.id, "Form references itself");
            return Err(RoutingError::SelfReference {
                form_id: form.id.clone(),
            });
        }
        if let Some(start) = path.iter().position(|id| *id == target_id) {
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(target_id.to_string());
            tracing::warn!(cycle = %cycle.join(" -> "), "Cyclic router references");
            return Err(RoutingError::CyclicRouting { path: cycle });
        }
        self.store.form(target_id).ok_or_else(|| {
            tracing::warn!(form_id = %form.id, target = %target_id, "Router reference to missing form");
            RoutingError::FormNotFound {
                form_id: target_id.to_string(),
            }
        })
    }

    /// Check every router reference reachable from `form` and return the
    /// forms reached.
    pub fn check_references(&self, form: &'a Form) -> Result<ReachableForms<'a>> {
        let mut path = Vec::new();
        let mut exhausted = HashSet::new();
        let mut forms = Vec::new();
        self.visit(form, &mut path, &mut exhausted, &mut forms)?;
        Ok(ReachableForms { root: form, forms })
    }

    fn visit(
        &self,
        form: &'a Form,
        path: &mut Vec<&'a str>,
        exhausted: &mut HashSet<&'a str>,
        forms: &mut Vec<&'a Form>,
    ) -> Result<()> {
        if exhausted.contains(form.id.as_str()) {
            return Ok(());
        }
        forms.push(form);
        path.push(&form.id);
        for reference in form.routes.router_references() {
            let target = self.follow(form, &reference.id, path)?;
            self.visit(target, path, exhausted, forms)?;
        }
        path.pop();
        exhausted.insert(&form.id);
        Ok(())
    }

    /// True if `from` can reach `target` by following router references.
    pub fn can_reach(&self, from: &Form, target: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![from.id.as_str()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(form) = (if id == from.id { Some(from) } else { self.store.form(id) }) else {
                continue;
            };
            for reference in form.routes.router_references() {
                if reference.id == target {
                    return true;
                }
                stack.push(&reference.id);
            }
        }
        false
    }
}

// ============================================================================
// Authoring-time validation
// ============================================================================

/// Non-fatal findings of [`validate_form`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub form_id: String,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Reject self references, dangling references and cycles reachable from
/// `form`; collect warnings for stale rules and operator/type mismatches in
/// its route queries.
pub fn validate_form(form: &Form, store: &dyn FormStore) -> Result<ValidationReport> {
    ChainResolver::new(store).check_references(form)?;

    let mut warnings = Vec::new();
    for route in form.routes.rule_routes() {
        for w in validate_references(&route.query, &form.fields)
            .into_iter()
            .map(|id| format!("unknown field '{id}'"))
            .chain(validate_operator_compatibility(&route.query, &form.fields))
        {
            warnings.push(format!("route {}: {w}", route.id));
        }
    }
    for w in &warnings {
        tracing::warn!(form_id = %form.id, "{w}");
    }
    Ok(ValidationReport {
        form_id: form.id.clone(),
        warnings,
    })
}

/// Warnings for attribute queries of `form` checked against a team's attributes.
pub fn validate_attribute_queries(form: &Form, attributes: &AttributeCatalog) -> Vec<String> {
    let mut warnings = Vec::new();
    for route in form.routes.rule_routes() {
        let Some(tree) = &route.attribute_query else {
            continue;
        };
        for w in validate_references(tree, attributes)
            .into_iter()
            .map(|id| format!("unknown attribute '{id}'"))
            .chain(validate_operator_compatibility(tree, attributes))
        {
            warnings.push(format!("route {} attributes: {w}", route.id));
        }
    }
    warnings
}

// ============================================================================
// Eligible routers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    AlreadyReferenced,
    WouldCycle,
}

/// A form that could be added as a router reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterOption {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<DisabledReason>,
}

impl RouterOption {
    pub fn is_disabled(&self) -> bool {
        self.disabled.is_some()
    }
}

/// Sibling forms `form` may reference, ordered by id.
pub fn eligible_routers(form: &Form, store: &dyn FormStore) -> Vec<RouterOption> {
    let resolver = ChainResolver::new(store);
    let referenced: HashSet<&str> = form
        .routes
        .router_references()
        .map(|r| r.id.as_str())
        .collect();

    store
        .forms()
        .into_iter()
        .filter(|candidate| candidate.id != form.id && candidate.owner.is_sibling_of(&form.owner))
        .map(|candidate| {
            let disabled = if referenced.contains(candidate.id.as_str()) {
                Some(DisabledReason::AlreadyReferenced)
            } else if resolver.can_reach(candidate, &form.id) {
                Some(DisabledReason::WouldCycle)
            } else {
                None
            };
            RouterOption {
                id: candidate.id.clone(),
                name: candidate.name.clone(),
                description: candidate.description.clone(),
                disabled,
            }
        })
        .collect()
}
