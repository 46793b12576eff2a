//! First-match route selection over a single route table.

use serde::Serialize;

use crate::evaluator::{evaluate_condition, EvalContext};
use crate::route::{Route, RouteTable, RouterReference, RuleRoute};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Rule,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSelection<'a> {
    pub route: &'a RuleRoute,
    pub matched_by: MatchedBy,
}

impl<'a> RouteSelection<'a> {
    pub fn rule(route: &'a RuleRoute) -> Self {
        Self {
            route,
            matched_by: MatchedBy::Rule,
        }
    }

    /// The table's fallback, selected whenever it is reached, whatever its
    /// own tree says.
    pub fn fallback(table: &'a RouteTable) -> Self {
        Self {
            route: table.fallback(),
            matched_by: MatchedBy::Fallback,
        }
    }
}

/// One stop of a first-match walk over the main routes of a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteStep<'a> {
    /// A rule route whose query holds.
    Matched(&'a RuleRoute),
    /// A router reference, to be followed before the walk continues.
    Delegate(&'a RouterReference),
}

/// Walks routes in stored order, yielding every router reference and every
/// rule route whose query holds. Non-matching rules are passed over.
/// Evaluation is lazy, so a caller that stops at the first
/// [`RouteStep::Matched`] never evaluates the routes behind it.
pub struct RouteSteps<'r, 'c> {
    routes: std::slice::Iter<'r, Route>,
    ctx: EvalContext<'c>,
}

pub fn route_steps<'r, 'c>(routes: &'r [Route], ctx: EvalContext<'c>) -> RouteSteps<'r, 'c> {
    RouteSteps {
        routes: routes.iter(),
        ctx,
    }
}

impl<'r, 'c> Iterator for RouteSteps<'r, 'c> {
    type Item = RouteStep<'r>;

    fn next(&mut self) -> Option<RouteStep<'r>> {
        for route in self.routes.by_ref() {
            match route {
                Route::Rule(rule) => {
                    if evaluate_condition(&rule.query, &self.ctx) {
                        return Some(RouteStep::Matched(rule));
                    }
                }
                Route::Router(reference) => return Some(RouteStep::Delegate(reference)),
            }
        }
        None
    }
}

/// Select the first rule route whose query matches, else the fallback.
///
/// Router references are skipped; delegation is the chain resolver's job.
pub fn select_route<'a>(table: &'a RouteTable, ctx: &EvalContext<'_>) -> RouteSelection<'a> {
    let matched = route_steps(table.main_routes(), *ctx).find_map(|step| match step {
        RouteStep::Matched(route) => Some(route),
        RouteStep::Delegate(_) => None,
    });
    match matched {
        Some(route) => {
            tracing::debug!(route_id = %route.id, "Route matched");
            RouteSelection::rule(route)
        }
        None => {
            tracing::debug!(route_id = %table.fallback().id, "No route matched, using fallback");
            RouteSelection::fallback(table)
        }
    }
}
