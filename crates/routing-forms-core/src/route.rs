//! Route tables.
//!
//! A route table is an ordered list of rule routes and router references,
//! ending in exactly one fallback rule route. Tables are immutable: every
//! edit returns a new table.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::condition::Condition;
use crate::config::EngineConfig;
use crate::error::{Result, RoutingError};

// ── Actions ───────────────────────────────────────────────────

/// Where a matched route sends the respondent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Book an event, by `owner/event` slug or id. May contain `{identifier}` variables.
    EventRedirect { destination: String },
    ExternalRedirect { url: String },
    CustomMessage { text: String },
}

impl Action {
    pub fn event_destination(&self) -> Option<&str> {
        match self {
            Self::EventRedirect { destination } => Some(destination.as_str()),
            Self::ExternalRedirect { .. } | Self::CustomMessage { .. } => None,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::EventRedirect { .. } => "event_redirect",
            Self::ExternalRedirect { .. } => "external_redirect",
            Self::CustomMessage { .. } => "custom_message",
        }
    }
}

// ── Routes ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRoute {
    pub id: String,
    /// Tree over form fields. Defaults to match-all.
    #[serde(default)]
    pub query: Condition,
    /// Tree over host attributes, used only for team-pooled events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_query: Option<Condition>,
    pub action: Action,
    #[serde(default)]
    pub is_fallback: bool,
}

impl RuleRoute {
    pub fn new(id: impl Into<String>, query: Condition, action: Action) -> Self {
        Self {
            id: id.into(),
            query,
            attribute_query: None,
            action,
            is_fallback: false,
        }
    }

    pub fn fallback(id: impl Into<String>, action: Action) -> Self {
        Self {
            is_fallback: true,
            ..Self::new(id, Condition::match_all(), action)
        }
    }

    pub fn with_attribute_query(mut self, tree: Condition) -> Self {
        self.attribute_query = Some(tree);
        self
    }

    /// Fresh route with match-all trees and an unset event destination.
    pub fn empty() -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            Condition::match_all(),
            Action::EventRedirect {
                destination: String::new(),
            },
        )
        .with_attribute_query(Condition::match_all())
    }
}

/// Delegates routing to another form's route table. `id` is that form's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterReference {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Route {
    Rule(RuleRoute),
    Router(RouterReference),
}

impl Route {
    pub fn id(&self) -> &str {
        match self {
            Self::Rule(r) => &r.id,
            Self::Router(r) => &r.id,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Rule(r) if r.is_fallback)
    }

    pub fn as_rule(&self) -> Option<&RuleRoute> {
        match self {
            Self::Rule(r) => Some(r),
            Self::Router(_) => None,
        }
    }
}

/// Fallback route created when a table has none.
pub fn create_fallback_route(config: &EngineConfig) -> RuleRoute {
    RuleRoute::fallback(
        Uuid::new_v4().to_string(),
        Action::CustomMessage {
            text: config.fallback_message.clone(),
        },
    )
}

// ── Route table ───────────────────────────────────────────────

/// Ordered routes followed by the single fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Route>", into = "Vec<Route>")]
pub struct RouteTable {
    main: Vec<Route>,
    fallback: RuleRoute,
}

impl TryFrom<Vec<Route>> for RouteTable {
    type Error = RoutingError;

    fn try_from(routes: Vec<Route>) -> Result<Self> {
        Self::new(routes)
    }
}

impl From<RouteTable> for Vec<Route> {
    fn from(table: RouteTable) -> Self {
        let mut routes = table.main;
        routes.push(Route::Rule(table.fallback));
        routes
    }
}

impl RouteTable {
    /// Strict constructor.
    ///
    /// Rejects duplicate ids and anything but exactly one fallback. The
    /// fallback is moved to the end; the relative order of the other
    /// routes is kept. Bare rule roots are wrapped into `AND` groups.
    pub fn new(routes: Vec<Route>) -> Result<Self> {
        let mut seen = HashSet::new();
        for route in &routes {
            if !seen.insert(route.id()) {
                return Err(RoutingError::DuplicateRouteId(route.id().to_string()));
            }
        }

        let (mut fallbacks, main): (Vec<Route>, Vec<Route>) =
            routes.into_iter().partition(Route::is_fallback);
        if fallbacks.len() > 1 {
            return Err(RoutingError::MultipleFallbacks(fallbacks.len()));
        }
        let Some(Route::Rule(fallback)) = fallbacks.pop() else {
            return Err(RoutingError::MissingFallback);
        };

        let main = main
            .into_iter()
            .map(|route| match route {
                Route::Rule(r) => Route::Rule(with_rooted_trees(r)),
                router @ Route::Router(_) => router,
            })
            .collect();

        Ok(Self {
            main,
            fallback: with_rooted_trees(fallback),
        })
    }

    /// Repairing constructor for authored lists.
    ///
    /// Appends a fallback when none exists and keeps only the first of
    /// several fallbacks (the others become ordinary routes), then applies
    /// [`RouteTable::new`].
    pub fn normalized(routes: Vec<Route>, config: &EngineConfig) -> Result<Self> {
        let mut routes = routes;
        let mut found = false;
        for route in routes.iter_mut() {
            if let Route::Rule(r) = route {
                if r.is_fallback {
                    if found {
                        tracing::warn!(route_id = %r.id, "Demoting extra fallback route");
                        r.is_fallback = false;
                    }
                    found = true;
                }
            }
        }
        if !found {
            routes.push(Route::Rule(create_fallback_route(config)));
        }
        Self::new(routes)
    }

    pub fn fallback(&self) -> &RuleRoute {
        &self.fallback
    }

    /// Everything except the fallback, in stored order.
    pub fn main_routes(&self) -> &[Route] {
        &self.main
    }

    /// Number of routes including the fallback.
    pub fn route_count(&self) -> usize {
        self.main.len() + 1
    }

    /// Route ids in evaluation order, fallback last.
    pub fn ids(&self) -> Vec<&str> {
        self.main
            .iter()
            .map(Route::id)
            .chain(std::iter::once(self.fallback.id.as_str()))
            .collect()
    }

    pub fn router_references(&self) -> impl Iterator<Item = &RouterReference> {
        self.main.iter().filter_map(|r| match r {
            Route::Router(router) => Some(router),
            Route::Rule(_) => None,
        })
    }

    /// Every rule route, fallback included.
    pub fn rule_routes(&self) -> impl Iterator<Item = &RuleRoute> {
        self.main
            .iter()
            .filter_map(Route::as_rule)
            .chain(std::iter::once(&self.fallback))
    }

    /// New table with `route` added just before the fallback.
    pub fn with_route(&self, route: Route) -> Result<Self> {
        let mut routes = self.main.clone();
        routes.push(route);
        routes.push(Route::Rule(self.fallback.clone()));
        Self::new(routes)
    }

    /// New table without the route `id`. The fallback cannot be removed.
    pub fn without_route(&self, id: &str) -> Result<Self> {
        if self.fallback.id == id {
            return Err(RoutingError::MissingFallback);
        }
        Ok(Self {
            main: self.main.iter().filter(|r| r.id() != id).cloned().collect(),
            fallback: self.fallback.clone(),
        })
    }

    /// New table with main routes `a` and `b` swapped. Returns `None` if
    /// either index is out of range; the fallback never moves.
    pub fn with_swapped(&self, a: usize, b: usize) -> Option<Self> {
        if a >= self.main.len() || b >= self.main.len() {
            return None;
        }
        let mut main = self.main.clone();
        main.swap(a, b);
        Some(Self {
            main,
            fallback: self.fallback.clone(),
        })
    }
}

fn with_rooted_trees(mut route: RuleRoute) -> RuleRoute {
    route.query = route.query.into_root();
    route.attribute_query = route.attribute_query.map(Condition::into_root);
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use serde_json::json;

    fn redirect(url: &str) -> Action {
        Action::ExternalRedirect { url: url.into() }
    }

    fn rule(id: &str) -> Route {
        Route::Rule(RuleRoute::new(id, Condition::match_all(), redirect("https://a.test")))
    }

    fn fallback(id: &str) -> Route {
        Route::Rule(RuleRoute::fallback(
            id,
            Action::CustomMessage { text: "bye".into() },
        ))
    }

    fn router(id: &str) -> Route {
        Route::Router(RouterReference {
            id: id.into(),
            name: format!("Form {id}"),
            description: None,
        })
    }

    #[test]
    fn test_new_moves_fallback_last() {
        let table = RouteTable::new(vec![fallback("fb"), rule("r1"), router("form-b")]).unwrap();
        assert_eq!(table.ids(), vec!["r1", "form-b", "fb"]);
        assert_eq!(table.fallback().id, "fb");
        assert_eq!(table.main_routes().len(), 2);
    }

    #[test]
    fn test_new_rejects_missing_fallback() {
        let err = RouteTable::new(vec![rule("r1")]).unwrap_err();
        assert!(matches!(err, RoutingError::MissingFallback));
    }

    #[test]
    fn test_new_rejects_multiple_fallbacks() {
        let err = RouteTable::new(vec![fallback("a"), fallback("b")]).unwrap_err();
        assert!(matches!(err, RoutingError::MultipleFallbacks(2)));
    }

    #[test]
    fn test_new_rejects_duplicate_ids() {
        let err = RouteTable::new(vec![rule("r1"), rule("r1"), fallback("fb")]).unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateRouteId(id) if id == "r1"));
    }

    #[test]
    fn test_new_wraps_rule_roots() {
        let bare = Condition::unary("notes", Operator::IsEmpty);
        let table = RouteTable::new(vec![
            Route::Rule(RuleRoute::new("r1", bare.clone(), redirect("https://a.test"))),
            fallback("fb"),
        ])
        .unwrap();
        let r1 = table.main_routes()[0].as_rule().unwrap();
        assert_eq!(r1.query, Condition::all(vec![bare]));
    }

    #[test]
    fn test_normalized_appends_fallback() {
        let cfg = EngineConfig::default();
        let table = RouteTable::normalized(vec![rule("r1")], &cfg).unwrap();
        assert_eq!(table.route_count(), 2);
        assert_eq!(
            table.fallback().action,
            Action::CustomMessage {
                text: cfg.fallback_message.clone()
            }
        );
        assert!(!table.fallback().query.has_rules());
    }

    #[test]
    fn test_normalized_keeps_first_fallback() {
        let cfg = EngineConfig::default();
        let table =
            RouteTable::normalized(vec![fallback("fb1"), rule("r1"), fallback("fb2")], &cfg)
                .unwrap();
        assert_eq!(table.fallback().id, "fb1");
        assert_eq!(table.ids(), vec!["r1", "fb2", "fb1"]);
    }

    #[test]
    fn test_edits_return_new_tables() {
        let table = RouteTable::new(vec![rule("r1"), fallback("fb")]).unwrap();
        let grown = table.with_route(rule("r2")).unwrap();
        assert_eq!(table.route_count(), 2);
        assert_eq!(grown.route_count(), 3);
        assert_eq!(grown.fallback().id, "fb");

        let swapped = grown.with_swapped(0, 1).unwrap();
        assert_eq!(swapped.ids(), vec!["r2", "r1", "fb"]);
        assert!(grown.with_swapped(0, 2).is_none());

        let shrunk = swapped.without_route("r1").unwrap();
        assert_eq!(shrunk.ids(), vec!["r2", "fb"]);
        assert!(shrunk.without_route("fb").is_err());
    }

    #[test]
    fn test_serde_round_trip_shape() {
        let table: RouteTable = serde_json::from_value(json!([
            {"type": "rule", "id": "r1",
             "query": {"type": "group", "combinator": "AND", "children": [
                 {"type": "rule", "field": "budget", "operator": "greater", "value": 1000}
             ]},
             "action": {"kind": "external_redirect", "url": "https://sales.example.com"}},
            {"type": "router", "id": "form-b", "name": "Partner intake"},
            {"type": "rule", "id": "fb", "is_fallback": true,
             "action": {"kind": "event_redirect", "destination": "team/general"}}
        ]))
        .unwrap();
        assert_eq!(table.router_references().count(), 1);
        assert_eq!(
            table.fallback().action.event_destination(),
            Some("team/general")
        );

        let rejected: std::result::Result<RouteTable, _> = serde_json::from_value(json!([
            {"type": "rule", "id": "r1", "action": {"kind": "custom_message", "text": "x"}}
        ]));
        assert!(rejected.is_err());
    }

    #[test]
    fn test_empty_route_is_match_all() {
        let r = RuleRoute::empty();
        assert!(!r.query.has_rules());
        assert_eq!(r.attribute_query, Some(Condition::match_all()));
        assert_eq!(r.action.kind_str(), "event_redirect");
    }
}
