//! Routing Forms - Form Submission Decision Engine
//!
//! Routes a form submission to exactly one destination (an event to book,
//! an external URL, or a message) by evaluating an ordered route table of
//! condition trees against the submitted answers. Forms may delegate to
//! other forms through router references, and team-pooled events narrow
//! their hosts with a second condition tree over host attributes.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Response entries + Field catalog                            │
//! └──────────────────────────────────────────────────────────────┘
//!                               │  normalize_response
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Chain resolver  (route table, router references, cycles)    │
//! │      └─ first-match selection over condition trees           │
//! └──────────────────────────────────────────────────────────────┘
//!                               │  terminal rule route
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Host filter  (attribute tree over the pooled roster)        │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Parameter forwarder  →  RoutingDecision                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is synchronous and pure over caller-supplied snapshots.
//!
//! # Usage
//!
//! ```ignore
//! use routing_forms_core::{DecisionRequest, EngineConfig, Fixture, ForwardParams, RoutingEngine};
//!
//! let (forms, teams) = Fixture::from_file("forms.yaml")?.into_parts();
//! let engine = RoutingEngine::new(EngineConfig::from_file("engine.yaml")?, &forms, &teams);
//!
//! let form = forms.form("intake").unwrap();
//! let decision = engine.decide(DecisionRequest {
//!     form,
//!     entries: &entries,
//!     url_params: &ForwardParams::from_query("utm_source=ads"),
//! })?;
//! decision.ensure_eligible_hosts()?;
//! ```

pub mod catalog;
pub mod chain;
pub mod condition;
pub mod config;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod form;
pub mod forward;
pub mod hosts;
pub mod response;
pub mod route;
pub mod selection;
pub mod store;

// Re-export main types
pub use catalog::{
    Attribute, AttributeCatalog, AttributeType, Catalog, ChoiceOption, Field, FieldCatalog,
    FieldType,
};
pub use chain::{
    eligible_routers, validate_attribute_queries, validate_form, ChainResolver, DisabledReason,
    Resolution, RouterOption, ValidationReport,
};
pub use condition::{Combinator, Condition, Operator};
pub use config::EngineConfig;
pub use decision::{DecisionRequest, RoutingDecision, RoutingEngine};
pub use error::{Result, RoutingError};
pub use evaluator::{evaluate_condition, explain_condition, EvalContext, Evaluation};
pub use form::{Form, Owner};
pub use forward::{build_forward_parameters, substitute_variables, ForwardParams};
pub use hosts::{filter_hosts, Host, HostId, HostOutcome, TeamRoster};
pub use response::{normalize_response, FieldValue, NormalizedResponse, ResponseEntry};
pub use route::{Action, Route, RouteTable, RouterReference, RuleRoute};
pub use selection::{select_route, MatchedBy, RouteSelection};
pub use store::{Fixture, FormStore, InMemoryFormStore, InMemoryTeamDirectory, TeamDirectory};
