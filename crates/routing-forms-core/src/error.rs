use thiserror::Error;

/// Every outcome of the engine that is not a routing decision.
///
/// Configuration errors (self-reference, cycles, dangling references,
/// malformed tables) are fatal to the current evaluation. Stale rule
/// references never surface here; they are skipped during evaluation.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("cyclic routing: {}", .path.join(" -> "))]
    CyclicRouting { path: Vec<String> },

    #[error("form {form_id} references itself as a router")]
    SelfReference { form_id: String },

    #[error("form not found: {form_id}")]
    FormNotFound { form_id: String },

    #[error("no eligible host for event {event}")]
    NoEligibleHost { event: String },

    #[error("route table has no fallback route")]
    MissingFallback,

    #[error("route table has {0} fallback routes, expected exactly one")]
    MultipleFallbacks(usize),

    #[error("duplicate route id: {0}")]
    DuplicateRouteId(String),

    #[error("config: {0}")]
    Config(String),
}

impl RoutingError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::FormNotFound { .. } => 404,
            Self::CyclicRouting { .. } | Self::SelfReference { .. } => 409,
            Self::NoEligibleHost { .. }
            | Self::MissingFallback
            | Self::MultipleFallbacks(_)
            | Self::DuplicateRouteId(_) => 422,
            Self::Config(_) => 500,
        }
    }

    /// True for errors caused by how forms were authored or wired together,
    /// as opposed to the outcome of evaluating a particular response.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::NoEligibleHost { .. })
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;
