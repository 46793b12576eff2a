//! Engine configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutingError};

/// Reserved forwarding key carrying the matched host ids.
pub const DEFAULT_ROUTED_HOSTS_PARAM: &str = "cal.routedTeamMemberIds";

pub const DEFAULT_FALLBACK_MESSAGE: &str = "Thank you for your interest! We will be in touch soon.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Key under which matched host ids are forwarded.
    pub routed_hosts_param: String,
    /// URL parameters that steer routing itself and are never passed through.
    pub control_params: Vec<String>,
    /// Message of a fallback route created during table normalization.
    pub fallback_message: String,
    /// Compare text values case-sensitively.
    pub case_sensitive_text: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            routed_hosts_param: DEFAULT_ROUTED_HOSTS_PARAM.to_string(),
            control_params: vec!["form".into(), "slug".into(), "pages".into()],
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            case_sensitive_text: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading engine configuration");
        let content = std::fs::read_to_string(path)
            .map_err(|e| RoutingError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| RoutingError::Config(e.to_string()))
    }

    /// True if `name` must be stripped from pass-through URL parameters.
    pub fn is_control_param(&self, name: &str) -> bool {
        name == self.routed_hosts_param || self.control_params.iter().any(|p| p == name)
    }
}
