//! Decision point settings.
//!
//! Settings files use the same envelope as the rest of the configuration
//! directory:
//!
//! ```yaml
//! id: authz
//! name: Authorization
//! provider: authz
//! version: 1.0.0
//! values:
//!   max_depth: 16
//!   log_decisions: true
//! ```

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SETTINGS_ID: &str = "authz";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzSettings {
    /// Deepest allowed nesting of policy sets, policies and rules, root included.
    pub max_depth: usize,
    /// Log every final decision at `info` instead of `debug`.
    pub log_decisions: bool,
}

impl Default for AuthzSettings {
    fn default() -> Self {
        Self {
            max_depth: 32,
            log_decisions: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    id: String,
    #[serde(default)]
    values: AuthzSettings,
}

impl AuthzSettings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: SettingsFile =
            serde_yaml::from_str(content).map_err(|e| AuthzError::Settings(e.to_string()))?;
        if file.id != SETTINGS_ID {
            return Err(AuthzError::Settings(format!(
                "expected configuration id '{}', found '{}'",
                SETTINGS_ID, file.id
            )));
        }
        file.values.validate()?;
        Ok(file.values)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthzError::Settings(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(AuthzError::Settings(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
