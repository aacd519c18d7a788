use anyhow::{Context, Result};
use authz::{AuthzSettings, CombiningAlgorithm, EncodedPolicySet, RuleSetDefinition};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Top level of a `--rule-sets` input file.
#[derive(Debug, Deserialize)]
pub struct RuleSetFile {
    pub name: String,
    #[serde(default = "default_root_algorithm")]
    pub algorithm: CombiningAlgorithm,
    pub rule_sets: Vec<RuleSetDefinition>,
}

fn default_root_algorithm() -> CombiningAlgorithm {
    CombiningAlgorithm::DenyUnlessPermit
}

/// Load settings from the given file, or defaults when none is configured
pub fn load_settings(path: Option<&Path>) -> Result<AuthzSettings> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading settings");
            AuthzSettings::from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))
        }
        None => Ok(AuthzSettings::default()),
    }
}

/// Read and deserialize a JSON file
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn read_encoded(path: &Path) -> Result<EncodedPolicySet> {
    read_json(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_settings_defaults() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings, AuthzSettings::default());
    }

    #[test]
    fn test_load_settings_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("authz.yaml");
        fs::write(&path, "id: authz\nvalues:\n  max_depth: 4\n").unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.max_depth, 4);
    }

    #[test]
    fn test_load_settings_missing_file() {
        let err = load_settings(Some(Path::new("/nonexistent/authz.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }

    #[tokio::test]
    async fn test_read_rule_set_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rules.json");
        fs::write(
            &path,
            r#"{"name": "app", "rule_sets": [
                {"name": "posts", "resource_type": "Post",
                 "actions": {"read": {"effect": "permit"}}}
            ]}"#,
        )
        .unwrap();

        let file: RuleSetFile = read_json(&path).await.unwrap();
        assert_eq!(file.name, "app");
        assert_eq!(file.algorithm, CombiningAlgorithm::DenyUnlessPermit);
        assert_eq!(file.rule_sets.len(), 1);
    }
}
