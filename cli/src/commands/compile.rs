use crate::utils::inputs::{read_json, RuleSetFile};
use anyhow::{Context, Result};
use authz::{compile_rule_sets, AuthzSettings, FunctionRegistry, PolicyDecisionPoint, PolicySet};
use colored::*;
use std::path::PathBuf;
use tracing::info;

/// Compile a policy set or rule-set file into the encoded form
pub async fn execute(
    input: PathBuf,
    output: Option<PathBuf>,
    rule_sets: bool,
    settings: AuthzSettings,
) -> Result<()> {
    let set: PolicySet = if rule_sets {
        let file: RuleSetFile = read_json(&input).await?;
        compile_rule_sets(file.name, file.algorithm, file.rule_sets)
    } else {
        read_json(&input).await?
    };

    // Building the decision point runs the same validation as loading
    let pdp = PolicyDecisionPoint::from_policy_set(&set, FunctionRegistry::with_builtins(), settings)
        .with_context(|| format!("Policy in {} is invalid", input.display()))?;
    let encoded = pdp.encoded().to_json_pretty()?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &encoded)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(root = %pdp.root_name(), nodes = pdp.encoded().nodes.len(), "policy compiled");
            println!(
                "{} Compiled '{}' ({} nodes) to {}",
                "✓".green(),
                pdp.root_name().bold(),
                pdp.encoded().nodes.len(),
                path.display()
            );
        }
        None => println!("{}", encoded),
    }

    Ok(())
}
