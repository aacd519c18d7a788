use crate::utils::inputs::read_encoded;
use anyhow::{Context, Result};
use authz::{AuthzSettings, FunctionRegistry, NodeBody, PolicyDecisionPoint};
use colored::*;
use std::path::PathBuf;

/// Validate an encoded policy set
pub async fn execute(input: PathBuf, settings: AuthzSettings) -> Result<()> {
    let encoded = read_encoded(&input).await?;
    let pdp = PolicyDecisionPoint::from_encoded(encoded, FunctionRegistry::with_builtins(), settings)
        .with_context(|| format!("{} is not a valid encoded policy set", input.display()))?;

    let (mut sets, mut policies, mut rules) = (0, 0, 0);
    for node in &pdp.encoded().nodes {
        match node.body {
            NodeBody::PolicySet { .. } => sets += 1,
            NodeBody::Policy { .. } => policies += 1,
            NodeBody::Rule { .. } => rules += 1,
        }
    }

    println!("{} {} is valid", "✓".green(), input.display());
    println!("  {}: {}", "Root".bold(), pdp.root_name());
    println!("  {}: {}", "Policy sets".bold(), sets);
    println!("  {}: {}", "Policies".bold(), policies);
    println!("  {}: {}", "Rules".bold(), rules);

    Ok(())
}
