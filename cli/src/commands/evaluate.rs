use crate::utils::inputs::{read_encoded, read_json};
use anyhow::{anyhow, Result};
use authz::{AuthzSettings, Decision, FunctionRegistry, PolicyDecisionPoint, RequestContext};
use colored::*;
use std::path::PathBuf;

/// Evaluate a request context against an encoded policy set
pub async fn execute(
    input: PathBuf,
    context: PathBuf,
    format: String,
    settings: AuthzSettings,
) -> Result<()> {
    let encoded = read_encoded(&input).await?;
    let pdp = PolicyDecisionPoint::from_encoded(encoded, FunctionRegistry::with_builtins(), settings)?;

    let raw: serde_json::Value = read_json(&context).await?;
    let mut request = RequestContext::from_json(&raw)
        .map_err(|e| anyhow!("Invalid context in {}: {}", context.display(), e))?;

    let decision = pdp.decide(&mut request)?;

    match format.as_str() {
        "json" => {
            let json_output = serde_json::to_string_pretty(&decision)?;
            println!("{}", json_output);
        }
        "yaml" => {
            let yaml_output = serde_yaml::to_string(&decision)?;
            println!("{}", yaml_output);
        }
        _ => print_decision_text(pdp.root_name(), &decision),
    }

    Ok(())
}

fn print_decision_text(root: &str, decision: &Decision) {
    let evaluation = decision.evaluation.as_str();
    let colored_evaluation = if decision.evaluation.is_permit() {
        evaluation.green().bold()
    } else if decision.evaluation.is_deny() {
        evaluation.red().bold()
    } else {
        evaluation.yellow().bold()
    };

    println!("{}: {}", root.bold(), colored_evaluation);

    if !decision.obligations.is_empty() {
        println!("  {}:", "Obligations".bold());
        for obligation in &decision.obligations {
            print_entry(&obligation.id, &obligation.arguments);
        }
    }
    if !decision.advice.is_empty() {
        println!("  {}:", "Advice".bold());
        for advice in &decision.advice {
            print_entry(&advice.id, &advice.arguments);
        }
    }
}

fn print_entry(id: &str, arguments: &serde_json::Value) {
    if arguments.is_null() {
        println!("    - {}", id);
    } else {
        println!("    - {} {}", id, arguments);
    }
}
