//! Declarative rule sets.
//!
//! A rule set describes, for one resource type, which actions are permitted
//! or denied and under which condition. Rule sets are compiled into ordinary
//! policies, so everything downstream only ever sees the policy tree.

use crate::algorithm::CombiningAlgorithm;
use crate::condition::Condition;
use crate::context::{keys, AttributeKey};
use crate::evaluation::Effect;
use crate::policy::{Policy, PolicySet, Rule};
use crate::target::{Match, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happens for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    /// Extra target groups on top of the action match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub effect: Effect,
}

impl ActionRule {
    pub fn permit() -> Self {
        Self {
            target: None,
            condition: None,
            effect: Effect::Permit,
        }
    }

    pub fn deny() -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::permit()
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }
}

fn default_algorithm() -> CombiningAlgorithm {
    CombiningAlgorithm::FirstApplicable
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDefinition {
    pub name: String,
    /// When set, the compiled policy only applies to this `resource.type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default = "default_algorithm")]
    pub algorithm: CombiningAlgorithm,
    /// Action name to rule; compiled in action-name order.
    pub actions: BTreeMap<String, ActionRule>,
}

impl RuleSetDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: None,
            algorithm: default_algorithm(),
            actions: BTreeMap::new(),
        }
    }

    pub fn for_resource(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn algorithm(mut self, algorithm: CombiningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn action(mut self, name: impl Into<String>, rule: ActionRule) -> Self {
        self.actions.insert(name.into(), rule);
        self
    }

    pub fn into_policy(self) -> Policy {
        let mut policy = Policy::new(self.name.clone(), self.algorithm);
        if let Some(resource_type) = &self.resource_type {
            policy = policy.target(Target::all([Match::equals(
                AttributeKey::resource(keys::RESOURCE_TYPE),
                resource_type.as_str(),
            )]));
        }

        for (action, definition) in self.actions {
            let mut target = Target::all([Match::equals(
                AttributeKey::action(keys::ACTION_NAME),
                action.as_str(),
            )]);
            if let Some(extra) = definition.target {
                target.any_of.extend(extra.any_of);
            }

            let mut rule = Rule::new(format!("{}::{}", self.name, action), definition.effect)
                .target(target);
            rule.condition = definition.condition;
            policy = policy.rule(rule);
        }
        policy
    }
}

/// Compiles rule sets into one policy set, in the order given.
pub fn compile_rule_sets(
    name: impl Into<String>,
    algorithm: CombiningAlgorithm,
    definitions: impl IntoIterator<Item = RuleSetDefinition>,
) -> PolicySet {
    definitions
        .into_iter()
        .fold(PolicySet::new(name, algorithm), |set, definition| {
            set.policy(definition.into_policy())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::evaluation::Evaluation;
    use crate::pdp::PolicyDecisionPoint;
    use serde_json::json;

    fn posts() -> RuleSetDefinition {
        RuleSetDefinition::new("posts")
            .for_resource("Post")
            .action("read", ActionRule::permit())
            .action(
                "update",
                ActionRule::permit().when(Condition::call("is_owner")),
            )
            .action(
                "delete",
                ActionRule::permit().target(Target::all([Match::equals(
                    AttributeKey::subject("role"),
                    "admin",
                )])),
            )
    }

    fn request(action: &str) -> RequestContext {
        RequestContext::new()
            .with(AttributeKey::action("name"), action)
            .with(AttributeKey::resource("type"), "Post")
            .with(AttributeKey::subject("id"), "u1")
            .with(AttributeKey::subject("role"), "author")
            .with(AttributeKey::resource("owner"), "u1")
    }

    #[test]
    fn test_into_policy_layout() {
        let policy = posts().into_policy();
        assert_eq!(policy.name, "posts");
        assert!(policy.target.is_some());
        let names: Vec<&str> = policy.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["posts::delete", "posts::read", "posts::update"]);

        let delete = &policy.rules[0];
        assert_eq!(delete.target.as_ref().unwrap().any_of.len(), 2);
        assert!(policy.rules[2].condition.is_some());
    }

    #[test]
    fn test_compiled_rule_sets_evaluate() {
        let comments = RuleSetDefinition::new("comments")
            .for_resource("Comment")
            .action("read", ActionRule::permit());
        let set = compile_rule_sets(
            "application",
            CombiningAlgorithm::DenyUnlessPermit,
            [posts(), comments],
        );
        assert_eq!(set.children.len(), 2);

        let pdp = PolicyDecisionPoint::new(&set).unwrap();
        assert_eq!(pdp.evaluate(&mut request("read")).unwrap(), Evaluation::PERMIT);
        assert_eq!(pdp.evaluate(&mut request("update")).unwrap(), Evaluation::PERMIT);
        assert_eq!(pdp.evaluate(&mut request("delete")).unwrap(), Evaluation::DENY);
        assert_eq!(pdp.evaluate(&mut request("publish")).unwrap(), Evaluation::DENY);

        let mut other_owner = request("update").with(AttributeKey::resource("owner"), "u2");
        assert_eq!(pdp.evaluate(&mut other_owner).unwrap(), Evaluation::DENY);
    }

    #[test]
    fn test_definition_from_json() {
        let definition: RuleSetDefinition = serde_json::from_value(json!({
            "name": "users",
            "resource_type": "User",
            "actions": {
                "read": {"effect": "permit"},
                "delete": {"effect": "deny"}
            }
        }))
        .unwrap();
        assert_eq!(definition.algorithm, CombiningAlgorithm::FirstApplicable);
        assert_eq!(definition.actions.len(), 2);
    }
}
