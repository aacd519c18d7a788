//! In-memory policy object graph.
//!
//! Rules nest in policies, policies and policy sets nest in policy sets. The
//! graph is what authors build (directly, through the builders below, or from
//! rule-set definitions); the decision point never evaluates it directly but
//! encodes it once into an [`EncodedPolicySet`](crate::encoder::EncodedPolicySet).

use crate::algorithm::CombiningAlgorithm;
use crate::condition::Condition;
use crate::evaluation::Effect;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Something the enforcement point must do when the decision is `fulfill_on`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: String,
    pub fulfill_on: Effect,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

impl Obligation {
    pub fn new(id: impl Into<String>, fulfill_on: Effect) -> Self {
        Self {
            id: id.into(),
            fulfill_on,
            arguments: Value::Null,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Like an [`Obligation`], but the enforcement point may ignore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub id: String,
    pub fulfill_on: Effect,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

impl Advice {
    pub fn new(id: impl Into<String>, fulfill_on: Effect) -> Self {
        Self {
            id: id.into(),
            fulfill_on,
            arguments: Value::Null,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Advice>,
}

impl Rule {
    pub fn new(name: impl Into<String>, effect: Effect) -> Self {
        Self {
            name: name.into(),
            target: None,
            condition: None,
            effect,
            obligations: Vec::new(),
            advice: Vec::new(),
        }
    }

    pub fn permit(name: impl Into<String>) -> Self {
        Self::new(name, Effect::Permit)
    }

    pub fn deny(name: impl Into<String>) -> Self {
        Self::new(name, Effect::Deny)
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn obligation(mut self, obligation: Obligation) -> Self {
        self.obligations.push(obligation);
        self
    }

    pub fn advice(mut self, advice: Advice) -> Self {
        self.advice.push(advice);
        self
    }
}

/// A list of rules under one combining algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    pub algorithm: CombiningAlgorithm,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Advice>,
}

impl Policy {
    pub fn new(name: impl Into<String>, algorithm: CombiningAlgorithm) -> Self {
        Self {
            name: name.into(),
            target: None,
            algorithm,
            rules: Vec::new(),
            obligations: Vec::new(),
            advice: Vec::new(),
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn obligation(mut self, obligation: Obligation) -> Self {
        self.obligations.push(obligation);
        self
    }

    pub fn advice(mut self, advice: Advice) -> Self {
        self.advice.push(advice);
        self
    }
}

/// Child of a policy set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySetChild {
    Policy(Policy),
    PolicySet(PolicySet),
}

impl PolicySetChild {
    pub fn name(&self) -> &str {
        match self {
            PolicySetChild::Policy(policy) => &policy.name,
            PolicySetChild::PolicySet(set) => &set.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    pub algorithm: CombiningAlgorithm,
    #[serde(default)]
    pub children: Vec<PolicySetChild>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Advice>,
}

impl PolicySet {
    pub fn new(name: impl Into<String>, algorithm: CombiningAlgorithm) -> Self {
        Self {
            name: name.into(),
            target: None,
            algorithm,
            children: Vec::new(),
            obligations: Vec::new(),
            advice: Vec::new(),
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.children.push(PolicySetChild::Policy(policy));
        self
    }

    pub fn policy_set(mut self, set: PolicySet) -> Self {
        self.children.push(PolicySetChild::PolicySet(set));
        self
    }

    pub fn obligation(mut self, obligation: Obligation) -> Self {
        self.obligations.push(obligation);
        self
    }

    pub fn advice(mut self, advice: Advice) -> Self {
        self.advice.push(advice);
        self
    }

    /// Total number of nodes (sets, policies and rules) in this tree.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| match child {
                PolicySetChild::Policy(policy) => 1 + policy.rules.len(),
                PolicySetChild::PolicySet(set) => set.node_count(),
            })
            .sum::<usize>()
    }

    /// Length of the longest root-to-leaf path, counting the root as 1.
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| match child {
                PolicySetChild::Policy(policy) if policy.rules.is_empty() => 1,
                PolicySetChild::Policy(_) => 2,
                PolicySetChild::PolicySet(set) => set.depth(),
            })
            .max()
            .unwrap_or(0)
    }
}
