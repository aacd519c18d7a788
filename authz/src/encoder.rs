//! Compact, serializable form of a policy tree.
//!
//! The object graph is flattened into an arena of nodes that reference their
//! children by index. The encoded form is plain data, so it can be written to a
//! cache file and loaded by another process without walking the graph again.
//! Every load goes through [`EncodedPolicySet::validate`], which is where
//! malformed trees are rejected.

use crate::algorithm::CombiningAlgorithm;
use crate::condition::{Condition, FunctionRegistry};
use crate::error::{AuthzError, Result};
use crate::evaluation::Effect;
use crate::policy::{Advice, Obligation, Policy, PolicySet, PolicySetChild, Rule};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Version written into every encoded tree.
pub const ENCODING_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBody {
    Rule {
        effect: Effect,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
    },
    Policy {
        algorithm: CombiningAlgorithm,
        rules: Vec<usize>,
    },
    PolicySet {
        algorithm: CombiningAlgorithm,
        children: Vec<usize>,
    },
}

impl NodeBody {
    fn kind(&self) -> &'static str {
        match self {
            NodeBody::Rule { .. } => "rule",
            NodeBody::Policy { .. } => "policy",
            NodeBody::PolicySet { .. } => "policy set",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Advice>,
    pub body: NodeBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedPolicySet {
    pub version: u32,
    pub root: usize,
    pub nodes: Vec<EncodedNode>,
}

/// Flattens an object graph. The root is always node 0 and nodes are stored
/// in pre-order.
pub fn encode(set: &PolicySet) -> EncodedPolicySet {
    let mut nodes = Vec::with_capacity(set.node_count());
    encode_policy_set(set, &mut nodes);
    debug!(policy_set = %set.name, nodes = nodes.len(), "policy tree encoded");
    EncodedPolicySet {
        version: ENCODING_VERSION,
        root: 0,
        nodes,
    }
}

fn reserve(nodes: &mut Vec<EncodedNode>, node: EncodedNode) -> usize {
    nodes.push(node);
    nodes.len() - 1
}

fn encode_policy_set(set: &PolicySet, nodes: &mut Vec<EncodedNode>) -> usize {
    let index = reserve(
        nodes,
        EncodedNode {
            name: set.name.clone(),
            target: set.target.clone(),
            obligations: set.obligations.clone(),
            advice: set.advice.clone(),
            body: NodeBody::PolicySet {
                algorithm: set.algorithm,
                children: Vec::new(),
            },
        },
    );

    let children: Vec<usize> = set
        .children
        .iter()
        .map(|child| match child {
            PolicySetChild::Policy(policy) => encode_policy(policy, nodes),
            PolicySetChild::PolicySet(inner) => encode_policy_set(inner, nodes),
        })
        .collect();

    if let NodeBody::PolicySet { children: slot, .. } = &mut nodes[index].body {
        *slot = children;
    }
    index
}

fn encode_policy(policy: &Policy, nodes: &mut Vec<EncodedNode>) -> usize {
    let index = reserve(
        nodes,
        EncodedNode {
            name: policy.name.clone(),
            target: policy.target.clone(),
            obligations: policy.obligations.clone(),
            advice: policy.advice.clone(),
            body: NodeBody::Policy {
                algorithm: policy.algorithm,
                rules: Vec::new(),
            },
        },
    );

    let rules: Vec<usize> = policy
        .rules
        .iter()
        .map(|rule| encode_rule(rule, nodes))
        .collect();

    if let NodeBody::Policy { rules: slot, .. } = &mut nodes[index].body {
        *slot = rules;
    }
    index
}

fn encode_rule(rule: &Rule, nodes: &mut Vec<EncodedNode>) -> usize {
    reserve(
        nodes,
        EncodedNode {
            name: rule.name.clone(),
            target: rule.target.clone(),
            obligations: rule.obligations.clone(),
            advice: rule.advice.clone(),
            body: NodeBody::Rule {
                effect: rule.effect,
                condition: rule.condition.clone(),
            },
        },
    )
}

impl EncodedPolicySet {
    pub fn root_node(&self) -> Option<&EncodedNode> {
        self.nodes.get(self.root)
    }

    pub fn node(&self, index: usize) -> Option<&EncodedNode> {
        self.nodes.get(index)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses an encoded tree. The result still has to be validated.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks that the arena forms a single well-typed tree rooted at a
    /// policy set, no deeper than `max_depth`. With a registry, condition
    /// function names are resolved as well.
    pub fn validate(&self, registry: Option<&FunctionRegistry>, max_depth: usize) -> Result<()> {
        if self.version != ENCODING_VERSION {
            return Err(AuthzError::InvalidPolicy(format!(
                "unsupported encoding version {} (expected {})",
                self.version, ENCODING_VERSION
            )));
        }

        let root = self.root_node().ok_or_else(|| {
            AuthzError::InvalidPolicy(format!("root node {} does not exist", self.root))
        })?;
        if !matches!(root.body, NodeBody::PolicySet { .. }) {
            return Err(AuthzError::InvalidPolicy(format!(
                "root node '{}' is a {}, expected a policy set",
                root.name,
                root.body.kind()
            )));
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![(self.root, 1usize)];
        while let Some((index, depth)) = stack.pop() {
            if visited[index] {
                return Err(AuthzError::InvalidPolicy(format!(
                    "node {} is referenced more than once",
                    index
                )));
            }
            visited[index] = true;

            let node = &self.nodes[index];
            if depth > max_depth {
                return Err(AuthzError::InvalidPolicy(format!(
                    "node '{}' is nested deeper than the limit of {}",
                    node.name, max_depth
                )));
            }
            self.validate_node(node, registry)?;

            let (children, rules_only) = match &node.body {
                NodeBody::Rule { .. } => continue,
                NodeBody::Policy { rules, .. } => (rules, true),
                NodeBody::PolicySet { children, .. } => (children, false),
            };
            for &child in children.iter().rev() {
                let child_node = self.nodes.get(child).ok_or_else(|| {
                    AuthzError::InvalidPolicy(format!(
                        "'{}' references missing node {}",
                        node.name, child
                    ))
                })?;
                let is_rule = matches!(child_node.body, NodeBody::Rule { .. });
                if is_rule != rules_only {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "{} '{}' cannot contain {} '{}'",
                        node.body.kind(),
                        node.name,
                        child_node.body.kind(),
                        child_node.name
                    )));
                }
                stack.push((child, depth + 1));
            }
        }

        if let Some(orphan) = visited.iter().position(|seen| !seen) {
            return Err(AuthzError::InvalidPolicy(format!(
                "node {} ('{}') is not reachable from the root",
                orphan, self.nodes[orphan].name
            )));
        }
        Ok(())
    }

    fn validate_node(&self, node: &EncodedNode, registry: Option<&FunctionRegistry>) -> Result<()> {
        if let Some(target) = &node.target {
            target
                .validate()
                .map_err(|e| AuthzError::InvalidPolicy(format!("'{}': {}", node.name, e)))?;
        }
        if let (NodeBody::Rule { condition: Some(condition), .. }, Some(registry)) =
            (&node.body, registry)
        {
            condition
                .validate(registry)
                .map_err(|e| AuthzError::InvalidPolicy(format!("rule '{}': {}", node.name, e)))?;
        }
        Ok(())
    }
}
