//! The Policy Decision Point.
//!
//! A decision point owns one validated, immutable encoded tree and evaluates
//! it against a fresh context per request. It is `Send + Sync`; share it
//! behind an `Arc` and give every concurrent evaluation its own context.

use crate::algorithm::CombiningAlgorithm;
use crate::condition::{Condition, ConditionError, FunctionRegistry};
use crate::context::Context;
use crate::encoder::{self, EncodedNode, EncodedPolicySet, NodeBody};
use crate::error::{AuthzError, Result};
use crate::evaluation::{Effect, Evaluation};
use crate::policy::{Advice, Obligation, PolicySet};
use crate::settings::AuthzSettings;
use crate::target::{match_target, TargetMatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Final result of an evaluation, with the obligations and advice attached
/// to the nodes that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub evaluation: Evaluation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Advice>,
}

impl Decision {
    fn bare(evaluation: Evaluation) -> Self {
        Self {
            evaluation,
            obligations: Vec::new(),
            advice: Vec::new(),
        }
    }

    pub fn is_permit(&self) -> bool {
        self.evaluation.is_permit()
    }

    /// Adds the node's own obligations and advice that apply to this
    /// decision. Indeterminate and not-applicable decisions carry none.
    fn attach(&mut self, node: &EncodedNode) {
        let Some(effect) = Effect::from_evaluation(self.evaluation) else {
            return;
        };
        self.obligations.extend(
            node.obligations
                .iter()
                .filter(|o| o.fulfill_on == effect)
                .cloned(),
        );
        self.advice.extend(
            node.advice
                .iter()
                .filter(|a| a.fulfill_on == effect)
                .cloned(),
        );
    }
}

#[derive(Debug, Clone)]
pub struct PolicyDecisionPoint {
    policies: Arc<EncodedPolicySet>,
    registry: FunctionRegistry,
    settings: AuthzSettings,
}

impl PolicyDecisionPoint {
    /// Builds a decision point from an object graph, using the built-in
    /// condition functions and default settings.
    pub fn new(set: &PolicySet) -> Result<Self> {
        Self::from_policy_set(set, FunctionRegistry::with_builtins(), AuthzSettings::default())
    }

    /// Encodes `set` once and adopts the result.
    pub fn from_policy_set(
        set: &PolicySet,
        registry: FunctionRegistry,
        settings: AuthzSettings,
    ) -> Result<Self> {
        Self::from_encoded(encoder::encode(set), registry, settings)
    }

    /// Adopts an already encoded tree, e.g. one loaded from a cache file.
    pub fn from_encoded(
        encoded: EncodedPolicySet,
        registry: FunctionRegistry,
        settings: AuthzSettings,
    ) -> Result<Self> {
        settings.validate()?;
        encoded.validate(Some(&registry), settings.max_depth)?;
        Ok(Self {
            policies: Arc::new(encoded),
            registry,
            settings,
        })
    }

    pub fn encoded(&self) -> &EncodedPolicySet {
        &self.policies
    }

    pub fn settings(&self) -> &AuthzSettings {
        &self.settings
    }

    pub fn root_name(&self) -> &str {
        self.root().name.as_str()
    }

    fn root(&self) -> &EncodedNode {
        // validated at construction
        &self.policies.nodes[self.policies.root]
    }

    /// Evaluates the tree and returns only the result.
    pub fn evaluate(&self, context: &mut dyn Context) -> Result<Evaluation> {
        self.decide(context).map(|decision| decision.evaluation)
    }

    /// Evaluates the tree. Errors only for condition faults; every policy
    /// outcome, including indeterminate ones, is a `Decision`.
    pub fn decide(&self, context: &mut dyn Context) -> Result<Decision> {
        let root = self.root_name();
        debug!(policy_set = %root, "evaluation started");

        let decision = self.evaluate_node(self.policies.root, context)?;

        if self.settings.log_decisions {
            info!(policy_set = %root, decision = %decision.evaluation, "evaluation finished");
        } else {
            debug!(policy_set = %root, decision = %decision.evaluation, "evaluation finished");
        }
        Ok(decision)
    }

    fn evaluate_node(&self, index: usize, context: &mut dyn Context) -> Result<Decision> {
        let node = &self.policies.nodes[index];
        let decision = match &node.body {
            NodeBody::Rule { effect, condition } => {
                self.evaluate_rule(node, *effect, condition.as_ref(), context)?
            }
            NodeBody::Policy { algorithm, rules } => {
                self.evaluate_container(node, *algorithm, rules, context)?
            }
            NodeBody::PolicySet {
                algorithm,
                children,
            } => self.evaluate_container(node, *algorithm, children, context)?,
        };
        trace!(node = %node.name, decision = %decision.evaluation, "node evaluated");
        Ok(decision)
    }

    fn evaluate_rule(
        &self,
        node: &EncodedNode,
        effect: Effect,
        condition: Option<&Condition>,
        context: &mut dyn Context,
    ) -> Result<Decision> {
        let evaluation = match match_target(node.target.as_ref(), context) {
            TargetMatch::NotMatch => Evaluation::NOT_APPLICABLE,
            TargetMatch::Indeterminate => effect.indeterminate(),
            TargetMatch::Match | TargetMatch::NoTarget => {
                match condition.map(|c| c.evaluate(context, &self.registry)) {
                    None | Some(Ok(true)) => effect.evaluation(),
                    Some(Ok(false)) => Evaluation::NOT_APPLICABLE,
                    Some(Err(ConditionError::Indeterminate(reason))) => {
                        trace!(rule = %node.name, %reason, "condition indeterminate");
                        effect.indeterminate()
                    }
                    Some(Err(ConditionError::Fault(message))) => {
                        return Err(AuthzError::ConditionFault {
                            rule: node.name.clone(),
                            message,
                        })
                    }
                }
            }
        };

        let mut decision = Decision::bare(evaluation);
        decision.attach(node);
        Ok(decision)
    }

    fn evaluate_container(
        &self,
        node: &EncodedNode,
        algorithm: CombiningAlgorithm,
        children: &[usize],
        context: &mut dyn Context,
    ) -> Result<Decision> {
        match match_target(node.target.as_ref(), context) {
            TargetMatch::NotMatch => return Ok(Decision::bare(Evaluation::NOT_APPLICABLE)),
            TargetMatch::Indeterminate => {
                return Ok(Decision::bare(Evaluation::INDETERMINATE_DENY_OR_PERMIT))
            }
            TargetMatch::Match | TargetMatch::NoTarget => {}
        }

        let mut results = Vec::with_capacity(children.len());
        for &child in children {
            let decision = self.evaluate_node(child, context)?;
            let stop = algorithm.is_final(decision.evaluation);
            results.push(decision);
            if stop {
                break;
            }
        }

        let evaluations: Vec<Evaluation> = results.iter().map(|d| d.evaluation).collect();
        let mut decision = Decision::bare(algorithm.combine(&evaluations));
        if decision.evaluation.is_determinate() {
            for child in results
                .into_iter()
                .filter(|child| child.evaluation == decision.evaluation)
            {
                decision.obligations.extend(child.obligations);
                decision.advice.extend(child.advice);
            }
            decision.attach(node);
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AttributeKey, RequestContext};
    use crate::policy::{Policy, Rule};
    use crate::target::{Match, Target};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn action(name: &str) -> Target {
        Target::all([Match::equals(AttributeKey::action("name"), name)])
    }

    fn ctx(action: &str) -> RequestContext {
        RequestContext::new().with(AttributeKey::action("name"), action)
    }

    fn single_rule(rule: Rule) -> PolicyDecisionPoint {
        let set = PolicySet::new("root", CombiningAlgorithm::DenyOverrides).policy(
            Policy::new("policy", CombiningAlgorithm::DenyOverrides).rule(rule),
        );
        PolicyDecisionPoint::new(&set).unwrap()
    }

    #[test]
    fn test_rule_not_match_is_not_applicable() {
        let pdp = single_rule(Rule::permit("read").target(action("read")));
        assert_eq!(pdp.evaluate(&mut ctx("write")).unwrap(), Evaluation::NOT_APPLICABLE);
        assert_eq!(pdp.evaluate(&mut ctx("read")).unwrap(), Evaluation::PERMIT);
    }

    #[test]
    fn test_rule_indeterminate_target_keeps_effect() {
        let pdp = single_rule(Rule::deny("read").target(action("read")));
        let result = pdp.evaluate(&mut RequestContext::new()).unwrap();
        assert_eq!(result, Evaluation::INDETERMINATE_DENY);

        let pdp = single_rule(Rule::permit("read").target(action("read")));
        let result = pdp.evaluate(&mut RequestContext::new()).unwrap();
        assert_eq!(result, Evaluation::INDETERMINATE_PERMIT);
    }

    #[test]
    fn test_rule_condition_outcomes() {
        let rule = Rule::permit("admins").condition(Condition::eq(AttributeKey::subject("role"), "admin"));
        let pdp = single_rule(rule);

        let mut admin = ctx("read").with(AttributeKey::subject("role"), "admin");
        assert_eq!(pdp.evaluate(&mut admin).unwrap(), Evaluation::PERMIT);

        let mut guest = ctx("read").with(AttributeKey::subject("role"), "guest");
        assert_eq!(pdp.evaluate(&mut guest).unwrap(), Evaluation::NOT_APPLICABLE);

        let mut anonymous = ctx("read");
        assert_eq!(
            pdp.evaluate(&mut anonymous).unwrap(),
            Evaluation::INDETERMINATE_PERMIT
        );
    }

    #[test]
    fn test_condition_fault_propagates() {
        let set = PolicySet::new("root", CombiningAlgorithm::DenyOverrides).policy(
            Policy::new("policy", CombiningAlgorithm::DenyOverrides)
                .rule(Rule::permit("buggy").condition(Condition::call("explode"))),
        );
        let mut registry = FunctionRegistry::new();
        registry.register("explode", |_| Err(ConditionError::Fault("index out of range".into())));
        let pdp =
            PolicyDecisionPoint::from_policy_set(&set, registry, AuthzSettings::default()).unwrap();

        let err = pdp.evaluate(&mut ctx("read")).unwrap_err();
        assert!(matches!(err, AuthzError::ConditionFault { ref rule, .. } if rule == "buggy"));
    }

    #[test]
    fn test_unknown_function_fails_at_construction() {
        let set = PolicySet::new("root", CombiningAlgorithm::DenyOverrides).policy(
            Policy::new("policy", CombiningAlgorithm::DenyOverrides)
                .rule(Rule::permit("r").condition(Condition::call("not_registered"))),
        );
        assert!(matches!(
            PolicyDecisionPoint::new(&set),
            Err(AuthzError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_container_target_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = FunctionRegistry::new();
        registry.register("record", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        let set = PolicySet::new("root", CombiningAlgorithm::DenyOverrides)
            .target(action("delete"))
            .policy(
                Policy::new("policy", CombiningAlgorithm::PermitOverrides)
                    .rule(Rule::permit("r").condition(Condition::call("record"))),
            );
        let pdp = PolicyDecisionPoint::from_policy_set(&set, registry, AuthzSettings::default())
            .unwrap();

        assert_eq!(pdp.evaluate(&mut ctx("read")).unwrap(), Evaluation::NOT_APPLICABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // indeterminate container target: children are skipped as well
        let result = pdp.evaluate(&mut RequestContext::new()).unwrap();
        assert_eq!(result, Evaluation::INDETERMINATE_DENY_OR_PERMIT);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(pdp.evaluate(&mut ctx("delete")).unwrap(), Evaluation::PERMIT);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_applicable_stops_at_first_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = FunctionRegistry::new();
        registry.register("record", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        let set = PolicySet::new("root", CombiningAlgorithm::FirstApplicable).policy(
            Policy::new("policy", CombiningAlgorithm::FirstApplicable)
                .rule(Rule::deny("first"))
                .rule(Rule::permit("second").condition(Condition::call("record"))),
        );
        let pdp = PolicyDecisionPoint::from_policy_set(&set, registry, AuthzSettings::default())
            .unwrap();
        assert_eq!(pdp.evaluate(&mut ctx("read")).unwrap(), Evaluation::DENY);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_obligations_follow_the_decision() {
        let set = PolicySet::new("root", CombiningAlgorithm::PermitOverrides)
            .obligation(Obligation::new("log-permit", Effect::Permit))
            .obligation(Obligation::new("log-deny", Effect::Deny))
            .policy(
                Policy::new("policy", CombiningAlgorithm::PermitOverrides)
                    .advice(Advice::new("cache", Effect::Permit))
                    .rule(
                        Rule::permit("read")
                            .target(action("read"))
                            .obligation(Obligation::new("audit-read", Effect::Permit))
                            .obligation(Obligation::new("never", Effect::Deny)),
                    )
                    .rule(
                        Rule::deny("rest")
                            .obligation(Obligation::new("audit-deny", Effect::Deny)),
                    ),
            );
        let pdp = PolicyDecisionPoint::new(&set).unwrap();

        let decision = pdp.decide(&mut ctx("read")).unwrap();
        assert!(decision.is_permit());
        let ids: Vec<&str> = decision.obligations.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["audit-read", "log-permit"]);
        assert_eq!(decision.advice.len(), 1);

        let decision = pdp.decide(&mut ctx("write")).unwrap();
        assert!(decision.evaluation.is_deny());
        let ids: Vec<&str> = decision.obligations.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["audit-deny", "log-deny"]);
        assert!(decision.advice.is_empty());
    }

    #[test]
    fn test_indeterminate_decisions_carry_no_obligations() {
        let set = PolicySet::new("root", CombiningAlgorithm::DenyOverrides)
            .obligation(Obligation::new("log", Effect::Deny))
            .policy(
                Policy::new("policy", CombiningAlgorithm::DenyOverrides).rule(
                    Rule::deny("by-role")
                        .target(Target::all([Match::equals(AttributeKey::subject("role"), "x")]))
                        .obligation(Obligation::new("audit", Effect::Deny)),
                ),
            );
        let pdp = PolicyDecisionPoint::new(&set).unwrap();
        let decision = pdp.decide(&mut ctx("read")).unwrap();
        assert_eq!(decision.evaluation, Evaluation::INDETERMINATE_DENY);
        assert!(decision.obligations.is_empty());
    }

    #[test]
    fn test_settings_are_validated() {
        let set = PolicySet::new("root", CombiningAlgorithm::DenyOverrides);
        let settings = AuthzSettings {
            max_depth: 0,
            ..AuthzSettings::default()
        };
        assert!(matches!(
            PolicyDecisionPoint::from_policy_set(&set, FunctionRegistry::new(), settings),
            Err(AuthzError::Settings(_))
        ));
    }

    #[test]
    fn test_empty_root_is_not_applicable() {
        let set = PolicySet::new("root", CombiningAlgorithm::DenyUnlessPermit);
        let pdp = PolicyDecisionPoint::new(&set).unwrap();
        assert_eq!(pdp.root_name(), "root");
        assert_eq!(pdp.evaluate(&mut ctx("read")).unwrap(), Evaluation::NOT_APPLICABLE);
    }
}
