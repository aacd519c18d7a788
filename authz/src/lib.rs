//! XACML-style Policy Decision Point.
//!
//! This crate evaluates hierarchical policy trees (policy sets containing
//! policies and policy sets, policies containing rules) against a per-request
//! attribute context and returns one of `PERMIT`, `DENY`, `NOT_APPLICABLE` or
//! an `INDETERMINATE` variant.
//!
//! # Architecture Overview
//!
//! The authorization flow follows this pattern:
//!
//! 1. **Policies are authored** as an object graph ([`PolicySet`]) or as
//!    declarative rule sets ([`RuleSetDefinition`])
//! 2. **The encoder** flattens the graph once into an immutable
//!    [`EncodedPolicySet`], which can also be cached as JSON
//! 3. **A context** ([`RequestContext`]) is built per request
//! 4. **The decision point** ([`PolicyDecisionPoint`]) matches targets,
//!    evaluates conditions and reduces child results with the node's
//!    [`CombiningAlgorithm`]
//! 5. **The authorization manager** maps the result to allow or deny
//!
//! # Example
//!
//! ```rust
//! use authz::{
//!     AttributeKey, CombiningAlgorithm, Condition, Evaluation, Match, Policy,
//!     PolicyDecisionPoint, PolicySet, RequestContext, Rule, Target,
//! };
//!
//! let set = PolicySet::new("app", CombiningAlgorithm::DenyOverrides).policy(
//!     Policy::new("admin", CombiningAlgorithm::FirstApplicable).rule(
//!         Rule::permit("delete")
//!             .target(Target::all([Match::equals(AttributeKey::action("name"), "delete")]))
//!             .condition(Condition::eq(AttributeKey::subject("role"), "admin")),
//!     ),
//! );
//! let pdp = PolicyDecisionPoint::new(&set).unwrap();
//!
//! let mut context = RequestContext::new()
//!     .with(AttributeKey::action("name"), "delete")
//!     .with(AttributeKey::subject("role"), "admin");
//! assert_eq!(pdp.evaluate(&mut context).unwrap(), Evaluation::PERMIT);
//! ```

pub mod algorithm;
pub mod condition;
pub mod context;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod manager;
pub mod pdp;
pub mod policy;
pub mod rule_set;
pub mod settings;
pub mod target;
pub mod types;

pub use algorithm::CombiningAlgorithm;
pub use condition::{CompareOp, Condition, ConditionError, FunctionRegistry, Operand};
pub use context::{AttributeError, AttributeKey, Category, Context, RequestContext};
pub use encoder::{encode, EncodedNode, EncodedPolicySet, NodeBody};
pub use error::{AuthzError, Result};
pub use evaluation::{Effect, Evaluation};
pub use manager::AuthorizationManager;
pub use pdp::{Decision, PolicyDecisionPoint};
pub use policy::{Advice, Obligation, Policy, PolicySet, PolicySetChild, Rule};
pub use rule_set::{compile_rule_sets, ActionRule, RuleSetDefinition};
pub use settings::AuthzSettings;
pub use target::{match_target, AllOf, AnyOf, Match, MatchFunction, Target, TargetMatch};
pub use types::{request_context, Action, Principal, Resource};
