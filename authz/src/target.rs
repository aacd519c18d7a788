//! Targets and the four-valued target matcher.
//!
//! A [`Target`] is a conjunction of [`AnyOf`] groups, each group a disjunction
//! of [`AllOf`] clause lists, each list a conjunction of attribute [`Match`]es.
//! Missing attributes and failed comparisons make a clause indeterminate
//! rather than false.

use crate::context::{AttributeKey, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// Outcome of matching a target against a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMatch {
    Match,
    NotMatch,
    /// The node has no target and therefore always applies.
    NoTarget,
    Indeterminate,
}

impl TargetMatch {
    /// `Match` or `NoTarget`.
    pub fn applies(self) -> bool {
        matches!(self, TargetMatch::Match | TargetMatch::NoTarget)
    }
}

impl fmt::Display for TargetMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetMatch::Match => "match",
            TargetMatch::NotMatch => "not-match",
            TargetMatch::NoTarget => "no-target",
            TargetMatch::Indeterminate => "indeterminate",
        };
        f.write_str(name)
    }
}

/// How an attribute value is compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFunction {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    /// Pattern is matched against string values with `regex` syntax.
    Regex(String),
    /// Any value is accepted as long as the attribute exists.
    Present,
}

/// A single attribute comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub key: AttributeKey,
    #[serde(rename = "match")]
    pub function: MatchFunction,
}

impl Match {
    pub fn equals(key: AttributeKey, value: impl Into<Value>) -> Self {
        Self {
            key,
            function: MatchFunction::Equals(value.into()),
        }
    }

    pub fn not_equals(key: AttributeKey, value: impl Into<Value>) -> Self {
        Self {
            key,
            function: MatchFunction::NotEquals(value.into()),
        }
    }

    pub fn one_of<I, V>(key: AttributeKey, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            key,
            function: MatchFunction::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn regex(key: AttributeKey, pattern: impl Into<String>) -> Self {
        Self {
            key,
            function: MatchFunction::Regex(pattern.into()),
        }
    }

    pub fn present(key: AttributeKey) -> Self {
        Self {
            key,
            function: MatchFunction::Present,
        }
    }

    /// Checks that the match function itself is well formed.
    pub fn validate(&self) -> Result<(), String> {
        if let MatchFunction::Regex(pattern) = &self.function {
            Regex::new(pattern)
                .map_err(|e| format!("invalid pattern for '{}': {}", self.key, e))?;
        }
        Ok(())
    }

    fn evaluate(&self, context: &mut dyn Context) -> TargetMatch {
        let value = match context.attribute(&self.key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                trace!(key = %self.key, "attribute missing, clause indeterminate");
                return TargetMatch::Indeterminate;
            }
            Err(e) => {
                trace!(key = %self.key, error = %e, "attribute resolution failed");
                return TargetMatch::Indeterminate;
            }
        };

        match self.compare(&value) {
            Ok(true) => TargetMatch::Match,
            Ok(false) => TargetMatch::NotMatch,
            Err(reason) => {
                trace!(key = %self.key, %reason, "comparison failed");
                TargetMatch::Indeterminate
            }
        }
    }

    fn compare(&self, value: &Value) -> Result<bool, String> {
        match &self.function {
            MatchFunction::Present => Ok(true),
            MatchFunction::Equals(expected) => Ok(bag_contains(value, expected)),
            MatchFunction::NotEquals(expected) => Ok(!bag_contains(value, expected)),
            MatchFunction::In(candidates) => {
                Ok(candidates.iter().any(|c| bag_contains(value, c)))
            }
            MatchFunction::Regex(pattern) => {
                let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
                match value {
                    Value::String(s) => Ok(regex.is_match(s)),
                    Value::Array(items) => {
                        let mut matched = false;
                        for item in items {
                            let s = item
                                .as_str()
                                .ok_or_else(|| format!("cannot match {} against a pattern", item))?;
                            matched |= regex.is_match(s);
                        }
                        Ok(matched)
                    }
                    other => Err(format!("cannot match {} against a pattern", other)),
                }
            }
        }
    }
}

/// Multi-valued attributes (arrays) match when any element equals the
/// expected value.
fn bag_contains(value: &Value, expected: &Value) -> bool {
    if value == expected {
        return true;
    }
    match (value, expected) {
        (Value::Array(items), expected) if !expected.is_array() => {
            items.iter().any(|item| item == expected)
        }
        _ => false,
    }
}

/// Clauses that must all match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllOf {
    pub matches: Vec<Match>,
}

impl AllOf {
    pub fn new(matches: impl IntoIterator<Item = Match>) -> Self {
        Self {
            matches: matches.into_iter().collect(),
        }
    }

    fn evaluate(&self, context: &mut dyn Context) -> TargetMatch {
        let mut indeterminate = false;
        for clause in &self.matches {
            match clause.evaluate(context) {
                TargetMatch::NotMatch => return TargetMatch::NotMatch,
                TargetMatch::Indeterminate => indeterminate = true,
                _ => {}
            }
        }
        if indeterminate {
            TargetMatch::Indeterminate
        } else {
            TargetMatch::Match
        }
    }
}

/// Alternatives of which at least one must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnyOf {
    pub all_of: Vec<AllOf>,
}

impl AnyOf {
    pub fn new(all_of: impl IntoIterator<Item = AllOf>) -> Self {
        Self {
            all_of: all_of.into_iter().collect(),
        }
    }

    fn evaluate(&self, context: &mut dyn Context) -> TargetMatch {
        let mut indeterminate = false;
        for alternative in &self.all_of {
            match alternative.evaluate(context) {
                TargetMatch::Match => return TargetMatch::Match,
                TargetMatch::Indeterminate => indeterminate = true,
                _ => {}
            }
        }
        if indeterminate {
            TargetMatch::Indeterminate
        } else {
            TargetMatch::NotMatch
        }
    }
}

/// Applicability predicate of a rule, policy or policy set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub any_of: Vec<AnyOf>,
}

impl Target {
    pub fn new(any_of: impl IntoIterator<Item = AnyOf>) -> Self {
        Self {
            any_of: any_of.into_iter().collect(),
        }
    }

    /// Target where every clause must match.
    pub fn all(matches: impl IntoIterator<Item = Match>) -> Self {
        Self::new([AnyOf::new([AllOf::new(matches)])])
    }

    /// Target where any single clause is enough.
    pub fn any(matches: impl IntoIterator<Item = Match>) -> Self {
        Self::new([AnyOf::new(
            matches.into_iter().map(|m| AllOf::new([m])),
        )])
    }

    /// Adds another group that must match as well.
    pub fn and(mut self, group: AnyOf) -> Self {
        self.any_of.push(group);
        self
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.any_of
            .iter()
            .flat_map(|group| group.all_of.iter())
            .flat_map(|all| all.matches.iter())
    }

    pub fn validate(&self) -> Result<(), String> {
        self.matches().try_for_each(Match::validate)
    }

    pub fn evaluate(&self, context: &mut dyn Context) -> TargetMatch {
        let mut indeterminate = false;
        for group in &self.any_of {
            match group.evaluate(context) {
                TargetMatch::NotMatch => return TargetMatch::NotMatch,
                TargetMatch::Indeterminate => indeterminate = true,
                _ => {}
            }
        }
        if indeterminate {
            TargetMatch::Indeterminate
        } else {
            TargetMatch::Match
        }
    }
}

/// Matches an optional target; an absent target yields `NoTarget`.
pub fn match_target(target: Option<&Target>, context: &mut dyn Context) -> TargetMatch {
    match target {
        None => TargetMatch::NoTarget,
        Some(target) => target.evaluate(context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AttributeError, RequestContext};
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext::new()
            .with(AttributeKey::action("name"), "read")
            .with(AttributeKey::subject("role"), "editor")
            .with(AttributeKey::subject("groups"), json!(["staff", "writers"]))
            .with(AttributeKey::resource("path"), "/posts/42")
    }

    #[test]
    fn test_absent_target_is_no_target() {
        assert_eq!(match_target(None, &mut ctx()), TargetMatch::NoTarget);
        assert!(TargetMatch::NoTarget.applies());
    }

    #[test]
    fn test_empty_target_matches() {
        let target = Target::default();
        assert_eq!(match_target(Some(&target), &mut ctx()), TargetMatch::Match);
    }

    #[test]
    fn test_all_of_semantics() {
        let target = Target::all([
            Match::equals(AttributeKey::action("name"), "read"),
            Match::equals(AttributeKey::subject("role"), "editor"),
        ]);
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::Match);

        let target = Target::all([
            Match::equals(AttributeKey::action("name"), "read"),
            Match::equals(AttributeKey::subject("role"), "admin"),
        ]);
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::NotMatch);
    }

    #[test]
    fn test_any_of_semantics() {
        let target = Target::any([
            Match::equals(AttributeKey::action("name"), "write"),
            Match::equals(AttributeKey::action("name"), "read"),
        ]);
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::Match);

        let target = Target::any([
            Match::equals(AttributeKey::action("name"), "write"),
            Match::equals(AttributeKey::action("name"), "delete"),
        ]);
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::NotMatch);
    }

    #[test]
    fn test_groups_are_conjunctive() {
        let target = Target::any([Match::equals(AttributeKey::action("name"), "read")]).and(
            AnyOf::new([AllOf::new([Match::equals(
                AttributeKey::subject("role"),
                "admin",
            )])]),
        );
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::NotMatch);
    }

    #[test]
    fn test_missing_attribute_is_indeterminate() {
        let target = Target::all([Match::equals(AttributeKey::environment("ip"), "10.0.0.1")]);
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::Indeterminate);
    }

    #[test]
    fn test_not_match_beats_indeterminate_in_all_of() {
        let target = Target::all([
            Match::equals(AttributeKey::environment("ip"), "10.0.0.1"),
            Match::equals(AttributeKey::action("name"), "delete"),
        ]);
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::NotMatch);
    }

    #[test]
    fn test_match_beats_indeterminate_in_any_of() {
        let target = Target::any([
            Match::equals(AttributeKey::environment("ip"), "10.0.0.1"),
            Match::equals(AttributeKey::action("name"), "read"),
        ]);
        assert_eq!(target.evaluate(&mut ctx()), TargetMatch::Match);
    }

    #[test]
    fn test_resolution_error_is_indeterminate() {
        let mut ctx = ctx().with_resolver(AttributeKey::subject("department"), |key| {
            Err(AttributeError::Resolution {
                key: key.to_string(),
                message: "timeout".into(),
            })
        });
        let target = Target::all([Match::equals(AttributeKey::subject("department"), "sales")]);
        assert_eq!(target.evaluate(&mut ctx), TargetMatch::Indeterminate);
    }

    #[test]
    fn test_match_functions() {
        let mut ctx = ctx();
        let eval = |m: Match, ctx: &mut RequestContext| Target::all([m]).evaluate(ctx);

        assert_eq!(
            eval(Match::present(AttributeKey::action("name")), &mut ctx),
            TargetMatch::Match
        );
        assert_eq!(
            eval(Match::not_equals(AttributeKey::subject("role"), "guest"), &mut ctx),
            TargetMatch::Match
        );
        assert_eq!(
            eval(
                Match::one_of(AttributeKey::action("name"), ["read", "index"]),
                &mut ctx
            ),
            TargetMatch::Match
        );
        assert_eq!(
            eval(Match::equals(AttributeKey::subject("groups"), "writers"), &mut ctx),
            TargetMatch::Match
        );
        assert_eq!(
            eval(Match::regex(AttributeKey::resource("path"), r"^/posts/\d+$"), &mut ctx),
            TargetMatch::Match
        );
        assert_eq!(
            eval(Match::regex(AttributeKey::resource("path"), r"^/users/"), &mut ctx),
            TargetMatch::NotMatch
        );
    }

    #[test]
    fn test_bad_comparisons_are_indeterminate() {
        let mut ctx = ctx().with(AttributeKey::resource("size"), 10);
        let target = Target::all([Match::regex(AttributeKey::resource("size"), "1.*")]);
        assert_eq!(target.evaluate(&mut ctx), TargetMatch::Indeterminate);

        let target = Target::all([Match::regex(AttributeKey::resource("path"), "(unclosed")]);
        assert_eq!(target.evaluate(&mut ctx), TargetMatch::Indeterminate);
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let target = Target::all([
            Match::equals(AttributeKey::action("name"), "read"),
            Match::present(AttributeKey::subject("id")),
        ]);
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(
            json,
            json!({"any_of": [{"all_of": [{"matches": [
                {"key": "action.name", "match": {"equals": "read"}},
                {"key": "subject.id", "match": "present"}
            ]}]}]})
        );
        let back: Target = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
    }
}
