//! Rule conditions.
//!
//! Conditions are plain data so that an encoded policy tree stays
//! serializable: an expression tree over context attributes, plus calls to
//! native functions looked up by name in a [`FunctionRegistry`]. Function names
//! are checked when the decision point is built, not when a rule fires.

use crate::context::{self, AttributeError, AttributeKey, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why a condition produced no boolean.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    /// The condition could not be decided for this request. The owning rule
    /// evaluates to an indeterminate result.
    #[error("condition indeterminate: {0}")]
    Indeterminate(String),

    /// The condition is broken. Propagated to the caller.
    #[error("condition fault: {0}")]
    Fault(String),
}

impl From<AttributeError> for ConditionError {
    fn from(err: AttributeError) -> Self {
        ConditionError::Indeterminate(err.to_string())
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Attribute value is one of the elements of the operand array.
    In,
    /// Attribute value (an array or a string) contains the operand.
    Contains,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(Value),
    Attribute(AttributeKey),
}

/// Boolean expression evaluated after a rule's target matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Literal(bool),
    Present(AttributeKey),
    Compare {
        key: AttributeKey,
        op: CompareOp,
        operand: Operand,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    /// Native function registered under this name.
    Call(String),
}

impl Condition {
    pub fn compare(key: AttributeKey, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            key,
            op,
            operand: Operand::Value(value.into()),
        }
    }

    pub fn eq(key: AttributeKey, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::Eq, value)
    }

    pub fn ne(key: AttributeKey, value: impl Into<Value>) -> Self {
        Self::compare(key, CompareOp::Ne, value)
    }

    /// Both attributes hold equal values, e.g. `resource.owner == subject.id`.
    pub fn same(key: AttributeKey, other: AttributeKey) -> Self {
        Condition::Compare {
            key,
            op: CompareOp::Eq,
            operand: Operand::Attribute(other),
        }
    }

    pub fn call(name: impl Into<String>) -> Self {
        Condition::Call(name.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Checks that every called function is registered.
    pub fn validate(&self, registry: &FunctionRegistry) -> Result<(), String> {
        match self {
            Condition::Call(name) if !registry.contains(name) => {
                Err(format!("condition calls unknown function '{}'", name))
            }
            Condition::All(items) | Condition::Any(items) => {
                items.iter().try_for_each(|c| c.validate(registry))
            }
            Condition::Not(inner) => inner.validate(registry),
            _ => Ok(()),
        }
    }

    pub fn evaluate(
        &self,
        context: &mut dyn Context,
        registry: &FunctionRegistry,
    ) -> Result<bool, ConditionError> {
        match self {
            Condition::Literal(b) => Ok(*b),
            Condition::Present(key) => Ok(!matches!(
                context.attribute(key)?,
                None | Some(Value::Null)
            )),
            Condition::Compare { key, op, operand } => {
                let left = required(context, key)?;
                let right = match operand {
                    Operand::Value(v) => v.clone(),
                    Operand::Attribute(other) => required(context, other)?,
                };
                compare(&left, *op, &right)
            }
            Condition::All(items) => {
                let mut failure = None;
                for item in items {
                    match item.evaluate(context, registry) {
                        Ok(false) => return Ok(false),
                        Ok(true) => {}
                        Err(ConditionError::Fault(message)) => {
                            return Err(ConditionError::Fault(message))
                        }
                        Err(e) => failure = failure.or(Some(e)),
                    }
                }
                failure.map_or(Ok(true), Err)
            }
            Condition::Any(items) => {
                let mut failure = None;
                for item in items {
                    match item.evaluate(context, registry) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(ConditionError::Fault(message)) => {
                            return Err(ConditionError::Fault(message))
                        }
                        Err(e) => failure = failure.or(Some(e)),
                    }
                }
                failure.map_or(Ok(false), Err)
            }
            Condition::Not(inner) => inner.evaluate(context, registry).map(|b| !b),
            Condition::Call(name) => {
                let function = registry.get(name).ok_or_else(|| {
                    ConditionError::Fault(format!("function '{}' is not registered", name))
                })?;
                function(context)
            }
        }
    }
}

fn required(context: &mut dyn Context, key: &AttributeKey) -> Result<Value, ConditionError> {
    context
        .attribute(key)?
        .ok_or_else(|| ConditionError::Indeterminate(format!("attribute '{}' is missing", key)))
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq => Ok(left == right),
        CompareOp::Ne => Ok(left != right),
        CompareOp::In => match right {
            Value::Array(items) => Ok(items.contains(left)),
            other => Err(ConditionError::Indeterminate(format!(
                "'in' expects an array operand, got {}",
                other
            ))),
        },
        CompareOp::Contains => match (left, right) {
            (Value::Array(items), needle) => Ok(items.contains(needle)),
            (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle)),
            (other, _) => Err(ConditionError::Indeterminate(format!(
                "'contains' expects an array or string, got {}",
                other
            ))),
        },
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = order(left, right)?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, ConditionError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            a.zip(b)
                .and_then(|(a, b)| a.partial_cmp(&b))
                .ok_or_else(|| ConditionError::Indeterminate("numbers are not comparable".into()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(ConditionError::Indeterminate(format!(
            "cannot order {} and {}",
            a, b
        ))),
    }
}

/// Signature of a native condition function.
pub type ConditionFn =
    Arc<dyn Fn(&mut dyn Context) -> Result<bool, ConditionError> + Send + Sync>;

/// Named native condition functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ConditionFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in helpers:
    /// `is_authenticated` and `is_owner` (`resource.owner == subject.id`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("is_authenticated", |ctx| Ok(context::is_authenticated(ctx)?));
        registry.register("is_owner", |ctx| {
            let subject = context::subject_id(ctx)?;
            let owner = ctx.attribute(&AttributeKey::resource("owner"))?;
            Ok(match (subject, owner) {
                (Some(subject), Some(Value::String(owner))) => subject == owner,
                _ => false,
            })
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&mut dyn Context) -> Result<bool, ConditionError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ConditionFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
