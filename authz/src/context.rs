//! Request context: the attribute store queried during evaluation.
//!
//! A context is created fresh for every authorization request and is owned by
//! the caller. The engine only ever reads from it, but lookups take `&mut self`
//! so implementations can memoize expensive attribute sources for the duration
//! of one evaluation pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Attribute category, following the usual subject/resource/action/environment split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Subject,
    Resource,
    Action,
    Environment,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Subject,
        Category::Resource,
        Category::Action,
        Category::Environment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Subject => "subject",
            Category::Resource => "resource",
            Category::Action => "action",
            Category::Environment => "environment",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown attribute category '{}'", s))
    }
}

/// Identifies one attribute: a category plus an attribute id.
///
/// Serialized as `"category.id"`, e.g. `"subject.role"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeKey {
    pub category: Category,
    pub id: String,
}

impl AttributeKey {
    pub fn new(category: Category, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }

    pub fn subject(id: impl Into<String>) -> Self {
        Self::new(Category::Subject, id)
    }

    pub fn resource(id: impl Into<String>) -> Self {
        Self::new(Category::Resource, id)
    }

    pub fn action(id: impl Into<String>) -> Self {
        Self::new(Category::Action, id)
    }

    pub fn environment(id: impl Into<String>) -> Self {
        Self::new(Category::Environment, id)
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category.as_str(), self.id)
    }
}

impl FromStr for AttributeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, id) = s
            .split_once('.')
            .ok_or_else(|| format!("attribute key '{}' must look like 'category.id'", s))?;
        if id.is_empty() {
            return Err(format!("attribute key '{}' has an empty id", s));
        }
        Ok(Self::new(category.parse()?, id))
    }
}

impl TryFrom<String> for AttributeKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AttributeKey> for String {
    fn from(value: AttributeKey) -> Self {
        value.to_string()
    }
}

/// Failure to resolve an attribute.
///
/// Inside the engine this always turns into an `INDETERMINATE` match or
/// condition result; it never crosses the decision point boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttributeError {
    #[error("Attribute '{key}' could not be resolved: {message}")]
    Resolution { key: String, message: String },

    #[error("Attribute '{key}' has an invalid value: {message}")]
    InvalidValue { key: String, message: String },
}

/// Read-only attribute lookup supplied by the caller.
pub trait Context {
    /// Returns the attribute value, `Ok(None)` when the attribute is unknown.
    fn attribute(&mut self, key: &AttributeKey) -> Result<Option<Value>, AttributeError>;
}

type Resolver = Box<dyn Fn(&AttributeKey) -> Result<Value, AttributeError> + Send>;

/// In-memory context with optional lazily resolved attributes.
///
/// Resolved values are cached, so a resolver runs at most once per context
/// however many targets and conditions ask for it. Failed resolutions are not
/// cached.
#[derive(Default)]
pub struct RequestContext {
    values: HashMap<AttributeKey, Value>,
    resolvers: HashMap<AttributeKey, Resolver>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a static attribute value.
    pub fn with(mut self, key: AttributeKey, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds an attribute whose value is computed on first use.
    pub fn with_resolver<F>(mut self, key: AttributeKey, resolver: F) -> Self
    where
        F: Fn(&AttributeKey) -> Result<Value, AttributeError> + Send + 'static,
    {
        self.values.remove(&key);
        self.resolvers.insert(key, Box::new(resolver));
        self
    }

    pub fn insert(&mut self, key: AttributeKey, value: impl Into<Value>) {
        self.resolvers.remove(&key);
        self.values.insert(key, value.into());
    }

    pub fn contains(&self, key: &AttributeKey) -> bool {
        self.values.contains_key(key) || self.resolvers.contains_key(key)
    }

    /// Builds a context from a JSON object keyed by category:
    /// `{"subject": {"role": "admin"}, "action": {"name": "read"}}`.
    pub fn from_json(value: &Value) -> Result<Self, AttributeError> {
        let invalid = |key: &str, message: &str| AttributeError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        let categories = value
            .as_object()
            .ok_or_else(|| invalid("<context>", "context must be a JSON object"))?;

        let mut context = Self::new();
        for (name, attributes) in categories {
            let category: Category = name.parse().map_err(|e: String| invalid(name, &e))?;
            let attributes = attributes
                .as_object()
                .ok_or_else(|| invalid(name, "category must map attribute ids to values"))?;
            for (id, attribute) in attributes {
                context.insert(AttributeKey::new(category, id.clone()), attribute.clone());
            }
        }
        Ok(context)
    }
}

impl Context for RequestContext {
    fn attribute(&mut self, key: &AttributeKey) -> Result<Option<Value>, AttributeError> {
        if let Some(value) = self.values.get(key) {
            return Ok(Some(value.clone()));
        }

        let Some(resolver) = self.resolvers.get(key) else {
            return Ok(None);
        };
        let value = resolver(key)?;
        self.resolvers.remove(key);
        self.values.insert(key.clone(), value.clone());
        Ok(Some(value))
    }
}

/// Well-known attribute ids used by the helpers below and by the
/// authorization manager when it builds contexts.
pub mod keys {
    pub const SUBJECT_ID: &str = "id";
    pub const SUBJECT_TYPE: &str = "type";
    pub const SUBJECT_AUTHENTICATED: &str = "authenticated";
    pub const ACTION_NAME: &str = "name";
    pub const RESOURCE_TYPE: &str = "type";
    pub const RESOURCE_ID: &str = "id";
}

fn string_attribute(
    context: &mut dyn Context,
    key: AttributeKey,
) -> Result<Option<String>, AttributeError> {
    match context.attribute(&key)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(AttributeError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a string, got {}", other),
        }),
    }
}

/// Name of the requested action.
pub fn action_name(context: &mut dyn Context) -> Result<Option<String>, AttributeError> {
    string_attribute(context, AttributeKey::action(keys::ACTION_NAME))
}

/// Type of the requested resource.
pub fn resource_type(context: &mut dyn Context) -> Result<Option<String>, AttributeError> {
    string_attribute(context, AttributeKey::resource(keys::RESOURCE_TYPE))
}

/// Identity of the requested resource, absent for collection-level actions.
pub fn resource_identity(context: &mut dyn Context) -> Result<Option<String>, AttributeError> {
    string_attribute(context, AttributeKey::resource(keys::RESOURCE_ID))
}

/// Identifier of the current subject.
pub fn subject_id(context: &mut dyn Context) -> Result<Option<String>, AttributeError> {
    string_attribute(context, AttributeKey::subject(keys::SUBJECT_ID))
}

/// Whether the subject is authenticated. A missing attribute means no.
pub fn is_authenticated(context: &mut dyn Context) -> Result<bool, AttributeError> {
    let key = AttributeKey::subject(keys::SUBJECT_AUTHENTICATED);
    match context.attribute(&key)? {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(other) => Err(AttributeError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_attribute_key_parsing() {
        let key: AttributeKey = "subject.role".parse().unwrap();
        assert_eq!(key, AttributeKey::subject("role"));
        assert_eq!(key.to_string(), "subject.role");

        // ids may contain dots
        let key: AttributeKey = "environment.request.ip".parse().unwrap();
        assert_eq!(key.id, "request.ip");

        assert!("role".parse::<AttributeKey>().is_err());
        assert!("user.role".parse::<AttributeKey>().is_err());
        assert!("subject.".parse::<AttributeKey>().is_err());
    }

    #[test]
    fn test_static_values() {
        let mut ctx = RequestContext::new().with(AttributeKey::action("name"), "read");
        assert_eq!(
            ctx.attribute(&AttributeKey::action("name")).unwrap(),
            Some(json!("read"))
        );
        assert_eq!(ctx.attribute(&AttributeKey::subject("role")).unwrap(), None);
    }

    #[test]
    fn test_resolver_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut ctx = RequestContext::new().with_resolver(AttributeKey::subject("role"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("admin"))
        });

        for _ in 0..3 {
            assert_eq!(
                ctx.attribute(&AttributeKey::subject("role")).unwrap(),
                Some(json!("admin"))
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolver_failure_is_reported() {
        let mut ctx = RequestContext::new().with_resolver(AttributeKey::subject("groups"), |key| {
            Err(AttributeError::Resolution {
                key: key.to_string(),
                message: "directory offline".into(),
            })
        });
        assert!(ctx.attribute(&AttributeKey::subject("groups")).is_err());
        assert!(ctx.contains(&AttributeKey::subject("groups")));
    }

    #[test]
    fn test_from_json() {
        let mut ctx = RequestContext::from_json(&json!({
            "subject": {"role": "admin", "authenticated": true},
            "action": {"name": "delete"}
        }))
        .unwrap();

        assert_eq!(action_name(&mut ctx).unwrap().as_deref(), Some("delete"));
        assert!(is_authenticated(&mut ctx).unwrap());
        assert_eq!(resource_type(&mut ctx).unwrap(), None);

        assert!(RequestContext::from_json(&json!(["subject"])).is_err());
        assert!(RequestContext::from_json(&json!({"tenant": {}})).is_err());
        assert!(RequestContext::from_json(&json!({"subject": "admin"})).is_err());
    }

    #[test]
    fn test_helpers_reject_wrong_types() {
        let mut ctx = RequestContext::new()
            .with(AttributeKey::subject("authenticated"), "yes")
            .with(AttributeKey::resource("id"), 42)
            .with(AttributeKey::subject("id"), json!({"nested": true}));

        assert!(is_authenticated(&mut ctx).is_err());
        assert_eq!(resource_identity(&mut ctx).unwrap().as_deref(), Some("42"));
        assert!(subject_id(&mut ctx).is_err());
    }
}
