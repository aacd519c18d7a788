//! Request-side types consumed by the authorization manager.
//!
//! # Security Considerations
//!
//! ## 1. Principal Identity
//! - Principals must be built from authenticated sessions only
//! - `authenticated` is taken at face value by policies; never derive it from
//!   request input
//!
//! ## 2. Resource Identity
//! - Resource ids are passed to policies as opaque strings
//! - Collection-level actions (create, index) carry no resource id
//!
//! ## 3. Extra Parameters
//! - Extra request properties land in the `environment` category and are
//!   echoed back in denial errors for auditing; do not put secrets in them

use crate::context::{keys, AttributeKey, RequestContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The "who" of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// The unique identifier for this principal (e.g., ULID for users)
    pub id: String,

    /// The type of principal (e.g., "User", "Service")
    pub entity_type: String,

    pub authenticated: bool,

    /// Further subject attributes such as roles or department.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            authenticated: true,
            attributes: Map::new(),
        }
    }

    /// An authenticated user.
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, "User")
    }

    /// An anonymous/unauthenticated user.
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            ..Self::new("anonymous", "User")
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// The "what" of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn read() -> Self {
        Self::new("read")
    }

    pub fn write() -> Self {
        Self::new("write")
    }

    pub fn create() -> Self {
        Self::new("create")
    }

    pub fn delete() -> Self {
        Self::new("delete")
    }
}

/// The "which" of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Absent for actions on the whole collection.
    pub id: Option<String>,

    /// The type of resource (e.g., "Post", "User", "Comment")
    pub entity_type: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            entity_type: entity_type.into(),
            attributes: Map::new(),
        }
    }

    /// A resource type without a specific instance.
    pub fn of_type(entity_type: impl Into<String>) -> Self {
        Self {
            id: None,
            entity_type: entity_type.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Builds the evaluation context for one request.
///
/// Explicit attributes win over the same-named custom attributes, so a
/// principal cannot shadow its own `id` or `authenticated` flag.
pub fn request_context(
    principal: &Principal,
    action: &Action,
    resource: &Resource,
    extra: &Map<String, Value>,
) -> RequestContext {
    let mut context = RequestContext::new();

    for (name, value) in &principal.attributes {
        context.insert(AttributeKey::subject(name.clone()), value.clone());
    }
    context.insert(AttributeKey::subject(keys::SUBJECT_ID), principal.id.clone());
    context.insert(
        AttributeKey::subject(keys::SUBJECT_TYPE),
        principal.entity_type.clone(),
    );
    context.insert(
        AttributeKey::subject(keys::SUBJECT_AUTHENTICATED),
        principal.authenticated,
    );

    context.insert(AttributeKey::action(keys::ACTION_NAME), action.name.clone());

    for (name, value) in &resource.attributes {
        context.insert(AttributeKey::resource(name.clone()), value.clone());
    }
    context.insert(
        AttributeKey::resource(keys::RESOURCE_TYPE),
        resource.entity_type.clone(),
    );
    if let Some(id) = &resource.id {
        context.insert(AttributeKey::resource(keys::RESOURCE_ID), id.clone());
    }

    for (name, value) in extra {
        context.insert(AttributeKey::environment(name.clone()), value.clone());
    }
    context
}
