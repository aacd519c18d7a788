//! Authorization manager: turns decisions into allow/deny behavior.
//!
//! Only `PERMIT` allows a request. Every other result, and every error raised
//! while deciding, is treated as a denial.

use crate::error::{AuthzError, Result};
use crate::pdp::{Decision, PolicyDecisionPoint};
use crate::types::{request_context, Action, Principal, Resource};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct AuthorizationManager {
    pdp: Arc<PolicyDecisionPoint>,
}

impl AuthorizationManager {
    pub fn new(pdp: Arc<PolicyDecisionPoint>) -> Self {
        Self { pdp }
    }

    pub fn decision_point(&self) -> &PolicyDecisionPoint {
        &self.pdp
    }

    /// Evaluates the request and returns the full decision.
    pub fn decide(
        &self,
        principal: &Principal,
        action: &Action,
        resource: &Resource,
        extra: &Map<String, Value>,
    ) -> Result<Decision> {
        let mut context = request_context(principal, action, resource, extra);
        self.pdp.decide(&mut context)
    }

    /// Fail-closed boolean check.
    pub fn is_allowed(
        &self,
        principal: &Principal,
        action: &Action,
        resource: &Resource,
        extra: &Map<String, Value>,
    ) -> bool {
        match self.decide(principal, action, resource, extra) {
            Ok(decision) => {
                debug!(
                    action = %action.name,
                    resource_type = %resource.entity_type,
                    decision = %decision.evaluation,
                    "authorization decided"
                );
                decision.is_permit()
            }
            Err(e) => {
                error!(
                    action = %action.name,
                    resource_type = %resource.entity_type,
                    error = %e,
                    "authorization failed, denying"
                );
                false
            }
        }
    }

    /// Returns `Ok` with the decision when permitted, `AccessDenied` otherwise.
    /// Condition faults are returned as they are.
    pub fn authorize(
        &self,
        principal: &Principal,
        action: &Action,
        resource: &Resource,
        extra: &Map<String, Value>,
    ) -> Result<Decision> {
        let decision = self.decide(principal, action, resource, extra)?;
        if decision.is_permit() {
            return Ok(decision);
        }

        warn!(
            subject = %principal.id,
            action = %action.name,
            resource_type = %resource.entity_type,
            resource_id = ?resource.id,
            decision = %decision.evaluation,
            "access denied"
        );
        Err(AuthzError::AccessDenied {
            action: action.name.clone(),
            resource_type: resource.entity_type.clone(),
            resource_id: resource.id.clone(),
            extra: extra.clone(),
        })
    }
}
