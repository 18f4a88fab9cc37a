//! ACL authorization
//!
//! Decision order, first match wins:
//!
//! 1. non-literal resource patterns are rejected as unsupported
//! 2. super users are allowed
//! 3. cluster resources are denied
//! 4. transactional ids and delegation tokens are allowed
//! 5. the current rule snapshot is scanned; a rule whose resource type, user
//!    pattern and resource pattern all match grants `ALL`, grants the
//!    operation itself, or grants DESCRIBE through READ/WRITE/DELETE/ALTER
//! 6. otherwise denied

use crate::error::{AuthzError, Result};
use crate::store::RuleStore;
use crate::types::{Action, AuthorizationResult, PatternType, ResourceType};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Authorization engine over a [`RuleStore`]
pub struct Authorizer {
    store: Arc<RuleStore>,
    super_users: HashSet<String>,
}

impl Authorizer {
    pub fn new(store: Arc<RuleStore>, super_users: HashSet<String>) -> Self {
        Self { store, super_users }
    }

    pub fn is_super_user(&self, principal: &str) -> bool {
        self.super_users.contains(principal)
    }

    /// Decide a single action for `principal`.
    ///
    /// Only errors when the action's resource pattern type is not literal.
    pub fn decide(&self, principal: &str, action: &Action) -> Result<AuthorizationResult> {
        let resource = &action.resource;
        if resource.pattern_type != PatternType::Literal {
            return Err(AuthzError::UnsupportedPatternType(resource.pattern_type));
        }

        let result = if self.is_super_user(principal) {
            AuthorizationResult::Allowed
        } else {
            match resource.resource_type {
                ResourceType::Cluster => AuthorizationResult::Denied,
                ResourceType::TransactionalId | ResourceType::DelegationToken => {
                    AuthorizationResult::Allowed
                }
                resource_type => self.match_rules(principal, resource_type, &resource.name, action),
            }
        };

        debug!(
            "Authorization: principal={}, resource={}:{}, operation={} -> {:?}",
            principal, resource.resource_type, resource.name, action.operation, result
        );
        Ok(result)
    }

    /// Decide every action for `principal`, in order.
    ///
    /// Every action is checked for a literal pattern type before any rule is
    /// consulted, so a bad batch fails as a whole.
    pub fn authorize(&self, principal: &str, actions: &[Action]) -> Result<Vec<AuthorizationResult>> {
        if let Some(bad) = actions
            .iter()
            .find(|a| a.resource.pattern_type != PatternType::Literal)
        {
            return Err(AuthzError::UnsupportedPatternType(bad.resource.pattern_type));
        }

        actions.iter().map(|action| self.decide(principal, action)).collect()
    }

    fn match_rules(
        &self,
        principal: &str,
        resource_type: ResourceType,
        resource_name: &str,
        action: &Action,
    ) -> AuthorizationResult {
        let rules = self.store.current_rules();
        rules
            .iter()
            .any(|rule| {
                rule.applies_to(principal, resource_type, resource_name)
                    && rule.operations.grants(action.operation)
            })
            .into()
    }
}
