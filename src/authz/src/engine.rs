//! Host-facing engine: configuration, lifecycle and the decision surface

use crate::authenticator::Authenticator;
use crate::authorizer::Authorizer;
use crate::config::AuthzConfig;
use crate::error::Result;
use crate::refresh::{RefreshScheduler, RefreshSettings, RefreshStats};
use crate::source::AclSource;
use crate::store::{CredentialSnapshot, RuleSnapshot, RuleStore};
use crate::types::{Action, AuthenticationResult, AuthorizationResult};
use std::sync::Arc;
use tracing::info;

/// ACL engine
///
/// # Architecture
///
/// ```text
///  AclSource ──(refresh task)──▶ RuleStore ◀──(per request)── Authorizer
///                                    ▲
///                                    └──────(per request)──── Authenticator
/// ```
///
/// Decisions only ever read the already published snapshots, so `decide`
/// and `authenticate` never wait on the database.
pub struct AclEngine {
    store: Arc<RuleStore>,
    authorizer: Authorizer,
    authenticator: Authenticator,
    scheduler: RefreshScheduler,
}

impl AclEngine {
    /// Build an engine over `source`.
    ///
    /// Fails with a configuration error when a required table or column
    /// mapping is missing. No refresh happens until [`start`](Self::start).
    pub fn new(config: &AuthzConfig, source: Arc<dyn AclSource>) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(RuleStore::new());
        let super_users = config.super_user_set();
        let enable_db_auth = config.authentication.enable_db_auth;
        info!(
            "Configuring ACL engine: {} super users, {} static users, db auth {}",
            super_users.len(),
            config.authentication.static_users.len(),
            if enable_db_auth { "enabled" } else { "disabled" }
        );

        let settings = RefreshSettings {
            rule_interval: config.rule_refresh_interval(),
            credential_interval: enable_db_auth.then(|| config.credential_refresh_interval()),
            case: config.case_sensitivity(),
        };

        Ok(Self {
            authorizer: Authorizer::new(Arc::clone(&store), super_users),
            authenticator: Authenticator::new(
                config.authentication.static_users.clone(),
                Arc::clone(&store),
                enable_db_auth,
            ),
            scheduler: RefreshScheduler::new(source, Arc::clone(&store), settings),
            store,
        })
    }

    /// Build an engine reading from PostgreSQL as described by `config`
    #[cfg(feature = "postgres")]
    pub fn connect(config: &AuthzConfig) -> Result<Self> {
        config.validate()?;
        let source = crate::source::PostgresAclSource::from_config(config)?;
        Self::new(config, Arc::new(source))
    }

    /// Start background refresh; the first cycle runs immediately.
    ///
    /// Returns without waiting for that cycle, so decisions made right after
    /// startup may still see the empty snapshot and be denied.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Cancel background refresh and release the source's connections
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    /// Decide one action; see [`Authorizer::decide`]
    pub fn decide(&self, principal: &str, action: &Action) -> Result<AuthorizationResult> {
        self.authorizer.decide(principal, action)
    }

    /// Decide a batch of actions; see [`Authorizer::authorize`]
    pub fn authorize(&self, principal: &str, actions: &[Action]) -> Result<Vec<AuthorizationResult>> {
        self.authorizer.authorize(principal, actions)
    }

    /// Check a username and secret; see [`Authenticator::authenticate`]
    pub fn authenticate(&self, username: &str, secret: &[u8]) -> AuthenticationResult {
        self.authenticator.authenticate(username, secret)
    }

    /// Check a SASL/PLAIN initial response
    pub fn authenticate_plain(&self, message: &[u8]) -> AuthenticationResult {
        self.authenticator.authenticate_plain(message)
    }

    /// Force a rule refresh now
    pub async fn refresh_rules(&self) -> Result<u64> {
        self.scheduler.refresh_rules_now().await
    }

    /// Force a credential refresh now
    pub async fn refresh_credentials(&self) -> Result<u64> {
        self.scheduler.refresh_credentials_now().await
    }

    pub fn current_rules(&self) -> Arc<RuleSnapshot> {
        self.store.current_rules()
    }

    pub fn current_credentials(&self) -> Arc<CredentialSnapshot> {
        self.store.current_credentials()
    }

    pub fn refresh_stats(&self) -> RefreshStats {
        self.scheduler.stats()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::source::InMemoryAclSource;

    #[test]
    fn test_engine_requires_acl_mapping() {
        let result = AclEngine::new(&AuthzConfig::default(), Arc::new(InMemoryAclSource::new()));
        assert!(matches!(result, Err(AuthzError::Configuration(_))));
    }
}
