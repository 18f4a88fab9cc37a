//! Username/secret authentication in two tiers
//!
//! The static tier is a fixed table from configuration. The database tier is
//! the credential snapshot kept by the refresh scheduler and is only
//! consulted when enabled and the static tier did not authenticate. Nothing
//! here returns an error to the caller: every failure is a rejection.

use crate::error::{AuthzError, Result};
use crate::store::RuleStore;
use crate::types::AuthenticationResult;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Authentication engine
pub struct Authenticator {
    static_users: HashMap<String, String>,
    store: Arc<RuleStore>,
    enable_db_auth: bool,
}

impl Authenticator {
    pub fn new(
        static_users: HashMap<String, String>,
        store: Arc<RuleStore>,
        enable_db_auth: bool,
    ) -> Self {
        Self {
            static_users,
            store,
            enable_db_auth,
        }
    }

    /// Check `secret` for `username` against the static tier, then the
    /// database tier
    pub fn authenticate(&self, username: &str, secret: &[u8]) -> AuthenticationResult {
        if username.is_empty() {
            debug!("Rejecting authentication without a username");
            return AuthenticationResult::Rejected;
        }

        let static_result = self.static_authenticate(username, secret);
        debug!("Static authentication username:{}, result:{}", username, static_result);
        if static_result {
            return AuthenticationResult::Authenticated;
        }

        if !self.enable_db_auth {
            return AuthenticationResult::Rejected;
        }

        match self.db_authenticate(username, secret) {
            Ok(result) => {
                debug!("Database authentication username:{}, result:{}", username, result);
                result.into()
            }
            Err(e) => {
                error!("Database authentication for {} failed: {}", username, e);
                AuthenticationResult::Rejected
            }
        }
    }

    /// Authenticate a SASL/PLAIN initial response: `[authzid] NUL authcid NUL passwd`.
    ///
    /// The authorization identity is ignored.
    pub fn authenticate_plain(&self, message: &[u8]) -> AuthenticationResult {
        let parts: Vec<&[u8]> = message.split(|&b| b == 0).collect();
        let [_authzid, username, password] = parts.as_slice() else {
            debug!("Rejecting malformed SASL/PLAIN message ({} fields)", parts.len());
            return AuthenticationResult::Rejected;
        };

        match std::str::from_utf8(username) {
            Ok(username) => self.authenticate(username, password),
            Err(_) => {
                debug!("Rejecting SASL/PLAIN message with non UTF-8 username");
                AuthenticationResult::Rejected
            }
        }
    }

    fn static_authenticate(&self, username: &str, secret: &[u8]) -> bool {
        self.static_users
            .get(username)
            .is_some_and(|expected| expected.as_bytes() == secret)
    }

    fn db_authenticate(&self, username: &str, secret: &[u8]) -> Result<bool> {
        let credentials = self.store.current_credentials();
        if !credentials.is_initialized() {
            return Err(AuthzError::CredentialsUnavailable);
        }

        match credentials.get(username) {
            Some(record) => Ok(record.verify(secret)),
            None => {
                debug!("User {} not found in credential snapshot", username);
                Ok(false)
            }
        }
    }
}
