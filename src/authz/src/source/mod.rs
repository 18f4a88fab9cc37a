//! External store access for ACL rows and credential rows

use crate::error::{AuthzError, Result};
use crate::rule::{AclRow, CredentialRow};
use async_trait::async_trait;
use parking_lot::RwLock;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresAclSource;

/// System of record for ACL rules and credentials.
///
/// Implementations may block on I/O; they are only ever called from the
/// refresh tasks, never from a decision.
#[async_trait]
pub trait AclSource: Send + Sync {
    /// Read every ACL row
    async fn fetch_rules(&self) -> Result<Vec<AclRow>>;

    /// Read every credential row
    async fn fetch_credentials(&self) -> Result<Vec<CredentialRow>>;

    /// Release pooled resources. Called once on engine shutdown.
    async fn close(&self) {}
}

/// In-memory ACL source
///
/// Rows can be swapped at any time and the source can be told to fail,
/// which makes it suitable for tests and for embedding with a fixed table.
#[derive(Debug, Default)]
pub struct InMemoryAclSource {
    rules: RwLock<Vec<AclRow>>,
    credentials: RwLock<Vec<CredentialRow>>,
    failure: RwLock<Option<String>>,
}

impl InMemoryAclSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<AclRow>) -> Self {
        let source = Self::new();
        source.set_rules(rules);
        source
    }

    pub fn set_rules(&self, rules: Vec<AclRow>) {
        *self.rules.write() = rules;
    }

    pub fn set_credentials(&self, credentials: Vec<CredentialRow>) {
        *self.credentials.write() = credentials;
    }

    /// Make every subsequent fetch fail with the given message
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.write() = None;
    }

    fn check(&self) -> Result<()> {
        match self.failure.read().as_ref() {
            Some(message) => Err(AuthzError::Database(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AclSource for InMemoryAclSource {
    async fn fetch_rules(&self) -> Result<Vec<AclRow>> {
        self.check()?;
        Ok(self.rules.read().clone())
    }

    async fn fetch_credentials(&self) -> Result<Vec<CredentialRow>> {
        self.check()?;
        Ok(self.credentials.read().clone())
    }
}
