//! # Brokerguard ACL engine
//!
//! Authorization and authentication decisions for a message broker, served
//! from an in-memory snapshot of an external ACL table.
//!
//! ## Features
//!
//! - **Snapshot reads**: decisions never touch the database
//! - **Background refresh** with atomic whole-snapshot replacement
//! - **Wildcard patterns** for principals and resource names (`orders-*`)
//! - **Operation implication**: READ/WRITE/DELETE/ALTER grants imply DESCRIBE
//! - **Two-tier authentication**: static users first, then the credential table
//!
//! ## Example
//!
//! ```rust
//! use brokerguard_authz::{
//!     AclEngine, AclRow, Action, AuthzConfig, InMemoryAclSource, Operation, ResourceType,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthzConfig::from_toml_str(r#"
//!         [acl]
//!         table = "kafka_acl"
//!         [acl.columns]
//!         user_pattern = "user_pattern"
//!         resource_type = "resource_type"
//!         resource_pattern = "resource_pattern"
//!         operation = "operation"
//!     "#)?;
//!
//!     let source = Arc::new(InMemoryAclSource::with_rules(vec![
//!         AclRow::new("alice*", "TOPIC", "orders-*", "WRITE"),
//!     ]));
//!     let engine = AclEngine::new(&config, source)?;
//!     engine.refresh_rules().await?;
//!
//!     let action = Action::literal(ResourceType::Topic, "orders-2024", Operation::Describe);
//!     assert!(engine.decide("alice1", &action)?.is_allowed());
//!     Ok(())
//! }
//! ```

pub mod authenticator;
pub mod authorizer;
pub mod config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod refresh;
pub mod rule;
pub mod source;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use authenticator::Authenticator;
pub use authorizer::Authorizer;
pub use config::AuthzConfig;
pub use engine::AclEngine;
pub use error::{AuthzError, Result};
pub use pattern::{CaseSensitivity, WildcardPattern};
pub use refresh::{RefreshScheduler, RefreshSettings, RefreshStats};
pub use rule::{AclRow, AclRule, CredentialRecord, CredentialRow};
pub use source::{AclSource, InMemoryAclSource};
pub use store::{RuleStore, Snapshot};
pub use types::{
    Action, AuthenticationResult, AuthorizationResult, Operation, PatternType, ResourcePattern,
    ResourceType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
