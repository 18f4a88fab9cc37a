//! Core request and decision types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker resource kinds an ACL rule or request can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Topic,
    Group,
    Cluster,
    TransactionalId,
    DelegationToken,
    User,
}

impl ResourceType {
    /// Parse a resource type name, ignoring case (`TOPIC`, `topic`, `transactional_id`)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TOPIC" => Some(ResourceType::Topic),
            "GROUP" => Some(ResourceType::Group),
            "CLUSTER" => Some(ResourceType::Cluster),
            "TRANSACTIONAL_ID" => Some(ResourceType::TransactionalId),
            "DELEGATION_TOKEN" => Some(ResourceType::DelegationToken),
            "USER" => Some(ResourceType::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Topic => "TOPIC",
            ResourceType::Group => "GROUP",
            ResourceType::Cluster => "CLUSTER",
            ResourceType::TransactionalId => "TRANSACTIONAL_ID",
            ResourceType::DelegationToken => "DELEGATION_TOKEN",
            ResourceType::User => "USER",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a principal can request on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    All,
    Read,
    Write,
    Create,
    Delete,
    Alter,
    Describe,
    ClusterAction,
    DescribeConfigs,
    AlterConfigs,
    IdempotentWrite,
    CreateTokens,
    DescribeTokens,
}

impl Operation {
    /// Every operation, in declaration order
    pub const VALUES: [Operation; 13] = [
        Operation::All,
        Operation::Read,
        Operation::Write,
        Operation::Create,
        Operation::Delete,
        Operation::Alter,
        Operation::Describe,
        Operation::ClusterAction,
        Operation::DescribeConfigs,
        Operation::AlterConfigs,
        Operation::IdempotentWrite,
        Operation::CreateTokens,
        Operation::DescribeTokens,
    ];

    /// Parse an operation name, ignoring case (`READ`, `describe_configs`)
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::VALUES.into_iter().find(|op| op.as_str() == upper)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::All => "ALL",
            Operation::Read => "READ",
            Operation::Write => "WRITE",
            Operation::Create => "CREATE",
            Operation::Delete => "DELETE",
            Operation::Alter => "ALTER",
            Operation::Describe => "DESCRIBE",
            Operation::ClusterAction => "CLUSTER_ACTION",
            Operation::DescribeConfigs => "DESCRIBE_CONFIGS",
            Operation::AlterConfigs => "ALTER_CONFIGS",
            Operation::IdempotentWrite => "IDEMPOTENT_WRITE",
            Operation::CreateTokens => "CREATE_TOKENS",
            Operation::DescribeTokens => "DESCRIBE_TOKENS",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a request's resource name is meant to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    /// Exact resource name (the only form the engine decides on)
    #[default]
    Literal,
    Prefixed,
    Match,
    Any,
}

impl PatternType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LITERAL" => Some(PatternType::Literal),
            "PREFIXED" => Some(PatternType::Prefixed),
            "MATCH" => Some(PatternType::Match),
            "ANY" => Some(PatternType::Any),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Literal => "LITERAL",
            PatternType::Prefixed => "PREFIXED",
            PatternType::Match => "MATCH",
            PatternType::Any => "ANY",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource descriptor supplied by the host for one decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePattern {
    pub resource_type: ResourceType,
    pub name: String,
    #[serde(default)]
    pub pattern_type: PatternType,
}

impl ResourcePattern {
    /// Literal resource with the given name
    pub fn literal(resource_type: ResourceType, name: impl Into<String>) -> Self {
        Self {
            resource_type,
            name: name.into(),
            pattern_type: PatternType::Literal,
        }
    }
}

/// One operation on one resource, as asked by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub resource: ResourcePattern,
    pub operation: Operation,
}

impl Action {
    pub fn new(resource: ResourcePattern, operation: Operation) -> Self {
        Self { resource, operation }
    }

    /// Shorthand for an operation on a literal resource
    pub fn literal(
        resource_type: ResourceType,
        name: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self::new(ResourcePattern::literal(resource_type, name), operation)
    }
}

/// Outcome of an authorization decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationResult {
    Allowed,
    Denied,
}

impl AuthorizationResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizationResult::Allowed)
    }
}

impl From<bool> for AuthorizationResult {
    fn from(allowed: bool) -> Self {
        if allowed {
            AuthorizationResult::Allowed
        } else {
            AuthorizationResult::Denied
        }
    }
}

/// Outcome of an authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationResult {
    Authenticated,
    Rejected,
}

impl AuthenticationResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthenticationResult::Authenticated)
    }
}

impl From<bool> for AuthenticationResult {
    fn from(ok: bool) -> Self {
        if ok {
            AuthenticationResult::Authenticated
        } else {
            AuthenticationResult::Rejected
        }
    }
}
