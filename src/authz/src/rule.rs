//! ACL rules and credential records, from raw store rows to their compiled form

use crate::pattern::{CaseSensitivity, WildcardPattern};
use crate::types::{Operation, ResourceType};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// One ACL row exactly as read from the external store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRow {
    pub user_pattern: String,
    pub resource_type: String,
    pub resource_pattern: String,
    pub operation: String,
}

impl AclRow {
    pub fn new(
        user_pattern: impl Into<String>,
        resource_type: impl Into<String>,
        resource_pattern: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            user_pattern: user_pattern.into(),
            resource_type: resource_type.into(),
            resource_pattern: resource_pattern.into(),
            operation: operation.into(),
        }
    }
}

/// One credential row exactly as read from the external store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRow {
    pub username: String,
    pub password: String,
}

impl CredentialRow {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Fixed-size set of operations
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationSet(u16);

impl OperationSet {
    /// Operations whose grant also makes a resource visible to DESCRIBE
    pub const DESCRIBE_IMPLIERS: OperationSet = OperationSet(
        Self::bit(Operation::Read)
            | Self::bit(Operation::Write)
            | Self::bit(Operation::Delete)
            | Self::bit(Operation::Alter),
    );

    pub const fn empty() -> Self {
        OperationSet(0)
    }

    const fn bit(op: Operation) -> u16 {
        1 << (op as u16)
    }

    pub fn insert(&mut self, op: Operation) {
        self.0 |= Self::bit(op);
    }

    pub fn contains(&self, op: Operation) -> bool {
        self.0 & Self::bit(op) != 0
    }

    pub fn intersects(&self, other: OperationSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        Operation::VALUES.into_iter().filter(|op| self.contains(*op))
    }
}

impl FromIterator<Operation> for OperationSet {
    fn from_iter<T: IntoIterator<Item = Operation>>(iter: T) -> Self {
        let mut set = OperationSet::empty();
        for op in iter {
            set.insert(op);
        }
        set
    }
}

impl fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// What a rule's operation column grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOperations {
    /// The literal `ALL`
    All,
    /// A comma-separated list, parsed
    Set(OperationSet),
}

impl RuleOperations {
    /// Parse an operation column value.
    ///
    /// Tokens that are not operation names are dropped with a warning; they
    /// could never equal a requested operation anyway.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case(Operation::All.as_str()) {
            return RuleOperations::All;
        }

        let mut set = OperationSet::empty();
        for token in raw.split(',') {
            match Operation::parse(token) {
                Some(op) => set.insert(op),
                None => warn!("Ignoring unknown ACL operation '{}'", token.trim()),
            }
        }
        RuleOperations::Set(set)
    }

    /// Whether a rule carrying these operations grants `requested`
    pub fn grants(&self, requested: Operation) -> bool {
        match self {
            RuleOperations::All => true,
            RuleOperations::Set(set) => {
                (requested == Operation::Describe
                    && set.intersects(OperationSet::DESCRIBE_IMPLIERS))
                    || set.contains(requested)
            }
        }
    }
}

/// An ACL rule ready for matching. Immutable once built.
#[derive(Debug, Clone)]
pub struct AclRule {
    pub user_pattern: WildcardPattern,
    pub resource_type: ResourceType,
    pub resource_pattern: WildcardPattern,
    pub operations: RuleOperations,
}

impl AclRule {
    /// Compile a raw row. Returns `None` when the resource type is not one
    /// the engine knows, since such a rule can never match a request.
    pub fn compile(row: &AclRow, case: CaseSensitivity) -> Option<Self> {
        let Some(resource_type) = ResourceType::parse(&row.resource_type) else {
            warn!(
                "Skipping ACL rule for user pattern '{}' with unknown resource type '{}'",
                row.user_pattern, row.resource_type
            );
            return None;
        };

        Some(Self {
            user_pattern: WildcardPattern::compile(row.user_pattern.as_str(), case),
            resource_type,
            resource_pattern: WildcardPattern::compile(row.resource_pattern.as_str(), case),
            operations: RuleOperations::parse(&row.operation),
        })
    }

    /// Whether this rule targets the given principal and resource
    pub fn applies_to(&self, principal: &str, resource_type: ResourceType, resource_name: &str) -> bool {
        self.resource_type == resource_type
            && self.user_pattern.matches(principal)
            && self.resource_pattern.matches(resource_name)
    }
}

/// A known secret for one username
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    secret: String,
}

impl CredentialRecord {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Exact byte comparison against a presented secret
    pub fn verify(&self, presented: &[u8]) -> bool {
        self.secret.as_bytes() == presented
    }
}

impl From<CredentialRow> for CredentialRecord {
    fn from(row: CredentialRow) -> Self {
        Self::new(row.username, row.password)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}
