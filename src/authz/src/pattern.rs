//! Wildcard matching for principal and resource patterns
//!
//! Patterns use a single metacharacter: `*` matches any run of characters,
//! including the empty run, and may appear any number of times. Everything
//! else is compared literally, so there is no such thing as a malformed
//! pattern. `prefix*` is the common case and gets its own fast path.

use serde::{Deserialize, Serialize};

const WILDCARD: u8 = b'*';

/// Case policy applied when comparing literal parts of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseSensitivity {
    #[default]
    Sensitive,
    /// ASCII letters compare equal regardless of case
    Insensitive,
}

impl CaseSensitivity {
    pub fn from_flag(case_sensitive: bool) -> Self {
        if case_sensitive {
            CaseSensitivity::Sensitive
        } else {
            CaseSensitivity::Insensitive
        }
    }

    #[inline]
    fn eq(self, a: u8, b: u8) -> bool {
        match self {
            CaseSensitivity::Sensitive => a == b,
            CaseSensitivity::Insensitive => a.eq_ignore_ascii_case(&b),
        }
    }

    #[inline]
    fn eq_slice(self, a: &[u8], b: &[u8]) -> bool {
        match self {
            CaseSensitivity::Sensitive => a == b,
            CaseSensitivity::Insensitive => a.eq_ignore_ascii_case(b),
        }
    }
}

/// Match `candidate` against `pattern`.
///
/// Pure and allocation-free; safe to call from any number of threads.
pub fn matches(pattern: &str, candidate: &str, case: CaseSensitivity) -> bool {
    glob_match(pattern.as_bytes(), candidate.as_bytes(), case)
}

/// A pattern classified once so repeated matching skips the general scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    source: String,
    kind: PatternKind,
    case: CaseSensitivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    /// `*`, `**`, ...
    Any,
    /// No wildcard at all
    Exact,
    /// Exactly one wildcard, at the end
    Prefix,
    /// Anything else
    Glob,
}

impl WildcardPattern {
    pub fn compile(pattern: impl Into<String>, case: CaseSensitivity) -> Self {
        let source = pattern.into();
        let bytes = source.as_bytes();
        let stars = bytes.iter().filter(|&&b| b == WILDCARD).count();

        let kind = if stars == 0 {
            PatternKind::Exact
        } else if stars == bytes.len() {
            PatternKind::Any
        } else if stars == 1 && bytes.last() == Some(&WILDCARD) {
            PatternKind::Prefix
        } else {
            PatternKind::Glob
        };

        Self { source, kind, case }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let pattern = self.source.as_bytes();
        let candidate = candidate.as_bytes();

        match self.kind {
            PatternKind::Any => true,
            PatternKind::Exact => self.case.eq_slice(pattern, candidate),
            PatternKind::Prefix => {
                let prefix = &pattern[..pattern.len() - 1];
                candidate.len() >= prefix.len()
                    && self.case.eq_slice(prefix, &candidate[..prefix.len()])
            }
            PatternKind::Glob => glob_match(pattern, candidate, self.case),
        }
    }
}

/// Iterative glob scan, backtracking only to the most recent `*`.
///
/// Comparing bytes is equivalent to comparing chars here: literal runs of a
/// valid UTF-8 pattern can only line up with whole chars of the candidate.
fn glob_match(pattern: &[u8], candidate: &[u8], case: CaseSensitivity) -> bool {
    let mut p = 0;
    let mut c = 0;
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && pattern[p] == WILDCARD {
            backtrack = Some((p, c));
            p += 1;
        } else if p < pattern.len() && case.eq(pattern[p], candidate[c]) {
            p += 1;
            c += 1;
        } else if let Some((star, resume)) = backtrack {
            p = star + 1;
            c = resume + 1;
            backtrack = Some((star, resume + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == WILDCARD)
}
