//! Author identity and position on a publication
//!
//! Identity is decided by an [`AuthorMatcher`]. The default is the loose
//! name-token rule PubMed users expect: every whitespace token of the query
//! must occur somewhere in "family given". Stricter matchers can be swapped
//! in without touching the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the target author sits in a publication's author list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorPosition {
    First,
    Last,
    Middle,
    /// Target author not found in the list
    #[serde(rename = "none")]
    Absent,
}

impl AuthorPosition {
    /// First and last authors are the ones that count toward the index
    pub fn is_leading(self) -> bool {
        matches!(self, AuthorPosition::First | AuthorPosition::Last)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorPosition::First => "first",
            AuthorPosition::Last => "last",
            AuthorPosition::Middle => "middle",
            AuthorPosition::Absent => "none",
        }
    }
}

impl fmt::Display for AuthorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a registry author list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorName {
    pub family: String,
    pub given: String,
}

impl AuthorName {
    pub fn new(family: impl Into<String>, given: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            given: given.into(),
        }
    }
}

/// Decides whether an author-list entry is the researcher being scored
pub trait AuthorMatcher: Send + Sync {
    fn matches(&self, target: &str, author: &AuthorName) -> bool;
}

/// Every lower-cased whitespace token of the target must be a substring of
/// "family given". "Smith J" matches Smith, John and also Smithson, Jane.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSubstringMatcher;

impl AuthorMatcher for TokenSubstringMatcher {
    fn matches(&self, target: &str, author: &AuthorName) -> bool {
        let haystack = format!("{} {}", author.family, author.given).to_lowercase();
        target
            .to_lowercase()
            .split_whitespace()
            .all(|token| haystack.contains(token))
    }
}

/// Position of `target` in `authors`, using the first matching entry.
///
/// Index 0 is checked before the last index, so a matching sole author is
/// `First`.
pub fn author_position(
    matcher: &dyn AuthorMatcher,
    target: &str,
    authors: &[AuthorName],
) -> AuthorPosition {
    let last = authors.len().saturating_sub(1);
    for (i, author) in authors.iter().enumerate() {
        if matcher.matches(target, author) {
            return if i == 0 {
                AuthorPosition::First
            } else if i == last {
                AuthorPosition::Last
            } else {
                AuthorPosition::Middle
            };
        }
    }
    AuthorPosition::Absent
}
