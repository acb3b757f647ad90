//! Domain pattern classification and matching.
//!
//! A host key is one of three kinds:
//!
//! - **Exact**: a literal domain such as `api.example.com`
//! - **Wildcard**: any key containing `*`, e.g. `*.example.com`
//! - **Regex**: a key that compiles as a regular expression and contains at
//!   least one metacharacter beyond `.`, e.g. `^api-\d+\.example\.com$`
//!
//! Wildcard detection runs first, so `*.ex(ample).com` is a wildcard even
//! though it also looks like a regex.

use std::borrow::Cow;

use regex::Regex;

/// Characters that turn a compilable key into a regex pattern.
///
/// A dot alone is not enough: `example.com` is valid regex syntax but is
/// matched literally.
const REGEX_META: &[char] = &[
    '^', '$', '+', '?', '(', ')', '[', ']', '{', '}', '|', '\\',
];

/// The kind of a host pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Exact,
    Wildcard,
    Regex,
}

/// Classify a raw pattern string.
pub fn classify(pattern: &str) -> PatternKind {
    if pattern.contains('*') {
        return PatternKind::Wildcard;
    }

    if pattern.contains(REGEX_META) && Regex::new(pattern).is_ok() {
        PatternKind::Regex
    } else {
        PatternKind::Exact
    }
}

/// A classified pattern, with its compiled expression for non-exact kinds.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact,
    /// Anchored expression derived from the wildcard key.
    Wildcard(Regex),
    Regex(Regex),
}

impl Pattern {
    /// Classify `pattern` and compile what its kind needs.
    ///
    /// Classification already checks that regex keys compile, so an error is
    /// only possible for pathological inputs (e.g. size limits).
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        Self::for_key(pattern, pattern)
    }

    /// Compile a host key given both its trimmed `source` and lower-cased form.
    ///
    /// Classification and regex compilation use the source text, so escapes
    /// such as `\D` keep their meaning. Wildcards are built from the
    /// lower-cased form since queries are always lower-cased.
    pub fn for_key(source: &str, lowered: &str) -> Result<Self, regex::Error> {
        match classify(source) {
            PatternKind::Exact => Ok(Self::Exact),
            PatternKind::Wildcard => wildcard_regex(lowered).map(Self::Wildcard),
            PatternKind::Regex => Regex::new(source).map(Self::Regex),
        }
    }

    #[inline]
    pub const fn kind(&self) -> PatternKind {
        match self {
            Self::Exact => PatternKind::Exact,
            Self::Wildcard(_) => PatternKind::Wildcard,
            Self::Regex(_) => PatternKind::Regex,
        }
    }

    /// Test a query domain against this pattern.
    ///
    /// `key` is the lower-cased pattern the entry was built from; it is only
    /// consulted for exact patterns.
    pub fn matches(&self, key: &str, query: &QueryName<'_>) -> bool {
        match self {
            Self::Exact => query.either(|d| d == key),
            Self::Wildcard(re) | Self::Regex(re) => query.either(|d| re.is_match(d)),
        }
    }
}

/// A lower-cased query domain and its form without the trailing dot.
#[derive(Debug, Clone)]
pub struct QueryName<'a> {
    dotted: Cow<'a, str>,
}

impl<'a> QueryName<'a> {
    pub fn new(domain: &'a str) -> Self {
        let trimmed = domain.trim();
        let dotted = if trimmed.chars().any(char::is_uppercase) {
            Cow::Owned(trimmed.to_lowercase())
        } else {
            Cow::Borrowed(trimmed)
        };
        Self { dotted }
    }

    /// The query as received, lower-cased.
    #[inline]
    pub fn dotted(&self) -> &str {
        &self.dotted
    }

    /// The query with one trailing dot removed.
    #[inline]
    pub fn undotted(&self) -> &str {
        self.dotted().strip_suffix('.').unwrap_or(self.dotted())
    }

    #[inline]
    fn either(&self, mut check: impl FnMut(&str) -> bool) -> bool {
        check(self.dotted()) || check(self.undotted())
    }
}

/// Build the anchored expression for a wildcard key.
///
/// `*.example.com` becomes `^.*\.example\.com$`.
fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$"))
}

/// Check whether `domain` matches the wildcard `pattern`.
///
/// Returns `false` when the pattern cannot be turned into an expression.
pub fn match_wildcard(domain: &str, pattern: &str) -> bool {
    wildcard_regex(pattern).is_ok_and(|re| re.is_match(domain))
}
