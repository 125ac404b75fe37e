use std::{borrow::Borrow, fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Serialize, Serializer};

/// A validated item identifier.
///
/// Identifiers consist of uppercase ASCII letters, digits and underscores,
/// start with an uppercase letter and are at least two characters long
/// (`^[A-Z][A-Z0-9_]+$`). For example `SYS_REQ_001` or `SW_ARCH_BRAKE_CTRL`.
///
/// The type-prefix rule (an ID must start with its item type's prefix) is not
/// a lexical property and is enforced by the
/// [`SchemaRegistry`](crate::domain::SchemaRegistry).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ItemId(NonEmptyString);

impl ItemId {
    /// Creates a new `ItemId` from a string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdError`] if the string does not match
    /// `^[A-Z][A-Z0-9_]+$`.
    pub fn new(s: String) -> Result<Self, InvalidIdError> {
        if !is_lexically_valid(&s) {
            return Err(InvalidIdError::Pattern(s));
        }
        let non_empty = NonEmptyString::new(s).map_err(InvalidIdError::Pattern)?;
        Ok(Self(non_empty))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn is_lexically_valid(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_uppercase() {
        return false;
    }
    let mut rest = chars.peekable();
    if rest.peek().is_none() {
        return false;
    }
    rest.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

impl TryFrom<String> for ItemId {
    type Error = InvalidIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ItemId {
    type Error = InvalidIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl FromStr for ItemId {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl Deref for ItemId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Error returned when an item identifier is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum InvalidIdError {
    /// The identifier does not match the lexical ID pattern.
    #[error("invalid item ID '{0}': must match ^[A-Z][A-Z0-9_]+$")]
    Pattern(String),

    /// The identifier does not match the configured ID pattern.
    #[error("invalid item ID '{id}': does not match configured pattern {pattern}")]
    ConfiguredPattern {
        /// The rejected identifier.
        id: String,
        /// The configured regular expression.
        pattern: String,
    },

    /// The identifier does not start with its item type's prefix.
    #[error("invalid item ID '{id}': items of type '{directive}' must start with '{prefix}'")]
    Prefix {
        /// The rejected identifier.
        id: String,
        /// The item type the record declared.
        directive: String,
        /// The prefix required by that item type.
        prefix: String,
    },

    /// The record carries no identifier and IDs are required.
    #[error("missing item ID for record of type '{0}'")]
    Missing(String),
}
