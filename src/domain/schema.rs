//! The schema registry: item types, link types and the attribute contract.
//!
//! A [`SchemaRegistry`] is populated once at startup (usually from a
//! [`Config`](crate::Config)) and is read-only afterwards. Item stores borrow
//! it immutably, so once ingestion has started the borrow checker prevents
//! any further registration.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::item_id::{InvalidIdError, ItemId};

/// The built-in ASPICE item types, link types and extra options.
pub mod aspice;

/// The lexical pattern every item ID must match.
pub const DEFAULT_ID_PATTERN: &str = r"^[A-Z][A-Z0-9_]+$";

static DEFAULT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_ID_PATTERN).expect("default ID pattern is valid"));

/// A kind of item, such as a stakeholder requirement or a software
/// architecture element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    /// Symbolic name used by records to declare their type (e.g. `sys_req`).
    pub directive: String,
    /// Human-readable title.
    pub title: String,
    /// Every ID of this type must start with this prefix.
    pub prefix: String,
    /// Presentational style tag, passed through to the export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Presentational colour, passed through to the export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Whether items of this type are expected to have at least one incoming
    /// traceability link. Items that don't are reported as orphans.
    #[serde(default = "default_true")]
    pub requires_traceability: bool,
}

/// A source/target item type combination for which a link type is valid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypePair {
    /// Directive of the item the link starts from.
    pub source: String,
    /// Directive of the item the link points to.
    pub target: String,
}

impl TypePair {
    /// Creates a new type pair.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A kind of directed link between two items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkType {
    /// Option name used by records (e.g. `satisfies`).
    pub option: String,
    /// Label shown on the target side (e.g. "is satisfied by").
    pub incoming: String,
    /// Label shown on the source side (e.g. "satisfies").
    pub outgoing: String,
    /// Presentational style tag, passed through to the export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Presentational colour, passed through to the export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Type pairs for which the link is valid. `None` permits any pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_pairs: Option<BTreeSet<TypePair>>,
    /// Whether links of this type express hierarchical refinement and must
    /// therefore never form a cycle.
    #[serde(default)]
    pub acyclic: bool,
    /// Whether an incoming link of this type counts as traceability coverage
    /// for orphan detection.
    #[serde(default = "default_true")]
    pub traceability: bool,
}

impl LinkType {
    /// Returns `true` if a link of this type may go from an item of type
    /// `source` to an item of type `target`.
    #[must_use]
    pub fn permits(&self, source: &str, target: &str) -> bool {
        self.allowed_pairs.as_ref().is_none_or(|pairs| {
            pairs
                .iter()
                .any(|pair| pair.source == source && pair.target == target)
        })
    }
}

const fn default_true() -> bool {
    true
}

/// Errors raised while populating or querying the schema.
///
/// These are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SchemaError {
    /// An item type with this directive is already registered.
    #[error("item type '{0}' is already registered")]
    DuplicateItemType(String),

    /// A link type with this option name is already registered.
    #[error("link type '{0}' is already registered")]
    DuplicateLinkType(String),

    /// No item type with this directive is registered.
    #[error("unknown item type '{0}'")]
    UnknownItemType(String),

    /// No link type with this option name is registered.
    #[error("unknown link type '{0}'")]
    UnknownLinkType(String),

    /// Two item types have overlapping ID prefixes.
    #[error(
        "prefix '{prefix}' of item type '{directive}' overlaps prefix '{existing_prefix}' of item type '{existing}'"
    )]
    AmbiguousPrefix {
        /// The directive being registered.
        directive: String,
        /// Its prefix.
        prefix: String,
        /// The already registered directive it collides with.
        existing: String,
        /// The already registered prefix.
        existing_prefix: String,
    },

    /// The prefix cannot begin a valid item ID.
    #[error("prefix '{prefix}' of item type '{directive}' cannot start a valid item ID")]
    InvalidPrefix {
        /// The directive being registered.
        directive: String,
        /// The rejected prefix.
        prefix: String,
    },

    /// Generated IDs must carry at least one hash character.
    #[error("generated ID length must be at least 1")]
    ZeroIdLength,

    /// The configured ID pattern is not a valid regular expression.
    #[error("invalid ID pattern '{pattern}': {reason}")]
    InvalidIdPattern {
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// The set of allowed item types, link types and attribute keys.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    item_types: BTreeMap<String, ItemType>,
    link_types: BTreeMap<String, LinkType>,
    extra_options: BTreeSet<String>,
    id_pattern: Regex,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self {
            item_types: BTreeMap::new(),
            link_types: BTreeMap::new(),
            extra_options: BTreeSet::new(),
            id_pattern: DEFAULT_ID_REGEX.clone(),
        }
    }
}

impl SchemaRegistry {
    /// Creates an empty registry using the default ID pattern.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in ASPICE schema: six item types (SYS.1 to SWE.3), the four
    /// traceability link types and the five ASPICE extra options.
    ///
    /// # Panics
    ///
    /// Panics if the built-in schema is inconsistent, which the test suite
    /// rules out.
    #[must_use]
    pub fn aspice() -> Self {
        let mut registry = Self::new();
        for item_type in aspice::item_types() {
            registry
                .register_item_type(item_type)
                .expect("built-in item types are consistent");
        }
        for link_type in aspice::link_types() {
            registry
                .register_link_type(link_type)
                .expect("built-in link types are consistent");
        }
        for option in aspice::EXTRA_OPTIONS {
            registry.register_extra_option(option);
        }
        registry
    }

    /// Registers an item type.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::DuplicateItemType`] if the directive is taken
    /// - [`SchemaError::InvalidPrefix`] if the prefix cannot start an ID
    /// - [`SchemaError::AmbiguousPrefix`] if the prefix is a prefix of an
    ///   existing type's prefix, or the other way around
    pub fn register_item_type(&mut self, item_type: ItemType) -> Result<(), SchemaError> {
        if self.item_types.contains_key(&item_type.directive) {
            return Err(SchemaError::DuplicateItemType(item_type.directive));
        }

        if !is_valid_prefix(&item_type.prefix) {
            return Err(SchemaError::InvalidPrefix {
                directive: item_type.directive,
                prefix: item_type.prefix,
            });
        }

        if let Some(existing) = self.item_types.values().find(|existing| {
            existing.prefix.starts_with(&item_type.prefix)
                || item_type.prefix.starts_with(&existing.prefix)
        }) {
            return Err(SchemaError::AmbiguousPrefix {
                directive: item_type.directive,
                prefix: item_type.prefix,
                existing: existing.directive.clone(),
                existing_prefix: existing.prefix.clone(),
            });
        }

        tracing::debug!(directive = %item_type.directive, prefix = %item_type.prefix, "registered item type");
        self.item_types
            .insert(item_type.directive.clone(), item_type);
        Ok(())
    }

    /// Registers a link type.
    ///
    /// Item types named in `allowed_pairs` must be registered first.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::DuplicateLinkType`] if the option name is taken
    /// - [`SchemaError::UnknownItemType`] if an allowed pair names an
    ///   unregistered item type
    pub fn register_link_type(&mut self, link_type: LinkType) -> Result<(), SchemaError> {
        if self.link_types.contains_key(&link_type.option) {
            return Err(SchemaError::DuplicateLinkType(link_type.option));
        }

        if let Some(pairs) = &link_type.allowed_pairs {
            for pair in pairs {
                self.resolve_item_type(&pair.source)?;
                self.resolve_item_type(&pair.target)?;
            }
        }

        tracing::debug!(option = %link_type.option, "registered link type");
        self.link_types.insert(link_type.option.clone(), link_type);
        Ok(())
    }

    /// Adds an attribute key to the closed set of extra options.
    ///
    /// Returns `true` if the key was not already present.
    pub fn register_extra_option(&mut self, option: impl Into<String>) -> bool {
        self.extra_options.insert(option.into())
    }

    /// Replaces the ID pattern.
    ///
    /// The lexical rule `^[A-Z][A-Z0-9_]+$` is always enforced; the configured
    /// pattern is checked in addition to it.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdPattern`] if the pattern does not
    /// compile.
    pub fn set_id_pattern(&mut self, pattern: &str) -> Result<(), SchemaError> {
        self.id_pattern = Regex::new(pattern).map_err(|e| SchemaError::InvalidIdPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Looks up an item type by directive.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownItemType`] if no such type exists.
    pub fn resolve_item_type(&self, directive: &str) -> Result<&ItemType, SchemaError> {
        self.item_types
            .get(directive)
            .ok_or_else(|| SchemaError::UnknownItemType(directive.to_string()))
    }

    /// Looks up a link type by option name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownLinkType`] if no such type exists.
    pub fn resolve_link_type(&self, option: &str) -> Result<&LinkType, SchemaError> {
        self.link_types
            .get(option)
            .ok_or_else(|| SchemaError::UnknownLinkType(option.to_string()))
    }

    /// Returns `true` if `key` is a registered extra option.
    #[must_use]
    pub fn is_extra_option(&self, key: &str) -> bool {
        self.extra_options.contains(key)
    }

    /// Item types, ordered by directive.
    pub fn item_types(&self) -> impl Iterator<Item = &ItemType> {
        self.item_types.values()
    }

    /// Link types, ordered by option name.
    pub fn link_types(&self) -> impl Iterator<Item = &LinkType> {
        self.link_types.values()
    }

    /// The registered extra options, in lexicographic order.
    #[must_use]
    pub const fn extra_options(&self) -> &BTreeSet<String> {
        &self.extra_options
    }

    /// The active ID pattern.
    #[must_use]
    pub fn id_pattern(&self) -> &str {
        self.id_pattern.as_str()
    }

    /// Validates a raw ID for an item of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIdError`] if the ID fails the lexical rule, the
    /// configured pattern, or does not start with the type's prefix.
    pub fn validate_id(&self, item_type: &ItemType, raw: &str) -> Result<ItemId, InvalidIdError> {
        let id = ItemId::try_from(raw)?;

        if !self.id_pattern.is_match(raw) {
            return Err(InvalidIdError::ConfiguredPattern {
                id: raw.to_string(),
                pattern: self.id_pattern.as_str().to_string(),
            });
        }

        if !raw.starts_with(&item_type.prefix) {
            return Err(InvalidIdError::Prefix {
                id: raw.to_string(),
                directive: item_type.directive.clone(),
                prefix: item_type.prefix.clone(),
            });
        }

        Ok(id)
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn item_type(directive: &str, prefix: &str) -> ItemType {
        ItemType {
            directive: directive.to_string(),
            title: directive.to_string(),
            prefix: prefix.to_string(),
            style: None,
            color: None,
            requires_traceability: true,
        }
    }

    fn link_type(option: &str) -> LinkType {
        LinkType {
            option: option.to_string(),
            incoming: format!("{option} (in)"),
            outgoing: option.to_string(),
            style: None,
            color: None,
            allowed_pairs: None,
            acyclic: false,
            traceability: true,
        }
    }

    #[test]
    fn aspice_schema_is_complete() {
        let registry = SchemaRegistry::aspice();

        let directives: Vec<_> = registry.item_types().map(|t| t.directive.as_str()).collect();
        assert_eq!(
            directives,
            ["stkh_req", "sw_arch", "sw_design", "sw_req", "sys_arch", "sys_req"]
        );

        let options: Vec<_> = registry.link_types().map(|t| t.option.as_str()).collect();
        assert_eq!(options, ["derives_from", "refines", "satisfies", "traces_to"]);

        for key in [
            "aspice_process",
            "safety_class",
            "verification_method",
            "priority",
            "rationale",
        ] {
            assert!(registry.is_extra_option(key), "{key} should be registered");
        }
        assert!(!registry.is_extra_option("owner"));
        assert_eq!(registry.id_pattern(), DEFAULT_ID_PATTERN);
    }

    #[test]
    fn duplicate_item_type_is_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register_item_type(item_type("req", "REQ_")).unwrap();

        let err = registry
            .register_item_type(item_type("req", "OTHER_"))
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateItemType("req".to_string()));
    }

    #[test]
    fn duplicate_link_type_is_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register_link_type(link_type("satisfies")).unwrap();

        let err = registry
            .register_link_type(link_type("satisfies"))
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateLinkType("satisfies".to_string()));
    }

    #[test_case("SYS_REQ_", "SYS_REQ_X_"; "new prefix extends existing")]
    #[test_case("SYS_REQ_X_", "SYS_REQ_"; "existing prefix extends new")]
    #[test_case("SYS_REQ_", "SYS_REQ_"; "identical prefixes")]
    fn overlapping_prefixes_are_ambiguous(first: &str, second: &str) {
        let mut registry = SchemaRegistry::new();
        registry.register_item_type(item_type("first", first)).unwrap();

        let err = registry
            .register_item_type(item_type("second", second))
            .unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousPrefix { existing, .. } if existing == "first"));
        assert!(registry.resolve_item_type("second").is_err());
    }

    #[test]
    fn sibling_prefixes_are_not_ambiguous() {
        let mut registry = SchemaRegistry::new();
        registry.register_item_type(item_type("sys", "SYS_REQ_")).unwrap();
        registry.register_item_type(item_type("sw", "SW_REQ_")).unwrap();
        assert_eq!(registry.item_types().count(), 2);
    }

    #[test_case(""; "empty")]
    #[test_case("sys_"; "lowercase")]
    #[test_case("1_"; "leading digit")]
    fn invalid_prefix_is_rejected(prefix: &str) {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register_item_type(item_type("req", prefix))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPrefix { .. }));
    }

    #[test]
    fn unknown_lookups_fail() {
        let registry = SchemaRegistry::aspice();
        assert_eq!(
            registry.resolve_item_type("test_case").unwrap_err(),
            SchemaError::UnknownItemType("test_case".to_string())
        );
        assert_eq!(
            registry.resolve_link_type("verifies").unwrap_err(),
            SchemaError::UnknownLinkType("verifies".to_string())
        );
    }

    #[test]
    fn allowed_pairs_must_name_registered_types() {
        let mut registry = SchemaRegistry::new();
        registry.register_item_type(item_type("req", "REQ_")).unwrap();

        let mut link = link_type("satisfies");
        link.allowed_pairs = Some([TypePair::new("req", "missing")].into());

        let err = registry.register_link_type(link).unwrap_err();
        assert_eq!(err, SchemaError::UnknownItemType("missing".to_string()));
    }

    #[test]
    fn unrestricted_link_permits_any_pair() {
        let link = link_type("traces_to");
        assert!(link.permits("anything", "whatever"));
    }

    #[test]
    fn restricted_link_permits_only_listed_pairs() {
        let registry = SchemaRegistry::aspice();
        let satisfies = registry.resolve_link_type("satisfies").unwrap();
        assert!(satisfies.permits("sys_req", "stkh_req"));
        assert!(!satisfies.permits("stkh_req", "sys_req"));
        assert!(!satisfies.permits("sw_req", "stkh_req"));
    }

    #[test]
    fn validate_id_checks_prefix() {
        let registry = SchemaRegistry::aspice();
        let sys_req = registry.resolve_item_type("sys_req").unwrap();

        assert!(registry.validate_id(sys_req, "SYS_REQ_001").is_ok());
        assert!(matches!(
            registry.validate_id(sys_req, "SW_REQ_001"),
            Err(InvalidIdError::Prefix { .. })
        ));
        assert!(matches!(
            registry.validate_id(sys_req, "sys_req_001"),
            Err(InvalidIdError::Pattern(_))
        ));
    }

    #[test]
    fn configured_pattern_is_enforced_in_addition() {
        let mut registry = SchemaRegistry::aspice();
        registry.set_id_pattern(r"^[A-Z_]+_\d{3}$").unwrap();
        let sys_req = registry.resolve_item_type("sys_req").unwrap();

        assert!(registry.validate_id(sys_req, "SYS_REQ_001").is_ok());
        assert!(matches!(
            registry.validate_id(sys_req, "SYS_REQ_1"),
            Err(InvalidIdError::ConfiguredPattern { .. })
        ));
    }

    #[test]
    fn invalid_pattern_is_a_schema_error() {
        let mut registry = SchemaRegistry::new();
        let err = registry.set_id_pattern("([A-Z").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidIdPattern { .. }));
    }
}
