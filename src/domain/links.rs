//! Cross-checks every outgoing link against the store and the schema.

use nonempty::NonEmpty;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;
use tracing::instrument;

use crate::domain::{ItemId, ItemStore, item::Item};

/// A single defective link.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The link's option names no registered link type.
    #[error("{item}: unknown link type '{option}'")]
    UnknownLinkType {
        /// The item the link starts from.
        item: ItemId,
        /// The unregistered option name.
        option: String,
    },

    /// The link's target is not in the store.
    #[error("{item}: '{option}' link target {target} does not exist")]
    Unresolved {
        /// The item the link starts from.
        item: ItemId,
        /// The link type's option name.
        option: String,
        /// The missing target ID, as authored.
        target: String,
    },

    /// The link type does not permit this combination of item types.
    #[error(
        "{item}: '{option}' link from {item_type} to {target_type} ({target}) is not allowed"
    )]
    InvalidPair {
        /// The item the link starts from.
        item: ItemId,
        /// The source item's type.
        item_type: String,
        /// The link type's option name.
        option: String,
        /// The target item.
        target: ItemId,
        /// The target item's type.
        target_type: String,
    },
}

/// Why a store could not be validated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Links can only be validated on a sealed store.
    #[error("item store must be sealed before links are validated")]
    StoreNotSealed,

    /// One or more links are defective. Every violation is listed.
    #[error("{} invalid link(s)", .0.len())]
    Links(NonEmpty<LinkError>),
}

/// Proof that a sealed store passed link validation.
///
/// Only a `ValidatedStore` can be turned into a
/// [`Graph`](crate::domain::Graph).
#[derive(Debug, Clone, Copy)]
pub struct ValidatedStore<'s, 'r> {
    store: &'s ItemStore<'r>,
}

impl<'s, 'r> ValidatedStore<'s, 'r> {
    /// The validated store.
    #[must_use]
    pub const fn store(&self) -> &'s ItemStore<'r> {
        self.store
    }
}

/// Validates every link of every item in a sealed store.
///
/// Violations are collected exhaustively in one pass and reported ordered by
/// source item ID, then by link position. Items are checked in parallel;
/// the store is sealed, so concurrent readers are safe.
///
/// # Errors
///
/// - [`ValidationError::StoreNotSealed`] if the store still accepts writes
/// - [`ValidationError::Links`] with every violation found
#[instrument(level = "debug", skip_all, fields(items = store.len()))]
pub fn validate_links<'s, 'r>(
    store: &'s ItemStore<'r>,
) -> Result<ValidatedStore<'s, 'r>, ValidationError> {
    if !store.is_sealed() {
        return Err(ValidationError::StoreNotSealed);
    }

    let items: Vec<&Item> = store.iter().collect();
    let violations: Vec<LinkError> = items
        .par_iter()
        .map(|item| check_item(store, item))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    match NonEmpty::from_vec(violations) {
        None => {
            tracing::debug!("all links valid");
            Ok(ValidatedStore { store })
        }
        Some(violations) => {
            tracing::warn!(count = violations.len(), "link validation failed");
            Err(ValidationError::Links(violations))
        }
    }
}

fn check_item(store: &ItemStore<'_>, item: &Item) -> Vec<LinkError> {
    let registry = store.registry();
    let mut violations = Vec::new();

    for link in item.links() {
        let Ok(link_type) = registry.resolve_link_type(&link.option) else {
            violations.push(LinkError::UnknownLinkType {
                item: item.id().clone(),
                option: link.option.clone(),
            });
            continue;
        };

        let Ok(target) = store.get(&link.target) else {
            violations.push(LinkError::Unresolved {
                item: item.id().clone(),
                option: link.option.clone(),
                target: link.target.clone(),
            });
            continue;
        };

        if !link_type.permits(item.directive(), target.directive()) {
            violations.push(LinkError::InvalidPair {
                item: item.id().clone(),
                item_type: item.directive().to_string(),
                option: link.option.clone(),
                target: target.id().clone(),
                target_type: target.directive().to_string(),
            });
        }
    }

    violations
}
