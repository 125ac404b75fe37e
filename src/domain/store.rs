//! In-memory store of validated items.
//!
//! The [`ItemStore`] knows nothing about the filesystem or how records were
//! authored. It validates each record against the [`SchemaRegistry`] on the
//! way in, and once [sealed](ItemStore::seal) it is a read-only snapshot that
//! may be shared between any number of readers.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::instrument;

use crate::domain::{
    ItemId, SchemaRegistry,
    item::{Item, ItemRecord, Link},
    item_id::InvalidIdError,
};

/// Errors that reject a single record during ingestion.
///
/// A rejected record leaves the store unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The store has been sealed and accepts no further items.
    #[error("store is sealed; no further items can be added")]
    StoreSealed,

    /// The record's directive names no registered item type.
    #[error("unknown item type '{0}'")]
    UnknownItemType(String),

    /// The record's ID is missing, malformed or carries the wrong prefix.
    #[error(transparent)]
    InvalidId(#[from] InvalidIdError),

    /// The record carries an attribute outside the registered extra options.
    #[error("item {id} has unknown attribute '{key}'")]
    UnknownAttribute {
        /// The record's ID.
        id: ItemId,
        /// The rejected attribute key.
        key: String,
    },

    /// An item with the same ID is already in the store.
    #[error("duplicate item ID {0}")]
    DuplicateId(ItemId),
}

/// Error returned when looking up an ID that isn't in the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("item {0} not found")]
pub struct NotFoundError(pub String);

/// A record rejected during batch ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position of the record in the ingested batch.
    pub index: usize,
    /// The record's ID as authored, if it had one.
    pub id: Option<String>,
    /// Why the record was rejected.
    pub error: IngestError,
}

/// Outcome of ingesting a batch of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// IDs of the accepted items, in ingestion order.
    pub accepted: Vec<ItemId>,
    /// Every rejected record.
    pub rejected: Vec<Rejection>,
}

impl IngestReport {
    /// Returns `true` if every record was accepted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// A store of validated items keyed by ID.
///
/// Items are kept in lexicographic ID order. Only outgoing links are stored;
/// incoming links are derived by [`ItemStore::incoming`].
#[derive(Debug, Clone)]
pub struct ItemStore<'r> {
    registry: &'r SchemaRegistry,
    items: BTreeMap<ItemId, Item>,
    sealed: bool,
    /// Number of hash characters in generated IDs, or `None` if records must
    /// carry an explicit ID.
    generated_id_length: Option<usize>,
}

impl<'r> ItemStore<'r> {
    /// Creates an empty, unsealed store validating against `registry`.
    ///
    /// Records must carry an explicit ID.
    #[must_use]
    pub const fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            items: BTreeMap::new(),
            sealed: false,
            generated_id_length: None,
        }
    }

    /// Allows records without an ID; they receive the type prefix followed by
    /// `length` hash characters.
    #[must_use]
    pub fn generate_missing_ids(mut self, length: usize) -> Self {
        self.generated_id_length = Some(length);
        self
    }

    /// The schema this store validates against.
    #[must_use]
    pub const fn registry(&self) -> &'r SchemaRegistry {
        self.registry
    }

    /// Validates a record and adds it to the store.
    ///
    /// # Errors
    ///
    /// - [`IngestError::StoreSealed`] if the store is sealed
    /// - [`IngestError::UnknownItemType`] if the directive is not registered
    /// - [`IngestError::InvalidId`] if the ID is missing, does not match the ID
    ///   pattern or does not start with the type's prefix
    /// - [`IngestError::UnknownAttribute`] if an attribute key is not a
    ///   registered extra option
    /// - [`IngestError::DuplicateId`] if the ID is already taken
    ///
    /// On error the store is unchanged.
    pub fn add_item(&mut self, record: ItemRecord) -> Result<&Item, IngestError> {
        if self.sealed {
            return Err(IngestError::StoreSealed);
        }

        let item_type = self
            .registry
            .resolve_item_type(&record.directive)
            .map_err(|_| IngestError::UnknownItemType(record.directive.clone()))?;

        let raw_id = match (&record.id, self.generated_id_length) {
            (Some(id), _) => id.clone(),
            (None, Some(length)) => format!("{}{}", item_type.prefix, record.id_hash(length)),
            (None, None) => return Err(InvalidIdError::Missing(record.directive).into()),
        };
        let id = self.registry.validate_id(item_type, &raw_id)?;

        if let Some(key) = record
            .attributes
            .keys()
            .find(|key| !self.registry.is_extra_option(key))
        {
            return Err(IngestError::UnknownAttribute {
                id,
                key: key.clone(),
            });
        }

        if self.items.contains_key(&id) {
            return Err(IngestError::DuplicateId(id));
        }

        let item = Item {
            id: id.clone(),
            directive: record.directive,
            title: record.title,
            content: record.content,
            attributes: record.attributes,
            links: record
                .links
                .into_iter()
                .map(|link| Link {
                    option: link.option,
                    target: link.target,
                })
                .collect(),
        };

        tracing::trace!(%id, "added item");
        Ok(self.items.entry(id).or_insert(item))
    }

    /// Adds every record, continuing past rejections.
    ///
    /// Every rejection is recorded in the returned report; nothing is
    /// dropped silently.
    #[instrument(level = "debug", skip_all)]
    pub fn ingest(&mut self, records: impl IntoIterator<Item = ItemRecord>) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, record) in records.into_iter().enumerate() {
            let authored_id = record.id.clone();
            match self.add_item(record) {
                Ok(item) => report.accepted.push(item.id.clone()),
                Err(error) => {
                    tracing::warn!(index, id = ?authored_id, %error, "rejected record");
                    report.rejected.push(Rejection {
                        index,
                        id: authored_id,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "ingestion finished"
        );
        report
    }

    /// Stops the store accepting new items.
    ///
    /// Sealing is idempotent.
    pub fn seal(&mut self) {
        if !self.sealed {
            tracing::debug!(items = self.items.len(), "sealed item store");
        }
        self.sealed = true;
    }

    /// Whether the store has been sealed.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Retrieves an item by ID.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] if no item has this ID.
    pub fn get(&self, id: &str) -> Result<&Item, NotFoundError> {
        self.items
            .get(id)
            .ok_or_else(|| NotFoundError(id.to_string()))
    }

    /// Returns `true` if an item with this ID exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Number of items in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over all items in lexicographic ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Items of the given type, in ID order.
    pub fn items_of_type<'a>(&'a self, directive: &'a str) -> impl Iterator<Item = &'a Item> {
        self.items
            .values()
            .filter(move |item| item.directive == directive)
    }

    /// Incoming links to `id`, as `(source item, link)` pairs ordered by
    /// source ID.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = (&'a Item, &'a Link)> {
        self.items.values().flat_map(move |source| {
            source
                .links
                .iter()
                .filter(move |link| link.target == id)
                .map(move |link| (source, link))
        })
    }
}
