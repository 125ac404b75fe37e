//! Domain models for traceability.
//!
//! This module contains the core domain types: the schema registry, item
//! identifiers, items and their store, link validation and the traceability
//! graph.

mod config;
pub use config::Config;

/// Item identifier types and validation.
pub mod item_id;
pub use item_id::{InvalidIdError, ItemId};

/// Item types, link types and the schema registry.
pub mod schema;
pub use schema::{ItemType, LinkType, SchemaError, SchemaRegistry, TypePair};

/// Raw item records and validated items.
pub mod item;
pub use item::{Item, ItemRecord, Link, LinkRecord};

pub mod store;
pub use store::{IngestError, IngestReport, ItemStore, NotFoundError, Rejection};

pub mod links;
pub use links::{LinkError, ValidatedStore, ValidationError, validate_links};

pub mod graph;
pub use graph::{Analysis, Coverage, Cycle, Graph, Orphan};
