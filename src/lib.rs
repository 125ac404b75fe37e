//! ASPICE Traceability Engine
//!
//! Requirement and architecture items are validated against a schema, linked
//! into a typed graph, checked for structural defects and exported as one
//! stable JSON document.

pub mod domain;
pub use domain::{
    Analysis, Config, Graph, Item, ItemId, ItemRecord, ItemStore, LinkError, SchemaError,
    SchemaRegistry, ValidationError, validate_links,
};

/// JSON export of validated graphs.
pub mod export;
pub use export::{ExportBlockedError, ExportDocument, export, export_graph};

/// Loading item records from disk.
pub mod storage;
pub use storage::{LoadError, load_records};
