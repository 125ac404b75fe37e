//! The exporter turns a structurally valid graph into one JSON document.
//!
//! Export is all-or-nothing: an unsealed store, an invalid link or a
//! refinement cycle blocks it entirely, and nothing is written. Orphans and
//! coverage gaps are advisory and are embedded in the `validation` block.
//!
//! The document is deterministic. Items are sorted by ID, every object's
//! keys are emitted in lexicographic order and nothing time-dependent is
//! recorded, so exporting an unchanged store twice yields identical bytes.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::Path,
};

use nonempty::NonEmpty;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::domain::{
    Config, Coverage, Cycle, Graph, ItemId, ItemRecord, ItemStore, ItemType, Link, LinkError,
    LinkType, Orphan, Rejection, SchemaError, SchemaRegistry, ValidationError, validate_links,
};

/// Why an export was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportBlockedError {
    /// The store still accepts writes.
    #[error("export blocked: the item store is not sealed")]
    NotSealed,

    /// Some records were rejected during ingestion.
    #[error("export blocked: {} record(s) rejected during ingestion", .0.len())]
    RejectedRecords(NonEmpty<Rejection>),

    /// Link validation failed.
    #[error("export blocked: {} invalid link(s)", .0.len())]
    InvalidLinks(NonEmpty<LinkError>),

    /// Refinement links form at least one cycle.
    #[error("export blocked: {} refinement cycle(s)", .0.len())]
    Cycles(NonEmpty<Cycle>),

    /// A coverage rule names an unknown item type.
    #[error("export blocked: {0}")]
    Schema(#[from] SchemaError),
}

impl From<ValidationError> for ExportBlockedError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::StoreNotSealed => Self::NotSealed,
            ValidationError::Links(violations) => Self::InvalidLinks(violations),
        }
    }
}

/// The exported artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDocument {
    /// Project name.
    pub project: String,
    /// Project release.
    pub version: String,
    /// The schema the items were validated against.
    pub schema: ExportSchema,
    /// Every item, sorted by ID.
    pub items: Vec<ExportItem>,
    /// Advisory findings (and the empty list of cycles).
    pub validation: ExportValidation,
}

/// The schema section of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSchema {
    /// The active ID pattern.
    pub id_pattern: String,
    /// Allowed attribute keys.
    pub extra_options: Vec<String>,
    /// Item types, by directive.
    pub item_types: Vec<ItemType>,
    /// Link types, by option.
    pub link_types: Vec<LinkType>,
}

/// One item in an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportItem {
    /// The item's ID.
    pub id: ItemId,
    /// The item's type directive.
    #[serde(rename = "type")]
    pub item_type: String,
    /// Title, possibly empty.
    pub title: String,
    /// Body content, possibly empty.
    pub content: String,
    /// Extra options.
    pub attributes: BTreeMap<String, String>,
    /// Outgoing links, in authored order.
    pub links: Vec<Link>,
    /// Incoming links, derived from the graph and sorted by source.
    pub back_links: Vec<BackLink>,
    /// Content fingerprint.
    pub fingerprint: String,
}

/// An incoming link, seen from its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackLink {
    /// The link type's option name.
    pub option: String,
    /// The item that declares the link.
    pub source: ItemId,
}

/// The `validation` section of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportValidation {
    /// Refinement cycles. Always empty in a written export.
    pub cycles: Vec<Cycle>,
    /// Items lacking expected incoming traceability.
    pub orphans: Vec<Orphan>,
    /// Coverage per configured rule.
    pub coverage: Vec<Coverage>,
}

impl ExportDocument {
    /// Renders the document as pretty-printed JSON with sorted keys and a
    /// trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        // `serde_json::Value` keeps object keys in a `BTreeMap`, which sorts them.
        let value = serde_json::to_value(self)?;
        let mut json = serde_json::to_string_pretty(&value)?;
        json.push('\n');
        Ok(json)
    }

    /// Writes the document to `path`, creating parent directories.
    ///
    /// The document is written to a sibling temporary file which is then
    /// renamed over `path`, so a failed write never leaves a truncated export
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or the file
    /// cannot be written.
    #[instrument(level = "debug", skip(self))]
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::other)?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "export path has no file name"))?;
        let tmp = parent.join(format!(
            ".{}.tmp.{}",
            file_name.to_string_lossy(),
            std::process::id()
        ));

        let written = write_synced(&tmp, json.as_bytes()).and_then(|()| fs::rename(&tmp, path));
        if let Err(error) = written {
            let _ = fs::remove_file(&tmp);
            return Err(error);
        }

        tracing::info!(path = %path.display(), items = self.items.len(), "wrote export");
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Validates a sealed store, builds its graph and exports it.
///
/// # Errors
///
/// Returns [`ExportBlockedError`] if the store is unsealed, a link is
/// invalid, refinement links form a cycle, or a coverage rule is unknown.
#[instrument(level = "debug", skip_all, fields(items = store.len()))]
pub fn export(store: &ItemStore<'_>, config: &Config) -> Result<ExportDocument, ExportBlockedError> {
    let validated = validate_links(store)?;
    let graph = Graph::build(validated);
    export_graph(&graph, config)
}

/// Exports an already built graph.
///
/// # Errors
///
/// Returns [`ExportBlockedError::Cycles`] if refinement links form a cycle,
/// or [`ExportBlockedError::Schema`] if a coverage rule is unknown.
pub fn export_graph(graph: &Graph<'_, '_>, config: &Config) -> Result<ExportDocument, ExportBlockedError> {
    let analysis = graph.analyse(config.coverage())?;
    if let Some(cycles) = NonEmpty::from_vec(analysis.cycles) {
        return Err(ExportBlockedError::Cycles(cycles));
    }

    let store = graph.store();
    let registry = store.registry();

    let items = store
        .iter()
        .map(|item| {
            let back_links = graph
                .incoming(item.id())
                .unwrap_or_default()
                .into_iter()
                .map(|(source, link_type)| BackLink {
                    option: link_type.option.clone(),
                    source: source.id().clone(),
                })
                .collect();

            ExportItem {
                id: item.id().clone(),
                item_type: item.directive().to_string(),
                title: item.title().to_string(),
                content: item.content().to_string(),
                attributes: item.attributes().clone(),
                links: item.links().to_vec(),
                back_links,
                fingerprint: item.fingerprint(),
            }
        })
        .collect();

    Ok(ExportDocument {
        project: config.project.clone(),
        version: config.version.clone(),
        schema: ExportSchema::from(registry),
        items,
        validation: ExportValidation {
            cycles: Vec::new(),
            orphans: analysis.orphans,
            coverage: analysis.coverage,
        },
    })
}

/// Runs a complete ingestion: ingest every record, seal, validate and
/// export.
///
/// Any rejected record blocks the export, so a partially valid set of
/// records is never exported.
///
/// # Errors
///
/// Returns [`ExportBlockedError::RejectedRecords`] with every rejection, or
/// any error of [`export`].
pub fn export_records(
    registry: &SchemaRegistry,
    config: &Config,
    records: impl IntoIterator<Item = ItemRecord>,
) -> Result<ExportDocument, ExportBlockedError> {
    let mut store = ItemStore::new(registry);
    if !config.id_required {
        store = store.generate_missing_ids(config.id_length());
    }

    let report = store.ingest(records);
    if let Some(rejected) = NonEmpty::from_vec(report.rejected) {
        return Err(ExportBlockedError::RejectedRecords(rejected));
    }

    store.seal();
    export(&store, config)
}

impl From<&SchemaRegistry> for ExportSchema {
    fn from(registry: &SchemaRegistry) -> Self {
        Self {
            id_pattern: registry.id_pattern().to_string(),
            extra_options: registry.extra_options().iter().cloned().collect(),
            item_types: registry.item_types().cloned().collect(),
            link_types: registry.link_types().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn sealed<'r>(registry: &'r SchemaRegistry, records: Vec<ItemRecord>) -> ItemStore<'r> {
        let mut store = ItemStore::new(registry);
        assert!(store.ingest(records).is_clean());
        store.seal();
        store
    }

    fn minimal() -> Vec<ItemRecord> {
        vec![
            ItemRecord::new("STKH_REQ_001", "stkh_req")
                .with_title("Stable braking on slippery roads")
                .with_attribute("aspice_process", "SYS.1"),
            ItemRecord::new("SYS_REQ_001", "sys_req")
                .with_title("Wheel slip detection")
                .with_attribute("aspice_process", "SYS.2")
                .with_attribute("safety_class", "ASIL-D")
                .with_link("satisfies", "STKH_REQ_001"),
        ]
    }

    #[test]
    fn exports_minimal_example() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(&registry, minimal());

        let document = export(&store, &Config::default()).unwrap();

        let ids: Vec<_> = document.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, ["STKH_REQ_001", "SYS_REQ_001"]);

        let stkh = &document.items[0];
        assert!(stkh.links.is_empty());
        assert_eq!(
            stkh.back_links,
            [BackLink {
                option: "satisfies".to_string(),
                source: ItemId::try_from("SYS_REQ_001").unwrap(),
            }]
        );

        let sys = &document.items[1];
        assert_eq!(
            sys.links,
            [Link {
                option: "satisfies".to_string(),
                target: "STKH_REQ_001".to_string(),
            }]
        );
        assert_eq!(sys.attributes["safety_class"], "ASIL-D");
        assert!(document.validation.cycles.is_empty());
        // nothing traces to the system requirement yet
        assert_eq!(document.validation.orphans.len(), 1);
        assert_eq!(document.validation.orphans[0].id.as_str(), "SYS_REQ_001");
    }

    #[test]
    fn json_layout() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(&registry, minimal());
        let json = export(&store, &Config::default()).unwrap().to_json().unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["items", "project", "schema", "validation", "version"]);

        let item = &value["items"][1];
        assert_eq!(item["id"], "SYS_REQ_001");
        assert_eq!(item["type"], "sys_req");
        assert_eq!(item["links"][0]["option"], "satisfies");
        assert_eq!(item["links"][0]["target"], "STKH_REQ_001");
        assert_eq!(value["items"][0]["links"].as_array().unwrap().len(), 0);
        assert_eq!(value["schema"]["link_types"][0]["option"], "derives_from");
        assert_eq!(value["schema"]["link_types"][2]["incoming"], "is satisfied by");
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn export_is_byte_identical_across_runs() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(&registry, minimal());
        let config = Config::default();

        let first = export(&store, &config).unwrap().to_json().unwrap();
        let second = export(&store, &config).unwrap().to_json().unwrap();
        assert_eq!(first, second);

        // ingestion order does not matter either
        let mut reversed = minimal();
        reversed.reverse();
        let other = sealed(&registry, reversed);
        assert_eq!(first, export(&other, &config).unwrap().to_json().unwrap());
    }

    #[test]
    fn unsealed_store_blocks_export_and_writes_nothing() {
        let registry = SchemaRegistry::aspice();
        let mut store = ItemStore::new(&registry);
        assert!(store.ingest(minimal()).is_clean());

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("needs.json");

        let result = export(&store, &Config::default()).and_then(|document| {
            document.write(&path).unwrap();
            Ok(document)
        });

        assert_eq!(result.unwrap_err(), ExportBlockedError::NotSealed);
        assert!(!path.exists());
    }

    #[test]
    fn invalid_links_block_export() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(
            &registry,
            vec![
                ItemRecord::new("STKH_REQ_001", "stkh_req"),
                ItemRecord::new("SW_REQ_001", "sw_req").with_link("satisfies", "STKH_REQ_001"),
                ItemRecord::new("SW_REQ_002", "sw_req").with_link("derives_from", "SYS_REQ_404"),
            ],
        );

        let err = export(&store, &Config::default()).unwrap_err();
        let ExportBlockedError::InvalidLinks(violations) = err else {
            panic!("expected invalid links, got {err:?}");
        };
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn cycles_block_export() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(
            &registry,
            vec![
                ItemRecord::new("SW_REQ_A", "sw_req").with_link("derives_from", "SW_REQ_B"),
                ItemRecord::new("SW_REQ_B", "sw_req").with_link("derives_from", "SW_REQ_A"),
            ],
        );

        let err = export(&store, &Config::default()).unwrap_err();
        let ExportBlockedError::Cycles(cycles) = err else {
            panic!("expected cycles, got {err:?}");
        };
        assert_eq!(cycles.head.to_string(), "SW_REQ_A -> SW_REQ_B -> SW_REQ_A");
    }

    #[test]
    fn rejected_records_block_export() {
        let registry = SchemaRegistry::aspice();
        let mut records = minimal();
        records.push(ItemRecord::new("bad id", "sys_req"));

        let err = export_records(&registry, &Config::default(), records).unwrap_err();
        let ExportBlockedError::RejectedRecords(rejected) = err else {
            panic!("expected rejected records, got {err:?}");
        };
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected.head.index, 2);
    }

    #[test]
    fn export_records_generates_ids_when_allowed() {
        let registry = SchemaRegistry::aspice();
        let mut config = Config::default();
        config.id_required = false;

        let record = ItemRecord {
            directive: "stkh_req".to_string(),
            title: "Driver can always stop the vehicle".to_string(),
            ..ItemRecord::default()
        };
        let expected = format!("STKH_REQ_{}", record.id_hash(config.id_length()));

        let document = export_records(&registry, &config, [record]).unwrap();
        assert_eq!(document.items[0].id.as_str(), expected);
    }

    #[test]
    fn write_replaces_existing_export_without_leftovers() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(&registry, minimal());
        let document = export(&store, &Config::default()).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("needs.json");
        std::fs::write(&path, "stale").unwrap();

        document.write(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), document.to_json().unwrap());
        let entries: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["needs.json"]);
    }

    #[test]
    fn failed_write_keeps_previous_export() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(&registry, minimal());
        let document = export(&store, &Config::default()).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        // a directory at the target path makes the final rename fail
        let path = tmp.path().join("needs.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "previous").unwrap();

        assert!(document.write(&path).is_err());
        assert_eq!(std::fs::read_to_string(path.join("keep")).unwrap(), "previous");
        let leftovers = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().file_name() != "needs.json")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn write_creates_parent_directories() {
        let registry = SchemaRegistry::aspice();
        let store = sealed(&registry, minimal());
        let document = export(&store, &Config::default()).unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("build/needs/needs.json");
        document.write(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, document.to_json().unwrap());
    }
}
