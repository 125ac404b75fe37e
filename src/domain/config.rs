use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::schema::{
    DEFAULT_ID_PATTERN, ItemType, LinkType, SchemaError, SchemaRegistry, TypePair, aspice,
};

/// Configuration for a traceability run.
///
/// This struct describes the schema (item types, link types, extra options
/// and ID rules), the coverage rules evaluated on every export and where the
/// export is written. Every field falls back to the ASPICE defaults, so an
/// empty configuration file describes the built-in ASPICE schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Project name, recorded in the export.
    pub project: String,

    /// Project release, recorded in the export.
    pub version: String,

    /// Regular expression every item ID must match.
    ///
    /// Checked in addition to the built-in `^[A-Z][A-Z0-9_]+$` rule.
    id_regex: String,

    /// Whether records must carry an explicit ID.
    ///
    /// When `false`, records without an ID are given one made of the type's
    /// prefix and a content hash.
    pub id_required: bool,

    /// Number of hash characters in a generated ID.
    id_length: usize,

    /// Attribute keys items may carry.
    extra_options: Vec<String>,

    /// The allowed item types.
    item_types: Vec<ItemType>,

    /// The allowed link types.
    link_types: Vec<LinkType>,

    /// `(source, target)` pairs of item types whose coverage is reported on
    /// export.
    coverage: Vec<TypePair>,

    /// Where the export is written, relative to the working directory.
    pub export_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: default_project(),
            version: default_version(),
            id_regex: default_id_regex(),
            id_required: true,
            id_length: default_id_length(),
            extra_options: default_extra_options(),
            item_types: aspice::item_types(),
            link_types: aspice::link_types(),
            coverage: aspice::coverage_rules(),
            export_path: default_export_path(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))?;
        if config.id_length == 0 {
            return Err(format!("Invalid config file: {}", SchemaError::ZeroIdLength));
        }
        Ok(config)
    }

    /// Loads the configuration if the file exists, otherwise returns the
    /// default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using ASPICE defaults");
            Ok(Self::default())
        }
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Builds the schema registry described by this configuration.
    ///
    /// Item types are registered before link types so that allowed pairs can
    /// be checked against them.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] encountered. Schema errors are fatal
    /// at startup.
    pub fn registry(&self) -> Result<SchemaRegistry, SchemaError> {
        if self.id_length == 0 {
            return Err(SchemaError::ZeroIdLength);
        }
        let mut registry = SchemaRegistry::new();
        registry.set_id_pattern(self.id_regex())?;
        for item_type in &self.item_types {
            registry.register_item_type(item_type.clone())?;
        }
        for link_type in &self.link_types {
            registry.register_link_type(link_type.clone())?;
        }
        for option in &self.extra_options {
            registry.register_extra_option(option.clone());
        }
        Ok(registry)
    }

    /// Returns the number of hash characters in a generated ID.
    #[must_use]
    pub const fn id_length(&self) -> usize {
        self.id_length
    }

    /// Returns the configured ID pattern.
    #[must_use]
    pub fn id_regex(&self) -> &str {
        &self.id_regex
    }

    /// Returns the coverage rules.
    #[must_use]
    pub fn coverage(&self) -> &[TypePair] {
        &self.coverage
    }

    /// Adds a coverage rule.
    ///
    /// Returns `true` if the rule was added, `false` if it already existed.
    pub fn add_coverage_rule(&mut self, rule: TypePair) -> bool {
        if self.coverage.contains(&rule) {
            false
        } else {
            self.coverage.push(rule);
            true
        }
    }
}

fn default_project() -> String {
    "ASPICE Requirements".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_id_regex() -> String {
    DEFAULT_ID_PATTERN.to_string()
}

const fn default_id_length() -> usize {
    5
}

fn default_extra_options() -> Vec<String> {
    aspice::EXTRA_OPTIONS.iter().map(ToString::to_string).collect()
}

fn default_export_path() -> PathBuf {
    PathBuf::from("build/needs/needs.json")
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_project")]
        project: String,

        #[serde(default = "default_version")]
        version: String,

        #[serde(default = "default_id_regex")]
        id_regex: String,

        #[serde(default = "default_true")]
        id_required: bool,

        /// Number of hash characters in generated IDs.
        #[serde(default = "default_id_length")]
        id_length: usize,

        #[serde(default = "default_export_path")]
        export_path: PathBuf,

        #[serde(default = "default_extra_options")]
        extra_options: Vec<String>,

        #[serde(default = "aspice::item_types")]
        item_types: Vec<ItemType>,

        #[serde(default = "aspice::link_types")]
        link_types: Vec<LinkType>,

        #[serde(default = "aspice::coverage_rules")]
        coverage: Vec<TypePair>,
    },
}

const fn default_true() -> bool {
    true
}

impl From<Versions> for super::Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                project,
                version,
                id_regex,
                id_required,
                id_length,
                export_path,
                extra_options,
                item_types,
                link_types,
                coverage,
            } => Self {
                project,
                version,
                id_regex,
                id_required,
                id_length,
                extra_options,
                item_types,
                link_types,
                coverage,
                export_path,
            },
        }
    }
}

impl From<super::Config> for Versions {
    fn from(config: super::Config) -> Self {
        Self::V1 {
            project: config.project,
            version: config.version,
            id_regex: config.id_regex,
            id_required: config.id_required,
            id_length: config.id_length,
            export_path: config.export_path,
            extra_options: config.extra_options,
            item_types: config.item_types,
            link_types: config.link_types,
            coverage: config.coverage,
        }
    }
}
