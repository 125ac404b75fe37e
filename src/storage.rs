//! Loads raw item records from JSON and YAML files.
//!
//! A record file holds a list of records. JSON files (`*.json`) contain an
//! array, YAML files (`*.yaml`, `*.yml`) a sequence. Directories are walked
//! recursively and files are read in sorted path order, so the resulting
//! record order does not depend on the filesystem.

use std::{
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::domain::ItemRecord;

/// Errors that can occur when loading record files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The path does not exist.
    #[error("{}: no such file or directory", .0.display())]
    NotFound(PathBuf),

    /// A file or directory could not be read.
    #[error("{}: {source}", path.display())]
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A JSON file could not be parsed.
    #[error("{}: {source}", path.display())]
    Json {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// A YAML file could not be parsed.
    #[error("{}: {source}", path.display())]
    Yaml {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        source: serde_yaml::Error,
    },

    /// A file given explicitly has an extension that is not a record format.
    #[error("{}: not a record file (expected .json, .yaml or .yml)", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(OsStr::to_str) {
            Some("json") => Some(Self::Json),
            Some("yaml" | "yml") => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Loads every record below `path`.
///
/// `path` may be a single record file or a directory. Files in a directory
/// that are not record files are skipped, as are hidden files and
/// directories.
///
/// # Errors
///
/// Returns the first [`LoadError`] encountered.
#[tracing::instrument(level = "debug")]
pub fn load_records(path: &Path) -> Result<Vec<ItemRecord>, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
        let format = Format::of(path).ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;
        return load_file(path, format);
    }

    let mut records = Vec::new();
    for (file, format) in collect_record_paths(path)? {
        let loaded = load_file(&file, format)?;
        tracing::debug!(path = %file.display(), records = loaded.len(), "loaded record file");
        records.extend(loaded);
    }

    tracing::info!(records = records.len(), "loaded records");
    Ok(records)
}

fn collect_record_paths(root: &Path) -> Result<Vec<(PathBuf, Format)>, LoadError> {
    let mut paths = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| LoadError::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(format) = Format::of(entry.path()) {
            paths.push((entry.into_path(), format));
        }
    }

    Ok(paths)
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

fn load_file(path: &Path, format: Format) -> Result<Vec<ItemRecord>, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match format {
        Format::Json => serde_json::from_str(&content).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Format::Yaml => serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
    }
}
