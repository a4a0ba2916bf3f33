//! Snapshot writer.
//!
//! Produces `inventory_<YYYYMMDD>_<HHMMSS>/` with the manifest, run
//! statistics, per-type NDJSON object files, and the relationship graph.
//! JSON documents are written to `<name>.tmp` and renamed into place, so a
//! reader never observes a truncated file.

use crate::models::{InventoryManifest, InventoryStatistics, ObjectRecord};
use crate::runner::RunnerResult;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Snapshot format version carried in the manifest.
pub const SNAPSHOT_VERSION: &str = "2.0";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("write failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization failed for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes one run's snapshot to a timestamped directory.
pub struct SnapshotWriter {
    directory: PathBuf,
}

impl SnapshotWriter {
    /// Creates a writer rooted at `output_root`, using the conventional
    /// timestamped directory name.
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Self::with_directory_name(output_root, format!("inventory_{}", stamp))
    }

    /// Creates a writer with an explicit directory name (tests use this
    /// for determinism).
    pub fn with_directory_name(output_root: impl AsRef<Path>, name: impl AsRef<str>) -> Self {
        Self {
            directory: output_root.as_ref().join(name.as_ref()),
        }
    }

    /// The snapshot directory this writer produces.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes the complete snapshot: manifest, statistics, object NDJSON
    /// files, graph, and orphan sets.
    pub fn write(
        &self,
        result: &RunnerResult,
        statistics: &InventoryStatistics,
        options: serde_json::Value,
    ) -> Result<PathBuf, SnapshotError> {
        self.create_dirs()?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for extractor_result in result.results.values() {
            if extractor_result.items.is_empty() {
                continue;
            }
            let kind = extractor_result.items[0].kind.as_str().to_string();
            *counts.entry(kind.clone()).or_default() += extractor_result.items.len();
            self.write_ndjson(
                &self.directory.join("objects").join(format!("{}.ndjson", kind)),
                &extractor_result.items,
            )?;
        }

        self.write_json(
            &self.directory.join("relationships").join("graph.json"),
            &result.graph,
        )?;
        self.write_json(
            &self.directory.join("relationships").join("orphans.json"),
            &result.graph.orphan_ids_by_kind(),
        )?;
        self.write_json(&self.directory.join("statistics.json"), statistics)?;

        let manifest = InventoryManifest {
            version: SNAPSHOT_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            options,
            extractor_kinds: result.kinds.iter().map(|k| k.as_str().to_string()).collect(),
            counts,
            duration_ms: result.duration_ms(),
        };
        self.write_json(&self.directory.join("manifest.json"), &manifest)?;

        info!(directory = %self.directory.display(), "snapshot written");
        Ok(self.directory.clone())
    }

    fn create_dirs(&self) -> Result<(), SnapshotError> {
        for dir in [
            self.directory.clone(),
            self.directory.join("objects"),
            self.directory.join("relationships"),
        ] {
            fs::create_dir_all(&dir).map_err(|source| SnapshotError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Serializes to `<path>.tmp`, then renames into place.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), SnapshotError> {
        let body = serde_json::to_vec_pretty(value).map_err(|source| SnapshotError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_atomic(path, |file| file.write_all(&body))
    }

    /// One record per line, UTF-8, `\n`-terminated, flushed before rename.
    fn write_ndjson(&self, path: &Path, records: &[ObjectRecord]) -> Result<(), SnapshotError> {
        let mut lines = Vec::new();
        for record in records {
            serde_json::to_writer(&mut lines, record).map_err(|source| {
                SnapshotError::Serialize {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            lines.push(b'\n');
        }
        self.write_atomic(path, |file| file.write_all(&lines))
    }

    fn write_atomic(
        &self,
        path: &Path,
        write_body: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    ) -> Result<(), SnapshotError> {
        let tmp_path = path.with_extension(match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.tmp", ext),
            None => "tmp".to_string(),
        });
        let io_err = |source: std::io::Error| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(&tmp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        write_body(&mut writer).map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        drop(writer);
        fs::rename(&tmp_path, path).map_err(io_err)?;
        Ok(())
    }
}
