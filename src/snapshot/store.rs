//! Table Snapshot Store
//!
//! Writes `{table}_snapshot_{YYYYmmdd_HHMMSS}.json` under
//! `<store dir>/backups/<database>/`. Two snapshots of one table within the
//! same UTC second share a name and the later one wins.

use crate::db::queries::SqlBuilder;
use crate::db::Datastore;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BACKUP_DIR: &str = "backups";

/// A written snapshot
#[derive(Debug, Clone)]
pub struct SnapshotArtifact {
    pub path: PathBuf,
    pub row_count: usize,
    /// SHA-256 of the written bytes, hex encoded
    pub checksum: String,
    pub captured_at: DateTime<Utc>,
}

pub struct SnapshotService {
    store: Arc<dyn Datastore>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Backup area of the database stored at `db_path`
    pub fn backup_dir(db_path: &Path) -> PathBuf {
        let parent = db_path.parent().unwrap_or_else(|| Path::new("."));
        let stem = db_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        parent.join(BACKUP_DIR).join(stem)
    }

    pub fn file_name(table: &str, captured_at: DateTime<Utc>) -> String {
        format!("{}_snapshot_{}.json", table, captured_at.format("%Y%m%d_%H%M%S"))
    }

    /// Export every row of `table` in `db_name` to a new artifact
    pub fn snapshot(&self, db_name: &str, table: &str) -> Result<SnapshotArtifact, AppError> {
        let db_path = self
            .store
            .resolve(Some(db_name))
            .map_err(|e| AppError::Snapshot(e.to_string()))?;
        let sql = SqlBuilder::select_all(table).map_err(|e| AppError::Snapshot(e.to_string()))?;

        let rows = self
            .store
            .execute(Some(db_name), &sql, &[])
            .map_err(|e| AppError::Snapshot(format!("cannot read {}: {}", table, e)))?
            .into_rows();

        let dir = Self::backup_dir(&db_path);
        std::fs::create_dir_all(&dir)
            .map_err(|e| AppError::Snapshot(format!("cannot create {}: {}", dir.display(), e)))?;

        let captured_at = Utc::now();
        let path = dir.join(Self::file_name(table, captured_at));
        let bytes = serde_json::to_vec_pretty(&rows).map_err(|e| AppError::Snapshot(e.to_string()))?;
        std::fs::write(&path, &bytes)
            .map_err(|e| AppError::Snapshot(format!("cannot write {}: {}", path.display(), e)))?;

        let checksum = format!("{:x}", Sha256::digest(&bytes));

        tracing::debug!("Snapshot of {}.{} written to {}", db_name, table, path.display());

        Ok(SnapshotArtifact {
            path,
            row_count: rows.len(),
            checksum,
            captured_at,
        })
    }
}
