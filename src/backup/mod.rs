// medbackup/src/backup/mod.rs
pub mod archive;
pub mod db_dump;
pub mod logic;
pub mod s3_mirror;
pub mod s3_upload;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::errors::{self, BackupError};
use crate::storage::ObjectStore;

pub use logic::{perform_full_backup, BackupStage};
pub use s3_mirror::MirrorOutcome;
pub use status::BackupStatusReport;

/// Kind of artifact produced by a backup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Database,
    Images,
}

impl ArtifactKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ArtifactKind::Database => "database",
            ArtifactKind::Images => "images",
        }
    }
}

/// A finished, compressed backup waiting on local disk to be shipped.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub kind: ArtifactKind,
    pub local_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl BackupArtifact {
    /// Wraps an already-written file, capturing its on-disk size.
    pub fn from_file(
        kind: ArtifactKind,
        local_path: PathBuf,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let size_bytes = std::fs::metadata(&local_path)
            .with_context(|| format!("Failed to stat artifact file {}", local_path.display()))?
            .len();
        Ok(Self {
            kind,
            local_path,
            created_at,
            size_bytes,
        })
    }

    pub fn file_name(&self) -> Result<&str> {
        self.local_path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| {
                format!(
                    "Artifact path {} has no usable file name",
                    self.local_path.display()
                )
            })
    }
}

/// Outcome of one orchestrated run, reported to the scheduler log or the
/// HTTP caller. Never persisted.
#[derive(Debug, Clone)]
pub struct BackupRunResult {
    pub success: bool,
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

static LAST_RUN_SECOND: AtomicI64 = AtomicI64::new(0);

/// Hands out strictly increasing, second-granular timestamps. Artifacts of
/// the same kind from back-to-back runs therefore never collide on a
/// remote key, even when the runs start within the same wall-clock second.
pub fn allocate_run_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    let mut previous = LAST_RUN_SECOND.load(Ordering::Acquire);
    loop {
        let second = now.timestamp().max(previous + 1);
        match LAST_RUN_SECOND.compare_exchange(previous, second, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => return now + Duration::seconds(second - now.timestamp()),
            Err(observed) => previous = observed,
        }
    }
}

/// Formats a timestamp for artifact names. Colons and periods never appear,
/// keeping the names safe on every filesystem.
pub fn format_backup_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Classifies a backup file name or object key as `database` or `images`,
/// matching the `database_backup_*` / `images_backup_*` naming scheme.
pub fn backup_type_tag(name: &str) -> &'static str {
    if name.contains("database") {
        "database"
    } else {
        "images"
    }
}

/// Entry point shared by the scheduler, the HTTP handlers and the one-shot
/// CLI modes. Owns the in-flight guard that keeps runs from overlapping.
pub struct BackupRunner {
    config: Arc<AppConfig>,
    store: Arc<dyn ObjectStore>,
    in_flight: Mutex<()>,
}

impl BackupRunner {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config,
            store,
            in_flight: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs the full pipeline. Stage failures land inside the returned
    /// [`BackupRunResult`]; the only error is an overlapping run.
    pub async fn run_full(&self) -> errors::Result<BackupRunResult> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| BackupError::AlreadyRunning)?;
        Ok(perform_full_backup(&self.config, self.store.as_ref()).await)
    }

    /// Runs only the database snapshot stage, leaving the artifact on disk.
    pub async fn run_database(&self) -> Result<BackupArtifact> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| BackupError::AlreadyRunning)?;
        db_dump::dump_database(&self.config).await
    }

    /// Runs only the image mirror stage, leaving the artifact on disk.
    pub async fn run_images(&self) -> Result<MirrorOutcome> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| BackupError::AlreadyRunning)?;
        s3_mirror::mirror_images(&self.config, self.store.as_ref()).await
    }

    /// Read-only status query; deliberately not serialized with runs.
    pub async fn status(&self) -> Result<BackupStatusReport> {
        status::collect_backup_status(&self.config, self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_timestamps_are_strictly_increasing() {
        let mut previous = allocate_run_timestamp();
        for _ in 0..5 {
            let next = allocate_run_timestamp();
            assert!(
                next.timestamp() > previous.timestamp(),
                "{next} must be after {previous}"
            );
            previous = next;
        }
    }

    #[test]
    fn formatted_timestamps_are_filesystem_safe() {
        let stamp = Utc.with_ymd_and_hms(2026, 1, 5, 2, 30, 59).unwrap();
        let formatted = format_backup_timestamp(&stamp);

        assert_eq!(formatted, "2026-01-05_02-30-59");
        assert!(!formatted.contains(':'));
        assert!(!formatted.contains('.'));
        assert!(!formatted.contains('/'));
    }

    #[test]
    fn type_tag_follows_artifact_naming() {
        assert_eq!(backup_type_tag("database_backup_2026-01-05_02-00-00.sql.gz"), "database");
        assert_eq!(backup_type_tag("images_backup_2026-01-05_02-00-01.tar.gz"), "images");
        assert_eq!(backup_type_tag("backups/database_backup_x.sql.gz"), "database");
    }
}
