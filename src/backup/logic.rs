// medbackup/src/backup/logic.rs
use std::fmt;

use anyhow::Error;
use chrono::{SecondsFormat, Utc};

use crate::backup::{db_dump, s3_mirror, s3_upload, BackupRunResult, MirrorOutcome};
use crate::config::AppConfig;
use crate::storage::ObjectStore;

/// Pipeline stage names, attached to failures so a run result can say
/// where the pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    DumpingDatabase,
    ShippingDatabase,
    MirroringImages,
    ShippingImages,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupStage::DumpingDatabase => "database dump",
            BackupStage::ShippingDatabase => "database upload",
            BackupStage::MirroringImages => "image mirror",
            BackupStage::ShippingImages => "image upload",
        };
        f.write_str(name)
    }
}

/// Runs the full backup pipeline: dump and ship the database, then mirror
/// and ship the images. The stages run strictly in that order; the first
/// failure stops the run and later stages are not attempted.
///
/// Never returns an error. The outcome, including which stage failed,
/// lands in the returned [`BackupRunResult`] so the scheduler and the HTTP
/// layer report it instead of unwinding.
pub async fn perform_full_backup(config: &AppConfig, store: &dyn ObjectStore) -> BackupRunResult {
    let started_at = Utc::now();
    println!(
        "=== Starting full backup at {} ===",
        started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    );

    let outcome = run_backup_pipeline(config, store).await;
    let duration = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;

    match outcome {
        Ok(()) => {
            println!("=== Backup completed successfully in {duration:.2} seconds ===");
            BackupRunResult {
                success: true,
                duration,
                timestamp: started_at,
                error: None,
            }
        }
        Err((stage, error)) => {
            eprintln!("=== Backup failed during {stage} after {duration:.2} seconds ===");
            eprintln!("❌ Error: {error:#}");
            BackupRunResult {
                success: false,
                duration,
                timestamp: started_at,
                error: Some(format!("{stage} failed: {error:#}")),
            }
        }
    }
}

async fn run_backup_pipeline(
    config: &AppConfig,
    store: &dyn ObjectStore,
) -> Result<(), (BackupStage, Error)> {
    let database_artifact = db_dump::dump_database(config)
        .await
        .map_err(|e| (BackupStage::DumpingDatabase, e))?;
    let database_key = s3_upload::ship_artifact(store, config, database_artifact)
        .await
        .map_err(|e| (BackupStage::ShippingDatabase, e))?;
    println!("📦 database artifact stored as {database_key}");

    let MirrorOutcome {
        artifact,
        successful_downloads,
        total_objects,
    } = s3_mirror::mirror_images(config, store)
        .await
        .map_err(|e| (BackupStage::MirroringImages, e))?;
    let images_key = s3_upload::ship_artifact(store, config, artifact)
        .await
        .map_err(|e| (BackupStage::ShippingImages, e))?;
    println!("📦 images artifact stored as {images_key} ({successful_downloads}/{total_objects} objects mirrored)");

    Ok(())
}
