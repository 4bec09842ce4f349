// medbackup/src/backup/s3_mirror.rs
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::{future, stream, StreamExt};
use serde::Serialize;

use crate::backup::{allocate_run_timestamp, archive, format_backup_timestamp, ArtifactKind, BackupArtifact};
use crate::config::AppConfig;
use crate::errors::Result as BackupResult;
use crate::storage::{self, ObjectStore, RemoteObject};

/// What the mirror stage produced: the finished archive plus how many of
/// the listed objects actually made it in.
#[derive(Debug)]
pub struct MirrorOutcome {
    pub artifact: BackupArtifact,
    pub successful_downloads: usize,
    pub total_objects: usize,
}

/// Inventory written into every image archive as `manifest.json`. Lists
/// every object the listing reported, including ones whose download failed,
/// so an operator can diff the archive against the bucket.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorManifest {
    pub timestamp: String,
    pub total_objects: usize,
    pub successful_downloads: usize,
    pub objects: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl From<&RemoteObject> for ManifestEntry {
    fn from(object: &RemoteObject) -> Self {
        Self {
            key: object.key.clone(),
            size: object.size,
            last_modified: object.last_modified,
            etag: object.etag.clone(),
        }
    }
}

/// Mirrors the source image bucket into a `images_backup_<timestamp>.tar.gz`
/// archive under the backup directory.
///
/// Individual download failures are logged and tolerated; only listing,
/// manifest or archival failures abort the stage. The staging directory is
/// removed once the archive exists.
pub async fn mirror_images(config: &AppConfig, store: &dyn ObjectStore) -> Result<MirrorOutcome> {
    let source_bucket = config.source_bucket()?;
    let created_at = allocate_run_timestamp();
    let timestamp = format_backup_timestamp(&created_at);
    let staging_dir = config.backup_dir.join(format!("images_backup_{timestamp}"));

    println!("🚀 Starting S3 images backup from bucket {source_bucket}");
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .with_context(|| format!("Failed to create staging directory {}", staging_dir.display()))?;

    let objects = storage::list_all_objects(store, source_bucket, None)
        .await
        .with_context(|| format!("Failed to list objects in source bucket {source_bucket}"))?;
    println!("📂 Found {} objects to back up", objects.len());

    let successful_downloads = download_all_objects(
        store,
        source_bucket,
        &objects,
        &staging_dir,
        config.download_concurrency,
    )
    .await;
    println!(
        "✓ Downloaded {}/{} objects",
        successful_downloads,
        objects.len()
    );

    let manifest = MirrorManifest {
        timestamp: timestamp.clone(),
        total_objects: objects.len(),
        successful_downloads,
        objects: objects.iter().map(ManifestEntry::from).collect(),
    };
    write_manifest(&staging_dir, &manifest).context("Failed to write mirror manifest")?;

    let archive_path = config
        .backup_dir
        .join(format!("images_backup_{timestamp}.tar.gz"));
    archive::create_tar_gz_archive(&staging_dir, &archive_path)?;

    tokio::fs::remove_dir_all(&staging_dir)
        .await
        .with_context(|| format!("Failed to remove staging directory {}", staging_dir.display()))?;

    let artifact = BackupArtifact::from_file(ArtifactKind::Images, archive_path, created_at)?;
    println!(
        "✅ Images backup completed: {} ({} bytes)",
        artifact.local_path.display(),
        artifact.size_bytes
    );

    Ok(MirrorOutcome {
        artifact,
        successful_downloads,
        total_objects: objects.len(),
    })
}

/// Downloads every listed object into the staging directory, at most
/// `concurrency` transfers in flight at a time, and counts the successes.
async fn download_all_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    objects: &[RemoteObject],
    staging_dir: &Path,
    concurrency: usize,
) -> usize {
    let downloads: Vec<_> = objects.iter().map(|object| {
        let local_path = staging_dir.join(sanitize_object_key(&object.key));
        async move {
            match store.download_object(bucket, &object.key, &local_path).await {
                Ok(bytes) => {
                    if bytes != object.size {
                        println!(
                            "⚠️ Size mismatch for {}: listing said {} bytes, downloaded {}",
                            object.key, object.size, bytes
                        );
                    }
                    true
                }
                Err(e) => {
                    eprintln!("❌ Failed to download {}: {:#}", object.key, e);
                    false
                }
            }
        }
    }).collect();

    stream::iter(downloads)
        .buffer_unordered(concurrency.max(1))
        .filter(|succeeded| future::ready(*succeeded))
        .count()
        .await
}

/// Flattens an object key into a file name: every character outside
/// `[A-Za-z0-9.-]` becomes an underscore. Distinct keys can collide after
/// flattening; the manifest keeps the original keys for disambiguation.
pub fn sanitize_object_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn write_manifest(staging_dir: &Path, manifest: &MirrorManifest) -> BackupResult<PathBuf> {
    let manifest_path = staging_dir.join("manifest.json");
    let body = serde_json::to_vec_pretty(manifest)?;
    std::fs::write(&manifest_path, body)?;
    Ok(manifest_path)
}
