// medbackup/src/backup/s3_upload.rs
use anyhow::{Context, Result};

use crate::backup::{backup_type_tag, format_backup_timestamp, BackupArtifact};
use crate::config::AppConfig;
use crate::storage::{ObjectStore, UploadAttributes};

/// Ships a finished artifact to the durable backup bucket.
///
/// The remote key is `<prefix>/<file name>` and the object carries the
/// artifact's creation timestamp and type tag as metadata. The local file is
/// removed only after the store acknowledges the upload, so a failed upload
/// leaves it on disk for manual recovery. Returns the remote key.
pub async fn ship_artifact(
    store: &dyn ObjectStore,
    config: &AppConfig,
    artifact: BackupArtifact,
) -> Result<String> {
    let bucket = config.backup_bucket()?;
    let file_name = artifact.file_name()?;
    let s3_key = format!("{}/{}", config.backup_prefix, file_name);

    println!(
        "Uploading {} to bucket {} with key {}",
        artifact.local_path.display(),
        bucket,
        s3_key
    );

    let attributes = UploadAttributes {
        content_type: "application/gzip".to_string(),
        metadata: vec![
            (
                "backup-date".to_string(),
                format_backup_timestamp(&artifact.created_at),
            ),
            ("backup-type".to_string(), backup_type_tag(file_name).to_string()),
        ],
    };

    store
        .upload_file(bucket, &s3_key, &artifact.local_path, &attributes)
        .await
        .with_context(|| {
            format!(
                "Failed to upload {} to bucket {}",
                artifact.local_path.display(),
                bucket
            )
        })?;

    tokio::fs::remove_file(&artifact.local_path)
        .await
        .with_context(|| {
            format!(
                "Failed to remove local artifact {} after upload",
                artifact.local_path.display()
            )
        })?;

    println!(
        "✅ Successfully uploaded {} ({} bytes) as {}",
        file_name, artifact.size_bytes, s3_key
    );
    Ok(s3_key)
}
