// medbackup/src/backup/db_dump.rs
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::process::Command;
use which::which;

use crate::backup::{allocate_run_timestamp, archive, format_backup_timestamp, ArtifactKind, BackupArtifact};
use crate::config::{AppConfig, DatabaseConfig};
use crate::errors::BackupError;

/// Locates the pg_dump executable, honoring an explicit override from the
/// configuration before falling back to a PATH search.
fn find_pg_dump_executable(database: &DatabaseConfig) -> Result<PathBuf> {
    if let Some(path) = &database.pg_dump_path {
        return Ok(path.clone());
    }
    which("pg_dump")
        .context("pg_dump executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH.")
}

/// Dumps the configured database with pg_dump and compresses the result.
///
/// The raw `.sql` dump only exists transiently: it is gzipped to
/// `database_backup_<timestamp>.sql.gz` and removed, and a failed pg_dump
/// never leaves a partial dump file behind.
pub async fn dump_database(config: &AppConfig) -> Result<BackupArtifact> {
    let database = &config.database;
    let db_name = config.database_name()?;
    let pg_dump_path = find_pg_dump_executable(database)?;

    tokio::fs::create_dir_all(&config.backup_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create backup directory {}",
                config.backup_dir.display()
            )
        })?;

    let created_at = allocate_run_timestamp();
    let timestamp = format_backup_timestamp(&created_at);
    let dump_file_name = format!("database_backup_{timestamp}.sql");
    let dump_file_path = config.backup_dir.join(&dump_file_name);

    println!("🚀 Starting database backup: {dump_file_name}");

    let output = Command::new(&pg_dump_path)
        .arg("-h")
        .arg(&database.host)
        .arg("-p")
        .arg(database.port.to_string())
        .arg("-U")
        .arg(&database.user)
        .arg("-d")
        .arg(db_name)
        .arg("-f")
        .arg(&dump_file_path)
        .arg("--no-password")
        .env("PGPASSWORD", &database.password)
        .output()
        .await
        .with_context(|| format!("Failed to execute pg_dump at {}", pg_dump_path.display()))?;

    if !output.status.success() {
        // A partial dump is useless and must not be shipped.
        let _ = tokio::fs::remove_file(&dump_file_path).await;
        return Err(BackupError::Command {
            program: "pg_dump".to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    let compressed_path = archive::gzip_file(&dump_file_path)
        .with_context(|| format!("Failed to compress dump file {}", dump_file_path.display()))?;
    tokio::fs::remove_file(&dump_file_path)
        .await
        .with_context(|| format!("Failed to remove raw dump file {}", dump_file_path.display()))?;

    let artifact = BackupArtifact::from_file(ArtifactKind::Database, compressed_path, created_at)?;
    println!(
        "✅ Database backup completed: {} ({} bytes)",
        artifact.local_path.display(),
        artifact.size_bytes
    );
    Ok(artifact)
}
