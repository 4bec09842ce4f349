// medbackup/src/backup/status.rs
use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backup::backup_type_tag;
use crate::config::AppConfig;
use crate::storage::{self, ObjectStore, RemoteObject};

/// One artifact currently sitting in the backup bucket.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBackup {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub backup_type: String,
}

/// Snapshot of the backup bucket, grouped by the calendar date each
/// artifact was written. `retention_days` is advisory: the service never
/// deletes anything, operators prune with the window in hand.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatusReport {
    pub total_backups: usize,
    pub backup_groups: BTreeMap<String, Vec<StoredBackup>>,
    pub retention_days: u32,
}

/// Lists everything under the backup prefix and groups it by date.
pub async fn collect_backup_status(
    config: &AppConfig,
    store: &dyn ObjectStore,
) -> Result<BackupStatusReport> {
    let bucket = config.backup_bucket()?;
    let objects = storage::list_all_objects(store, bucket, Some(&config.backup_prefix))
        .await
        .with_context(|| format!("Failed to list backups in bucket {bucket}"))?;

    let total_backups = objects.len();
    Ok(BackupStatusReport {
        total_backups,
        backup_groups: group_backups_by_date(objects),
        retention_days: config.retention.retention_days,
    })
}

fn group_backups_by_date(objects: Vec<RemoteObject>) -> BTreeMap<String, Vec<StoredBackup>> {
    let mut groups: BTreeMap<String, Vec<StoredBackup>> = BTreeMap::new();
    for object in objects {
        let date = object
            .last_modified
            .map(|stamp| stamp.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        groups.entry(date).or_default().push(StoredBackup {
            backup_type: backup_type_tag(&object.key).to_string(),
            key: object.key,
            size: object.size,
            last_modified: object.last_modified,
        });
    }
    groups
}
