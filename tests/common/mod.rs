// medbackup/tests/common/mod.rs
//! Shared fixtures for the integration tests: an in-memory object store,
//! configuration builders and stub `pg_dump` executables.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use medbackup::config::AppConfig;
use medbackup::errors::BackupError;
use medbackup::storage::{ObjectPage, ObjectStore, RemoteObject, UploadAttributes};

/// Builds an [`AppConfig`] from literal key/value pairs, leaving every
/// other setting at its default.
pub fn test_config(pairs: &[(&str, &str)]) -> AppConfig {
    AppConfig::from_lookup(|key| {
        pairs
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.to_string())
    })
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    last_modified: Option<DateTime<Utc>>,
    etag: Option<String>,
}

/// One call the store accepted through [`ObjectStore::upload_file`].
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub metadata: Vec<(String, String)>,
    pub bytes: Vec<u8>,
}

struct ListGate {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// In-memory [`ObjectStore`] with injectable download and upload failures
/// and a hold point for parking a run mid-listing.
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    failing_downloads: Mutex<HashSet<String>>,
    fail_uploads: AtomicBool,
    page_size: usize,
    list_calls: AtomicUsize,
    list_gate: Mutex<Option<ListGate>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_page_size(medbackup::storage::LIST_PAGE_SIZE as usize)
    }

    /// A store that truncates listings at `page_size` keys, forcing the
    /// caller to follow the continuation cursor.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            uploads: Mutex::new(Vec::new()),
            failing_downloads: Mutex::new(HashSet::new()),
            fail_uploads: AtomicBool::new(false),
            page_size,
            list_calls: AtomicUsize::new(0),
            list_gate: Mutex::new(None),
        }
    }

    pub fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) {
        self.put_object_at(bucket, key, bytes, Some(Utc::now()));
    }

    pub fn put_object_at(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        last_modified: Option<DateTime<Utc>>,
    ) {
        self.objects
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    bytes: bytes.to_vec(),
                    last_modified,
                    etag: Some(format!("\"etag-{key}\"")),
                },
            );
    }

    /// Makes every download of `key` fail until the store is rebuilt.
    pub fn fail_download(&self, key: &str) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert(key.to_string());
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Arms a hold on the next listing call. The returned receiver fires
    /// once the store reaches that call, and the call blocks until the
    /// returned sender fires (or is dropped).
    pub fn hold_next_list(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.list_gate.lock().unwrap() = Some(ListGate {
            reached: reached_tx,
            release: release_rx,
        });
        (reached_rx, release_tx)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ObjectPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.reached.send(());
            let _ = gate.release.await;
        }

        let bucket_objects = self
            .objects
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .unwrap_or_default();

        let matching: Vec<RemoteObject> = bucket_objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|prefix| key.starts_with(prefix)))
            .filter(|(key, _)| {
                continuation
                    .as_deref()
                    .is_none_or(|cursor| key.as_str() > cursor)
            })
            .map(|(key, object)| RemoteObject {
                key: key.clone(),
                size: object.bytes.len() as u64,
                last_modified: object.last_modified,
                etag: object.etag.clone(),
            })
            .collect();

        let truncated = matching.len() > self.page_size;
        let objects: Vec<RemoteObject> = matching.into_iter().take(self.page_size).collect();
        let next_token = if truncated {
            objects.last().map(|object| object.key.clone())
        } else {
            None
        };
        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn download_object(&self, bucket: &str, key: &str, dest_path: &Path) -> Result<u64> {
        if self.failing_downloads.lock().unwrap().contains(key) {
            return Err(
                BackupError::ObjectStore(format!("injected download failure for {key}")).into(),
            );
        }
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|bucket_objects| bucket_objects.get(key))
            .map(|object| object.bytes.clone())
            .ok_or_else(|| BackupError::ObjectStore(format!("no such object {bucket}/{key}")))?;

        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest_path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        source_path: &Path,
        attributes: &UploadAttributes,
    ) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(
                BackupError::ObjectStore(format!("injected upload failure for {key}")).into(),
            );
        }
        let bytes = std::fs::read(source_path)
            .with_context(|| format!("Failed to read upload source {}", source_path.display()))?;
        self.uploads.lock().unwrap().push(RecordedUpload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: attributes.content_type.clone(),
            metadata: attributes.metadata.clone(),
            bytes: bytes.clone(),
        });
        self.objects
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    bytes,
                    last_modified: Some(Utc::now()),
                    etag: None,
                },
            );
        Ok(())
    }
}

/// Reads the file entries of a `.tar.gz` archive into a path -> contents
/// map. Directory entries are skipped.
pub fn read_tar_gz_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    use std::io::Read;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open archive {}", path.display()))?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut entries = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().to_string();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        entries.insert(name, contents);
    }
    Ok(entries)
}

/// Decompresses a gzip buffer.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Writes an executable stand-in for `pg_dump` that emits a tiny SQL dump
/// to the path given via `-f`.
#[cfg(unix)]
pub fn write_stub_pg_dump(dir: &Path) -> Result<PathBuf> {
    let script = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -f) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '%s\n' "-- PostgreSQL database dump" > "$out"
printf '%s\n' "CREATE TABLE patients (id serial PRIMARY KEY);" >> "$out"
"#;
    write_executable(dir, "pg_dump", script)
}

/// Writes a `pg_dump` stand-in that fails the way a refused connection
/// does, without producing a dump file.
#[cfg(unix)]
pub fn write_failing_pg_dump(dir: &Path) -> Result<PathBuf> {
    let script = "#!/bin/sh\necho 'pg_dump: error: connection to server failed' >&2\nexit 1\n";
    write_executable(dir, "pg_dump", script)
}

#[cfg(unix)]
fn write_executable(dir: &Path, name: &str, script: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, script)
        .with_context(|| format!("Failed to write stub {}", path.display()))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to mark {} executable", path.display()))?;
    Ok(path)
}
