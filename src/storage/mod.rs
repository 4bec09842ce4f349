// medbackup/src/storage/mod.rs
//! Object store access used by the backup stages.

pub mod s3;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Number of keys requested per listing page.
pub const LIST_PAGE_SIZE: i32 = 1000;

/// One object observed in a bucket listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// A single listing page plus the cursor for the next one, if any.
#[derive(Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<RemoteObject>,
    pub next_token: Option<String>,
}

/// Attributes attached to an uploaded object.
#[derive(Debug, Clone)]
pub struct UploadAttributes {
    pub content_type: String,
    pub metadata: Vec<(String, String)>,
}

/// The slice of object store behaviour the pipeline depends on.
///
/// Keeping the stages behind this trait lets tests drive them against an
/// in-memory store instead of a live bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches one listing page, resuming from `continuation` when given.
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ObjectPage>;

    /// Downloads one object into `dest_path`, returning the byte count.
    async fn download_object(&self, bucket: &str, key: &str, dest_path: &Path) -> Result<u64>;

    /// Uploads a local file under `key`. Implementations return only after
    /// the store has acknowledged the object.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        source_path: &Path,
        attributes: &UploadAttributes,
    ) -> Result<()>;
}

/// Collects every object in the bucket by following the listing cursor
/// until the store stops handing one back.
pub async fn list_all_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: Option<&str>,
) -> Result<Vec<RemoteObject>> {
    let mut objects = Vec::new();
    let mut continuation = None;
    loop {
        let page = store.list_objects_page(bucket, prefix, continuation).await?;
        objects.extend(page.objects);
        continuation = match page.next_token {
            Some(token) => Some(token),
            None => break,
        };
    }
    Ok(objects)
}
