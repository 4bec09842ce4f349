// medbackup/src/storage/s3.rs
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::{ObjectPage, ObjectStore, RemoteObject, UploadAttributes, LIST_PAGE_SIZE};
use crate::config::ObjectStoreConfig;
use crate::errors::BackupError;

/// S3-backed [`ObjectStore`] used in every deployment.
pub struct S3ObjectStore {
    client: s3::Client,
}

impl S3ObjectStore {
    /// Builds a client for the configured region, with optional static
    /// credentials and an optional custom endpoint for S3-compatible
    /// stores such as DigitalOcean Spaces or MinIO.
    pub async fn connect(config: &ObjectStoreConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key, &config.secret_access_key)
        {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                access_key, secret_key, None, None, "Static",
            ));
        }

        let sdk_config = loader.load().await;
        Self {
            client: s3::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ObjectPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(LIST_PAGE_SIZE);
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackupError::ObjectStore(DisplayErrorContext(e).to_string()))
            .with_context(|| format!("Failed to list objects in bucket {bucket}"))?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                Some(RemoteObject {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono_timestamp),
                    etag: object.e_tag().map(str::to_string),
                })
            })
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn download_object(&self, bucket: &str, key: &str, dest_path: &Path) -> Result<u64> {
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create download directory {}", parent.display())
            })?;
        }

        let mut object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BackupError::ObjectStore(DisplayErrorContext(e).to_string()))
            .with_context(|| format!("Failed to get object s3://{bucket}/{key}"))?;

        let mut output_file = File::create(dest_path).await.with_context(|| {
            format!("Failed to create destination file {}", dest_path.display())
        })?;

        let mut total_bytes: u64 = 0;
        while let Some(chunk) = object
            .body
            .try_next()
            .await
            .map_err(|e| BackupError::ObjectStore(DisplayErrorContext(e).to_string()))
            .with_context(|| format!("Download stream for s3://{bucket}/{key} failed"))?
        {
            output_file.write_all(&chunk).await.with_context(|| {
                format!("Failed to write to destination file {}", dest_path.display())
            })?;
            total_bytes += chunk.len() as u64;
        }
        output_file.flush().await.with_context(|| {
            format!("Failed to flush destination file {}", dest_path.display())
        })?;

        Ok(total_bytes)
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        source_path: &Path,
        attributes: &UploadAttributes,
    ) -> Result<()> {
        let body = ByteStream::from_path(source_path).await.with_context(|| {
            format!("Failed to read upload body from {}", source_path.display())
        })?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(&attributes.content_type)
            .body(body);
        for (name, value) in &attributes.metadata {
            request = request.metadata(name, value);
        }

        request
            .send()
            .await
            .map_err(|e| BackupError::ObjectStore(DisplayErrorContext(e).to_string()))
            .with_context(|| {
                format!(
                    "Failed to upload {} to s3://{bucket}/{key}",
                    source_path.display()
                )
            })?;
        Ok(())
    }
}

fn to_chrono_timestamp(stamp: &s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(stamp.secs(), stamp.subsec_nanos())
}
