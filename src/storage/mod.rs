//! Object storage for published badges and reports.

use async_trait::async_trait;
use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream, Client};
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Cache directive for every published object, so badges refresh promptly
pub const CACHE_CONTROL: &str = "no-cache";

pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// An object ready to be written to a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub content_type: &'static str,
    pub cache_control: &'static str,
    pub body: Bytes,
}

impl StoredObject {
    /// SVG badge for the given trigger
    pub fn badge(trigger_id: &str, svg: String) -> Self {
        Self {
            name: format!("{}.svg", trigger_id),
            content_type: SVG_CONTENT_TYPE,
            cache_control: CACHE_CONTROL,
            body: Bytes::from(svg),
        }
    }

    /// HTML report for the given trigger
    pub fn report(trigger_id: &str, html: String) -> Self {
        Self {
            name: format!("{}.html", trigger_id),
            content_type: HTML_CONTENT_TYPE,
            cache_control: CACHE_CONTROL,
            body: Bytes::from(html),
        }
    }
}

/// Destination for badge and report objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, object: StoredObject) -> Result<(), StorageError>;
}

/// Writes objects to an S3 bucket
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a store using credentials and region from the default AWS chain
    pub async fn new(bucket: impl Into<String>) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::with_client(Client::new(&sdk_config), bucket)
    }

    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, object: StoredObject) -> Result<(), StorageError> {
        tracing::debug!(bucket = %self.bucket, name = %object.name, "Writing object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.name)
            .content_type(object.content_type)
            .cache_control(object.cache_control)
            .body(ByteStream::from(object.body))
            .send()
            .await
            .map_err(|e| StorageError::Put {
                bucket: self.bucket.clone(),
                name: object.name.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}

/// Writes objects as files under a local directory
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStore for DirStore {
    async fn put(&self, object: StoredObject) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            name: object.name.clone(),
            source,
        };
        // Trigger IDs never contain separators, but don't let one escape the root.
        let file_name = Path::new(&object.name)
            .file_name()
            .ok_or_else(|| io_err(std::io::Error::other("invalid object name")))?;
        let path = self.root.join(file_name);

        tokio::fs::create_dir_all(&self.root).await.map_err(io_err)?;
        tokio::fs::write(&path, &object.body).await.map_err(io_err)?;
        tracing::debug!(path = %path.display(), content_type = object.content_type, "Wrote object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_object_names() {
        let badge = StoredObject::badge("trigger-id", "<svg/>".to_string());
        assert_eq!(badge.name, "trigger-id.svg");
        assert_eq!(badge.content_type, "image/svg+xml");
        assert_eq!(badge.cache_control, "no-cache");

        let report = StoredObject::report("trigger-id", "<html/>".to_string());
        assert_eq!(report.name, "trigger-id.html");
        assert_eq!(report.content_type, "text/html; charset=UTF-8");
        assert_eq!(report.body, Bytes::from_static(b"<html/>"));
    }

    #[tokio::test]
    async fn test_dir_store_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path().join("badges"));

        store
            .put(StoredObject::badge("abc", "<svg/>".to_string()))
            .await
            .unwrap();
        let written = std::fs::read_to_string(dir.path().join("badges/abc.svg")).unwrap();
        assert_eq!(written, "<svg/>");

        // Later writes replace the previous object.
        store
            .put(StoredObject::badge("abc", "<svg></svg>".to_string()))
            .await
            .unwrap();
        let written = std::fs::read_to_string(dir.path().join("badges/abc.svg")).unwrap();
        assert_eq!(written, "<svg></svg>");
    }

    #[tokio::test]
    async fn test_dir_store_stays_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path().join("out"));
        store
            .put(StoredObject::badge("../escape", "x".to_string()))
            .await
            .unwrap();
        assert!(dir.path().join("out/escape.svg").exists());
        assert!(!dir.path().join("escape.svg").exists());
    }
}
