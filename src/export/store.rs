// src/export/store.rs
//! Object storage for exported CSVs.

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ExportError;

pub const ENV_STORE_URL: &str = "SENTINEL_STORE_URL";
pub const ENV_STORE_TOKEN: &str = "SENTINEL_STORE_TOKEN";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `bucket/key`; returns a link to the stored object.
    async fn put(&self, bucket: &str, key: &str, body: String) -> Result<String, ExportError>;
}

/// Plain HTTP `PUT <base>/<bucket>/<key>`, e.g. against a pre-authorised gateway.
pub struct HttpObjectStore {
    base_url: String,
    token: Option<String>,
    client: Client,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// `None` unless `SENTINEL_STORE_URL` is set.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(ENV_STORE_URL).ok()?;
        let mut store = Self::new(url);
        store.token = std::env::var(ENV_STORE_TOKEN).ok();
        Some(store)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: String) -> Result<String, ExportError> {
        let url = self.object_url(bucket, key);
        let mut req = self
            .client
            .put(&url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(body);
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }
        req.send().await?.error_for_status()?;
        Ok(url)
    }
}

/// Writes objects below a local root directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: String) -> Result<String, ExportError> {
        let path = self.root.join(bucket).join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        Ok(path.display().to_string())
    }
}

// --- Test helper ---
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    pub objects: Mutex<Vec<(String, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: String) -> Result<String, ExportError> {
        let name = format!("mem://{bucket}/{key}");
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((name.clone(), body));
        Ok(name)
    }
}
