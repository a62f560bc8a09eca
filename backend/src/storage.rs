//! Object storage for uploaded images

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use rand::Rng;
use tokio::fs;

use crate::config::{StorageConfig, StorageProvider};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores `data` under `key` and returns its public URL
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<String>;
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Unique object key: `<prefix>/<unix-millis>-<9 random digits>.<ext>`
pub fn object_key(prefix: &str, extension: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let name = format!("{}-{:09}.{}", Utc::now().timestamp_millis(), suffix, extension);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> AppResult<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;
        }
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into(),
        })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: &str) -> AppResult<String> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;
        }
        fs::write(&path, data)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;
        Ok(join_url(&self.public_base_url, key))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.base_path.join(key);
        if path.exists() {
            fs::remove_file(path)
                .await
                .map_err(|e| AppError::StorageError(e.to_string()))?;
        }
        Ok(())
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 upload failed: {}", e)))?;
        Ok(join_url(&self.public_base_url, key))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 delete failed: {}", e)))?;
        Ok(())
    }
}

/// Builds the configured storage provider once at startup
pub async fn from_config(config: &StorageConfig, port: u16) -> AppResult<Box<dyn Storage>> {
    match config.provider {
        StorageProvider::Local => {
            let base = config
                .public_base_url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}/uploads", port));
            Ok(Box::new(LocalStorage::new(&config.local_root, base).await?))
        }
        StorageProvider::S3 => {
            let bucket = config.bucket.clone().ok_or_else(|| {
                AppError::Configuration("storage.bucket is required for s3".to_string())
            })?;
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = &config.region {
                loader = loader.region(aws_config::Region::new(region.clone()));
            }
            let sdk_config = loader.load().await;
            let region = sdk_config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "us-east-1".to_string());
            let base = config
                .public_base_url
                .clone()
                .unwrap_or_else(|| format!("https://{}.s3.{}.amazonaws.com", bucket, region));
            Ok(Box::new(S3Storage::new(
                S3Client::new(&sdk_config),
                bucket,
                base,
            )))
        }
    }
}
