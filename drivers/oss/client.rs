//! OSS client / OSS客户端
//!
//! Whole-object operations plus the multipart path, bound to one bucket.
//! A client built from a credential provider re-issues expiring credentials
//! and reopens its bucket with them.

use bytes::Bytes;
use chrono::Duration;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

use super::bucket::OssBucket;
use super::config::OssConfig;
use super::credential_provider;
use crate::error::Result;
use crate::multipart::{FileSource, PartSource, UploadCoordinator};
use crate::storage::{
    BucketHandle, CredentialProvider, Credentials, ProgressCallback, CREDENTIAL_REFRESH_MARGIN_SECS,
};
use crate::utils::{object_url, validate_object_key};

/// Opens a bucket handle with the given credentials / 存储桶构建函数
pub type BucketFactory =
    Arc<dyn Fn(&OssConfig, &Credentials) -> Result<Arc<dyn BucketHandle>> + Send + Sync>;

/// Where fresh credentials come from / 凭证刷新来源
struct Refresher {
    provider: Arc<dyn CredentialProvider>,
    factory: BucketFactory,
}

/// Credentials and the bucket opened with them / 当前凭证与存储桶
struct Connection {
    credentials: Credentials,
    bucket: Arc<dyn BucketHandle>,
}

/// OSS client / OSS客户端
pub struct OssClient {
    config: OssConfig,
    refresher: Option<Refresher>,
    connection: RwLock<Connection>,
    progress: Option<ProgressCallback>,
}

impl OssClient {
    /// Validate config, fetch credentials and open the bucket / 建立连接
    pub async fn connect(config: OssConfig, provider: Arc<dyn CredentialProvider>) -> Result<Self> {
        let factory: BucketFactory = Arc::new(|config: &OssConfig, credentials: &Credentials| {
            let bucket: Arc<dyn BucketHandle> = Arc::new(OssBucket::new(config, credentials)?);
            Ok(bucket)
        });
        Self::connect_with(config, provider, factory).await
    }

    /// Same as `connect` with a custom bucket factory / 使用自定义存储桶构建函数
    pub async fn connect_with(
        config: OssConfig,
        provider: Arc<dyn CredentialProvider>,
        factory: BucketFactory,
    ) -> Result<Self> {
        config.validate()?;
        let credentials = provider.provide_credentials().await?;
        credentials.ensure_valid()?;
        let bucket = factory(&config, &credentials)?;
        tracing::info!(
            "OSS client ready: bucket={}, endpoint={}, credentials={}",
            config.bucket,
            config.endpoint,
            provider.name()
        );
        let mut client = Self::with_bucket(config, credentials, bucket);
        client.refresher = Some(Refresher { provider, factory });
        Ok(client)
    }

    /// Pick the credential provider from `use_sts` and connect / 按配置选择凭证并连接
    pub async fn from_config(config: OssConfig) -> Result<Self> {
        let provider = credential_provider(&config)?;
        Self::connect(config, provider).await
    }

    /// Use an already built bucket handle; credentials are never re-issued / 使用现成的存储桶句柄
    pub fn with_bucket(config: OssConfig, credentials: Credentials, bucket: Arc<dyn BucketHandle>) -> Self {
        Self {
            config,
            refresher: None,
            connection: RwLock::new(Connection { credentials, bucket }),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &OssConfig {
        &self.config
    }

    /// (AccessKeyId, AccessKeySecret, SecurityToken) currently in use / 当前凭证
    ///
    /// Only STS credentials are meant to leave the back-end.
    pub fn credentials(&self) -> (String, String, Option<String>) {
        let connection = self.connection.read();
        let (id, secret, token) = connection.credentials.token_triple();
        (id.to_string(), secret.to_string(), token.map(str::to_string))
    }

    fn bucket(&self) -> Arc<dyn BucketHandle> {
        self.connection.read().bucket.clone()
    }

    pub fn object_url(&self, key: &str) -> String {
        object_url(self.bucket().bucket_name(), &self.config.endpoint, key)
    }

    /// Coordinator sharing this client's bucket and options / 分片上传协调器
    pub fn coordinator(&self) -> UploadCoordinator {
        let coordinator = UploadCoordinator::new(
            self.bucket(),
            self.config.endpoint.clone(),
            self.config.upload_options(),
        );
        match &self.progress {
            Some(progress) => coordinator.with_progress(progress.clone()),
            None => coordinator,
        }
    }

    /// Re-issue credentials from the provider and reopen the bucket / 刷新凭证
    ///
    /// Without a provider the current credentials are only checked.
    pub async fn refresh_credentials(&self) -> Result<()> {
        let Some(refresher) = &self.refresher else {
            return self.connection.read().credentials.ensure_valid();
        };

        let credentials = refresher.provider.provide_credentials().await?;
        credentials.ensure_valid()?;
        let bucket = (refresher.factory)(&self.config, &credentials)?;
        tracing::info!(
            "Credentials re-issued by {}: access_key_id={}, expires={:?}",
            refresher.provider.name(),
            credentials.access_key_id,
            credentials.expiration
        );
        *self.connection.write() = Connection { credentials, bucket };
        Ok(())
    }

    async fn prepare(&self, key: &str) -> Result<()> {
        validate_object_key(key)?;
        let margin = Duration::seconds(CREDENTIAL_REFRESH_MARGIN_SECS);
        // 在await之前读取状态，然后释放锁
        let expiring = self.connection.read().credentials.expires_within(margin);
        if expiring && self.refresher.is_some() {
            self.refresh_credentials().await?;
        }
        self.connection.read().credentials.ensure_valid()
    }

    /// Download an object to a local path (overwrites) / 下载对象到本地
    pub async fn download_to_file(&self, key: &str, local_path: impl AsRef<Path>) -> Result<u64> {
        self.prepare(key).await?;
        let data = self.bucket().get_object(key).await?;
        tokio::fs::write(local_path.as_ref(), &data).await?;
        tracing::debug!(
            "Downloaded {} ({} bytes) to {}",
            key,
            data.len(),
            local_path.as_ref().display()
        );
        Ok(data.len() as u64)
    }

    /// Put a whole local file, overwriting the object / 上传本地文件（覆盖）
    pub async fn upload_file(&self, key: &str, local_path: impl AsRef<Path>) -> Result<String> {
        self.prepare(key).await?;
        let data = tokio::fs::read(local_path.as_ref()).await?;
        self.put(key, Bytes::from(data)).await
    }

    /// Put an in-memory object / 上传内存数据
    pub async fn upload_bytes(&self, key: &str, data: impl Into<Bytes>) -> Result<String> {
        self.prepare(key).await?;
        self.put(key, data.into()).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let size = data.len() as u64;
        self.bucket().put_object(key, data).await?;
        if let Some(progress) = &self.progress {
            progress(size, size);
        }
        tracing::info!("Uploaded {} ({} bytes)", key, size);
        Ok(self.object_url(key))
    }

    /// Concurrent multipart upload from any source / 分片上传
    pub async fn upload_multipart(&self, key: &str, source: Arc<dyn PartSource>) -> Result<String> {
        self.prepare(key).await?;
        self.coordinator().upload(key, source).await
    }

    pub async fn upload_file_multipart(&self, key: &str, local_path: impl AsRef<Path>) -> Result<String> {
        let source = FileSource::open(local_path).await?;
        self.upload_multipart(key, Arc::new(source)).await
    }

    /// Multipart when the file is larger than one part, single put otherwise / 自动选择上传方式
    pub async fn upload_path(&self, key: &str, local_path: impl AsRef<Path>) -> Result<String> {
        let source = FileSource::open(local_path.as_ref()).await?;
        if source.is_empty() || source.len() <= self.config.preferred_part_size {
            self.upload_file(key, local_path).await
        } else {
            self.upload_multipart(key, Arc::new(source)).await
        }
    }

    /// Delete an object; missing objects are not an error / 删除对象
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.prepare(key).await?;
        self.bucket().delete_object(key).await?;
        tracing::info!("Deleted {}", key);
        Ok(())
    }
}

impl std::fmt::Debug for OssClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection = self.connection.read();
        f.debug_struct("OssClient")
            .field("bucket", &connection.bucket.bucket_name())
            .field("endpoint", &self.config.endpoint)
            .field("credentials", &connection.credentials)
            .field("refreshes", &self.refresher.is_some())
            .finish()
    }
}
