//! Storage seams / 存储接口
//!
//! The bucket handle and credential provider are the only two collaborators
//! the uploader talks to. Vendor implementations live under `drivers`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{OssError, Result};

/// Re-issue temporary credentials this long before they expire / 提前刷新时间
pub const CREDENTIAL_REFRESH_MARGIN_SECS: i64 = 300;

/// 进度回调类型 / Progress callback type
/// 参数: (已完成字节数, 总字节数) / Parameters: (completed_bytes, total_bytes)
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Part accepted by the backend, as sent in the complete call / 已完成分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Access credentials / 访问凭证
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    /// STS security token, absent for long-lived keys / STS临时令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
    /// Expiry of temporary credentials / 过期时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Long-lived key pair / 长期密钥
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            security_token: None,
            expiration: None,
        }
    }

    /// True when the expiry falls within `margin` from now / 是否将在margin内过期
    /// Long-lived keys never expire.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expiration
            .map(|exp| exp - margin <= Utc::now())
            .unwrap_or(false)
    }

    /// Fails with `CredentialExpired` once the expiry has passed / 过期检查
    pub fn ensure_valid(&self) -> Result<()> {
        match self.expiration {
            Some(exp) if exp <= Utc::now() => Err(OssError::CredentialExpired {
                reason: format!("{} expired at {}", self.access_key_id, exp.to_rfc3339()),
            }),
            _ => Ok(()),
        }
    }

    /// (AccessKeyId, AccessKeySecret, SecurityToken) for front-end use / 提供给前端的凭证三元组
    pub fn token_triple(&self) -> (&str, &str, Option<&str>) {
        (
            &self.access_key_id,
            &self.access_key_secret,
            self.security_token.as_deref(),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .field("security_token", &self.security_token.as_ref().map(|_| "***"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Credential source, selected at construction / 凭证来源
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Provider name / 名称
    fn name(&self) -> &str;

    /// Issue (or return) credentials for building a bucket handle / 获取凭证
    async fn provide_credentials(&self) -> Result<Credentials>;
}

/// Bucket handle interface (primitive operations only) / 存储桶接口
#[async_trait]
pub trait BucketHandle: Send + Sync {
    /// Bucket name / 存储桶名称
    fn bucket_name(&self) -> &str;

    /// Start a multipart session, returns the upload id / 初始化分片上传
    async fn initiate_multipart_upload(&self, key: &str) -> Result<String>;

    /// Upload one part, returns its ETag / 上传分片
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String>;

    /// Complete with parts strictly ordered by part number / 完成分片上传
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()>;

    /// Abort a session; unknown upload ids yield `UploadNotFound` / 取消分片上传
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    /// Get whole object / 下载对象
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Put whole object / 上传对象
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    /// Delete object / 删除对象
    async fn delete_object(&self, key: &str) -> Result<()>;
}
