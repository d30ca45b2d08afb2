//! OSS存储桶实现（基于S3兼容接口）
//!
//! 设计原则：
//! - 只提供原语（分片初始化、上传、完成、取消，整对象读写删）
//! - 并发、重试、完整性校验由 multipart 协调器负责
//! - 非2xx响应统一映射为 OssError

use async_trait::async_trait;
use bytes::Bytes;
use s3::bucket::Bucket;
use s3::command::{Command, Multipart};
use s3::creds::Credentials as S3Credentials;
use s3::error::S3Error;
use s3::request::tokio_backend::ReqwestRequest as RequestImpl;
use s3::request::Request;
use s3::serde_types::Part;
use s3::Region;

use super::config::OssConfig;
use crate::error::{OssError, Result};
use crate::storage::{BucketHandle, CompletedPart, Credentials};

const CONTENT_TYPE: &str = "application/octet-stream";

/// OSS存储桶
pub struct OssBucket {
    name: String,
    bucket: Box<Bucket>,
}

impl OssBucket {
    /// 用给定凭证创建存储桶句柄（凭证过期时直接报错）
    pub fn new(config: &OssConfig, credentials: &Credentials) -> Result<Self> {
        credentials.ensure_valid()?;
        let bucket = Self::create_bucket(config, credentials)?;
        Ok(Self {
            name: config.bucket.clone(),
            bucket,
        })
    }

    /// 创建S3 Bucket客户端（虚拟主机风格：{bucket}.{endpoint}）
    fn create_bucket(config: &OssConfig, credentials: &Credentials) -> Result<Box<Bucket>> {
        let s3_credentials = S3Credentials::new(
            Some(&credentials.access_key_id),
            Some(&credentials.access_key_secret),
            credentials.security_token.as_deref(),
            None,
            None,
        )
        .map_err(|e| OssError::Config {
            reason: format!("invalid credentials: {}", e),
        })?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.api_endpoint(),
        };

        let bucket = Bucket::new(&config.bucket, region, s3_credentials).map_err(|e| OssError::Config {
            reason: format!("failed to create bucket {}: {}", config.bucket, e),
        })?;

        let bucket = if config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(bucket)
    }
}

/// S3错误映射
fn map_s3_error(operation: &'static str, err: S3Error) -> OssError {
    match err {
        S3Error::HttpFailWithBody(code, body) => map_status(operation, code, &body),
        other => OssError::backend(operation, other),
    }
}

fn map_status(operation: &'static str, code: u16, body: &str) -> OssError {
    if body.contains("NoSuchUpload") {
        return OssError::UploadNotFound {
            upload_id: String::new(),
        };
    }
    if body.contains("SecurityTokenExpired") {
        return OssError::CredentialExpired {
            reason: format!("{} rejected: HTTP {}", operation, code),
        };
    }
    OssError::backend(operation, format!("HTTP {}: {}", code, body.trim()))
}

/// Name the session in `UploadNotFound` / 补全上传ID
fn with_upload_id(err: OssError, upload_id: &str) -> OssError {
    match err {
        OssError::UploadNotFound { .. } => OssError::UploadNotFound {
            upload_id: upload_id.to_string(),
        },
        other => other,
    }
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

#[async_trait]
impl BucketHandle for OssBucket {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    async fn initiate_multipart_upload(&self, key: &str) -> Result<String> {
        let response = self
            .bucket
            .initiate_multipart_upload(key, CONTENT_TYPE)
            .await
            .map_err(|e| map_s3_error("initiate_multipart_upload", e))?;
        tracing::debug!("OSS分片上传初始化: key={}, upload_id={}", key, response.upload_id);
        Ok(response.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        tracing::debug!("OSS上传分片: key={}, part={}, size={}", key, part_number, data.len());
        // 不用 put_multipart_chunk：它在非2xx时会自行取消整个会话，取消只由协调器决定
        let command = Command::PutObject {
            content: &data,
            multipart: Some(Multipart::new(part_number, upload_id)),
            custom_headers: None,
            content_type: CONTENT_TYPE,
        };
        let request = RequestImpl::new(&self.bucket, key, command)
            .await
            .map_err(|e| map_s3_error("upload_part", e))?;
        let response = request
            .response_data(false)
            .await
            .map_err(|e| map_s3_error("upload_part", e))?;

        let code = response.status_code();
        if !is_success(code) {
            let err = map_status("upload_part", code, &String::from_utf8_lossy(response.bytes()));
            return Err(with_upload_id(err, upload_id));
        }

        response
            .headers()
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("etag"))
            .map(|(_, etag)| etag)
            .ok_or_else(|| OssError::backend("upload_part", format!("no ETag for part {}", part_number)))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        let parts: Vec<Part> = parts
            .into_iter()
            .map(|p| Part {
                part_number: p.part_number,
                etag: p.etag,
            })
            .collect();

        let response = self
            .bucket
            .complete_multipart_upload(key, upload_id, parts)
            .await
            .map_err(|e| with_upload_id(map_s3_error("complete_multipart_upload", e), upload_id))?;

        let code = response.status_code();
        if !is_success(code) {
            return Err(map_status(
                "complete_multipart_upload",
                code,
                &String::from_utf8_lossy(response.bytes()),
            ));
        }
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.bucket
            .abort_upload(key, upload_id)
            .await
            .map_err(|e| with_upload_id(map_s3_error("abort_multipart_upload", e), upload_id))
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| map_s3_error("get_object", e))?;
        let code = response.status_code();
        if code == 404 {
            return Err(OssError::ObjectNotFound { key: key.to_string() });
        }
        if !is_success(code) {
            return Err(map_status("get_object", code, &String::from_utf8_lossy(response.bytes())));
        }
        Ok(response.bytes().clone())
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let response = self
            .bucket
            .put_object(key, &data)
            .await
            .map_err(|e| map_s3_error("put_object", e))?;
        let code = response.status_code();
        if !is_success(code) {
            return Err(map_status("put_object", code, &String::from_utf8_lossy(response.bytes())));
        }
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| map_s3_error("delete_object", e))?;
        let code = response.status_code();
        // 删除不存在的对象视为成功
        if !is_success(code) && code != 404 {
            return Err(map_status("delete_object", code, &String::from_utf8_lossy(response.bytes())));
        }
        Ok(())
    }
}
