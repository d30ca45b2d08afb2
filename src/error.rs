//! Error types / 错误类型
//!
//! One taxonomy for every bucket, credential and multipart operation.
//! Retry decisions are made from the variant alone.

use std::time::Duration;
use thiserror::Error;

use crate::multipart::SessionStatus;

/// Primary error type / 主错误类型
#[derive(Debug, Error)]
pub enum OssError {
    /// Caller supplied bad sizes, keys or paths / 调用方输入错误
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A single backend call failed (network, auth, non-2xx) / 单次后端调用失败
    #[error("Backend {operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// A single backend call exceeded its deadline / 单次后端调用超时
    #[error("Backend {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Object does not exist / 对象不存在
    #[error("Object not found: {key}")]
    ObjectNotFound { key: String },

    /// Backend no longer knows the upload id (already aborted or completed) / 分片上传会话不存在
    #[error("Multipart upload {upload_id} not found")]
    UploadNotFound { upload_id: String },

    /// Aggregate failure, raised only after the session was aborted / 分片上传失败（已取消会话）
    #[error("Multipart upload failed for {key} at part {part_number}: {source}")]
    MultipartUploadFailed {
        key: String,
        part_number: u32,
        #[source]
        source: Box<OssError>,
    },

    /// Part list does not cover every planned part exactly once / 分片列表不完整
    #[error(
        "Incomplete upload for {key}: missing {missing:?}, duplicated {duplicated:?}, failed {failed:?}, unexpected {unexpected:?}"
    )]
    IncompleteUpload {
        key: String,
        missing: Vec<u32>,
        duplicated: Vec<u32>,
        failed: Vec<u32>,
        unexpected: Vec<u32>,
    },

    /// Temporary credentials must be re-issued / 临时凭证已过期
    #[error("Credentials expired: {reason}")]
    CredentialExpired { reason: String },

    /// Operation not allowed in the session's current state / 会话状态不允许该操作
    #[error("Upload session {upload_id} is {status}, cannot {action}")]
    InvalidState {
        upload_id: String,
        status: SessionStatus,
        action: &'static str,
    },

    /// Configuration is missing or inconsistent / 配置错误
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Worker task died before reporting / 内部错误
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OssError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        OssError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn backend(operation: &'static str, message: impl std::fmt::Display) -> Self {
        OssError::Backend {
            operation,
            message: message.to_string(),
        }
    }

    /// Returns true if the failed call may be repeated / 是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, OssError::Backend { .. } | OssError::Timeout { .. })
    }

    /// Part number of an aggregate multipart failure / 失败分片号
    pub fn failed_part(&self) -> Option<u32> {
        match self {
            OssError::MultipartUploadFailed { part_number, .. } => Some(*part_number),
            _ => None,
        }
    }

    /// True when credentials must be re-issued, also behind a multipart failure / 是否凭证过期
    pub fn is_credential_expired(&self) -> bool {
        match self {
            OssError::CredentialExpired { .. } => true,
            OssError::MultipartUploadFailed { source, .. } => source.is_credential_expired(),
            _ => false,
        }
    }
}

/// Result alias / 结果类型别名
pub type Result<T> = std::result::Result<T, OssError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        assert!(OssError::backend("upload_part", "connection reset").is_retryable());
        assert!(OssError::Timeout {
            operation: "upload_part",
            timeout: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!OssError::invalid_input("empty key").is_retryable());
        assert!(!OssError::CredentialExpired {
            reason: "token".to_string()
        }
        .is_retryable());
        assert!(!OssError::UploadNotFound {
            upload_id: "u1".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_multipart_failure_keeps_cause() {
        let err = OssError::MultipartUploadFailed {
            key: "a/b.bin".to_string(),
            part_number: 3,
            source: Box::new(OssError::backend("upload_part", "HTTP 500")),
        };
        assert_eq!(err.failed_part(), Some(3));
        let text = err.to_string();
        assert!(text.contains("part 3"));
        assert!(text.contains("HTTP 500"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_credential_expired());
    }

    #[test]
    fn test_credential_expiry_seen_through_part_failure() {
        let expired = OssError::CredentialExpired {
            reason: "SecurityTokenExpired".to_string(),
        };
        assert!(expired.is_credential_expired());
        assert_eq!(expired.failed_part(), None);

        let wrapped = OssError::MultipartUploadFailed {
            key: "a/b.bin".to_string(),
            part_number: 2,
            source: Box::new(expired),
        };
        assert!(wrapped.is_credential_expired());
        assert_eq!(wrapped.failed_part(), Some(2));
        assert!(!OssError::backend("upload_part", "HTTP 403").is_credential_expired());
    }
}
