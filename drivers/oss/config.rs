//! OSS驱动配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OssError, Result};
use crate::multipart::{PartLimits, UploadOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_PART_SIZE};

/// OSS配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OssConfig {
    /// 端点主机名（不含协议），如 oss-cn-hangzhou.aliyuncs.com
    pub endpoint: String,
    /// 存储桶名称
    pub bucket: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// STS扮演的角色ARN
    #[serde(default)]
    pub role_arn: String,
    /// 角色会话名称
    #[serde(default = "default_session_name")]
    pub role_session_name: String,
    /// Access Key ID
    #[serde(default)]
    pub access_key_id: String,
    /// Access Key Secret
    #[serde(default)]
    pub access_key_secret: String,
    /// 是否通过STS获取临时凭证
    #[serde(default)]
    pub use_sts: bool,
    /// STS端点主机名
    #[serde(default = "default_sts_endpoint")]
    pub sts_endpoint: String,
    /// 临时凭证有效期（秒）
    #[serde(default = "default_sts_duration")]
    pub sts_duration_secs: u64,
    /// 首选分片大小（字节）
    #[serde(default = "default_part_size")]
    pub preferred_part_size: u64,
    /// 并发上传数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 单个分片的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 首次重试等待（毫秒），之后指数退避
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
    /// 单个分片上传超时（秒）
    #[serde(default = "default_part_timeout")]
    pub part_timeout_secs: u64,
    /// API请求是否使用HTTPS（公开URL始终为http）
    #[serde(default = "default_use_https")]
    pub use_https: bool,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// 兼容网关、本地测试服务需要设置为true
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "cn-hangzhou".to_string()
}

fn default_session_name() -> String {
    "session-name".to_string()
}

fn default_sts_endpoint() -> String {
    "sts.aliyuncs.com".to_string()
}

fn default_sts_duration() -> u64 {
    3600
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> u64 {
    200
}

fn default_part_timeout() -> u64 {
    300
}

fn default_use_https() -> bool {
    true
}

impl Default for OssConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            region: default_region(),
            role_arn: String::new(),
            role_session_name: default_session_name(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            use_sts: false,
            sts_endpoint: default_sts_endpoint(),
            sts_duration_secs: default_sts_duration(),
            preferred_part_size: default_part_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_delay(),
            part_timeout_secs: default_part_timeout(),
            use_https: default_use_https(),
            force_path_style: false,
        }
    }
}

impl OssConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(OssError::Config {
                reason: reason.to_string(),
            })
        };
        if self.bucket.trim().is_empty() {
            return fail("bucket is empty");
        }
        if self.endpoint.trim().is_empty() {
            return fail("endpoint is empty");
        }
        if self.endpoint.contains("://") || self.endpoint.contains('/') {
            return fail("endpoint must be a bare host name without scheme or path");
        }
        if self.concurrency == 0 {
            return fail("concurrency must be at least 1");
        }
        if self.preferred_part_size == 0 {
            return fail("preferred_part_size must be greater than 0");
        }
        if self.part_timeout_secs == 0 {
            return fail("part_timeout_secs must be greater than 0");
        }
        if self.access_key_id.is_empty() || self.access_key_secret.is_empty() {
            return fail("access_key_id and access_key_secret are required");
        }
        if self.use_sts {
            if self.role_arn.is_empty() {
                return fail("role_arn is required when use_sts is enabled");
            }
            if self.sts_endpoint.is_empty() {
                return fail("sts_endpoint is required when use_sts is enabled");
            }
            // STS accepts 900..=3600 seconds for role sessions
            if !(900..=3600).contains(&self.sts_duration_secs) {
                return fail("sts_duration_secs must be within 900..=3600");
            }
        }
        Ok(())
    }

    /// 协调器参数
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            preferred_part_size: self.preferred_part_size,
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            part_timeout: Duration::from_secs(self.part_timeout_secs),
            limits: PartLimits::default(),
        }
    }

    /// API端点（带协议），供SDK使用
    pub fn api_endpoint(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint)
    }
}
