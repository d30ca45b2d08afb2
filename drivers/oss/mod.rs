//! Aliyun OSS driver / 阿里云OSS驱动
//!
//! - `bucket`: bucket primitives over the S3-compatible API
//! - `sts`: static and STS AssumeRole credential providers
//! - `client`: whole-object operations and the multipart path

pub mod bucket;
pub mod client;
pub mod config;
pub mod sts;

use std::sync::Arc;

pub use bucket::OssBucket;
pub use client::{BucketFactory, OssClient};
pub use config::OssConfig;
pub use sts::{StaticCredentialProvider, StsCredentialProvider};

use crate::error::Result;
use crate::storage::CredentialProvider;

/// Credential provider selected by `use_sts` / 根据配置选择凭证提供者
pub fn credential_provider(config: &OssConfig) -> Result<Arc<dyn CredentialProvider>> {
    if config.use_sts {
        Ok(Arc::new(StsCredentialProvider::from_config(config)?))
    } else {
        Ok(Arc::new(StaticCredentialProvider::new(
            config.access_key_id.clone(),
            config.access_key_secret.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection() {
        let mut config = OssConfig {
            access_key_id: "ak".to_string(),
            access_key_secret: "sk".to_string(),
            ..Default::default()
        };
        assert_eq!(credential_provider(&config).unwrap().name(), "static");
        config.use_sts = true;
        assert_eq!(credential_provider(&config).unwrap().name(), "sts");
    }
}
