//! Application configuration module / 应用配置模块
//!
//! Loads `OssConfig` from config.json (or the file named by `OSS_UPLOADER_CONFIG`).
//! Creates a default config file on first run / 首次运行时创建默认配置文件

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::drivers::oss::OssConfig;

/// Environment variable naming the config file / 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "OSS_UPLOADER_CONFIG";
pub const ACCESS_KEY_ID_ENV: &str = "OSS_ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET_ENV: &str = "OSS_ACCESS_KEY_SECRET";

/// Get the config file path / 获取配置文件路径
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
///
/// Secrets from the environment override the file. The result is not validated.
pub fn load_config(config_path: &Path) -> Result<OssConfig> {
    let mut config = if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;
        let config: OssConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;
        tracing::info!("Loaded configuration from {:?}", config_path);
        config
    } else {
        // Create default config / 创建默认配置
        let config = OssConfig::default();
        save_config(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        config
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config: &OssConfig, config_path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config file {:?}", config_path))?;
    Ok(())
}

/// Replace key pair fields with non-empty environment values / 用环境变量覆盖密钥
pub fn apply_env_overrides<F>(config: &mut OssConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(id) = lookup(ACCESS_KEY_ID_ENV).filter(|v| !v.is_empty()) {
        config.access_key_id = id;
    }
    if let Some(secret) = lookup(ACCESS_KEY_SECRET_ENV).filter(|v| !v.is_empty()) {
        config.access_key_secret = secret;
    }
}
