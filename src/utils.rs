/// Object key utility functions / 对象键工具函数

use crate::error::{OssError, Result};

/// OSS object keys are at most 1023 bytes / 对象键最大长度
pub const MAX_KEY_LEN: usize = 1023;

/// Check an object key before it reaches the backend / 校验对象键
/// 1. Not empty / 非空
/// 2. No leading / or \ / 不以 / 或 \ 开头
/// 3. At most 1023 bytes of UTF-8 / 不超过1023字节
pub fn validate_object_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(OssError::invalid_input("object key is empty"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(OssError::invalid_input(format!(
            "object key must not start with a separator: {}",
            key
        )));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(OssError::invalid_input(format!(
            "object key is {} bytes, limit is {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

/// Clean a user supplied key / 清理用户输入的对象键
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Clean . and .. and duplicate / / 清理 . 和 .. 和重复的 /
/// 3. Drop the leading / / 去掉开头的 /
pub fn clean_object_key(key: &str) -> String {
    let key = key.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();

    for part in key.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    let mut cleaned = parts.join("/");
    // Keep the trailing slash of "directory" keys
    if key.ends_with('/') && !cleaned.is_empty() {
        cleaned.push('/');
    }
    cleaned
}

/// Public object URL / 对象访问URL
pub fn object_url(bucket: &str, endpoint: &str, key: &str) -> String {
    format!("http://{}.{}/{}", bucket, endpoint, key)
}
