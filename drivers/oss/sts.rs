//! Credential providers / 凭证提供者
//!
//! Static key pairs are for trusted back-ends only. The STS provider exchanges
//! them for short-lived credentials scoped to one bucket, which may be handed
//! to front-ends.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use std::collections::BTreeMap;

use super::config::OssConfig;
use crate::error::{OssError, Result};
use crate::storage::{CredentialProvider, Credentials, CREDENTIAL_REFRESH_MARGIN_SECS};

type HmacSha1 = Hmac<Sha1>;

const STS_API_VERSION: &str = "2015-04-01";

/// Long-lived key pair / 静态凭证
pub struct StaticCredentialProvider {
    credentials: Credentials,
}

impl StaticCredentialProvider {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(access_key_id, access_key_secret),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn provide_credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// STS AssumeRole response body / STS响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    credentials: StsCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    access_key_secret: String,
    security_token: String,
    expiration: DateTime<Utc>,
}

/// STS error body / STS错误响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: String,
}

/// AssumeRole credential provider / STS临时凭证提供者
pub struct StsCredentialProvider {
    client: Client,
    endpoint: String,
    access_key_id: String,
    access_key_secret: String,
    role_arn: String,
    role_session_name: String,
    policy: String,
    duration_secs: u64,
    cached: Mutex<Option<Credentials>>,
}

impl StsCredentialProvider {
    pub fn from_config(config: &OssConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| OssError::Config {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.sts_endpoint.clone(),
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            role_arn: config.role_arn.clone(),
            role_session_name: config.role_session_name.clone(),
            policy: session_policy(&config.bucket),
            duration_secs: config.sts_duration_secs,
            cached: Mutex::new(None),
        })
    }

    /// Query parameters of one AssumeRole call, unsigned / 请求参数（未签名）
    fn request_params(&self, nonce: &str, timestamp: &str) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("AccessKeyId", self.access_key_id.clone());
        params.insert("Action", "AssumeRole".to_string());
        params.insert("DurationSeconds", self.duration_secs.to_string());
        params.insert("Format", "JSON".to_string());
        params.insert("Policy", self.policy.clone());
        params.insert("RoleArn", self.role_arn.clone());
        params.insert("RoleSessionName", self.role_session_name.clone());
        params.insert("SignatureMethod", "HMAC-SHA1".to_string());
        params.insert("SignatureNonce", nonce.to_string());
        params.insert("SignatureVersion", "1.0".to_string());
        params.insert("Timestamp", timestamp.to_string());
        params.insert("Version", STS_API_VERSION.to_string());
        params
    }

    async fn assume_role(&self) -> Result<Credentials> {
        let nonce = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let params = self.request_params(&nonce, &timestamp);

        let query = canonical_query(&params);
        let signature = sign(&self.access_key_secret, &string_to_sign("GET", &query))?;
        let url = format!(
            "https://{}/?{}&Signature={}",
            self.endpoint,
            query,
            percent_encode(&signature)
        );

        tracing::debug!("STS AssumeRole: role={}, session={}", self.role_arn, self.role_session_name);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OssError::backend("assume_role", e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| OssError::backend("assume_role", e))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<StsError>(&text) {
                Ok(err) => format!("{}: {} (request {})", err.code, err.message, err.request_id),
                Err(_) => text,
            };
            return Err(OssError::backend(
                "assume_role",
                format!("HTTP {}: {}", status.as_u16(), detail),
            ));
        }

        let credentials = parse_assume_role_response(&text)?;
        tracing::info!(
            "STS credentials issued: access_key_id={}, expires={:?}",
            credentials.access_key_id,
            credentials.expiration
        );
        Ok(credentials)
    }
}

#[async_trait]
impl CredentialProvider for StsCredentialProvider {
    fn name(&self) -> &str {
        "sts"
    }

    async fn provide_credentials(&self) -> Result<Credentials> {
        // 在await之前读取缓存，然后释放锁
        let cached = self.cached.lock().clone();
        if let Some(creds) = cached {
            if !creds.expires_within(Duration::seconds(CREDENTIAL_REFRESH_MARGIN_SECS)) {
                return Ok(creds);
            }
        }

        let creds = self.assume_role().await?;
        creds.ensure_valid()?;
        *self.cached.lock() = Some(creds.clone());
        Ok(creds)
    }
}

/// Policy limiting the role session to put/get inside `bucket` / 会话权限策略
pub fn session_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "1",
        "Statement": [{
            "Action": ["oss:PutObject", "oss:GetObject"],
            "Effect": "Allow",
            "Resource": [format!("acs:oss:*:*:{}/*", bucket)],
        }]
    })
    .to_string()
}

/// RPC percent-encoding: everything but `A-Za-z0-9-_.~` / RPC签名编码
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted `k=v&...` with both sides encoded / 规范化查询串
pub fn canonical_query(params: &BTreeMap<&str, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, canonical_query: &str) -> String {
    format!("{}&{}&{}", method, percent_encode("/"), percent_encode(canonical_query))
}

/// HMAC-SHA1 keyed with `secret&`, base64 encoded / 计算签名
pub fn sign(access_key_secret: &str, string_to_sign: &str) -> Result<String> {
    let key = format!("{}&", access_key_secret);
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| OssError::Internal {
        message: format!("HMAC key rejected: {}", e),
    })?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Parse the `Credentials` block of an AssumeRole reply / 解析AssumeRole响应
pub fn parse_assume_role_response(body: &str) -> Result<Credentials> {
    let resp: AssumeRoleResponse = serde_json::from_str(body)
        .map_err(|e| OssError::backend("assume_role", format!("unexpected response: {}", e)))?;
    let sts = resp.credentials;
    Ok(Credentials {
        access_key_id: sts.access_key_id,
        access_key_secret: sts.access_key_secret,
        security_token: Some(sts.security_token),
        expiration: Some(sts.expiration),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sts_config() -> OssConfig {
        OssConfig {
            endpoint: "oss-cn-x.example.com".to_string(),
            bucket: "my-bucket".to_string(),
            access_key_id: "testid".to_string(),
            access_key_secret: "testsecret".to_string(),
            use_sts: true,
            role_arn: "acs:ram::123:role/uploader".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_percent_encode_rules() {
        assert_eq!(percent_encode("a b*c~d"), "a%20b%2Ac~d");
        assert_eq!(percent_encode("2016-02-23T12:46:24Z"), "2016-02-23T12%3A46%3A24Z");
        assert_eq!(percent_encode("/"), "%2F");
    }

    #[test]
    fn test_string_to_sign() {
        let mut params = BTreeMap::new();
        params.insert("Version", "2014-05-26".to_string());
        params.insert("AccessKeyId", "testid".to_string());
        params.insert("Timestamp", "2016-02-23T12:46:24Z".to_string());
        params.insert("Action", "DescribeRegions".to_string());

        let query = canonical_query(&params);
        assert_eq!(
            query,
            "AccessKeyId=testid&Action=DescribeRegions&Timestamp=2016-02-23T12%3A46%3A24Z&Version=2014-05-26"
        );
        assert_eq!(
            string_to_sign("GET", &query),
            "GET&%2F&AccessKeyId%3Dtestid%26Action%3DDescribeRegions%26Timestamp%3D2016-02-23T12%253A46%253A24Z%26Version%3D2014-05-26"
        );
    }

    #[test]
    fn test_sign_is_keyed_sha1() {
        let a = sign("testsecret", "GET&%2F&x").unwrap();
        assert_eq!(a, sign("testsecret", "GET&%2F&x").unwrap());
        assert_ne!(a, sign("othersecret", "GET&%2F&x").unwrap());
        assert_eq!(BASE64.decode(&a).unwrap().len(), 20);
    }

    #[test]
    fn test_session_policy() {
        let policy: serde_json::Value = serde_json::from_str(&session_policy("my-bucket")).unwrap();
        let statement = &policy["Statement"][0];
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(
            statement["Action"],
            serde_json::json!(["oss:PutObject", "oss:GetObject"])
        );
        assert_eq!(statement["Resource"][0], "acs:oss:*:*:my-bucket/*");
    }

    #[test]
    fn test_request_params() {
        let provider = StsCredentialProvider::from_config(&sts_config()).unwrap();
        let params = provider.request_params("nonce-1", "2024-01-01T00:00:00Z");
        assert_eq!(params["Action"], "AssumeRole");
        assert_eq!(params["Version"], "2015-04-01");
        assert_eq!(params["Format"], "JSON");
        assert_eq!(params["SignatureMethod"], "HMAC-SHA1");
        assert_eq!(params["SignatureVersion"], "1.0");
        assert_eq!(params["RoleSessionName"], "session-name");
        assert_eq!(params["DurationSeconds"], "3600");
        assert_eq!(params["SignatureNonce"], "nonce-1");
        assert!(params["Policy"].contains("my-bucket/*"));
    }

    #[test]
    fn test_parse_assume_role_response() {
        let body = r#"{
            "RequestId": "6894B13B-6D71-4EF5-88FA-F32781734A7F",
            "AssumedRoleUser": {"Arn": "acs:ram::123:role/uploader/session-name", "AssumedRoleId": "1:session-name"},
            "Credentials": {
                "AccessKeyId": "STS.L4aBSCSJVMuKg5U1vFDw",
                "AccessKeySecret": "wyLTSmsyPGP1ohvvw8xYgB29dlGI8KMiH2pKCNZ9",
                "SecurityToken": "CAESrAIIARKAAShQquMnLIlbvEcIxO6wCoqJufs8sWwieUxu45hS9AvKNEte8KRUWiJWJ6Y+YHAPgNwi7yfRecMFydL2uPOgBI7LDio0RkbYLmJfIxHM2nGBPdml7kYEOXmJp2aDhbvvwVYIyt/8iES/R6N208wQh0Pk2bu+/9dvalp6wOHF4gkFGhhTVFMuTDRhQlNDU0pWTXVLZzVVMXZGRHciBTQzMjc0KgVhbGljZTCpnJjwySk6BlJzYU1ENUJuCgExGmkKBUFsbG93Eh8KDEFjdGlvbkVxdWFscxIGQWN0aW9uGgcKBW9zczoqEj8KDlJlc291cmNlRXF1YWxzEghSZXNvdXJjZRojCiFhY3M6b3NzOio6NDMyNzQ6c2FtcGxlYm94L2FsaWNlLyo=",
                "Expiration": "2015-04-09T11:52:19Z"
            }
        }"#;
        let creds = parse_assume_role_response(body).unwrap();
        assert_eq!(creds.access_key_id, "STS.L4aBSCSJVMuKg5U1vFDw");
        assert!(creds.security_token.as_deref().unwrap().starts_with("CAES"));
        assert_eq!(
            creds.expiration.unwrap().to_rfc3339(),
            "2015-04-09T11:52:19+00:00"
        );
        // 2015 is long gone
        assert!(matches!(
            creds.ensure_valid(),
            Err(OssError::CredentialExpired { .. })
        ));

        assert!(matches!(
            parse_assume_role_response(r#"{"Code": "NoPermission"}"#),
            Err(OssError::Backend { .. })
        ));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticCredentialProvider::new("ak", "sk");
        assert_eq!(provider.name(), "static");
        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!(creds.token_triple(), ("ak", "sk", None));
        assert!(creds.expiration.is_none());
    }

    #[tokio::test]
    async fn test_sts_provider_serves_fresh_cache() {
        let provider = StsCredentialProvider::from_config(&sts_config()).unwrap();
        let mut cached = Credentials::new("STS.cached", "secret");
        cached.security_token = Some("token".to_string());
        cached.expiration = Some(Utc::now() + Duration::hours(1));
        *provider.cached.lock() = Some(cached);

        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "STS.cached");
    }
}
