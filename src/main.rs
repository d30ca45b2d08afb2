use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oss_uploader::config;
use oss_uploader::utils::clean_object_key;
use oss_uploader::OssClient;

const USAGE: &str = "usage: oss-uploader <local-file> <object-key>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oss_uploader=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!(
            "oss-uploader {} (built {})",
            env!("CARGO_PKG_VERSION"),
            env!("BUILD_TIME")
        );
        return Ok(());
    }
    let (local_file, object_key) = match args.as_slice() {
        [local, key] => (PathBuf::from(local), clean_object_key(key)),
        _ => bail!(USAGE),
    };

    // Load configuration / 加载配置
    let config_path = config::get_config_path();
    let app_config = config::load_config(&config_path)?;
    app_config
        .validate()
        .with_context(|| format!("Invalid configuration in {:?}", config_path))?;

    let client = OssClient::from_config(app_config)
        .await
        .context("Failed to connect to OSS")?
        .with_progress(Arc::new(|done, total| {
            tracing::debug!("Progress: {}/{} bytes", done, total);
        }));

    let url = match client.upload_path(&object_key, &local_file).await {
        Ok(url) => url,
        Err(e) => {
            if let Some(part_number) = e.failed_part() {
                tracing::error!("Part {} failed, the multipart upload was aborted", part_number);
            }
            if e.is_credential_expired() {
                tracing::error!("Credentials expired, check the STS role and duration");
            }
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to upload {:?} to {}", local_file, object_key)));
        }
    };

    println!("{}", url);
    Ok(())
}
