//! 命令行参数、环境变量与服务配置默认值。

use clap::Parser;
use shadow_rs::formatcp;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_UPLOAD_DIR: &str = "public/uploads";
pub const DEFAULT_SERVICE_NAME: &str = "upload service";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_LOCK_WAIT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STAGING_TTL_SECS: u64 = 60 * 60;
pub const STAGING_DIR_NAME: &str = ".upload-staging";
pub const STAGING_SWEEP_INTERVAL_SECS: u64 = 900;
/// Room for multipart boundaries and the text fields on top of the file limit.
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// CLI arguments and environment configuration for the gateway.
#[derive(Parser, Debug)]
#[command(name = "upload-gateway", version = VERSION_INFO, about = "HTTP file upload gateway")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "HOST",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "BASE_URL",
        help = "Public URL prefix used to build returned file URLs"
    )]
    pub base_url: Option<String>,
    #[arg(
        short = 'd',
        long,
        env = "UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Directory uploaded files are stored under"
    )]
    pub upload_dir: String,
    #[arg(
        long,
        env = "STAGING_DIR",
        help = "Directory for in-flight uploads (defaults to a sibling of the upload dir)"
    )]
    pub staging_dir: Option<String>,
    #[arg(
        long,
        env = "MAX_FILE_SIZE",
        default_value_t = DEFAULT_MAX_FILE_SIZE,
        help = "Max uploaded file size in bytes (0 to disable)"
    )]
    pub max_file_size: u64,
    #[arg(
        long,
        env = "SERVICE_NAME",
        default_value = DEFAULT_SERVICE_NAME,
        help = "Service name reported by the health check"
    )]
    pub service_name: String,
    #[arg(
        long,
        env = "CORS_ORIGINS",
        default_value = "*",
        help = "Comma separated CORS origins, or * for any"
    )]
    pub cors_origins: String,
    #[arg(
        long,
        env = "STAGING_TTL_SECS",
        default_value_t = DEFAULT_STAGING_TTL_SECS,
        help = "Age after which abandoned staging files are removed (0 to disable)"
    )]
    pub staging_ttl_secs: u64,
    #[arg(
        long,
        env = "LOCK_TIMEOUT_SECS",
        default_value_t = DEFAULT_LOCK_WAIT_TIMEOUT_SECS,
        help = "Max wait for a concurrent upload to the same file"
    )]
    pub lock_timeout_secs: u64,
}

impl Args {
    /// 返回暂存目录，未配置时使用上传目录的同级目录。
    pub fn staging_path(&self) -> PathBuf {
        match &self.staging_dir {
            Some(dir) => PathBuf::from(dir),
            None => default_staging_dir(Path::new(&self.upload_dir)),
        }
    }
}

/// 请求处理期间只读的服务配置。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub service_name: String,
    pub max_file_size: u64,
    pub lock_timeout: Duration,
    pub cors_origins: String,
}

impl GatewayConfig {
    pub fn from_args(args: &Args) -> Self {
        let base_url = args
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", args.port));
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_name: args.service_name.clone(),
            max_file_size: args.max_file_size,
            lock_timeout: Duration::from_secs(args.lock_timeout_secs),
            cors_origins: args.cors_origins.clone(),
        }
    }

    /// 请求体上限：文件上限加 multipart 开销，`None` 表示不限制。
    pub fn body_limit(&self) -> Option<usize> {
        if self.max_file_size == 0 {
            return None;
        }
        let limit = self.max_file_size.saturating_add(MULTIPART_OVERHEAD);
        Some(usize::try_from(limit).unwrap_or(usize::MAX))
    }
}

fn default_staging_dir(upload_dir: &Path) -> PathBuf {
    match upload_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(STAGING_DIR_NAME),
        _ => PathBuf::from(STAGING_DIR_NAME),
    }
}
