//! 日志初始化：`RUST_LOG` 优先，否则使用网关默认过滤规则。

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Request spans and upload records at info, per-request access lines at debug.
fn default_directives() -> String {
    format!("warn,{}=info,tower_http=info", env!("CARGO_CRATE_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        let directives = default_directives();
        assert!(directives.contains("upload_gateway=info"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
