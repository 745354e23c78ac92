//! 存活检查处理器。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::GatewayConfig;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
    service: String,
    timestamp: String,
}

/// 始终返回 200 与当前 UTC 时间。
pub async fn health(Extension(config): Extension<Arc<GatewayConfig>>) -> JsonResponse<HealthStatus> {
    JsonResponse(HealthStatus {
        status: "ok",
        service: config.service_name.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
