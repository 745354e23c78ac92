//! 遗留暂存文件的后台清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::STAGING_SWEEP_INTERVAL_SECS;
use crate::storage::Storage;

/// 启动后台任务，定期清理中断上传留下的暂存文件。
pub fn spawn_background_tasks(storage: Arc<Storage>, staging_ttl: Duration) {
    if staging_ttl.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STAGING_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match storage.sweep_staging(staging_ttl).await {
                Ok(removed) => debug!(removed, "staging sweep finished"),
                Err(err) => warn!(error = %err, "staging sweep failed"),
            }
        }
    });
}
