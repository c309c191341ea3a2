//! 加载超时处理
//!
//! 清单获取与模块加载可以配置超时；未配置时操作一直运行到完成或失败。

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::utils::{PortalError, Result};

/// 在可选的截止时间内执行 Future
///
/// # Arguments
///
/// * `deadline` - 超时时间，`None` 表示不限制
/// * `target` - 超时错误中记录的目标（URL 等）
/// * `future` - 要执行的 Future
///
/// # Returns
///
/// - Future 的结果
/// - `Err(PortalError::LoadTimeout)`: 超时
pub async fn with_deadline<F, T>(deadline: Option<Duration>, target: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(limit) = deadline else {
        return future.await;
    };

    match timeout(limit, future).await {
        Ok(result) => result,
        Err(_elapsed) => {
            warn!(target_url = %target, timeout_ms = limit.as_millis() as u64, "加载超时");
            Err(PortalError::LoadTimeout {
                target: target.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}

/// 毫秒配置转换为可选超时（0 视为不限制）
pub fn deadline_from_millis(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|&ms| ms > 0).map(Duration::from_millis)
}
