//! 单飞（single-flight）执行器
//!
//! 以字符串为键合并并发的相同操作：第一个调用者“认领”键并启动任务，
//! 之后到达的调用者加入同一个进行中的结果。
//!
//! - 认领与加入在同一把锁内完成，不存在“先检查再插入”的竞争窗口
//! - 任务通过 `tokio::spawn` 运行，即使所有等待者都被取消也会执行完毕
//! - 任务结束后键被移除，失败结果不会被保留，下一次调用重新执行

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error};

use crate::utils::{PortalError, Result};

type InFlight<T> = Shared<BoxFuture<'static, Result<T>>>;
type InFlightMap<T> = Arc<Mutex<HashMap<String, InFlight<T>>>>;

/// 单飞执行器
pub struct SingleFlight<T> {
    inflight: InFlightMap<T>,
}

fn lock<T>(map: &Mutex<HashMap<String, InFlight<T>>>) -> MutexGuard<'_, HashMap<String, InFlight<T>>> {
    // 锁内没有可能 panic 的操作，中毒时直接继续使用
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// 创建空的执行器
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 执行或加入 `key` 对应的任务
    ///
    /// `make` 只在本次调用认领了键时才会被调用。
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let flight = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(key) {
                Some(existing) => {
                    debug!(key = %key, "加入进行中的任务");
                    existing.clone()
                }
                None => {
                    let flight = self.spawn(key, make());
                    inflight.insert(key.to_string(), flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    fn spawn<Fut>(&self, key: &str, work: Fut) -> InFlight<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let owned_key = key.to_string();
        let registry = Arc::clone(&self.inflight);
        let handle = tokio::spawn(async move {
            let result = work.await;
            lock(&registry).remove(&owned_key);
            result
        });

        let owned_key = key.to_string();
        let registry = Arc::clone(&self.inflight);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    error!(key = %owned_key, error = %join_err, "单飞任务异常终止");
                    lock(&registry).remove(&owned_key);
                    Err(PortalError::Internal(format!(
                        "任务 '{}' 异常终止: {}",
                        owned_key, join_err
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// 指定键是否有进行中的任务
    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.inflight).contains_key(key)
    }

    /// 进行中的任务数量
    pub fn in_flight_count(&self) -> usize {
        lock(&self.inflight).len()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
