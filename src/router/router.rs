//! 导航路由器
//!
//! 把导航路径映射到最多一个子应用，并保证同一时刻只有一个应用处于挂载状态。
//! 导航按到达顺序串行执行：一次“卸载 -> 挂载”完整结束后才处理下一次导航。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::core::config::RouterConfig;
use crate::module::{AppRegistry, AppStatus};
use crate::utils::{generate_navigation_id, Result};

/// 路由统计信息
#[derive(Debug, Default)]
pub struct RouterStats {
    /// 导航次数
    navigations: AtomicU64,
    /// 发生应用切换的次数
    switches: AtomicU64,
    /// 失败次数
    failures: AtomicU64,
    /// 切换总耗时（微秒）
    total_switch_us: AtomicU64,
    /// 最大切换耗时（微秒）
    max_switch_us: AtomicU64,
}

impl RouterStats {
    /// 创建新的统计实例
    pub fn new() -> Self {
        Self::default()
    }

    fn record_navigation(&self) {
        self.navigations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_switch(&self, latency_us: u64, success: bool) {
        self.switches.fetch_add(1, Ordering::Relaxed);
        self.total_switch_us.fetch_add(latency_us, Ordering::Relaxed);
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut current_max = self.max_switch_us.load(Ordering::Relaxed);
        while latency_us > current_max {
            match self.max_switch_us.compare_exchange_weak(
                current_max,
                latency_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_max = actual,
            }
        }
    }

    /// 获取统计快照
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        let switches = self.switches.load(Ordering::Relaxed);
        let total_switch = self.total_switch_us.load(Ordering::Relaxed);

        RouterStatsSnapshot {
            navigations: self.navigations.load(Ordering::Relaxed),
            switches,
            failures: self.failures.load(Ordering::Relaxed),
            avg_switch_us: if switches > 0 { total_switch / switches } else { 0 },
            max_switch_us: self.max_switch_us.load(Ordering::Relaxed),
        }
    }

    /// 重置统计
    pub fn reset(&self) {
        self.navigations.store(0, Ordering::Relaxed);
        self.switches.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.total_switch_us.store(0, Ordering::Relaxed);
        self.max_switch_us.store(0, Ordering::Relaxed);
    }
}

/// 路由统计快照
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatsSnapshot {
    /// 导航次数
    pub navigations: u64,
    /// 应用切换次数
    pub switches: u64,
    /// 失败次数
    pub failures: u64,
    /// 平均切换耗时（微秒）
    pub avg_switch_us: u64,
    /// 最大切换耗时（微秒）
    pub max_switch_us: u64,
}

/// 导航路由器
pub struct Router {
    registry: Arc<AppRegistry>,
    config: RouterConfig,
    /// 当前应用；导航期间一直持有，保证导航串行
    current: Mutex<Option<String>>,
    stats: RouterStats,
}

impl Router {
    /// 创建路由器
    pub fn new(registry: Arc<AppRegistry>, config: RouterConfig) -> Self {
        Self {
            registry,
            config,
            current: Mutex::new(None),
            stats: RouterStats::new(),
        }
    }

    /// 使用默认配置创建路由器
    pub fn with_defaults(registry: Arc<AppRegistry>) -> Self {
        Self::new(registry, RouterConfig::default())
    }

    /// 处理一次导航
    ///
    /// # Returns
    ///
    /// - `Ok(Some(app))`: 导航后挂载的应用
    /// - `Ok(None)`: 没有应用匹配该路径
    /// - `Err(_)`: 目标应用加载或挂载失败，此时没有应用处于挂载状态
    #[instrument(skip(self), fields(navigation_id = %generate_navigation_id()))]
    pub async fn on_navigate(&self, path: &str) -> Result<Option<String>> {
        let mut current = self.current.lock().await;
        self.stats.record_navigation();

        let target = self
            .registry
            .find_app(path, self.config.match_strategy)
            .await;

        if target == *current && self.still_mounted(target.as_deref()).await {
            debug!(path = %path, app = ?target, "目标应用未变化");
            return Ok(target);
        }

        let start = Instant::now();
        if let Some(previous) = current.take() {
            if let Err(e) = self.registry.unmount(&previous).await {
                warn!(app = %previous, error = %e, "卸载当前应用失败，继续切换");
            }
        }

        let Some(app) = target else {
            info!(path = %path, "没有应用匹配该路径");
            self.stats.record_switch(start.elapsed().as_micros() as u64, true);
            return Ok(None);
        };

        let result = self.registry.mount(&app, &self.config.container).await;
        self.stats
            .record_switch(start.elapsed().as_micros() as u64, result.is_ok());

        match result {
            Ok(()) => {
                info!(path = %path, app = %app, "已切换到应用");
                *current = Some(app.clone());
                Ok(Some(app))
            }
            Err(e) => {
                warn!(path = %path, app = %app, error = %e, error_code = e.error_code(), "切换应用失败");
                Err(e)
            }
        }
    }

    /// 当前应用是否仍处于挂载状态（`None` 视为一致）
    async fn still_mounted(&self, app: Option<&str>) -> bool {
        match app {
            Some(name) => self.registry.status(name).await == Some(AppStatus::Mounted),
            None => true,
        }
    }

    /// 当前挂载的应用
    pub async fn current(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    /// 卸载当前应用并清空状态
    pub async fn reset(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        match current.take() {
            Some(app) => {
                info!(app = %app, "重置路由器");
                self.registry.unmount(&app).await
            }
            None => Ok(()),
        }
    }

    /// 获取统计信息
    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// 重置统计
    pub fn reset_stats(&self) {
        self.stats.reset()
    }

    /// 获取配置
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// 应用注册表
    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }
}
