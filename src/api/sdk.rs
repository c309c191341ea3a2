//! Portal SDK
//!
//! 门户的主要对外接口。`Portal` 持有一个应用注册表和一个路由器，
//! 由宿主显式创建，不存在全局单例。
//!
//! # 示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_portal::{AppConfig, FsManifestFetcher, Portal, PortalConfig, StaticModuleLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = StaticModuleLoader::new();
//!     let portal = Portal::new(
//!         PortalConfig::default(),
//!         Arc::new(FsManifestFetcher::with_root("./dist")),
//!         Arc::new(loader),
//!     )
//!     .await?;
//!
//!     portal.register_app(AppConfig::new("shop", "/apps/shop", "/shop")).await?;
//!     portal.on_navigate("/shop/cart").await?;
//!
//!     portal.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::core::config::PortalConfig;
use crate::module::{
    AppConfig, AppRegistry, ManifestFetcher, ManifestResolver, ModuleCacheStats, ModuleLoader,
    RegistryConfig,
};
use crate::router::{Router, RouterStatsSnapshot};
use crate::utils::{deadline_from_millis, PortalError, Result};

// ============================================================================
// 门户状态
// ============================================================================

/// 门户状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalState {
    /// 运行中
    Running,
    /// 正在关闭
    ShuttingDown,
    /// 已关闭
    Shutdown,
}

impl PortalState {
    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        matches!(self, PortalState::Running)
    }
}

/// 门户运行信息
#[derive(Debug, Clone, Serialize)]
pub struct PortalInfo {
    /// 版本
    pub version: String,
    /// 状态
    pub state: PortalState,
    /// 运行时长（秒）
    pub uptime_secs: u64,
    /// 已注册应用数
    pub apps: usize,
    /// 当前挂载的应用
    pub mounted: Option<String>,
    /// 路由统计
    pub router: RouterStatsSnapshot,
    /// 实例缓存统计
    pub cache: ModuleCacheStats,
    /// 已缓存的清单数
    pub manifests: usize,
}

// ============================================================================
// Portal 主结构体
// ============================================================================

/// 微前端门户
///
/// # 生命周期
///
/// 1. `new()` - 创建注册表和路由器，注册配置中的应用
/// 2. `register_app()` / `on_navigate()` - 运行期使用
/// 3. `shutdown()` - 卸载当前应用，之后的导航返回 `Closed`
pub struct Portal {
    config: PortalConfig,
    state: RwLock<PortalState>,
    registry: Arc<AppRegistry>,
    router: Arc<Router>,
    started_at: Instant,
}

impl Portal {
    /// 创建门户
    ///
    /// # Arguments
    ///
    /// * `config` - 门户配置
    /// * `fetcher` - 清单获取能力
    /// * `loader` - 模块加载能力
    ///
    /// # Errors
    ///
    /// 配置无效或配置中的应用注册失败时返回错误
    pub async fn new(
        config: PortalConfig,
        fetcher: Arc<dyn ManifestFetcher>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<Self> {
        info!("初始化微前端门户 v{}", crate::VERSION);
        config.validate()?;

        let resolver = ManifestResolver::new(fetcher)
            .with_manifest_file(config.loader.manifest_file.clone())
            .with_fetch_timeout(deadline_from_millis(config.loader.fetch_timeout_ms));
        debug!("清单解析器初始化完成");

        let registry_config = RegistryConfig {
            default_entry: config.loader.entry_name.clone(),
            load_timeout: deadline_from_millis(config.loader.load_timeout_ms),
        };
        let registry = Arc::new(AppRegistry::with_config(
            registry_config,
            Arc::new(resolver),
            loader,
        ));
        debug!("应用注册表初始化完成");

        let router = Arc::new(Router::new(Arc::clone(&registry), config.router.clone()));
        debug!("路由器初始化完成");

        for app in config.apps.iter().cloned() {
            registry.register(app).await?;
        }

        info!(apps = config.apps.len(), "微前端门户初始化完成");
        Ok(Self {
            config,
            state: RwLock::new(PortalState::Running),
            registry,
            router,
            started_at: Instant::now(),
        })
    }

    /// 运行中时返回状态读锁
    ///
    /// 操作期间持有该锁，`shutdown` 等待进行中的操作结束后才开始卸载。
    async fn running(&self) -> Result<RwLockReadGuard<'_, PortalState>> {
        let state = self.state.read().await;
        if state.is_running() {
            Ok(state)
        } else {
            Err(PortalError::Closed)
        }
    }

    /// 注册应用
    pub async fn register_app(&self, app: AppConfig) -> Result<()> {
        let _running = self.running().await?;
        self.registry.register(app).await
    }

    /// 从配置文件注册其中的所有应用
    ///
    /// 只读取文件中的 `apps` 部分。返回注册成功的应用名称；
    /// 遇到第一个失败即停止，此前已注册的应用保留。
    pub async fn register_from_config(&self, path: impl Into<PathBuf>) -> Result<Vec<String>> {
        let _running = self.running().await?;
        let file = PortalConfig::from_file(path).await?;

        let mut registered = Vec::with_capacity(file.apps.len());
        for app in file.apps {
            let name = app.name.clone();
            self.registry.register(app).await?;
            registered.push(name);
        }

        info!(count = registered.len(), "已从配置文件注册应用");
        Ok(registered)
    }

    /// 处理导航
    ///
    /// 见 [`Router::on_navigate`]。
    pub async fn on_navigate(&self, path: &str) -> Result<Option<String>> {
        let _running = self.running().await?;
        self.router.on_navigate(path).await
    }

    /// 关闭门户
    ///
    /// 等待进行中的导航与注册结束，然后卸载当前应用。重复调用直接返回。
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.is_running() {
            return Ok(());
        }

        info!("正在关闭微前端门户...");
        *state = PortalState::ShuttingDown;

        if let Err(e) = self.router.reset().await {
            warn!(error = %e, "关闭时卸载应用失败");
        }

        *state = PortalState::Shutdown;
        info!("微前端门户已关闭");
        Ok(())
    }

    /// 获取门户状态
    pub async fn state(&self) -> PortalState {
        *self.state.read().await
    }

    /// 获取运行信息
    pub async fn info(&self) -> PortalInfo {
        PortalInfo {
            version: crate::VERSION.to_string(),
            state: self.state().await,
            uptime_secs: self.started_at.elapsed().as_secs(),
            apps: self.registry.len().await,
            mounted: self.registry.mounted().await,
            router: self.router.stats(),
            cache: self.registry.cache().stats(),
            manifests: self.registry.resolver().cached_count(),
        }
    }

    /// 应用注册表
    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    /// 路由器
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// 门户配置
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleInstance, StaticModuleLoader};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicIsize, Ordering};
    use std::time::Duration;

    struct NoManifest;

    #[async_trait]
    impl ManifestFetcher for NoManifest {
        async fn fetch_json(&self, url: &str) -> Result<Value> {
            Err(PortalError::Internal(format!("unexpected fetch: {}", url)))
        }
    }

    async fn portal(config: PortalConfig) -> Result<Portal> {
        let loader = StaticModuleLoader::new()
            .with_artifact("/shop.js", || Some(ModuleInstance::new("/shop.js")));
        Portal::new(config, Arc::new(NoManifest), Arc::new(loader)).await
    }

    #[tokio::test]
    async fn test_new_registers_configured_apps() {
        let config = PortalConfig::builder()
            .app(AppConfig::new("shop", "/apps/shop", "/shop").with_entry_url("/shop.js"))
            .build();
        let portal = portal(config).await.unwrap();

        assert!(portal.registry().contains("shop").await);
        assert_eq!(portal.state().await, PortalState::Running);
        assert_eq!(portal.on_navigate("/shop").await.unwrap().as_deref(), Some("shop"));

        let info = portal.info().await;
        assert_eq!(info.apps, 1);
        assert_eq!(info.mounted.as_deref(), Some("shop"));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = PortalConfig::builder().fetch_timeout_ms(0).build();
        assert!(portal(config).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown() {
        let portal = portal(PortalConfig::default()).await.unwrap();
        portal
            .register_app(AppConfig::new("shop", "/apps/shop", "/shop").with_entry_url("/shop.js"))
            .await
            .unwrap();
        portal.on_navigate("/shop").await.unwrap();

        portal.shutdown().await.unwrap();
        assert_eq!(portal.state().await, PortalState::Shutdown);
        assert!(portal.registry().mounted().await.is_none());

        let err = portal.on_navigate("/shop").await.unwrap_err();
        assert!(matches!(err, PortalError::Closed));
        let err = portal
            .register_app(AppConfig::new("blog", "/apps/blog", "/blog"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Closed));

        // 重复关闭
        portal.shutdown().await.unwrap();
    }

    /// 挂载计数 +1、卸载计数 -1 的实例，挂载钩子耗时 `delay`
    fn counted_instance(source: &str, live: &Arc<AtomicIsize>, delay: Duration) -> ModuleInstance {
        let (m, u) = (Arc::clone(live), Arc::clone(live));
        ModuleInstance::new(source)
            .with_mount(move |_| {
                let live = Arc::clone(&m);
                async move {
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                    live.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_unmount(move |_| {
                let live = Arc::clone(&u);
                async move {
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
    }

    async fn counted_portal(live: &Arc<AtomicIsize>, delay: Duration) -> Arc<Portal> {
        let loader = StaticModuleLoader::new();
        for name in ["shop", "blog"] {
            let url = format!("/{}.js", name);
            let source = url.clone();
            let live = Arc::clone(live);
            loader.register(url, move || Some(counted_instance(&source, &live, delay)));
        }
        let config = PortalConfig::builder()
            .app(AppConfig::new("shop", "/apps/shop", "/shop").with_entry_url("/shop.js"))
            .app(AppConfig::new("blog", "/apps/blog", "/blog").with_entry_url("/blog.js"))
            .build();
        Arc::new(
            Portal::new(config, Arc::new(NoManifest), Arc::new(loader))
                .await
                .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_inflight_navigation() {
        let live = Arc::new(AtomicIsize::new(0));
        let portal = counted_portal(&live, Duration::from_millis(100)).await;

        let p = Arc::clone(&portal);
        let inflight = tokio::spawn(async move { p.on_navigate("/shop").await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let p = Arc::clone(&portal);
        let closing = tokio::spawn(async move { p.shutdown().await });
        tokio::time::sleep(Duration::from_millis(1)).await;

        // 关闭已在排队，新的导航不再开始
        let late = portal.on_navigate("/blog").await;
        assert!(matches!(late, Err(PortalError::Closed)));

        assert_eq!(inflight.await.unwrap().unwrap().as_deref(), Some("shop"));
        closing.await.unwrap().unwrap();

        assert_eq!(portal.state().await, PortalState::Shutdown);
        assert!(portal.registry().mounted().await.is_none());
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_app_mounted_after_concurrent_shutdown() {
        for _ in 0..50 {
            let live = Arc::new(AtomicIsize::new(0));
            let portal = counted_portal(&live, Duration::ZERO).await;

            let navigations: Vec<_> = (0..8)
                .map(|i| {
                    let p = Arc::clone(&portal);
                    let path = if i % 2 == 0 { "/shop" } else { "/blog" };
                    tokio::spawn(async move { p.on_navigate(path).await })
                })
                .collect();
            portal.shutdown().await.unwrap();

            for navigation in navigations {
                match navigation.await.unwrap() {
                    Ok(_) | Err(PortalError::Closed) => {}
                    Err(e) => panic!("unexpected error: {:?}", e),
                }
            }
            assert!(portal.registry().mounted().await.is_none());
            assert_eq!(live.load(Ordering::SeqCst), 0);
        }
    }
}
