//! 应用注册表
//!
//! 管理所有已注册的子应用，负责：
//! - 应用注册、覆盖注册与注销
//! - 加载流水线：清单解析 -> 实例缓存 -> 模块加载 -> bootstrap
//! - 挂载与卸载，保证任意时刻最多一个应用处于挂载状态
//!
//! 同一应用的并发加载共享一次流水线；解析到同一产物的不同应用共享一次模块加载。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, instrument, warn, Instrument, Span};

use super::cache::{ModuleCache, SharedInstance};
use super::instance::{LifecycleProps, LifecycleStage};
use super::loader::ModuleLoader;
use super::manifest::ManifestResolver;
use super::metadata::{AppConfig, AppRuntimeState, AppSnapshot, AppStatus, MatchStrategy};
use crate::utils::{with_deadline, PortalError, Result, SingleFlight};

/// 默认入口名
pub const DEFAULT_ENTRY: &str = "src/main.jsx";

/// 注册表配置
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// 应用未指定入口时使用的清单入口名
    pub default_entry: String,
    /// 单个产物的加载超时（含 bootstrap）
    pub load_timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_entry: DEFAULT_ENTRY.to_string(),
            load_timeout: None,
        }
    }
}

/// 注册记录
struct AppRecord {
    config: AppConfig,
    state: AppRuntimeState,
    /// 每次（覆盖）注册分配新的代数，旧代数的加载结果不会写入新记录
    generation: u64,
}

#[derive(Default)]
struct RegistryState {
    apps: HashMap<String, AppRecord>,
    /// 注册顺序
    order: Vec<String>,
    next_generation: u64,
}

impl RegistryState {
    fn allocate_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn mounted(&self) -> Option<&str> {
        self.order
            .iter()
            .find(|name| {
                self.apps
                    .get(name.as_str())
                    .is_some_and(|r| r.state.status == AppStatus::Mounted)
            })
            .map(String::as_str)
    }
}

/// 应用注册表
pub struct AppRegistry {
    config: RegistryConfig,
    state: Arc<RwLock<RegistryState>>,
    resolver: Arc<ManifestResolver>,
    cache: Arc<ModuleCache>,
    loader: Arc<dyn ModuleLoader>,
    /// 按“应用名#代数”去重的加载流水线
    app_flights: SingleFlight<SharedInstance>,
    /// 按产物 URL 去重的模块加载
    artifact_flights: Arc<SingleFlight<SharedInstance>>,
    /// 挂载/卸载钩子串行执行（单一容器）
    lifecycle: Arc<Mutex<()>>,
}

impl AppRegistry {
    /// 使用默认配置创建注册表
    pub fn new(resolver: Arc<ManifestResolver>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self::with_config(RegistryConfig::default(), resolver, loader)
    }

    /// 使用指定配置创建注册表
    pub fn with_config(
        config: RegistryConfig,
        resolver: Arc<ManifestResolver>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(RegistryState::default())),
            resolver,
            cache: Arc::new(ModuleCache::new()),
            loader,
            app_flights: SingleFlight::new(),
            artifact_flights: Arc::new(SingleFlight::new()),
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    // ========================================================================
    // 注册
    // ========================================================================

    /// 注册应用
    ///
    /// # Errors
    ///
    /// - `DuplicateApp`: 名称已注册（覆盖请使用 [`reregister`](Self::reregister)）
    /// - `InvalidConfigValue` / `InvalidActivationRule`: 配置无效
    pub async fn register(&self, config: AppConfig) -> Result<()> {
        config.validate()?;

        let mut state = self.state.write().await;
        if state.apps.contains_key(&config.name) {
            return Err(PortalError::DuplicateApp(config.name));
        }

        let generation = state.allocate_generation();
        let name = config.name.clone();
        info!(
            app = %name,
            base = %config.base_location,
            rule = %config.activation_rule,
            "注册应用"
        );
        state.order.push(name.clone());
        state.apps.insert(
            name,
            AppRecord {
                config,
                state: AppRuntimeState::default(),
                generation,
            },
        );
        Ok(())
    }

    /// 覆盖注册
    ///
    /// 旧应用处于挂载状态时先卸载；新记录从 NotLoaded 开始。
    /// 名称未注册时等同于 [`register`](Self::register)。
    pub async fn reregister(&self, config: AppConfig) -> Result<()> {
        config.validate()?;
        let guard = self.lock_lifecycle().await;
        self.run_lifecycle(guard, move |lifecycle| lifecycle.replace(config))
            .await
    }

    /// 注销应用（挂载中的应用先卸载）
    pub async fn deregister(&self, name: &str) -> Result<()> {
        let guard = self.lock_lifecycle().await;
        let name = name.to_string();
        self.run_lifecycle(guard, move |lifecycle| lifecycle.remove(name))
            .await
    }

    // ========================================================================
    // 加载
    // ========================================================================

    /// 确保应用已加载
    ///
    /// NotLoaded 时执行加载流水线，Loaded / Mounted 时直接返回实例。
    /// 失败时状态保持 NotLoaded，并记录 `last_error`。
    #[instrument(skip(self), fields(app = %name))]
    pub async fn ensure_loaded(&self, name: &str) -> Result<SharedInstance> {
        let (config, generation) = {
            let state = self.state.read().await;
            let record = state
                .apps
                .get(name)
                .ok_or_else(|| PortalError::AppNotFound(name.to_string()))?;
            if let Some(instance) = record.state.loaded_instance() {
                return Ok(instance);
            }
            (record.config.clone(), record.generation)
        };

        let key = format!("{}#{}", name, generation);
        let pipeline = self.pipeline();
        self.app_flights
            .run(&key, move || pipeline.run(config, generation))
            .await
    }

    /// 解析应用的产物 URL（不加载）
    pub async fn resolve_artifact(&self, name: &str) -> Result<String> {
        let config = self
            .config(name)
            .await
            .ok_or_else(|| PortalError::AppNotFound(name.to_string()))?;
        artifact_url_for(&self.resolver, &config, &self.config.default_entry).await
    }

    fn pipeline(&self) -> LoadPipeline {
        LoadPipeline {
            state: Arc::clone(&self.state),
            resolver: Arc::clone(&self.resolver),
            cache: Arc::clone(&self.cache),
            loader: Arc::clone(&self.loader),
            artifact_flights: Arc::clone(&self.artifact_flights),
            default_entry: self.config.default_entry.clone(),
            load_timeout: self.config.load_timeout,
        }
    }

    // ========================================================================
    // 挂载 / 卸载
    // ========================================================================

    /// 挂载应用
    ///
    /// 先确保已加载；已挂载时不再调用钩子；其它已挂载的应用会先被卸载。
    /// 钩子失败时返回 `LifecycleFailed`，状态保持 Loaded。
    #[instrument(skip(self), fields(app = %name))]
    pub async fn mount(&self, name: &str, container: &str) -> Result<()> {
        let guard = self.lock_lifecycle().await;
        let instance = self.ensure_loaded(name).await?;

        let name = name.to_string();
        let container = container.to_string();
        self.run_lifecycle(guard, move |lifecycle| async move {
            lifecycle.mount(&name, &container, instance).await
        })
        .await
    }

    /// 卸载应用
    ///
    /// 未挂载（或未注册）时什么也不做。钩子失败时状态仍变为 Loaded，
    /// 随后返回 `LifecycleFailed`。
    #[instrument(skip(self), fields(app = %name))]
    pub async fn unmount(&self, name: &str) -> Result<()> {
        let guard = self.lock_lifecycle().await;
        let name = name.to_string();
        self.run_lifecycle(guard, move |lifecycle| async move {
            lifecycle.unmount(&name).await
        })
        .await
    }

    async fn lock_lifecycle(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lifecycle).lock_owned().await
    }

    /// 在独立任务中执行钩子与状态写入
    ///
    /// 任务持有 `lifecycle` 锁直到结束；调用方被取消时任务照常完成，
    /// 钩子结果一定会写入状态。
    async fn run_lifecycle<F, Fut>(&self, guard: OwnedMutexGuard<()>, op: F) -> Result<()>
    where
        F: FnOnce(Lifecycle) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let work = op(Lifecycle {
            state: Arc::clone(&self.state),
        });
        let handle = tokio::spawn(
            async move {
                let result = work.await;
                drop(guard);
                result
            }
            .instrument(Span::current()),
        );

        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(error = %join_err, "生命周期任务异常终止");
                Err(PortalError::Internal(format!(
                    "生命周期任务异常终止: {}",
                    join_err
                )))
            }
        }
    }

    // ========================================================================
    // 查询
    // ========================================================================

    /// 查找路径所属的应用
    pub async fn find_app(&self, path: &str, strategy: MatchStrategy) -> Option<String> {
        let state = self.state.read().await;
        let mut candidates = state.order.iter().filter_map(|name| {
            let record = state.apps.get(name)?;
            record
                .config
                .activation_rule
                .match_len(path)
                .map(|len| (name, len))
        });

        let found = match strategy {
            MatchStrategy::FirstMatch => candidates.next(),
            MatchStrategy::LongestPrefix => candidates.fold(None, |best, (name, len)| match best {
                Some((_, best_len)) if best_len >= len => best,
                _ => Some((name, len)),
            }),
        };
        found.map(|(name, _)| name.clone())
    }

    /// 应用状态
    pub async fn status(&self, name: &str) -> Option<AppStatus> {
        self.state.read().await.apps.get(name).map(|r| r.state.status)
    }

    /// 应用配置
    pub async fn config(&self, name: &str) -> Option<AppConfig> {
        self.state.read().await.apps.get(name).map(|r| r.config.clone())
    }

    /// 应用快照
    pub async fn snapshot(&self, name: &str) -> Option<AppSnapshot> {
        self.state
            .read()
            .await
            .apps
            .get(name)
            .map(|r| AppSnapshot::new(&r.config, &r.state))
    }

    /// 所有应用快照（注册顺序）
    pub async fn list(&self) -> Vec<AppSnapshot> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|name| state.apps.get(name))
            .map(|r| AppSnapshot::new(&r.config, &r.state))
            .collect()
    }

    /// 已加载应用的模块实例
    pub async fn instance(&self, name: &str) -> Option<SharedInstance> {
        self.state
            .read()
            .await
            .apps
            .get(name)
            .and_then(|r| r.state.loaded_instance())
    }

    /// 当前挂载的应用
    pub async fn mounted(&self) -> Option<String> {
        self.state.read().await.mounted().map(str::to_string)
    }

    /// 是否已注册
    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.apps.contains_key(name)
    }

    /// 已注册的应用名称（注册顺序）
    pub async fn app_names(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    /// 已注册的应用数量
    pub async fn len(&self) -> usize {
        self.state.read().await.apps.len()
    }

    /// 是否没有注册任何应用
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.apps.is_empty()
    }

    /// 模块实例缓存
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// 清单解析器
    pub fn resolver(&self) -> &ManifestResolver {
        &self.resolver
    }
}

/// 应用对应的产物 URL：优先使用预解析的 `entry_url`，否则查清单
async fn artifact_url_for(
    resolver: &ManifestResolver,
    config: &AppConfig,
    default_entry: &str,
) -> Result<String> {
    if let Some(ref url) = config.entry_url {
        return Ok(url.clone());
    }
    let entry = config.entry.as_deref().unwrap_or(default_entry);
    resolver.resolve(&config.base_location, entry).await
}

/// 挂载/卸载操作
///
/// 只在 [`AppRegistry::run_lifecycle`] 的任务中运行，运行期间持有 `lifecycle` 锁。
struct Lifecycle {
    state: Arc<RwLock<RegistryState>>,
}

impl Lifecycle {
    async fn mount(&self, name: &str, container: &str, instance: SharedInstance) -> Result<()> {
        let others: Vec<String> = {
            let state = self.state.read().await;
            if state
                .apps
                .get(name)
                .is_some_and(|r| r.state.status == AppStatus::Mounted)
            {
                debug!(app = %name, "应用已挂载，跳过");
                return Ok(());
            }
            state.mounted().filter(|m| *m != name).map(str::to_string).into_iter().collect()
        };

        for other in others {
            if let Err(e) = self.unmount(&other).await {
                warn!(app = %other, error = %e, "卸载前一个应用失败");
            }
        }

        let outcome = instance
            .invoke(LifecycleStage::Mount, LifecycleProps::with_container(name, container))
            .await;

        let mut state = self.state.write().await;
        let record = state
            .apps
            .get_mut(name)
            .ok_or_else(|| PortalError::AppNotFound(name.to_string()))?;

        match outcome {
            Some(Err(e)) => {
                let err = PortalError::LifecycleFailed {
                    app: name.to_string(),
                    hook: LifecycleStage::Mount.as_str(),
                    reason: e.to_string(),
                };
                warn!(app = %name, container = %container, error = %e, "挂载失败");
                record.state.last_error = Some(err.clone());
                Err(err)
            }
            _ => {
                record.state.mark_mounted(container);
                info!(app = %name, container = %container, "应用已挂载");
                Ok(())
            }
        }
    }

    async fn unmount(&self, name: &str) -> Result<()> {
        let (instance, container) = {
            let state = self.state.read().await;
            match state.apps.get(name) {
                Some(record) if record.state.status.can_unmount() => (
                    record.state.instance.clone(),
                    record.state.container.clone().unwrap_or_default(),
                ),
                _ => {
                    debug!(app = %name, "应用未挂载，跳过卸载");
                    return Ok(());
                }
            }
        };

        let outcome = match instance {
            Some(instance) => {
                instance
                    .invoke(LifecycleStage::Unmount, LifecycleProps::with_container(name, &container))
                    .await
            }
            None => None,
        };

        let mut state = self.state.write().await;
        let Some(record) = state.apps.get_mut(name) else {
            return Ok(());
        };
        record.state.mark_unmounted();

        match outcome {
            Some(Err(e)) => {
                let err = PortalError::LifecycleFailed {
                    app: name.to_string(),
                    hook: LifecycleStage::Unmount.as_str(),
                    reason: e.to_string(),
                };
                warn!(app = %name, error = %e, "卸载钩子失败");
                record.state.last_error = Some(err.clone());
                Err(err)
            }
            _ => {
                info!(app = %name, container = %container, "应用已卸载");
                Ok(())
            }
        }
    }

    async fn replace(self, config: AppConfig) -> Result<()> {
        if let Err(e) = self.unmount(&config.name).await {
            warn!(app = %config.name, error = %e, "覆盖注册前卸载失败");
        }

        let mut state = self.state.write().await;
        let generation = state.allocate_generation();
        let name = config.name.clone();
        let record = AppRecord {
            config,
            state: AppRuntimeState::default(),
            generation,
        };

        if state.apps.insert(name.clone(), record).is_some() {
            warn!(app = %name, "覆盖已注册的应用");
        } else {
            info!(app = %name, "注册应用");
            state.order.push(name);
        }
        Ok(())
    }

    async fn remove(self, name: String) -> Result<()> {
        if !self.state.read().await.apps.contains_key(&name) {
            return Err(PortalError::AppNotFound(name));
        }

        if let Err(e) = self.unmount(&name).await {
            warn!(app = %name, error = %e, "注销前卸载失败");
        }

        let mut state = self.state.write().await;
        state.apps.remove(&name);
        state.order.retain(|n| *n != name);
        info!(app = %name, "应用已注销");
        Ok(())
    }
}

/// 单次加载流水线
///
/// 在单飞任务中运行，只持有共享状态的 `Arc`。
struct LoadPipeline {
    state: Arc<RwLock<RegistryState>>,
    resolver: Arc<ManifestResolver>,
    cache: Arc<ModuleCache>,
    loader: Arc<dyn ModuleLoader>,
    artifact_flights: Arc<SingleFlight<SharedInstance>>,
    default_entry: String,
    load_timeout: Option<Duration>,
}

impl LoadPipeline {
    async fn run(self, config: AppConfig, generation: u64) -> Result<SharedInstance> {
        let name = config.name.clone();

        // 认领后复查，上一轮加载可能刚写入状态
        {
            let state = self.state.read().await;
            match state.apps.get(&name) {
                None => return Err(PortalError::AppNotFound(name)),
                Some(record) if record.generation == generation => {
                    if let Some(instance) = record.state.loaded_instance() {
                        return Ok(instance);
                    }
                }
                Some(_) => {}
            }
        }

        debug!(app = %name, "开始加载应用");
        let result = self.load(&config).await;

        let mut state = self.state.write().await;
        match state.apps.get_mut(&name) {
            Some(record) if record.generation == generation => match result {
                Ok((ref url, ref instance)) => {
                    record.state.mark_loaded(url, Arc::clone(instance));
                    info!(app = %name, artifact_url = %url, "应用已加载");
                }
                Err(ref e) => {
                    record.state.last_error = Some(e.clone());
                    warn!(app = %name, error = %e, error_code = e.error_code(), "应用加载失败");
                }
            },
            _ => debug!(app = %name, "注册已变更，丢弃本次加载结果"),
        }

        result.map(|(_, instance)| instance)
    }

    async fn load(&self, config: &AppConfig) -> Result<(String, SharedInstance)> {
        let url = artifact_url_for(&self.resolver, config, &self.default_entry).await?;

        if let Some(instance) = self.cache.get(&url) {
            debug!(app = %config.name, artifact_url = %url, "命中实例缓存");
            return Ok((url, instance));
        }

        let instance = self.load_artifact(&config.name, &url).await?;
        Ok((url, instance))
    }

    async fn load_artifact(&self, app: &str, url: &str) -> Result<SharedInstance> {
        let cache = Arc::clone(&self.cache);
        let loader = Arc::clone(&self.loader);
        let timeout = self.load_timeout;
        let owned_url = url.to_string();
        let app = app.to_string();

        self.artifact_flights
            .run(url, move || async move {
                if let Some(instance) = cache.peek(&owned_url) {
                    return Ok(instance);
                }

                let instance = with_deadline(timeout, &owned_url, async {
                    let instance = loader.load(&owned_url).await?;
                    let props = LifecycleProps::bootstrap(&app);
                    if let Some(Err(e)) = instance.invoke(LifecycleStage::Bootstrap, props).await {
                        return Err(PortalError::LifecycleFailed {
                            app: app.clone(),
                            hook: LifecycleStage::Bootstrap.as_str(),
                            reason: e.to_string(),
                        });
                    }
                    Ok::<_, PortalError>(instance)
                })
                .await?;

                Ok::<_, PortalError>(cache.get_or_insert(&owned_url, Arc::new(instance)))
            })
            .await
    }
}
