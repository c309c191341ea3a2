//! 模块加载器
//!
//! “加载远程模块”能力的抽象。加载器接收解析后的产物 URL，直接返回模块实例，
//! 不依赖任何全局命名约定。加载器本身不缓存、不重试，去重由注册表与
//! [`ModuleCache`](super::cache::ModuleCache) 负责。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use super::instance::ModuleInstance;
use crate::utils::{PortalError, Result};

/// 模块加载接口
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// 加载产物并返回模块实例
    ///
    /// # Errors
    ///
    /// - `ScriptLoad`: 产物获取或执行失败
    /// - `InstanceNotFound`: 执行完成但没有产出模块实例
    async fn load(&self, artifact_url: &str) -> Result<ModuleInstance>;
}

/// 实例工厂
///
/// 返回 `None` 表示产物执行完成但没有导出模块实例。
pub type InstanceFactory = Arc<dyn Fn() -> Option<ModuleInstance> + Send + Sync>;

/// 静态模块加载器
///
/// 产物 URL 到实例工厂的映射表，用于把子应用编译进宿主进程的场景以及测试。
///
/// # Example
///
/// ```
/// use chips_portal::module::{ModuleInstance, StaticModuleLoader};
///
/// let loader = StaticModuleLoader::new()
///     .with_artifact("/apps/shop/main-ab12.js", || {
///         Some(ModuleInstance::new("/apps/shop/main-ab12.js"))
///     });
/// assert!(loader.contains("/apps/shop/main-ab12.js"));
/// ```
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: RwLock<HashMap<String, InstanceFactory>>,
}

impl StaticModuleLoader {
    /// 创建空加载器
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, InstanceFactory>> {
        self.factories.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, InstanceFactory>> {
        self.factories.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 注册产物
    pub fn register<F>(&self, artifact_url: impl Into<String>, factory: F)
    where
        F: Fn() -> Option<ModuleInstance> + Send + Sync + 'static,
    {
        let artifact_url = artifact_url.into();
        debug!(artifact_url = %artifact_url, "注册静态产物");
        self.write().insert(artifact_url, Arc::new(factory));
    }

    /// 注册产物（构建器形式）
    pub fn with_artifact<F>(self, artifact_url: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Option<ModuleInstance> + Send + Sync + 'static,
    {
        self.register(artifact_url, factory);
        self
    }

    /// 移除产物
    pub fn unregister(&self, artifact_url: &str) -> bool {
        self.write().remove(artifact_url).is_some()
    }

    /// 是否注册了产物
    pub fn contains(&self, artifact_url: &str) -> bool {
        self.read().contains_key(artifact_url)
    }

    /// 已注册的产物数量
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, artifact_url: &str) -> Result<ModuleInstance> {
        let factory = self
            .read()
            .get(artifact_url)
            .cloned()
            .ok_or_else(|| PortalError::ScriptLoad {
                url: artifact_url.to_string(),
                reason: "产物未注册".to_string(),
            })?;

        let instance = factory().ok_or_else(|| PortalError::InstanceNotFound {
            url: artifact_url.to_string(),
        })?;

        info!(
            artifact_url = %artifact_url,
            capabilities = ?instance.capabilities(),
            "模块已加载"
        );
        Ok(instance)
    }
}
