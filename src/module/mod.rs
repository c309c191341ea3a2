//! 子应用模块管理
//!
//! 包含子应用管理的核心组件：
//! - 应用元数据与激活规则
//! - 构建清单解析
//! - 模块实例与生命周期钩子
//! - 模块加载器与实例缓存
//! - 应用注册表

pub mod cache;
pub mod instance;
pub mod loader;
pub mod manifest;
pub mod metadata;
pub mod registry;

// 重导出常用类型
pub use cache::{ModuleCache, ModuleCacheStats, SharedInstance};
pub use instance::{LifecycleHook, LifecycleProps, LifecycleStage, ModuleInstance};
pub use loader::{InstanceFactory, ModuleLoader, StaticModuleLoader};
#[cfg(feature = "http")]
pub use manifest::HttpManifestFetcher;
pub use manifest::{
    FsManifestFetcher, Manifest, ManifestEntry, ManifestFetcher, ManifestResolver,
    DEFAULT_MANIFEST_FILE,
};
pub use metadata::{
    ActivationRule, AppConfig, AppRuntimeState, AppSnapshot, AppStatus, MatchStrategy,
};
pub use registry::{AppRegistry, RegistryConfig, DEFAULT_ENTRY};
