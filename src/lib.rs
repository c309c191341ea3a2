//! # Chips Portal - 薯片微前端门户
//!
//! 微前端子应用的注册表与生命周期加载器，提供以下核心功能：
//!
//! - **应用注册表**: 按名称管理子应用的配置与运行时状态
//! - **清单解析**: 通过构建清单把逻辑入口解析为实际产物 URL
//! - **实例缓存**: 同一产物只加载一次，多个应用共享实例
//! - **生命周期**: bootstrap / mount / unmount 三个钩子，同一时刻最多一个应用挂载
//! - **导航路由**: 按路径规则切换子应用，导航串行执行
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_portal::{AppConfig, FsManifestFetcher, Portal, PortalConfig, StaticModuleLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let portal = Portal::new(
//!         PortalConfig::default(),
//!         Arc::new(FsManifestFetcher::with_root("./dist")),
//!         Arc::new(StaticModuleLoader::new()),
//!     )
//!     .await?;
//!
//!     portal.register_app(AppConfig::new("shop", "/apps/shop", "/shop")).await?;
//!     portal.on_navigate("/shop/cart").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 应用元数据、清单、实例、加载器与注册表
//! - `router` - 导航路由
//! - `utils` - 错误类型、日志、单飞执行器与超时
//! - `core` - 门户配置
//! - `api` - 公共 API 接口

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod module;
pub mod router;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    ActivationRule, AppConfig, AppRegistry, AppSnapshot, AppStatus, FsManifestFetcher,
    LifecycleProps, LifecycleStage, Manifest, ManifestFetcher, ManifestResolver, MatchStrategy,
    ModuleCache, ModuleInstance, ModuleLoader, StaticModuleLoader,
};
#[cfg(feature = "http")]
pub use module::HttpManifestFetcher;

pub use router::{Router, RouterStatsSnapshot};

pub use utils::logger::{LogFormat, LogGuard, Logger, LoggerConfig, RotationStrategy};
pub use utils::{error_code, PortalError, Result};

pub use api::sdk::{Portal, PortalInfo, PortalState};
pub use core::config::{LoaderConfig, LogConfig, PortalConfig, PortalConfigBuilder, RouterConfig};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
