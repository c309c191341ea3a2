//! 核心模块
//!
//! 包含门户配置。

pub mod config;

pub use config::{
    LoaderConfig, LogConfig, PortalConfig, PortalConfigBuilder, RouterConfig, DEFAULT_CONTAINER,
};
