//! API 模块
//!
//! 对外提供的 SDK 接口。
//!
//! - `sdk`: `Portal` 主接口，持有应用注册表与路由器

pub mod sdk;

// 重导出主要类型
pub use sdk::{Portal, PortalInfo, PortalState};
