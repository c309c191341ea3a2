//! 路由模块
//!
//! 根据导航路径切换子应用。

pub mod router;

// 重导出常用类型
pub use router::{Router, RouterStats, RouterStatsSnapshot};
