//! 工具模块
//!
//! 包含错误类型、导航 ID 生成、日志系统、单飞执行器与超时处理。

pub mod error;
pub mod id;
pub mod logger;
pub mod single_flight;
pub mod timeout;

// 重导出常用类型
pub use error::{error_code, PortalError, Result};
pub use id::{generate_navigation_id, is_valid_navigation_id};
pub use logger::{LogFormat, LogGuard, Logger, LoggerConfig, RotationStrategy};
pub use single_flight::SingleFlight;
pub use timeout::{deadline_from_millis, with_deadline};
