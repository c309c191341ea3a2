//! 门户日志
//!
//! 按配置文件的 `logging` 段安装全局 tracing 订阅者：控制台输出到 stderr
//! （stdout 留给命令行结果），可选按时间滚动的日志文件。
//!
//! `RUST_LOG` 环境变量优先于配置中的级别。
//!
//! ```rust,no_run
//! use chips_portal::{LogConfig, Logger, LoggerConfig};
//!
//! let config = LoggerConfig::from_log_config(&LogConfig::default())
//!     .with_level(Some("debug"))
//!     .with_directive("chips_portal::router=trace");
//! let _guard = Logger::init(config).unwrap();
//! tracing::info!(app = "shop", "应用已挂载");
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::core::config::LogConfig;
use crate::utils::{PortalError, Result};

/// 日志文件名为 `chips-portal.log.<日期>`
const LOG_FILE_NAME: &str = "chips-portal.log";

/// 日志文件轮转周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转
    Never,
    /// 每小时
    Hourly,
    /// 每天
    #[default]
    Daily,
}

impl From<&str> for RotationStrategy {
    /// 未知取值按每天处理
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "never" | "none" => RotationStrategy::Never,
            "hourly" | "hour" => RotationStrategy::Hourly,
            _ => RotationStrategy::Daily,
        }
    }
}

impl From<RotationStrategy> for Rotation {
    fn from(strategy: RotationStrategy) -> Self {
        match strategy {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 人类可读
    #[default]
    Pretty,
    /// 每行一个 JSON 对象
    Json,
}

/// 日志安装参数
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 基础级别，例如 `info`
    pub level: String,
    /// 输出格式
    pub format: LogFormat,
    /// 日志文件目录
    pub file_dir: Option<PathBuf>,
    /// 文件轮转周期
    pub rotation: RotationStrategy,
    /// 显示线程 ID 与源码位置
    pub verbose: bool,
    /// 追加的过滤指令，例如 `chips_portal::module=trace`
    pub directives: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::from_log_config(&LogConfig::default())
    }
}

impl LoggerConfig {
    /// 由配置文件的 `logging` 段创建
    ///
    /// `file_output` 关闭时忽略 `log_dir`。
    pub fn from_log_config(log_config: &LogConfig) -> Self {
        Self {
            level: log_config.level.to_lowercase(),
            format: if log_config.json_format {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            file_dir: log_config
                .log_dir
                .clone()
                .filter(|_| log_config.file_output),
            rotation: RotationStrategy::from(log_config.rotation.as_str()),
            verbose: false,
            directives: Vec::new(),
        }
    }

    /// 覆盖级别（`None` 保持原值）
    pub fn with_level(mut self, level: Option<&str>) -> Self {
        if let Some(level) = level {
            self.level = level.to_lowercase();
        }
        self
    }

    /// 开发模式显示线程 ID 与源码位置
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// 追加过滤指令（无效指令被忽略）
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        self.directives
            .iter()
            .filter_map(|d| d.parse::<Directive>().ok())
            .fold(base, EnvFilter::add_directive)
    }
}

/// 日志守卫
///
/// 丢弃时刷新非阻塞写入器中剩余的日志，需保持到程序退出。
#[derive(Default)]
pub struct LogGuard {
    workers: Vec<WorkerGuard>,
}

impl LogGuard {
    /// 未安装任何写入器（`try_init` 重复调用时）
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

static INSTALLED: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 全局日志安装
pub struct Logger;

impl Logger {
    /// 安装全局订阅者
    ///
    /// # Errors
    ///
    /// 已经安装过（本模块或其它代码）时返回 `InitFailed`。
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if INSTALLED.get().is_some() {
            return Err(PortalError::InitFailed("日志系统已初始化".to_string()));
        }

        let mut guard = LogGuard::default();

        let (console, worker) = tracing_appender::non_blocking(io::stderr());
        guard.workers.push(worker);
        let mut layers = vec![layer(&config, console, true)];

        if let Some(ref dir) = config.file_dir {
            let appender = RollingFileAppender::new(config.rotation.into(), dir, LOG_FILE_NAME);
            let (file, worker) = tracing_appender::non_blocking(appender);
            guard.workers.push(worker);
            layers.push(layer(&config, file, false));
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(config.env_filter())
            .try_init()
            .map_err(|e| PortalError::InitFailed(format!("安装日志订阅者失败: {}", e)))?;

        let _ = INSTALLED.set(());
        Ok(guard)
    }

    /// 安装失败时返回空守卫，测试中可重复调用
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_default()
    }
}

fn layer<W>(config: &LoggerConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(config.verbose)
        .with_file(config.verbose)
        .with_line_number(config.verbose);

    match config.format {
        LogFormat::Json => layer.json().with_ansi(false).boxed(),
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_from_str() {
        assert_eq!(RotationStrategy::from("never"), RotationStrategy::Never);
        assert_eq!(RotationStrategy::from(" HOURLY "), RotationStrategy::Hourly);
        assert_eq!(RotationStrategy::from("weekly"), RotationStrategy::Daily);
    }

    #[test]
    fn test_from_log_config() {
        let log_config = LogConfig {
            level: "WARN".to_string(),
            file_output: true,
            log_dir: Some(PathBuf::from("/var/log/portal")),
            json_format: true,
            rotation: "never".to_string(),
        };

        let config = LoggerConfig::from_log_config(&log_config);
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file_dir, Some(PathBuf::from("/var/log/portal")));
        assert_eq!(config.rotation, RotationStrategy::Never);
    }

    #[test]
    fn test_log_dir_ignored_without_file_output() {
        let log_config = LogConfig {
            log_dir: Some(PathBuf::from("/var/log/portal")),
            ..LogConfig::default()
        };
        assert!(LoggerConfig::from_log_config(&log_config).file_dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = LoggerConfig::default()
            .with_level(None)
            .with_verbose(true)
            .with_directive("chips_portal::router=trace");
        assert_eq!(config.level, "info");
        assert!(config.verbose);

        let config = config.with_level(Some("DEBUG"));
        assert_eq!(config.level, "debug");
        assert_eq!(config.directives.len(), 1);
    }

    #[test]
    fn test_bad_directive_is_skipped() {
        let config = LoggerConfig::default().with_directive("not a directive!!");
        let _filter = config.env_filter();
    }

    #[test]
    fn test_try_init_twice() {
        let _guard = Logger::try_init(LoggerConfig::default());
        let second = Logger::try_init(LoggerConfig::default());
        assert!(second.is_empty());
    }
}
