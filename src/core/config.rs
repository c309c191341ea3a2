//! 门户配置
//!
//! 定义门户的配置结构和加载逻辑。配置文件可以是 YAML 或 JSON（按扩展名判断）：
//!
//! ```yaml
//! loader:
//!   entry_name: src/main.jsx
//!   load_timeout_ms: 10000
//! router:
//!   match_strategy: longest_prefix
//! apps:
//!   - name: shop
//!     base_location: /apps/shop
//!     activation_rule: /shop
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::module::{AppConfig, MatchStrategy, DEFAULT_ENTRY, DEFAULT_MANIFEST_FILE};
use crate::utils::{PortalError, Result};

/// 默认挂载容器
pub const DEFAULT_CONTAINER: &str = "#subapp-container";

/// 加载器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// 应用未指定入口时使用的清单入口名
    #[serde(default = "default_entry_name")]
    pub entry_name: String,

    /// 清单文件名（相对应用基础地址）
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// 清单获取超时（毫秒，未设置表示不限制）
    #[serde(default)]
    pub fetch_timeout_ms: Option<u64>,

    /// 模块加载超时（毫秒，未设置表示不限制）
    #[serde(default)]
    pub load_timeout_ms: Option<u64>,
}

fn default_entry_name() -> String {
    DEFAULT_ENTRY.to_string()
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            entry_name: default_entry_name(),
            manifest_file: default_manifest_file(),
            fetch_timeout_ms: None,
            load_timeout_ms: None,
        }
    }
}

/// 路由器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 多个应用匹配同一路径时的选择策略
    #[serde(default)]
    pub match_strategy: MatchStrategy,

    /// 子应用挂载的容器
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            match_strategy: MatchStrategy::default(),
            container: default_container(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 门户配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 加载器配置
    #[serde(default)]
    pub loader: LoaderConfig,

    /// 路由器配置
    #[serde(default)]
    pub router: RouterConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 启动时注册的应用
    #[serde(default)]
    pub apps: Vec<AppConfig>,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

impl PortalConfig {
    /// 创建配置构建器
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder::new()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PortalError::ConfigLoadFailed(format!("无法读取 {}: {}", path.display(), e))
        })?;

        let mut config: PortalConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        Ok(config)
    }

    /// 合并另一个配置（用于覆盖）
    ///
    /// 同名应用被替换，新应用追加在末尾。
    pub fn merge(&mut self, other: PortalConfig) {
        // 只覆盖非默认值的配置
        if other.loader.entry_name != default_entry_name() {
            self.loader.entry_name = other.loader.entry_name;
        }
        if other.loader.manifest_file != default_manifest_file() {
            self.loader.manifest_file = other.loader.manifest_file;
        }
        if other.loader.fetch_timeout_ms.is_some() {
            self.loader.fetch_timeout_ms = other.loader.fetch_timeout_ms;
        }
        if other.loader.load_timeout_ms.is_some() {
            self.loader.load_timeout_ms = other.loader.load_timeout_ms;
        }
        if other.router.match_strategy != MatchStrategy::default() {
            self.router.match_strategy = other.router.match_strategy;
        }
        if other.router.container != default_container() {
            self.router.container = other.router.container;
        }
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        for app in other.apps {
            match self.apps.iter_mut().find(|a| a.name == app.name) {
                Some(existing) => *existing = app,
                None => self.apps.push(app),
            }
        }
        if other.dev_mode {
            self.dev_mode = true;
        }
    }

    /// 校验配置
    ///
    /// - 应用名称非空且唯一
    /// - 每个应用自身的配置有效
    /// - 超时不为 0
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for app in &self.apps {
            app.validate()?;
            if !seen.insert(app.name.as_str()) {
                return Err(PortalError::DuplicateApp(app.name.clone()));
            }
        }

        if self.loader.entry_name.trim().is_empty() {
            return Err(invalid("loader.entry_name", "入口名不能为空"));
        }
        if self.loader.manifest_file.trim().is_empty() {
            return Err(invalid("loader.manifest_file", "清单文件名不能为空"));
        }
        if self.loader.fetch_timeout_ms == Some(0) {
            return Err(invalid("loader.fetch_timeout_ms", "超时必须大于 0"));
        }
        if self.loader.load_timeout_ms == Some(0) {
            return Err(invalid("loader.load_timeout_ms", "超时必须大于 0"));
        }
        if self.router.container.trim().is_empty() {
            return Err(invalid("router.container", "容器不能为空"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> PortalError {
    PortalError::InvalidConfigValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct PortalConfigBuilder {
    config: PortalConfig,
}

impl PortalConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: PortalConfig::default(),
        }
    }

    /// 设置配置文件路径
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// 设置默认入口名
    pub fn entry_name(mut self, entry: impl Into<String>) -> Self {
        self.config.loader.entry_name = entry.into();
        self
    }

    /// 设置清单文件名
    pub fn manifest_file(mut self, file: impl Into<String>) -> Self {
        self.config.loader.manifest_file = file.into();
        self
    }

    /// 设置清单获取超时
    pub fn fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.config.loader.fetch_timeout_ms = Some(ms);
        self
    }

    /// 设置模块加载超时
    pub fn load_timeout_ms(mut self, ms: u64) -> Self {
        self.config.loader.load_timeout_ms = Some(ms);
        self
    }

    /// 设置匹配策略
    pub fn match_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.config.router.match_strategy = strategy;
        self
    }

    /// 设置挂载容器
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.config.router.container = container.into();
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 添加应用
    pub fn app(mut self, app: AppConfig) -> Self {
        self.config.apps.push(app);
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> PortalConfig {
        self.config
    }
}
