//! 薯片微前端门户错误类型定义
//!
//! 本模块定义了门户中使用的所有错误类型。
//!
//! 错误类型实现了 `Clone`：单飞加载（single-flight）会把同一个结果分发给
//! 所有等待者，因此 IO / JSON / YAML 等外部错误以 `Arc` 包装保存。

use std::sync::Arc;

use thiserror::Error;

/// 门户核心错误类型
#[derive(Error, Debug, Clone)]
pub enum PortalError {
    // ==================== 注册表错误 ====================

    /// 应用未注册
    #[error("应用未找到: '{0}'")]
    AppNotFound(String),

    /// 应用名称重复
    #[error("应用已注册: '{0}'")]
    DuplicateApp(String),

    /// 激活规则无效
    #[error("激活规则无效: {0}")]
    InvalidActivationRule(String),

    // ==================== 清单解析错误 ====================

    /// 清单获取或解析失败
    #[error("清单获取失败: '{base}' - {reason}")]
    ManifestFetch {
        /// 应用的基础地址
        base: String,
        /// 失败原因
        reason: String,
    },

    /// 清单中不存在指定入口
    #[error("清单中未找到入口: '{entry}' (base: '{base}')")]
    EntryNotFound {
        /// 应用的基础地址
        base: String,
        /// 查找的逻辑入口
        entry: String,
    },

    // ==================== 模块加载错误 ====================

    /// 脚本获取或执行失败
    #[error("脚本加载失败: '{url}' - {reason}")]
    ScriptLoad {
        /// 产物地址
        url: String,
        /// 失败原因
        reason: String,
    },

    /// 脚本执行完成但没有产出能力包
    #[error("未找到模块实例: '{url}'")]
    InstanceNotFound {
        /// 产物地址
        url: String,
    },

    /// 获取或加载超时
    #[error("加载超时: '{target}' 超过 {timeout_ms} ms")]
    LoadTimeout {
        /// 超时的清单或产物地址
        target: String,
        /// 超时时长（毫秒）
        timeout_ms: u64,
    },

    /// 生命周期钩子执行失败
    #[error("生命周期钩子失败: 应用 '{app}' 的 {hook} - {reason}")]
    LifecycleFailed {
        /// 应用名称
        app: String,
        /// 钩子名称：`bootstrap` / `mount` / `unmount`
        hook: &'static str,
        /// 失败原因
        reason: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        /// 配置键
        key: String,
        /// 无效原因
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(Arc<std::io::Error>),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(Arc<serde_json::Error>),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(Arc<serde_yaml::Error>),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 门户已关闭
    #[error("门户已关闭")]
    Closed,

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        PortalError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Json(Arc::new(err))
    }
}

impl From<serde_yaml::Error> for PortalError {
    fn from(err: serde_yaml::Error) -> Self {
        PortalError::Yaml(Arc::new(err))
    }
}

/// 门户操作结果类型别名
pub type Result<T> = std::result::Result<T, PortalError>;

/// 错误码常量
pub mod error_code {
    // 应用错误 (APP-xxx)
    /// 应用未找到
    pub const APP_NOT_FOUND: &str = "APP-001";
    /// 应用重复注册
    pub const APP_DUPLICATE: &str = "APP-002";
    /// 激活规则无效
    pub const APP_INVALID_RULE: &str = "APP-003";

    // 清单错误 (MANIFEST-xxx)
    /// 清单获取失败
    pub const MANIFEST_FETCH_FAILED: &str = "MANIFEST-001";
    /// 清单入口不存在
    pub const MANIFEST_ENTRY_NOT_FOUND: &str = "MANIFEST-002";

    // 模块错误 (MODULE-xxx)
    /// 脚本加载失败
    pub const MODULE_SCRIPT_LOAD_FAILED: &str = "MODULE-001";
    /// 模块实例不存在
    pub const MODULE_INSTANCE_NOT_FOUND: &str = "MODULE-002";
    /// 生命周期钩子失败
    pub const MODULE_LIFECYCLE_FAILED: &str = "MODULE-003";

    // 超时错误 (TIMEOUT-xxx)
    /// 加载超时
    pub const TIMEOUT_LOAD: &str = "TIMEOUT-001";

    // 配置错误 (CONFIG-xxx)
    /// 配置加载失败
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    /// 配置值无效
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 核心错误 (CORE-xxx)
    /// IO 错误
    pub const CORE_IO: &str = "CORE-001";
    /// 序列化错误
    pub const CORE_SERIALIZATION: &str = "CORE-002";
    /// 初始化失败
    pub const CORE_INIT_FAILED: &str = "CORE-003";
    /// 内部错误
    pub const CORE_INTERNAL: &str = "CORE-004";
    /// 门户已关闭
    pub const CORE_CLOSED: &str = "CORE-005";
}

impl PortalError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            PortalError::AppNotFound(_) => error_code::APP_NOT_FOUND,
            PortalError::DuplicateApp(_) => error_code::APP_DUPLICATE,
            PortalError::InvalidActivationRule(_) => error_code::APP_INVALID_RULE,
            PortalError::ManifestFetch { .. } => error_code::MANIFEST_FETCH_FAILED,
            PortalError::EntryNotFound { .. } => error_code::MANIFEST_ENTRY_NOT_FOUND,
            PortalError::ScriptLoad { .. } => error_code::MODULE_SCRIPT_LOAD_FAILED,
            PortalError::InstanceNotFound { .. } => error_code::MODULE_INSTANCE_NOT_FOUND,
            PortalError::LifecycleFailed { .. } => error_code::MODULE_LIFECYCLE_FAILED,
            PortalError::LoadTimeout { .. } => error_code::TIMEOUT_LOAD,
            PortalError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            PortalError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            PortalError::Io(_) => error_code::CORE_IO,
            PortalError::Json(_) | PortalError::Yaml(_) => error_code::CORE_SERIALIZATION,
            PortalError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            PortalError::Closed => error_code::CORE_CLOSED,
            PortalError::Internal(_) => error_code::CORE_INTERNAL,
        }
    }

    /// 是否为加载阶段的错误（清单、脚本、实例、超时、bootstrap）
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            PortalError::ManifestFetch { .. }
                | PortalError::EntryNotFound { .. }
                | PortalError::ScriptLoad { .. }
                | PortalError::InstanceNotFound { .. }
                | PortalError::LoadTimeout { .. }
                | PortalError::LifecycleFailed { hook: "bootstrap", .. }
        )
    }
}
