//! 应用元数据定义
//!
//! 注册应用的配置、激活规则、运行时状态与对外快照。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::instance::ModuleInstance;
use crate::utils::{PortalError, Result};

// ============================================================================
// 激活规则
// ============================================================================

/// 激活规则
///
/// 判断某个导航路径是否归属于一个应用。
///
/// 配置文件中的写法：
///
/// ```yaml
/// activation_rule: /shop                  # 路径前缀
/// activation_rule: { pattern: "^/(a|b)" } # 正则
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ActivationRuleSpec", into = "ActivationRuleSpec")]
pub enum ActivationRule {
    /// 路径以该前缀开头即匹配（纯字符串前缀，`/shop` 也匹配 `/shopping`）
    Prefix(String),
    /// 正则在路径中找到匹配即匹配
    Pattern(Regex),
}

/// 激活规则的序列化形式
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ActivationRuleSpec {
    Prefix(String),
    Pattern { pattern: String },
}

impl TryFrom<ActivationRuleSpec> for ActivationRule {
    type Error = PortalError;

    fn try_from(spec: ActivationRuleSpec) -> Result<Self> {
        match spec {
            ActivationRuleSpec::Prefix(prefix) => Ok(ActivationRule::Prefix(prefix)),
            ActivationRuleSpec::Pattern { pattern } => ActivationRule::pattern(&pattern),
        }
    }
}

impl From<ActivationRule> for ActivationRuleSpec {
    fn from(rule: ActivationRule) -> Self {
        match rule {
            ActivationRule::Prefix(prefix) => ActivationRuleSpec::Prefix(prefix),
            ActivationRule::Pattern(regex) => ActivationRuleSpec::Pattern {
                pattern: regex.as_str().to_string(),
            },
        }
    }
}

impl ActivationRule {
    /// 创建前缀规则
    pub fn prefix(prefix: impl Into<String>) -> Self {
        ActivationRule::Prefix(prefix.into())
    }

    /// 创建正则规则
    ///
    /// # Errors
    ///
    /// 正则无法编译时返回 `InvalidActivationRule`
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(ActivationRule::Pattern)
            .map_err(|e| PortalError::InvalidActivationRule(format!("'{}': {}", pattern, e)))
    }

    /// 路径是否匹配
    pub fn matches(&self, path: &str) -> bool {
        self.match_len(path).is_some()
    }

    /// 匹配长度，用于最长匹配策略
    ///
    /// 前缀规则返回前缀长度，正则规则返回匹配文本的长度。
    pub fn match_len(&self, path: &str) -> Option<usize> {
        match self {
            ActivationRule::Prefix(prefix) => path.starts_with(prefix.as_str()).then_some(prefix.len()),
            ActivationRule::Pattern(regex) => regex.find(path).map(|m| m.as_str().len()),
        }
    }
}

impl PartialEq for ActivationRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ActivationRule::Prefix(a), ActivationRule::Prefix(b)) => a == b,
            (ActivationRule::Pattern(a), ActivationRule::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<&str> for ActivationRule {
    fn from(prefix: &str) -> Self {
        ActivationRule::Prefix(prefix.to_string())
    }
}

impl fmt::Display for ActivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationRule::Prefix(prefix) => write!(f, "{}", prefix),
            ActivationRule::Pattern(regex) => write!(f, "~{}", regex.as_str()),
        }
    }
}

/// 多个应用同时匹配一个路径时的选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// 按注册顺序取第一个匹配的应用
    #[default]
    FirstMatch,
    /// 取匹配长度最长的应用，长度相同时按注册顺序
    LongestPrefix,
}

// ============================================================================
// 应用配置
// ============================================================================

/// 应用注册配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 应用名称（唯一键）
    pub name: String,

    /// 应用部署的基础地址，清单位于 `{base_location}/manifest.json`
    #[serde(alias = "base_url")]
    pub base_location: String,

    /// 激活规则
    #[serde(alias = "active_rule")]
    pub activation_rule: ActivationRule,

    /// 清单中的入口名（未设置时使用加载器默认入口）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// 预先解析好的产物 URL，设置后不再读取清单
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_url: Option<String>,
}

impl AppConfig {
    /// 创建应用配置
    pub fn new(
        name: impl Into<String>,
        base_location: impl Into<String>,
        activation_rule: impl Into<ActivationRule>,
    ) -> Self {
        Self {
            name: name.into(),
            base_location: base_location.into(),
            activation_rule: activation_rule.into(),
            entry: None,
            entry_url: None,
        }
    }

    /// 指定清单入口名
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// 指定预解析的产物 URL
    pub fn with_entry_url(mut self, url: impl Into<String>) -> Self {
        self.entry_url = Some(url.into());
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PortalError::InvalidConfigValue {
                key: "apps.name".to_string(),
                reason: "应用名称不能为空".to_string(),
            });
        }
        if self.base_location.trim().is_empty() && self.entry_url.is_none() {
            return Err(PortalError::InvalidConfigValue {
                key: format!("apps.{}.base_location", self.name),
                reason: "基础地址不能为空".to_string(),
            });
        }
        if let ActivationRule::Prefix(ref prefix) = self.activation_rule {
            if prefix.is_empty() {
                return Err(PortalError::InvalidActivationRule(format!(
                    "应用 '{}' 的激活前缀为空",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// 运行时状态
// ============================================================================

/// 应用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppStatus {
    /// 已注册，尚未加载
    #[default]
    NotLoaded,
    /// 已加载，持有模块实例
    Loaded,
    /// 已挂载到容器
    Mounted,
}

impl AppStatus {
    /// 是否已持有模块实例
    pub fn is_loaded(&self) -> bool {
        matches!(self, AppStatus::Loaded | AppStatus::Mounted)
    }

    /// 是否可以执行挂载
    pub fn can_mount(&self) -> bool {
        !matches!(self, AppStatus::Mounted)
    }

    /// 是否可以执行卸载
    pub fn can_unmount(&self) -> bool {
        matches!(self, AppStatus::Mounted)
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppStatus::NotLoaded => write!(f, "not-loaded"),
            AppStatus::Loaded => write!(f, "loaded"),
            AppStatus::Mounted => write!(f, "mounted"),
        }
    }
}

/// 应用运行时状态
///
/// 只由注册表的加载、挂载、卸载操作修改。
#[derive(Debug, Clone, Default)]
pub struct AppRuntimeState {
    /// 当前状态
    pub status: AppStatus,
    /// 模块实例（同一产物的应用共享同一个实例）
    pub instance: Option<Arc<ModuleInstance>>,
    /// 解析出的产物 URL
    pub artifact_url: Option<String>,
    /// 最近一次失败
    pub last_error: Option<PortalError>,
    /// 当前挂载的容器
    pub container: Option<String>,
    /// 加载完成时间
    pub loaded_at: Option<DateTime<Utc>>,
    /// 挂载时间
    pub mounted_at: Option<DateTime<Utc>>,
}

impl AppRuntimeState {
    /// 已加载时返回实例
    pub fn loaded_instance(&self) -> Option<Arc<ModuleInstance>> {
        if self.status.is_loaded() {
            self.instance.clone()
        } else {
            None
        }
    }

    pub(crate) fn mark_loaded(&mut self, artifact_url: &str, instance: Arc<ModuleInstance>) {
        self.status = AppStatus::Loaded;
        self.instance = Some(instance);
        self.artifact_url = Some(artifact_url.to_string());
        self.last_error = None;
        self.loaded_at = Some(Utc::now());
    }

    pub(crate) fn mark_mounted(&mut self, container: &str) {
        self.status = AppStatus::Mounted;
        self.container = Some(container.to_string());
        self.mounted_at = Some(Utc::now());
    }

    pub(crate) fn mark_unmounted(&mut self) {
        self.status = AppStatus::Loaded;
        self.container = None;
        self.mounted_at = None;
    }
}

/// 应用快照
///
/// 注册表对外提供的只读视图。
#[derive(Debug, Clone, Serialize)]
pub struct AppSnapshot {
    /// 应用名称
    pub name: String,
    /// 基础地址
    pub base_location: String,
    /// 激活规则
    pub activation_rule: String,
    /// 当前状态
    pub status: AppStatus,
    /// 产物 URL
    pub artifact_url: Option<String>,
    /// 当前挂载的容器
    pub container: Option<String>,
    /// 最近一次失败
    pub last_error: Option<String>,
    /// 加载完成时间
    pub loaded_at: Option<DateTime<Utc>>,
    /// 挂载时间
    pub mounted_at: Option<DateTime<Utc>>,
}

impl AppSnapshot {
    pub(crate) fn new(config: &AppConfig, state: &AppRuntimeState) -> Self {
        Self {
            name: config.name.clone(),
            base_location: config.base_location.clone(),
            activation_rule: config.activation_rule.to_string(),
            status: state.status,
            artifact_url: state.artifact_url.clone(),
            container: state.container.clone(),
            last_error: state.last_error.as_ref().map(|e| e.to_string()),
            loaded_at: state.loaded_at,
            mounted_at: state.mounted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_rule() {
        let rule = ActivationRule::prefix("/shop");
        assert!(rule.matches("/shop"));
        assert!(rule.matches("/shop/cart"));
        assert!(rule.matches("/shopping"));
        assert!(!rule.matches("/other"));
        assert_eq!(rule.match_len("/shop/cart"), Some(5));
    }

    #[test]
    fn test_pattern_rule() {
        let rule = ActivationRule::pattern("^/(login|register)").unwrap();
        assert!(rule.matches("/login"));
        assert!(rule.matches("/register/step-2"));
        assert!(!rule.matches("/settings"));
        assert_eq!(rule.match_len("/register/step-2"), Some(9));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = ActivationRule::pattern("^/(unclosed");
        assert!(matches!(result, Err(PortalError::InvalidActivationRule(_))));
    }

    #[test]
    fn test_rule_deserialize() {
        let prefix: ActivationRule = serde_yaml::from_str("/shop").unwrap();
        assert_eq!(prefix, ActivationRule::prefix("/shop"));

        let pattern: ActivationRule = serde_yaml::from_str("pattern: '^/auth'").unwrap();
        assert!(matches!(pattern, ActivationRule::Pattern(_)));
        assert!(pattern.matches("/auth/login"));

        let bad: std::result::Result<ActivationRule, _> = serde_yaml::from_str("pattern: '('");
        assert!(bad.is_err());
    }

    #[test]
    fn test_app_config_deserialize_aliases() {
        let yaml = r#"
name: app1
base_url: https://cdn.example.com/micro-apps/app1/v1.2.3
active_rule: /app1
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "app1");
        assert_eq!(config.base_location, "https://cdn.example.com/micro-apps/app1/v1.2.3");
        assert_eq!(config.activation_rule, ActivationRule::prefix("/app1"));
        assert!(config.entry.is_none());
    }

    #[test]
    fn test_app_config_validate() {
        assert!(AppConfig::new("shop", "/apps/shop", "/shop").validate().is_ok());
        assert!(AppConfig::new("", "/apps/shop", "/shop").validate().is_err());
        assert!(AppConfig::new("shop", "", "/shop").validate().is_err());
        assert!(AppConfig::new("shop", "", "/shop")
            .with_entry_url("/cdn/shop.js")
            .validate()
            .is_ok());
        assert!(AppConfig::new("shop", "/apps/shop", "").validate().is_err());
    }

    #[test]
    fn test_app_status() {
        assert_eq!(AppStatus::default(), AppStatus::NotLoaded);
        assert!(!AppStatus::NotLoaded.is_loaded());
        assert!(AppStatus::Mounted.is_loaded());
        assert!(!AppStatus::Mounted.can_mount());
        assert!(AppStatus::Mounted.can_unmount());
        assert!(!AppStatus::Loaded.can_unmount());
        assert_eq!(AppStatus::NotLoaded.to_string(), "not-loaded");
        assert_eq!(serde_json::to_string(&AppStatus::Mounted).unwrap(), "\"mounted\"");
    }
}
