//! 构建清单解析
//!
//! 应用部署目录下的 `manifest.json` 记录了源码入口名到实际产物路径
//! （通常带内容哈希）的映射：
//!
//! ```json
//! { "src/main.jsx": { "file": "main-ab12.js", "isEntry": true } }
//! ```
//!
//! `ManifestResolver` 按基础地址获取并缓存清单，解析入口对应的产物 URL。
//! 清单在解析器生命周期内只获取一次，没有失效机制。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::utils::{with_deadline, PortalError, Result, SingleFlight};

/// 默认清单文件名
pub const DEFAULT_MANIFEST_FILE: &str = "manifest.json";

// ============================================================================
// 清单数据结构
// ============================================================================

/// 清单条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 部署后的产物路径（相对基础地址）
    pub file: String,

    /// 源文件路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    /// 是否为构建入口
    #[serde(default, rename = "isEntry")]
    pub is_entry: bool,

    /// 关联的样式文件
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css: Vec<String>,

    /// 依赖的其它清单条目
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
}

/// 构建清单
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: HashMap<String, ManifestEntry>,
}

impl Manifest {
    /// 从 JSON 值解析清单
    ///
    /// # Errors
    ///
    /// 值不是“入口名 -> 含 `file` 字段的对象”映射时返回 `ManifestFetch`
    pub fn from_value(base: &str, value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| PortalError::ManifestFetch {
            base: base.to_string(),
            reason: format!("清单格式无效: {}", e),
        })
    }

    /// 查找入口
    pub fn get(&self, entry: &str) -> Option<&ManifestEntry> {
        self.entries.get(entry)
    }

    /// 标记为入口的条目名称（已排序）
    pub fn entries(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_entry)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 去掉基础地址末尾的 `/`
pub fn normalize_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// 拼接基础地址与相对路径
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", normalize_base(base), path.trim_start_matches('/'))
}

// ============================================================================
// 清单获取器
// ============================================================================

/// 清单获取接口
///
/// 由宿主环境提供“从 URL 获取 JSON”的能力。
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    /// 获取并解析 JSON
    async fn fetch_json(&self, url: &str) -> Result<Value>;
}

/// 本地文件系统清单获取器
///
/// 读取本地构建输出目录；支持普通路径与 `file://` URL。
/// 设置 `root` 后，绝对路径形式的地址（如 `/apps/shop`）相对于 `root` 解析。
#[derive(Debug, Clone, Default)]
pub struct FsManifestFetcher {
    root: Option<PathBuf>,
}

impl FsManifestFetcher {
    /// 按原样解析路径
    pub fn new() -> Self {
        Self { root: None }
    }

    /// 以 `root` 为根目录解析路径
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// 地址对应的本地路径
    pub fn path_for(&self, url: &str) -> PathBuf {
        let path = url.strip_prefix("file://").unwrap_or(url);
        match self.root {
            Some(ref root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }
}

#[async_trait]
impl ManifestFetcher for FsManifestFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let path = self.path_for(url);
        debug!(path = %path.display(), "读取本地清单");
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// HTTP 清单获取器
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpManifestFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpManifestFetcher {
    /// 使用请求超时创建
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortalError::InitFailed(format!("HTTP 客户端创建失败: {}", e)))?;
        Ok(Self { client })
    }

    /// 使用已有客户端
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let fetch_failed = |reason: String| PortalError::ManifestFetch {
            base: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_failed(format!("请求失败: {}", e)))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| fetch_failed(format!("响应不是有效 JSON: {}", e)))
    }
}

// ============================================================================
// 清单解析器
// ============================================================================

/// 清单解析器
///
/// - 每个基础地址最多获取一次清单；并发的首次解析共享同一次获取
/// - 获取失败不会被缓存
pub struct ManifestResolver {
    fetcher: Arc<dyn ManifestFetcher>,
    manifest_file: String,
    fetch_timeout: Option<Duration>,
    manifests: Arc<RwLock<HashMap<String, Arc<Manifest>>>>,
    inflight: SingleFlight<Arc<Manifest>>,
    fetches: Arc<AtomicU64>,
}

impl ManifestResolver {
    /// 创建解析器
    pub fn new(fetcher: Arc<dyn ManifestFetcher>) -> Self {
        Self {
            fetcher,
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            fetch_timeout: None,
            manifests: Arc::new(RwLock::new(HashMap::new())),
            inflight: SingleFlight::new(),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 设置清单文件名（例如 Vite 5 的 `.vite/manifest.json`）
    pub fn with_manifest_file(mut self, file: impl Into<String>) -> Self {
        self.manifest_file = file.into();
        self
    }

    /// 设置获取超时
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// 清单文件 URL
    pub fn manifest_url(&self, base: &str) -> String {
        join_url(base, &self.manifest_file)
    }

    /// 获取清单（已缓存时直接返回）
    #[instrument(skip(self))]
    pub async fn manifest(&self, base: &str) -> Result<Arc<Manifest>> {
        let base = normalize_base(base).to_string();
        if let Some(manifest) = self.cached(&base) {
            return Ok(manifest);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let manifests = Arc::clone(&self.manifests);
        let fetches = Arc::clone(&self.fetches);
        let url = self.manifest_url(&base);
        let timeout = self.fetch_timeout;
        let owned_base = base.clone();

        self.inflight
            .run(&base, move || async move {
                // 认领后复查，前一次获取可能刚写入缓存
                let cached = read_manifests(&manifests).get(&owned_base).cloned();
                if let Some(manifest) = cached {
                    return Ok(manifest);
                }

                debug!(base = %owned_base, url = %url, "获取清单");
                fetches.fetch_add(1, Ordering::Relaxed);
                let value = with_deadline(timeout, &url, fetcher.fetch_json(&url))
                    .await
                    .map_err(|e| fetch_error(&owned_base, e))?;

                let manifest = Arc::new(Manifest::from_value(&owned_base, value)?);
                write_manifests(&manifests).insert(owned_base.clone(), Arc::clone(&manifest));
                info!(base = %owned_base, entries = manifest.len(), "清单已缓存");
                Ok::<_, PortalError>(manifest)
            })
            .await
    }

    /// 解析入口对应的产物 URL
    ///
    /// # Errors
    ///
    /// - `ManifestFetch`: 清单获取或解析失败
    /// - `EntryNotFound`: 清单中没有该入口
    /// - `LoadTimeout`: 获取超时
    pub async fn resolve(&self, base: &str, entry: &str) -> Result<String> {
        let manifest = self.manifest(base).await?;
        let meta = manifest.get(entry).ok_or_else(|| PortalError::EntryNotFound {
            base: normalize_base(base).to_string(),
            entry: entry.to_string(),
        })?;

        let url = join_url(base, &meta.file);
        debug!(base = %base, entry = %entry, artifact_url = %url, "入口已解析");
        Ok(url)
    }

    /// 已缓存的清单
    pub fn cached(&self, base: &str) -> Option<Arc<Manifest>> {
        read_manifests(&self.manifests)
            .get(normalize_base(base))
            .cloned()
    }

    /// 已缓存的清单数量
    pub fn cached_count(&self) -> usize {
        read_manifests(&self.manifests).len()
    }

    /// 实际发起的获取次数
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

fn fetch_error(base: &str, err: PortalError) -> PortalError {
    match err {
        PortalError::LoadTimeout { .. } => err,
        PortalError::ManifestFetch { reason, .. } => PortalError::ManifestFetch {
            base: base.to_string(),
            reason,
        },
        other => PortalError::ManifestFetch {
            base: base.to_string(),
            reason: other.to_string(),
        },
    }
}

type ManifestMap = HashMap<String, Arc<Manifest>>;

fn read_manifests(map: &RwLock<ManifestMap>) -> std::sync::RwLockReadGuard<'_, ManifestMap> {
    map.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_manifests(map: &RwLock<ManifestMap>) -> std::sync::RwLockWriteGuard<'_, ManifestMap> {
    map.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
