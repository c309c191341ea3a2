//! 模块实例缓存
//!
//! 以解析后的产物 URL 为键保存已加载的模块实例。多个应用解析到同一个产物时
//! 共享同一个实例，同一产物不会被加载两次。缓存在注册表生命周期内有效，没有淘汰。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use super::instance::ModuleInstance;

/// 共享的模块实例
pub type SharedInstance = Arc<ModuleInstance>;

/// 缓存统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ModuleCacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 缓存条目数量
    pub size: usize,
    /// 命中率（百分比）
    pub hit_rate: f64,
}

/// 模块实例缓存
#[derive(Default)]
pub struct ModuleCache {
    /// 产物 URL -> 实例
    instances: RwLock<HashMap<String, SharedInstance>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ModuleCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SharedInstance>> {
        self.instances.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SharedInstance>> {
        self.instances.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 获取实例（计入命中统计）
    pub fn get(&self, url: &str) -> Option<SharedInstance> {
        let found = self.read().get(url).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// 获取实例（不计入统计）
    pub fn peek(&self, url: &str) -> Option<SharedInstance> {
        self.read().get(url).cloned()
    }

    /// 放入实例，覆盖已有条目
    pub fn put(&self, url: impl Into<String>, instance: SharedInstance) {
        self.write().insert(url.into(), instance);
    }

    /// 放入实例，已存在时保留先放入的实例并返回它
    pub fn get_or_insert(&self, url: &str, instance: SharedInstance) -> SharedInstance {
        Arc::clone(self.write().entry(url.to_string()).or_insert(instance))
    }

    /// 是否包含产物
    pub fn contains(&self, url: &str) -> bool {
        self.read().contains_key(url)
    }

    /// 已缓存的产物 URL
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.read().keys().cloned().collect();
        urls.sort_unstable();
        urls
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// 获取统计信息
    pub fn stats(&self) -> ModuleCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        ModuleCacheStats {
            hits,
            misses,
            size: self.len(),
            hit_rate: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}
