//! 集成测试公共设施
//!
//! 提供可计数的清单获取器、模块加载器，以及记录生命周期调用顺序的记录器。

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chips_portal::module::{
    AppRegistry, ManifestFetcher, ManifestResolver, ModuleInstance, ModuleLoader, RegistryConfig,
    StaticModuleLoader,
};
use chips_portal::{PortalError, Result};
use serde_json::{json, Value};

/// 模拟清单服务
pub struct MockFetcher {
    manifests: Mutex<HashMap<String, Value>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            manifests: Mutex::new(HashMap::new()),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    /// 在 `{base}/manifest.json` 放置清单
    pub fn serve(&self, base: &str, manifest: Value) {
        self.manifests
            .lock()
            .unwrap()
            .insert(format!("{}/manifest.json", base), manifest);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestFetcher for MockFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let found = self.manifests.lock().unwrap().get(url).cloned();
        found.ok_or_else(|| PortalError::ManifestFetch {
            base: url.to_string(),
            reason: "404 Not Found".to_string(),
        })
    }
}

/// 可计数、可延迟的模块加载器
pub struct CountingLoader {
    pub inner: StaticModuleLoader,
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: StaticModuleLoader::new(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleLoader for CountingLoader {
    async fn load(&self, artifact_url: &str) -> Result<ModuleInstance> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.load(artifact_url).await
    }
}

/// 生命周期调用记录器
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// 以 `prefix` 开头的事件数量，例如 `count("mount:shop")`
    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

/// 三个钩子都会记录调用的模块实例
pub fn recording_instance(source: &str, recorder: &Arc<Recorder>) -> ModuleInstance {
    let (b, m, u) = (Arc::clone(recorder), Arc::clone(recorder), Arc::clone(recorder));
    ModuleInstance::new(source)
        .with_bootstrap(move |props| {
            let r = Arc::clone(&b);
            async move {
                r.record(format!("bootstrap:{}", props.app_name));
                Ok(())
            }
        })
        .with_mount(move |props| {
            let r = Arc::clone(&m);
            async move {
                r.record(format!("mount:{}", props.app_name));
                Ok(())
            }
        })
        .with_unmount(move |props| {
            let r = Arc::clone(&u);
            async move {
                r.record(format!("unmount:{}", props.app_name));
                Ok(())
            }
        })
}

/// 注册一个记录生命周期的产物
pub fn serve_artifact(loader: &CountingLoader, url: &str, recorder: &Arc<Recorder>) {
    let source = url.to_string();
    let recorder = Arc::clone(recorder);
    loader
        .inner
        .register(url, move || Some(recording_instance(&source, &recorder)));
}

/// 只有一个入口的 Vite 清单
pub fn vite_manifest(entry: &str, file: &str) -> Value {
    let mut manifest = serde_json::Map::new();
    manifest.insert(
        entry.to_string(),
        json!({ "file": file, "src": entry, "isEntry": true }),
    );
    Value::Object(manifest)
}

/// 测试夹具
pub struct Fixture {
    pub fetcher: Arc<MockFetcher>,
    pub loader: Arc<CountingLoader>,
    pub recorder: Arc<Recorder>,
    pub registry: Arc<AppRegistry>,
}

impl Fixture {
    pub fn new(fetcher: MockFetcher, loader: CountingLoader) -> Self {
        Self::with_config(fetcher, loader, RegistryConfig::default())
    }

    pub fn with_config(fetcher: MockFetcher, loader: CountingLoader, config: RegistryConfig) -> Self {
        let fetcher = Arc::new(fetcher);
        let loader = Arc::new(loader);
        let resolver = Arc::new(ManifestResolver::new(fetcher.clone()));
        let registry = Arc::new(AppRegistry::with_config(config, resolver, loader.clone()));
        Self {
            fetcher,
            loader,
            recorder: Recorder::new(),
            registry,
        }
    }

    /// 发布一个应用：清单 `src/main.jsx -> {file}`，产物 `{base}/{file}`
    pub fn publish(&self, base: &str, file: &str) {
        self.fetcher.serve(base, vite_manifest("src/main.jsx", file));
        serve_artifact(&self.loader, &format!("{}/{}", base, file), &self.recorder);
    }
}
