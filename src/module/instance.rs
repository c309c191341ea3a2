//! 模块实例
//!
//! 加载产物后得到的能力包。实例可以提供 `bootstrap`、`mount`、`unmount`
//! 三个生命周期钩子中的任意几个，每个钩子都是异步的。

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::utils::Result;

/// 生命周期钩子
pub type LifecycleHook = Arc<dyn Fn(LifecycleProps) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    /// 首次加载后执行一次
    Bootstrap,
    /// 挂载到容器
    Mount,
    /// 从容器卸载
    Unmount,
}

impl LifecycleStage {
    /// 钩子名称
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Bootstrap => "bootstrap",
            LifecycleStage::Mount => "mount",
            LifecycleStage::Unmount => "unmount",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 传给生命周期钩子的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleProps {
    /// 触发钩子的应用
    pub app_name: String,
    /// 挂载容器（bootstrap 时为 None）
    pub container: Option<String>,
}

impl LifecycleProps {
    /// bootstrap 参数
    pub fn bootstrap(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            container: None,
        }
    }

    /// mount / unmount 参数
    pub fn with_container(app_name: &str, container: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            container: Some(container.to_string()),
        }
    }
}

/// 模块实例（能力包）
///
/// # Example
///
/// ```
/// use chips_portal::module::ModuleInstance;
///
/// let instance = ModuleInstance::new("/apps/shop/main-ab12.js")
///     .with_mount(|props| async move {
///         println!("mount into {:?}", props.container);
///         Ok(())
///     });
///
/// assert!(instance.has_mount());
/// assert!(!instance.has_unmount());
/// ```
pub struct ModuleInstance {
    source: String,
    bootstrap: Option<LifecycleHook>,
    mount: Option<LifecycleHook>,
    unmount: Option<LifecycleHook>,
}

fn hook<F, Fut>(f: F) -> LifecycleHook
where
    F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |props| f(props).boxed())
}

impl ModuleInstance {
    /// 创建没有任何钩子的实例
    ///
    /// `source` 通常是产物 URL，仅用于日志与调试。
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            bootstrap: None,
            mount: None,
            unmount: None,
        }
    }

    /// 设置 bootstrap 钩子
    pub fn with_bootstrap<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.bootstrap = Some(hook(f));
        self
    }

    /// 设置 mount 钩子
    pub fn with_mount<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.mount = Some(hook(f));
        self
    }

    /// 设置 unmount 钩子
    pub fn with_unmount<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.unmount = Some(hook(f));
        self
    }

    /// 实例来源
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 是否提供 bootstrap
    pub fn has_bootstrap(&self) -> bool {
        self.bootstrap.is_some()
    }

    /// 是否提供 mount
    pub fn has_mount(&self) -> bool {
        self.mount.is_some()
    }

    /// 是否提供 unmount
    pub fn has_unmount(&self) -> bool {
        self.unmount.is_some()
    }

    /// 提供的钩子名称列表
    pub fn capabilities(&self) -> Vec<&'static str> {
        [
            (LifecycleStage::Bootstrap, self.has_bootstrap()),
            (LifecycleStage::Mount, self.has_mount()),
            (LifecycleStage::Unmount, self.has_unmount()),
        ]
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(stage, _)| stage.as_str())
        .collect()
    }

    /// 执行钩子
    ///
    /// 实例没有该钩子时返回 `None`。
    pub async fn invoke(&self, stage: LifecycleStage, props: LifecycleProps) -> Option<Result<()>> {
        let hook = match stage {
            LifecycleStage::Bootstrap => self.bootstrap.as_ref(),
            LifecycleStage::Mount => self.mount.as_ref(),
            LifecycleStage::Unmount => self.unmount.as_ref(),
        }?;
        Some(hook(props).await)
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("source", &self.source)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
