//! Chips Portal 命令行入口
//!
//! 薯片微前端门户的命令行工具，用于检查配置和调试路由与清单解析。
//!
//! # 命令概览
//!
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `list-apps` - 列出配置中的应用
//! - `match` - 查看路径归属的应用
//! - `resolve` - 解析应用的产物 URL
//!
//! # 使用示例
//!
//! ```bash
//! # 检查配置文件
//! chips-portal check-config -f portal.yaml
//!
//! # 查看 /shop/cart 由哪个应用处理
//! chips-portal match /shop/cart
//!
//! # 读取本地构建目录中的清单，解析 shop 的入口产物
//! chips-portal resolve shop --root ./dist
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use chips_portal::{
    FsManifestFetcher, LogConfig, LogGuard, Logger, LoggerConfig, ManifestFetcher, Portal,
    PortalConfig, StaticModuleLoader,
};

/// Chips Portal - 薯片微前端门户
///
/// 子应用注册表与生命周期加载器。
#[derive(Parser)]
#[command(name = "chips-portal")]
#[command(version, about = "薯片微前端门户", long_about = None)]
#[command(author = "Chips Team")]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "portal.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，默认使用配置文件中的级别
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（启用更详细的日志）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件是否有效，并显示解析后的配置内容。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// 列出配置中的应用
    ListApps,

    /// 查看路径归属的应用
    ///
    /// 按配置的匹配策略找出处理该路径的应用，不加载任何模块。
    Match {
        /// 导航路径，例如 /shop/cart
        path: String,
    },

    /// 解析应用的产物 URL
    ///
    /// 读取应用的构建清单并解析入口产物，不加载模块。
    Resolve {
        /// 应用名称
        app: String,

        /// 本地构建输出的根目录（基础地址为绝对路径时相对该目录读取）
        #[arg(short, long)]
        root: Option<PathBuf>,
    },
}

/// 初始化日志系统
///
/// 以配置文件的 `logging` 段为基础，命令行指定的级别优先；开发模式显示线程与源码位置。
fn init_logging(logging: &LogConfig, level: Option<&str>, dev_mode: bool) -> anyhow::Result<LogGuard> {
    let config = LoggerConfig::from_log_config(logging)
        .with_level(level)
        .with_verbose(dev_mode);
    Ok(Logger::init(config)?)
}

/// 加载配置文件
async fn load_config(config_path: &Path, dev_mode: bool) -> anyhow::Result<PortalConfig> {
    let mut config = if config_path.exists() {
        PortalConfig::from_file(config_path)
            .await
            .with_context(|| format!("加载配置文件失败: {}", config_path.display()))?
    } else {
        PortalConfig::default()
    };

    if dev_mode {
        config.dev_mode = true;
    }
    config.validate().context("配置校验失败")?;
    Ok(config)
}

/// 按基础地址选择清单获取器
fn fetcher_for(base: &str, root: Option<PathBuf>) -> anyhow::Result<Arc<dyn ManifestFetcher>> {
    if base.starts_with("http://") || base.starts_with("https://") {
        return http_fetcher(base);
    }

    Ok(match root {
        Some(root) => Arc::new(FsManifestFetcher::with_root(root)),
        None => Arc::new(FsManifestFetcher::new()),
    })
}

#[cfg(feature = "http")]
fn http_fetcher(_base: &str) -> anyhow::Result<Arc<dyn ManifestFetcher>> {
    let fetcher = chips_portal::HttpManifestFetcher::new(std::time::Duration::from_secs(30))?;
    Ok(Arc::new(fetcher))
}

#[cfg(not(feature = "http"))]
fn http_fetcher(base: &str) -> anyhow::Result<Arc<dyn ManifestFetcher>> {
    bail!("基础地址 '{}' 需要 HTTP 支持，请使用 `--features http` 构建", base)
}

/// 检查配置文件
async fn check_config(path: &Path) -> anyhow::Result<()> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        println!();
        print_config(&PortalConfig::default());
        return Ok(());
    }

    let config = match PortalConfig::from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        println!("❌ 配置校验失败 [{}]: {}", e.error_code(), e);
        return Err(e.into());
    }

    println!("✅ 配置文件有效！");
    println!();
    print_config(&config);
    Ok(())
}

/// 打印配置内容
fn print_config(config: &PortalConfig) {
    let timeout = |ms: Option<u64>| {
        ms.map(|ms| format!("{} ms", ms))
            .unwrap_or_else(|| "不限制".to_string())
    };

    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [加载器配置]");
    println!("    默认入口:       {}", config.loader.entry_name);
    println!("    清单文件:       {}", config.loader.manifest_file);
    println!("    清单获取超时:   {}", timeout(config.loader.fetch_timeout_ms));
    println!("    模块加载超时:   {}", timeout(config.loader.load_timeout_ms));
    println!();
    println!("  [路由器配置]");
    println!("    匹配策略:       {:?}", config.router.match_strategy);
    println!("    挂载容器:       {}", config.router.container);
    println!();
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!();
    println!("  [应用] 共 {} 个", config.apps.len());
    for app in &config.apps {
        println!(
            "    {:<16} {:<24} {}",
            app.name,
            app.activation_rule.to_string(),
            app.base_location
        );
    }
    println!();
    println!("  [其他]");
    println!("    开发模式:       {}", if config.dev_mode { "是" } else { "否" });
    println!("────────────────────────────────────────");
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Chips Portal - 薯片微前端门户");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", chips_portal::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!(
        "  HTTP 清单获取:    {}",
        if cfg!(feature = "http") { "启用" } else { "未启用" }
    );
    println!("═══════════════════════════════════════");
    println!();
}

/// 用配置创建一个只用于查询的门户（不加载任何模块）
async fn inspect_portal(
    config: PortalConfig,
    fetcher: Arc<dyn ManifestFetcher>,
) -> anyhow::Result<Portal> {
    Ok(Portal::new(config, fetcher, Arc::new(StaticModuleLoader::new())).await?)
}

/// 列出配置中的应用
async fn list_apps(config: PortalConfig) -> anyhow::Result<()> {
    let portal = inspect_portal(config, Arc::new(FsManifestFetcher::new())).await?;

    let apps = portal.registry().list().await;
    println!();
    println!("已注册应用 (共 {} 个)", apps.len());
    println!("═══════════════════════════════════════");
    for app in apps {
        println!(
            "  {:<16} {:<24} {:<12} {}",
            app.name,
            app.activation_rule,
            app.status.to_string(),
            app.base_location
        );
    }
    println!("═══════════════════════════════════════");
    println!();
    Ok(())
}

/// 查看路径归属的应用
async fn match_path(config: PortalConfig, path: &str) -> anyhow::Result<()> {
    let strategy = config.router.match_strategy;
    let portal = inspect_portal(config, Arc::new(FsManifestFetcher::new())).await?;

    match portal.registry().find_app(path, strategy).await {
        Some(app) => println!("{} -> {}", path, app),
        None => println!("{} -> (无匹配应用)", path),
    }
    Ok(())
}

/// 解析应用的产物 URL
async fn resolve_app(config: PortalConfig, app: &str, root: Option<PathBuf>) -> anyhow::Result<()> {
    let Some(base) = config
        .apps
        .iter()
        .find(|a| a.name == app)
        .map(|a| a.base_location.clone())
    else {
        bail!("配置中没有应用 '{}'", app);
    };

    let portal = inspect_portal(config, fetcher_for(&base, root)?).await?;
    let url = portal
        .registry()
        .resolve_artifact(app)
        .await
        .with_context(|| format!("解析应用 '{}' 失败", app))?;
    println!("{} -> {}", app, url);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Version 和 CheckConfig 命令不需要日志
    let config = match cli.command {
        Commands::Version => {
            print_version();
            return Ok(());
        }
        Commands::CheckConfig { ref file } => {
            let config_path = file.clone().unwrap_or_else(|| cli.config.clone());
            return check_config(&config_path).await;
        }
        _ => load_config(&cli.config, cli.dev).await?,
    };

    let _log_guard = init_logging(&config.logging, cli.log_level.as_deref(), config.dev_mode)?;
    match config.config_path {
        Some(ref path) => info!("已加载配置文件: {}", path.display()),
        None => info!("配置文件不存在 ({})，使用默认配置", cli.config.display()),
    }

    match cli.command {
        Commands::ListApps => list_apps(config).await?,
        Commands::Match { path } => match_path(config, &path).await?,
        Commands::Resolve { app, root } => resolve_app(config, &app, root).await?,
        Commands::Version | Commands::CheckConfig { .. } => {}
    }

    Ok(())
}
