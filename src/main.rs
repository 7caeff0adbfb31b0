//! WebCore 命令行入口
//!
//! # 命令概览
//!
//! - `start` - 启动应用（默认命令）
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `list-loaders` - 列出已注册的库加载器
//!
//! # 使用示例
//!
//! ```bash
//! # 使用自定义配置文件启动
//! webcore -c my-config.yaml start
//!
//! # 开发模式启动（错误响应附带详情）
//! webcore --dev start
//!
//! # 检查配置文件
//! webcore check-config -c config.yaml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use webcore::core::loader_category;
use webcore::{AppConfig, LibraryLoader, Logger, LoggerConfig, WebCore};

/// WebCore - 可插拔 Web 应用脚手架
#[derive(Parser)]
#[command(name = "webcore")]
#[command(version, about = "模块化 Web 应用脚手架", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（错误响应附带详情）
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动应用
    ///
    /// 加载配置与基础设施库，初始化模块并开始监听 HTTP。
    /// 按 Ctrl+C 可优雅关闭。
    Start,

    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件与环境变量覆盖后的最终配置是否有效。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 列出已注册的库加载器，以及当前配置需要的加载器
    ListLoaders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            let config = load_config(&cli.config, cli.dev).await?;

            let logger =
                LoggerConfig::from_logging_config(&config.app.logging).with_level(cli.log_level);
            let _guard = Logger::init(logger)?;

            run_start(config).await?;
        }
        Commands::Version => print_version(),
        Commands::CheckConfig { config } => {
            let path = config.unwrap_or(cli.config);
            check_config(&path, cli.dev).await?;
        }
        Commands::ListLoaders => {
            let config = load_config(&cli.config, cli.dev).await?;
            list_loaders(config).await?;
        }
    }

    Ok(())
}

/// 加载配置，`--dev` 强制开发环境
async fn load_config(path: &Path, dev_mode: bool) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(path)
        .await
        .with_context(|| format!("无法加载配置: {}", path.display()))?;
    if dev_mode {
        config.app.environment = "development".to_string();
    }
    Ok(config)
}

fn no_loaders() -> Vec<(String, Arc<dyn LibraryLoader>)> {
    Vec::new()
}

async fn run_start(config: AppConfig) -> anyhow::Result<()> {
    let addr = config.server.bind_addr();
    let core = WebCore::new(config, no_loaders(), Vec::new()).await?;

    info!(addr = %addr, version = webcore::VERSION, "启动 WebCore");
    core.run().await?;
    info!("WebCore 已关闭");
    Ok(())
}

async fn check_config(path: &Path, dev_mode: bool) -> anyhow::Result<()> {
    println!("检查配置文件: {}", path.display());
    if !path.exists() {
        println!("⚠️  配置文件不存在，将使用默认配置与环境变量");
    }

    match load_config(path, dev_mode).await {
        Ok(config) => {
            println!("✅ 配置有效");
            println!("────────────────────────────────────────");
            println!("  应用:       {} v{} ({})", config.app.name, config.app.version, config.app.environment);
            println!("  监听地址:   {}{}", config.server.bind_addr(), config.server.path_prefix);
            println!("  日志级别:   {}", config.app.logging.level);
            println!("  认证:       {} / {} / {}", config.auth.auth_type, config.auth.control, config.auth.store);
            if !config.app.module.disabled.is_empty() {
                println!("  禁用模块:   {}", config.app.module.disabled.join(", "));
            }
            println!("────────────────────────────────────────");
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Err(e) => {
            println!("❌ 配置无效: {:#}", e);
            Err(e)
        }
    }
}

async fn list_loaders(config: AppConfig) -> anyhow::Result<()> {
    let core = WebCore::new(config, no_loaders(), Vec::new()).await?;
    let ctx = core.context();

    println!("已注册的加载器:");
    let mut names = core.libraries().loader_names().await;
    names.sort();
    for name in &names {
        println!("  - {}", name);
    }

    let config = ctx.config();
    let mut required = Vec::new();
    if !config.database.host.is_empty() {
        required.push(ctx.default_loader_name(loader_category::DATABASE));
    }
    if !config.redis.host.is_empty() {
        required.push(ctx.default_loader_name(loader_category::REDIS));
    }
    if !config.pubsub.project_id.is_empty() && !config.pubsub.topic.is_empty() {
        required.push(ctx.default_loader_name(loader_category::PUBSUB));
    }
    if !config.kafka.brokers.is_empty() {
        required.push(ctx.default_loader_name(loader_category::KAFKA));
    }
    if config.auth.is_enabled() {
        required.push(ctx.default_loader_name(loader_category::AUTHENTICATION));
        required.push(ctx.default_loader_name(loader_category::AUTH_STORAGE));
    }

    println!();
    println!("当前配置需要的加载器:");
    for name in required {
        let mark = if names.contains(&name) { "✅" } else { "❌" };
        println!("  {} {}", mark, name);
    }
    Ok(())
}

fn print_version() {
    println!();
    println!("WebCore");
    println!("═══════════════════════════════════════");
    println!("  版本:     {}", webcore::VERSION);
    println!("  目标平台: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}
