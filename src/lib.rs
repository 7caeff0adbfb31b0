//! # WebCore
//!
//! 可插拔 Web 应用脚手架，提供以下核心功能：
//!
//! - **模块管理**: 模块注册、依赖排序初始化、路由与命名服务汇总
//! - **库管理**: 按名称注册的加载器、单例与按键实例缓存
//! - **认证授权**: API Key / JWT / Basic 校验器，RBAC 授权与 ABAC 求值接口
//! - **配置管理**: YAML/JSON 配置文件与环境变量覆盖
//! - **事件总线**: 模块生命周期事件与模块间通信
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webcore::{AppConfig, LibraryLoader, WebCore};
//!
//! #[tokio::main]
//! async fn main() -> webcore::Result<()> {
//!     let config = AppConfig::load("config.yaml").await?;
//!     let loaders: Vec<(String, Arc<dyn LibraryLoader>)> = Vec::new();
//!     let core = WebCore::new(config, loaders, Vec::new()).await?;
//!     core.run().await
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `api` - 组合根
//! - `auth` - 认证与授权链
//! - `core` - 配置与应用上下文
//! - `library` - 库加载器与库管理器
//! - `module` - 模块接口、依赖图与模块管理器
//! - `router` - 请求/响应、路由表、HTTP 服务与事件总线
//! - `utils` - 错误类型、日志与 ID 生成

#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod auth;
pub mod core;
pub mod library;
pub mod module;
pub mod router;
pub mod utils;

pub use api::{CoreState, WebCore};

pub use auth::{
    AuthGuard, AuthStore, AuthValidator, ControlType, PolicyEvaluator, ResourceInfo,
    StaticAuthStore, UserAuthInfo,
};

pub use core::{AppConfig, AppContext, AuthConfig, Configurable};

pub use library::{Library, LibraryArgs, LibraryLoader, LibraryManager};

pub use module::{DependencyGraph, Module, ModuleManager, ModuleRoute, RouterGroup};

pub use router::{handler_fn, ApiResponse, Event, EventBus, RouteHandler, RouteTable, WebRequest};

pub use utils::logger::{LogGuard, Logger, LoggerConfig, RotationStrategy};
pub use utils::{error_code, generate_id, generate_uuid, status_code, CoreError, Result};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
