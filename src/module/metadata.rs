//! 模块接口与元数据
//!
//! 模块是自包含的功能单元：声明依赖、贡献路由与命名服务，
//! 并在依赖全部初始化之后执行自己的初始化。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::config::Configurable;
use crate::core::context::AppContext;
use crate::router::RouteHandler;
use crate::utils::Result;

/// 模块对外暴露的服务或仓储句柄
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

// ==================== 路由 ====================

/// 路由分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterGroup {
    /// 挂载在根路径下，不经过认证
    Public,
    /// 挂载在 `server.path` 前缀下，经过认证守卫
    Api,
}

/// 模块贡献的路由
#[derive(Clone)]
pub struct ModuleRoute {
    pub method: Method,
    /// 相对路径，支持 `:param` 与结尾的 `*`
    pub path: String,
    pub group: RouterGroup,
    pub handler: Arc<dyn RouteHandler>,
}

impl ModuleRoute {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        group: RouterGroup,
        handler: Arc<dyn RouteHandler>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            group,
            handler,
        }
    }

    /// 受保护的 API 路由
    pub fn api(method: Method, path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(method, path, RouterGroup::Api, handler)
    }

    /// 公开路由
    pub fn public(method: Method, path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(method, path, RouterGroup::Public, handler)
    }
}

impl fmt::Debug for ModuleRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRoute")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("group", &self.group)
            .finish()
    }
}

// ==================== Module ====================

/// 模块
///
/// 只有名称、版本和初始化是必须实现的，其余能力都有空的默认实现。
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// 唯一名称
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// 依赖的模块名称
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// 模块自身的配置
    fn config(&self) -> Option<&dyn Configurable> {
        None
    }

    fn routes(&self) -> Vec<ModuleRoute> {
        Vec::new()
    }

    /// 命名服务，汇总时以 `模块名.键` 命名
    fn services(&self) -> HashMap<String, ServiceHandle> {
        HashMap::new()
    }

    /// 命名仓储，汇总时以 `模块名.键` 命名
    fn repositories(&self) -> HashMap<String, ServiceHandle> {
        HashMap::new()
    }

    /// 初始化，调用时所有依赖都已初始化完成
    async fn init(&self, ctx: &AppContext) -> Result<()>;

    /// 销毁
    async fn destroy(&self) -> Result<()> {
        Ok(())
    }

    /// 具体类型名，用于拒绝同一类型的重复注册
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// ==================== LoadedModule ====================

/// 已注册的模块及其加载信息
#[derive(Clone)]
pub struct LoadedModule {
    pub module: Arc<dyn Module>,
    /// 来源，直接注册的模块为空
    pub source: String,
    pub loaded_at: DateTime<Utc>,
    /// 去重后的依赖
    pub dependencies: Vec<String>,
}

impl LoadedModule {
    pub fn new(module: Arc<dyn Module>, source: impl Into<String>) -> Self {
        let mut dependencies: Vec<String> = Vec::new();
        for dep in module.dependencies() {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }
        Self {
            module,
            source: source.into(),
            loaded_at: Utc::now(),
            dependencies,
        }
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn version(&self) -> &str {
        self.module.version()
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("source", &self.source)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// 模块元数据快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub source: String,
    pub loaded_at: DateTime<Utc>,
    pub initialized: bool,
    pub route_count: usize,
}

impl ModuleInfo {
    pub(crate) fn from_loaded(loaded: &LoadedModule, initialized: bool) -> Self {
        Self {
            name: loaded.name().to_string(),
            version: loaded.version().to_string(),
            dependencies: loaded.dependencies.clone(),
            source: loaded.source.clone(),
            loaded_at: loaded.loaded_at,
            initialized,
            route_count: loaded.module.routes().len(),
        }
    }
}
