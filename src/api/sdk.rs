//! WebCore 应用入口
//!
//! 组合根：把配置、库管理器、模块管理器、事件总线和路由表装配在一起，
//! 并按固定顺序驱动应用生命周期。
//!
//! # 生命周期
//!
//! 1. `new()` - 注册加载器与模块
//! 2. `start()` - 加载已配置的基础设施库与认证库
//! 3. `initialize()` - 按依赖顺序初始化模块并安装路由
//! 4. `serve()` - 绑定 HTTP 监听
//! 5. `stop()` - 先销毁库，再销毁模块
//!
//! # 示例
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

use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::auth::{default_auth_loaders, PolicyEvaluator};
use crate::core::config::AppConfig;
use crate::core::context::{loader_category, AppContext};
use crate::library::{LibraryArgs, LibraryLoader, LibraryManager};
use crate::module::{Module, ModuleManager};
use crate::router::{
    lifecycle_events, serve_with_shutdown, ApiResponse, Event, EventBus, RouteTable, WebRequest,
};
use crate::utils::{CoreError, Result};

// ==================== 状态 ====================

/// 应用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    /// 已创建，尚未加载库
    Created,
    /// 库已加载
    Started,
    /// 模块已初始化，路由已安装
    Initialized,
    /// 已停止
    Stopped,
}

impl CoreState {
    pub fn can_start(&self) -> bool {
        matches!(self, CoreState::Created)
    }

    pub fn can_initialize(&self) -> bool {
        matches!(self, CoreState::Started)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CoreState::Initialized)
    }
}

// ==================== WebCore ====================

/// 应用实例
///
/// 多个实例可以在同一进程中共存，彼此不共享任何状态。
pub struct WebCore {
    context: AppContext,
    routes: Arc<RouteTable>,
    evaluator: Option<Arc<dyn PolicyEvaluator>>,
    state: RwLock<CoreState>,
    started_at: RwLock<Option<Instant>>,
}

impl WebCore {
    /// 创建应用实例
    ///
    /// 认证相关的内置加载器先注册，`loaders` 中的同名加载器会覆盖它们。
    /// 禁用列表中的模块被跳过；模块校验失败时返回错误。
    pub async fn new<I, S>(config: AppConfig, loaders: I, modules: Vec<Arc<dyn Module>>) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Arc<dyn LibraryLoader>)>,
        S: Into<String>,
    {
        info!(app = %config.app.name, version = crate::VERSION, "创建应用实例");

        let config = Arc::new(config);
        let events = EventBus::new();

        let libraries = LibraryManager::new();
        for (name, loader) in default_auth_loaders() {
            libraries.register(name, loader).await;
        }
        for (name, loader) in loaders {
            libraries.register(name, loader).await;
        }

        let modules_manager = ModuleManager::from_config(&config).with_event_bus(events.clone());
        for module in modules {
            modules_manager.register(module).await?;
        }
        debug!(count = modules_manager.len().await, "模块注册完成");

        let routes = Arc::new(RouteTable::new(&config));
        let context = AppContext::new(
            Arc::clone(&config),
            Arc::new(libraries),
            Arc::new(modules_manager),
            events,
        );

        Ok(Self {
            context,
            routes,
            evaluator: None,
            state: RwLock::new(CoreState::Created),
            started_at: RwLock::new(None),
        })
    }

    /// 设置 ABAC 策略求值器，需在 `start()` 之前调用
    pub fn with_policy_evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    // ==================== 生命周期 ====================

    /// 加载已配置的基础设施库与认证库
    ///
    /// - `database.host` 非空：`database:<driver>`
    /// - `redis.host` 非空：`redis`
    /// - `pubsub.project_id` 与 `pubsub.topic` 非空：`pubsub`
    /// - `kafka.brokers` 非空：`kafka`
    /// - `auth.type` 不为 `none`：`authentication:<type>`
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_start() {
            return Err(CoreError::Internal(format!("当前状态 {:?} 不允许启动", *state)));
        }

        let ctx = &self.context;
        let config = ctx.config();

        if !config.database.host.is_empty() {
            self.load(loader_category::DATABASE, ctx.library_args(&config.database))
                .await?;
        }
        if !config.redis.host.is_empty() {
            self.load(loader_category::REDIS, ctx.library_args(&config.redis))
                .await?;
        }
        if !config.pubsub.project_id.is_empty() && !config.pubsub.topic.is_empty() {
            self.load(loader_category::PUBSUB, ctx.library_args(&config.pubsub))
                .await?;
        }
        if !config.kafka.brokers.is_empty() {
            self.load(loader_category::KAFKA, ctx.library_args(&config.kafka))
                .await?;
        }

        if config.auth.is_enabled() {
            let mut args = ctx.library_args(&config.auth);
            if let Some(evaluator) = &self.evaluator {
                args.push(Arc::clone(evaluator));
            }
            self.load(loader_category::AUTHENTICATION, args).await?;
        } else {
            info!("认证已关闭");
        }

        *state = CoreState::Started;
        *self.started_at.write().await = Some(Instant::now());
        self.publish(lifecycle_events::APP_STARTED).await;
        info!(libraries = ctx.libraries().instance_count().await, "应用已启动");
        Ok(())
    }

    async fn load(&self, category: &str, args: LibraryArgs) -> Result<()> {
        let name = self.context.default_loader_name(category);
        self.context.libraries().load_singleton(&name, args).await?;
        info!(loader = %name, "库已加载");
        Ok(())
    }

    /// 按依赖顺序初始化模块，安装模块路由与认证守卫
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_initialize() {
            return Err(CoreError::Internal(format!("当前状态 {:?} 不允许初始化", *state)));
        }

        let ctx = &self.context;
        ctx.modules().initialize_with_dependencies(ctx).await?;
        self.routes.add_all(ctx.modules().routes().await).await;

        if ctx.config().auth.is_enabled() {
            let guard = ctx.auth_guard().await.ok_or_else(|| {
                CoreError::Internal(format!(
                    "加载器 '{}' 没有产出认证守卫",
                    ctx.default_loader_name(loader_category::AUTHENTICATION)
                ))
            })?;
            self.routes.set_guard(Some(guard)).await;
        }

        *state = CoreState::Initialized;
        info!(routes = self.routes.len().await, "应用初始化完成");
        Ok(())
    }

    /// 绑定 HTTP 监听，收到 Ctrl+C 后返回
    pub async fn serve(&self) -> Result<()> {
        self.serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "无法监听 Ctrl+C 信号");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// 绑定 HTTP 监听，`signal` 完成时返回
    pub async fn serve_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.state().await.is_ready() {
            return Err(CoreError::Internal("应用尚未初始化".to_string()));
        }
        let addr = self.context.config().server.bind_addr();
        serve_with_shutdown(Arc::clone(&self.routes), &addr, signal).await
    }

    /// 停止应用：先销毁库，再销毁模块
    ///
    /// 重复调用无副作用。
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == CoreState::Stopped {
            return;
        }

        self.routes.set_guard(None).await;
        self.context.libraries().destroy().await;
        self.context.modules().destroy().await;

        *state = CoreState::Stopped;
        self.publish(lifecycle_events::APP_STOPPED).await;
        info!(uptime_secs = self.uptime().await.as_secs(), "应用已停止");
    }

    /// 启动、初始化、服务直到 Ctrl+C，最后停止
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        self.initialize().await?;
        let result = self.serve().await;
        self.stop().await;
        result
    }

    async fn publish(&self, event_type: &str) {
        let event = Event::new(
            event_type,
            "webcore",
            json!({ "app": self.context.config().app.name, "version": crate::VERSION }),
        );
        if let Err(e) = self.context.events().publish(event).await {
            warn!(event_type, error = %e, "生命周期事件发布失败");
        }
    }

    // ==================== 访问器 ====================

    /// 不经过 HTTP 直接分发请求
    pub async fn dispatch(&self, req: WebRequest) -> ApiResponse {
        self.routes.dispatch(req).await
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn config(&self) -> &AppConfig {
        self.context.config()
    }

    pub fn libraries(&self) -> &Arc<LibraryManager> {
        self.context.libraries()
    }

    pub fn modules(&self) -> &Arc<ModuleManager> {
        self.context.modules()
    }

    pub fn events(&self) -> &EventBus {
        self.context.events()
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub async fn state(&self) -> CoreState {
        *self.state.read().await
    }

    /// 自 `start()` 以来的运行时长
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .read()
            .await
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for WebCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebCore")
            .field("context", &self.context)
            .field("routes", &self.routes)
            .finish()
    }
}
