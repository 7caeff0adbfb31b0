//! 模块管理器
//!
//! 负责模块注册、按依赖顺序初始化、汇总路由与命名服务，以及卸载与销毁。

use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::dependency::DependencyGraph;
use super::metadata::{LoadedModule, Module, ModuleInfo, ModuleRoute, ServiceHandle};
use super::source::ModuleSource;
use crate::core::config::AppConfig;
use crate::core::context::AppContext;
use crate::router::{lifecycle_events, Event, EventBus};
use crate::utils::{CoreError, Result};

/// 模块管理器
pub struct ModuleManager {
    /// 禁用的模块名
    disabled: HashSet<String>,
    /// 按注册顺序保存的模块
    modules: RwLock<Vec<LoadedModule>>,
    /// 已完成初始化的模块名
    initialized: RwLock<HashSet<String>>,
    /// 串行化整轮初始化，保证每个模块的 init 只执行一次
    init_gate: Mutex<()>,
    /// 生命周期事件
    events: Option<EventBus>,
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl ModuleManager {
    pub fn new<I, S>(disabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disabled: disabled.into_iter().map(Into::into).collect(),
            modules: RwLock::new(Vec::new()),
            initialized: RwLock::new(HashSet::new()),
            init_gate: Mutex::new(()),
            events: None,
        }
    }

    /// 使用 `app.module.disabled` 创建
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.app.module.disabled.iter().cloned())
    }

    /// 在事件总线上发布生命周期事件
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    async fn emit(&self, event_type: &str, module: &str) {
        if let Some(events) = &self.events {
            let event = Event::new(event_type, "module_manager", json!({ "module": module }));
            if let Err(e) = events.publish(event).await {
                warn!(module, event_type, error = %e, "生命周期事件发布失败");
            }
        }
    }

    // ==================== 注册 ====================

    /// 注册模块
    ///
    /// 名称或版本为空、同一类型或同名模块重复注册时返回错误；
    /// 在禁用列表中的模块被跳过，不视为错误。
    pub async fn register(&self, module: Arc<dyn Module>) -> Result<()> {
        self.register_with_source(module, "").await
    }

    #[instrument(skip_all, fields(module = %module.name()))]
    async fn register_with_source(&self, module: Arc<dyn Module>, source: &str) -> Result<()> {
        let name = module.name().to_string();
        if name.is_empty() {
            return Err(CoreError::InvalidModule("模块名称不能为空".to_string()));
        }
        if module.version().is_empty() {
            return Err(CoreError::InvalidModule(format!("模块 '{}' 缺少版本号", name)));
        }
        if self.disabled.contains(&name) {
            warn!("模块已被禁用，跳过注册");
            return Ok(());
        }

        {
            let mut modules = self.modules.write().await;
            let type_name = module.type_name();
            if let Some(existing) = modules
                .iter()
                .find(|m| m.name() == name || m.module.type_name() == type_name)
            {
                return Err(CoreError::ModuleAlreadyRegistered(existing.name().to_string()));
            }

            let loaded = LoadedModule::new(module, source);
            debug!(dependencies = ?loaded.dependencies, "模块已注册");
            modules.push(loaded);
        }

        self.emit(lifecycle_events::MODULE_REGISTERED, &name).await;
        Ok(())
    }

    /// 从模块来源注册一组模块，返回实际注册的数量
    pub async fn register_from_source(
        &self,
        source: &dyn ModuleSource,
        names: &[String],
    ) -> Result<usize> {
        let before = self.len().await;
        for name in names {
            let module = source.load(name).await?;
            self.register_with_source(module, &source.describe()).await?;
        }
        Ok(self.len().await - before)
    }

    // ==================== 初始化 ====================

    /// 当前模块集合的依赖图
    pub async fn dependency_graph(&self) -> DependencyGraph {
        let modules = self.modules.read().await;
        DependencyGraph::build(
            modules
                .iter()
                .map(|m| (m.name().to_string(), m.dependencies.clone())),
        )
    }

    /// 按依赖顺序初始化所有模块
    ///
    /// 排序失败时不会初始化任何模块；某个模块初始化失败时立即中止，
    /// 已初始化的模块保持运行。已初始化过的模块不会重复初始化。
    ///
    /// 并发调用按顺序排队；模块的 `init` 中不能再调用本方法。
    #[instrument(skip_all)]
    pub async fn initialize_with_dependencies(&self, ctx: &AppContext) -> Result<Vec<String>> {
        let _gate = self.init_gate.lock().await;
        let order = self.dependency_graph().await.load_order()?;
        info!(order = ?order, "模块初始化顺序");

        for name in &order {
            if self.is_initialized(name).await {
                continue;
            }
            // 调用 init 时不持有状态锁，模块可以在 init 中查询管理器
            let Some(module) = self.get_module(name).await else {
                continue;
            };

            module.init(ctx).await.map_err(|e| CoreError::ModuleInitFailed {
                module: name.clone(),
                source: Box::new(e),
            })?;

            self.initialized.write().await.insert(name.clone());
            info!(module = %name, version = module.version(), "模块初始化完成");
            self.emit(lifecycle_events::MODULE_INITIALIZED, name).await;
        }
        Ok(order)
    }

    // ==================== 汇总 ====================

    /// 所有模块贡献的路由，附带模块名
    pub async fn routes(&self) -> Vec<(String, ModuleRoute)> {
        let modules = self.modules.read().await;
        modules
            .iter()
            .flat_map(|m| {
                let name = m.name().to_string();
                m.module
                    .routes()
                    .into_iter()
                    .map(move |route| (name.clone(), route))
            })
            .collect()
    }

    /// 所有命名服务，键为 `模块名.键`
    pub async fn services(&self) -> HashMap<String, ServiceHandle> {
        self.collect_named(|m| m.services()).await
    }

    /// 所有命名仓储，键为 `模块名.键`
    pub async fn repositories(&self) -> HashMap<String, ServiceHandle> {
        self.collect_named(|m| m.repositories()).await
    }

    async fn collect_named<F>(&self, extract: F) -> HashMap<String, ServiceHandle>
    where
        F: Fn(&dyn Module) -> HashMap<String, ServiceHandle>,
    {
        let modules = self.modules.read().await;
        let mut result = HashMap::new();
        for loaded in modules.iter() {
            for (key, handle) in extract(loaded.module.as_ref()) {
                result.insert(format!("{}.{}", loaded.name(), key), handle);
            }
        }
        result
    }

    /// 按 `模块名.键` 取服务并转为具体类型
    pub async fn service<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let (module, name) = key.split_once('.')?;
        let module = self.get_module(module).await?;
        module.services().remove(name)?.downcast::<T>().ok()
    }

    // ==================== 查询 ====================

    pub async fn get_module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules
            .read()
            .await
            .iter()
            .find(|m| m.name() == name)
            .map(|m| Arc::clone(&m.module))
    }

    /// 按注册顺序列出模块名
    pub async fn list_modules(&self) -> Vec<String> {
        self.modules
            .read()
            .await
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    pub async fn loaded_modules(&self) -> Vec<LoadedModule> {
        self.modules.read().await.clone()
    }

    pub async fn module_metadata(&self, name: &str) -> Option<ModuleInfo> {
        let initialized = self.is_initialized(name).await;
        self.modules
            .read()
            .await
            .iter()
            .find(|m| m.name() == name)
            .map(|m| ModuleInfo::from_loaded(m, initialized))
    }

    pub async fn is_initialized(&self, name: &str) -> bool {
        self.initialized.read().await.contains(name)
    }

    pub async fn len(&self) -> usize {
        self.modules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.modules.read().await.is_empty()
    }

    // ==================== 卸载 ====================

    /// 移除模块记录，不调用模块的销毁方法
    pub async fn unload_module(&self, name: &str) -> Result<()> {
        {
            let mut modules = self.modules.write().await;
            let index = modules
                .iter()
                .position(|m| m.name() == name)
                .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
            modules.remove(index);
        }
        self.initialized.write().await.remove(name);

        info!(module = %name, "模块已卸载");
        self.emit(lifecycle_events::MODULE_UNLOADED, name).await;
        Ok(())
    }

    /// 销毁所有模块
    ///
    /// 单个模块销毁失败只记录警告，最终总会清空模块记录。
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        let drained: Vec<LoadedModule> = self.modules.write().await.drain(..).collect();
        self.initialized.write().await.clear();

        for loaded in drained {
            let name = loaded.name().to_string();
            match loaded.module.destroy().await {
                Ok(()) => debug!(module = %name, "模块已销毁"),
                Err(e) => warn!(module = %name, error = %e, "模块销毁失败"),
            }
            self.emit(lifecycle_events::MODULE_DESTROYED, &name).await;
        }
        info!("模块管理器已销毁");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        version: &'static str,
    }

    #[async_trait]
    impl Module for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            self.version
        }

        fn services(&self) -> HashMap<String, ServiceHandle> {
            let mut services: HashMap<String, ServiceHandle> = HashMap::new();
            services.insert("greeting".to_string(), Arc::new(format!("hello from {}", self.name)));
            services
        }

        async fn init(&self, _ctx: &AppContext) -> Result<()> {
            Ok(())
        }
    }

    struct Other;

    #[async_trait]
    impl Module for Other {
        fn name(&self) -> &str {
            "other"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        async fn init(&self, _ctx: &AppContext) -> Result<()> {
            Ok(())
        }
    }

    fn named(name: &'static str, version: &'static str) -> Arc<dyn Module> {
        Arc::new(Named { name, version })
    }

    #[tokio::test]
    async fn test_rejects_empty_name_and_version() {
        let manager = ModuleManager::default();
        assert!(matches!(
            manager.register(named("", "1.0")).await,
            Err(CoreError::InvalidModule(_))
        ));
        assert!(matches!(
            manager.register(named("orders", "")).await,
            Err(CoreError::InvalidModule(_))
        ));
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejects_duplicate_type() {
        let manager = ModuleManager::default();
        manager.register(named("orders", "1.0")).await.unwrap();
        let err = manager.register(named("users", "1.0")).await.unwrap_err();
        assert!(matches!(err, CoreError::ModuleAlreadyRegistered(ref n) if n == "orders"));
        manager.register(Arc::new(Other)).await.unwrap();
        assert_eq!(manager.list_modules().await, vec!["orders", "other"]);
    }

    #[tokio::test]
    async fn test_disabled_module_skipped() {
        let manager = ModuleManager::new(["orders"]);
        manager.register(named("orders", "1.0")).await.unwrap();
        assert!(manager.list_modules().await.is_empty());
    }

    #[tokio::test]
    async fn test_services_namespaced() {
        let manager = ModuleManager::default();
        manager.register(named("orders", "1.0")).await.unwrap();

        let services = manager.services().await;
        assert!(services.contains_key("orders.greeting"));

        let greeting = manager.service::<String>("orders.greeting").await.unwrap();
        assert_eq!(greeting.as_str(), "hello from orders");
        assert!(manager.service::<u32>("orders.greeting").await.is_none());
        assert!(manager.repositories().await.is_empty());
    }

    #[tokio::test]
    async fn test_unload_module() {
        let manager = ModuleManager::default();
        manager.register(named("orders", "1.0")).await.unwrap();

        let info = manager.module_metadata("orders").await.unwrap();
        assert_eq!(info.version, "1.0");
        assert!(!info.initialized);

        manager.unload_module("orders").await.unwrap();
        assert!(manager.get_module("orders").await.is_none());
        assert!(matches!(
            manager.unload_module("orders").await,
            Err(CoreError::ModuleNotFound(_))
        ));
    }
}
