//! 应用上下文
//!
//! 模块初始化和库加载器共享的运行时句柄：配置、库管理器、模块管理器与事件总线。
//! 上下文可以廉价克隆，所有字段都是共享引用。

use std::fmt;
use std::sync::Arc;

use super::config::AppConfig;
use crate::auth::{AuthGuard, AuthStore, AuthStoreLibrary};
use crate::library::{LibraryArgs, LibraryManager};
use crate::module::ModuleManager;
use crate::router::EventBus;
use crate::utils::Result;

/// 默认加载器类别
pub mod loader_category {
    pub const DATABASE: &str = "database";
    pub const AUTH_STORAGE: &str = "authstorage";
    pub const AUTHENTICATION: &str = "authentication";
    pub const REDIS: &str = "redis";
    pub const PUBSUB: &str = "pubsub";
    pub const KAFKA: &str = "kafka";
}

/// 应用上下文
#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    libraries: Arc<LibraryManager>,
    modules: Arc<ModuleManager>,
    events: EventBus,
}

impl AppContext {
    pub fn new(
        config: Arc<AppConfig>,
        libraries: Arc<LibraryManager>,
        modules: Arc<ModuleManager>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            libraries,
            modules,
            events,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_arc(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    pub fn libraries(&self) -> &Arc<LibraryManager> {
        &self.libraries
    }

    pub fn modules(&self) -> &Arc<ModuleManager> {
        &self.modules
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// 按类别解析当前配置下的加载器名
    ///
    /// `database` → `database:<driver>`，`authstorage` → `authstorage:<store>`，
    /// `authentication` → `authentication:<type>`，其他类别原样返回。
    pub fn default_loader_name(&self, category: &str) -> String {
        let variant = match category {
            loader_category::DATABASE => &self.config.database.driver,
            loader_category::AUTH_STORAGE => &self.config.auth.store,
            loader_category::AUTHENTICATION => &self.config.auth.auth_type,
            _ => return category.to_string(),
        };
        format!("{}:{}", category, variant.to_lowercase())
    }

    /// 标准加载参数：位置 0 为上下文，位置 1 为对应的配置段
    pub fn library_args<C: Clone + Send + Sync + 'static>(&self, config: &C) -> LibraryArgs {
        LibraryArgs::new().with(self.clone()).with(config.clone())
    }

    /// 加载（或取出已缓存的）认证存储单例
    pub async fn load_auth_store(&self) -> Result<Arc<dyn AuthStore>> {
        let name = self.default_loader_name(loader_category::AUTH_STORAGE);
        let args = self.library_args(&self.config.auth);
        let library = self
            .libraries
            .load_singleton_as::<AuthStoreLibrary>(&name, args)
            .await?;
        Ok(library.store())
    }

    /// 已加载的认证守卫
    pub async fn auth_guard(&self) -> Option<Arc<AuthGuard>> {
        let name = self.default_loader_name(loader_category::AUTHENTICATION);
        self.libraries
            .get_as::<AuthGuard>(&name, crate::library::DEFAULT_INSTANCE_KEY)
            .await
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("app", &self.config.app.name)
            .field("environment", &self.config.app.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(config: AppConfig) -> AppContext {
        AppContext::new(
            Arc::new(config),
            Arc::new(LibraryManager::new()),
            Arc::new(ModuleManager::default()),
            EventBus::new(),
        )
    }

    #[test]
    fn test_default_loader_names() {
        let config = AppConfig::builder()
            .database("Postgres", "localhost")
            .auth_type("jwt")
            .build();
        let ctx = context(config);

        assert_eq!(ctx.default_loader_name("database"), "database:postgres");
        assert_eq!(ctx.default_loader_name("authstorage"), "authstorage:yaml");
        assert_eq!(ctx.default_loader_name("authentication"), "authentication:jwt");
        assert_eq!(ctx.default_loader_name("redis"), "redis");
    }

    #[tokio::test]
    async fn test_load_auth_store_without_loader() {
        let ctx = context(AppConfig::default());
        let err = ctx.load_auth_store().await.err().unwrap();
        assert!(matches!(err, crate::utils::CoreError::LoaderNotFound(ref n) if n == "authstorage:yaml"));
        assert!(ctx.auth_guard().await.is_none());
    }
}
