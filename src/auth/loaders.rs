//! 认证相关的库加载器
//!
//! | 加载器名 | 产物 |
//! |---|---|
//! | `authstorage:yaml` | [`AuthStoreLibrary`]（访问文件） |
//! | `authentication:apikey` | [`AuthGuard`] + [`ApiKeyValidator`] |
//! | `authentication:jwt` | [`AuthGuard`] + [`JwtValidator`] |
//! | `authentication:basic` | [`AuthGuard`] + [`BasicValidator`] |

use async_trait::async_trait;
use std::sync::Arc;

use super::guard::AuthGuard;
use super::model::ControlType;
use super::store::{AuthStore, StaticAuthStore};
use super::validator::{ApiKeyValidator, AuthValidator, BasicValidator, JwtValidator};
use crate::core::config::AuthConfig;
use crate::library::{Library, LibraryArgs, LibraryLoader};
use crate::utils::Result;

// ==================== 认证存储 ====================

/// 认证存储库
///
/// 把任意 [`AuthStore`] 包装为可由库管理器缓存的库实例。
pub struct AuthStoreLibrary {
    store: Arc<dyn AuthStore>,
}

impl AuthStoreLibrary {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn AuthStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl Library for AuthStoreLibrary {
    async fn install(&self, _args: &LibraryArgs) -> Result<()> {
        Ok(())
    }

    async fn uninstall(&self) -> Result<()> {
        Ok(())
    }
}

/// `authstorage:yaml` 加载器
///
/// 参数：`AppContext`（位置 0，未使用）与 `AuthConfig`（位置 1）。
/// 访问文件结构由 `auth.control` 决定。
#[derive(Debug, Default)]
pub struct YamlAuthStoreLoader;

#[async_trait]
impl LibraryLoader for YamlAuthStoreLoader {
    async fn init(&self, args: &LibraryArgs) -> Result<Arc<dyn Library>> {
        let config = args.get::<AuthConfig>(1)?;
        let control = ControlType::parse(&config.control)?;
        let store = StaticAuthStore::load(control, &config.access_file).await?;

        let library = AuthStoreLibrary::new(Arc::new(store));
        library.install(args).await?;
        Ok(Arc::new(library))
    }
}

// ==================== 认证守卫 ====================

async fn install_guard(validator: Arc<dyn AuthValidator>, args: &LibraryArgs) -> Result<Arc<dyn Library>> {
    let guard = AuthGuard::new(validator);
    guard.install(args).await?;
    Ok(Arc::new(guard))
}

/// `authentication:apikey` 加载器
#[derive(Debug, Default)]
pub struct ApiKeyAuthLoader;

#[async_trait]
impl LibraryLoader for ApiKeyAuthLoader {
    async fn init(&self, args: &LibraryArgs) -> Result<Arc<dyn Library>> {
        let config = args.get::<AuthConfig>(1)?;
        install_guard(Arc::new(ApiKeyValidator::from_config(config)), args).await
    }
}

/// `authentication:jwt` 加载器
#[derive(Debug, Default)]
pub struct JwtAuthLoader;

#[async_trait]
impl LibraryLoader for JwtAuthLoader {
    async fn init(&self, args: &LibraryArgs) -> Result<Arc<dyn Library>> {
        let config = args.get::<AuthConfig>(1)?;
        install_guard(Arc::new(JwtValidator::from_config(config)?), args).await
    }
}

/// `authentication:basic` 加载器
#[derive(Debug, Default)]
pub struct BasicAuthLoader;

#[async_trait]
impl LibraryLoader for BasicAuthLoader {
    async fn init(&self, args: &LibraryArgs) -> Result<Arc<dyn Library>> {
        install_guard(Arc::new(BasicValidator::new()), args).await
    }
}

/// 内置的认证加载器表，键为注册名
pub fn default_auth_loaders() -> Vec<(&'static str, Arc<dyn LibraryLoader>)> {
    vec![
        ("authstorage:yaml", Arc::new(YamlAuthStoreLoader) as Arc<dyn LibraryLoader>),
        ("authentication:apikey", Arc::new(ApiKeyAuthLoader)),
        ("authentication:jwt", Arc::new(JwtAuthLoader)),
        ("authentication:basic", Arc::new(BasicAuthLoader)),
    ]
}
