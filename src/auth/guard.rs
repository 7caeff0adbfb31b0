//! 认证守卫
//!
//! 认证守卫是 `authentication:<type>` 加载器产出的库实例，
//! 把校验器、认证器和授权器串成一次请求的准入判定：
//! 提取凭证 → 解析用户 → 检查权限，任何一步失败都直接拒绝。

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument};

use super::authenticator::Authenticator;
use super::authorization::{Authorization, PolicyEvaluator};
use super::model::UserAuthInfo;
use super::validator::AuthValidator;
use crate::core::config::AuthConfig;
use crate::core::context::AppContext;
use crate::library::{Library, LibraryArgs};
use crate::router::WebRequest;
use crate::utils::{CoreError, Result};

struct GuardChain {
    authenticator: Authenticator,
    authorization: Authorization,
}

/// 认证守卫
///
/// 安装参数：
///
/// | 位置 | 类型 | 说明 |
/// |---|---|---|
/// | 0 | [`AppContext`] | 用于加载 `authstorage:<store>` 单例 |
/// | 1 | [`AuthConfig`] | `type` 必须与校验器名称一致 |
/// | 任意 | `Arc<dyn PolicyEvaluator>` | 可选，ABAC 策略求值器 |
pub struct AuthGuard {
    validator: Arc<dyn AuthValidator>,
    chain: OnceLock<GuardChain>,
}

impl AuthGuard {
    pub fn new(validator: Arc<dyn AuthValidator>) -> Self {
        Self {
            validator,
            chain: OnceLock::new(),
        }
    }

    pub fn validator(&self) -> &Arc<dyn AuthValidator> {
        &self.validator
    }

    /// 是否已安装
    pub fn is_installed(&self) -> bool {
        self.chain.get().is_some()
    }

    /// 对请求做准入判定，通过时把用户写入 `req.user`
    #[instrument(skip_all, fields(method = %req.method, path = %req.path))]
    pub async fn check(&self, req: &mut WebRequest) -> Result<Arc<UserAuthInfo>> {
        let chain = self
            .chain
            .get()
            .ok_or_else(|| CoreError::Internal("认证守卫尚未安装".to_string()))?;

        let credential = chain.authenticator.extract(req)?;
        let user = chain.authenticator.authenticate(req, &credential).await?;
        chain
            .authorization
            .check(&user, req.method.as_str(), &req.path)
            .await?;

        let user = Arc::new(user);
        req.user = Some(Arc::clone(&user));
        debug!(user_id = user.user_id(), "请求准入");
        Ok(user)
    }
}

#[async_trait]
impl Library for AuthGuard {
    async fn install(&self, args: &LibraryArgs) -> Result<()> {
        let context = args.get::<AppContext>(0)?;
        let config = args.get::<AuthConfig>(1)?;
        let name = self.validator.name();

        if !config.auth_type.eq_ignore_ascii_case(name) {
            return Err(CoreError::LibraryInitFailed {
                loader: format!("authentication:{}", name),
                reason: format!("配置的认证类型 '{}' 与校验器不一致", config.auth_type),
            });
        }

        let store = context.load_auth_store().await?;
        let mut authorization = Authorization::new(Arc::clone(&store));
        if let Some(evaluator) = args.find::<Arc<dyn PolicyEvaluator>>() {
            authorization = authorization.with_evaluator(Arc::clone(evaluator));
        }

        let chain = GuardChain {
            authenticator: Authenticator::new(Arc::clone(&self.validator), store),
            authorization,
        };
        self.chain
            .set(chain)
            .map_err(|_| CoreError::Internal(format!("认证守卫 '{}' 重复安装", name)))?;

        info!(validator = name, "认证守卫已安装");
        Ok(())
    }

    async fn uninstall(&self) -> Result<()> {
        debug!(validator = self.validator.name(), "认证守卫已卸载");
        Ok(())
    }
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard")
            .field("validator", &self.validator.name())
            .field("installed", &self.is_installed())
            .finish()
    }
}
