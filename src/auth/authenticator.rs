//! 认证器：把校验器提取的凭证解析为存储中的用户

use std::sync::Arc;
use tracing::debug;

use super::model::UserAuthInfo;
use super::store::AuthStore;
use super::validator::AuthValidator;
use crate::router::WebRequest;
use crate::utils::Result;

/// 认证器
#[derive(Clone)]
pub struct Authenticator {
    validator: Arc<dyn AuthValidator>,
    store: Arc<dyn AuthStore>,
}

impl Authenticator {
    pub fn new(validator: Arc<dyn AuthValidator>, store: Arc<dyn AuthStore>) -> Self {
        Self { validator, store }
    }

    pub fn validator(&self) -> &Arc<dyn AuthValidator> {
        &self.validator
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    /// 提取凭证
    pub fn extract(&self, req: &WebRequest) -> Result<String> {
        self.validator.validate_key(req)
    }

    /// 用已提取的凭证查找用户
    pub async fn authenticate(&self, req: &WebRequest, credential: &str) -> Result<UserAuthInfo> {
        let user = self
            .store
            .get_user_auth_info(req, self.validator.as_ref(), credential)
            .await?;
        debug!(
            validator = self.validator.name(),
            user_id = user.user_id(),
            "认证成功"
        );
        Ok(user)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("validator", &self.validator.name())
            .finish_non_exhaustive()
    }
}
