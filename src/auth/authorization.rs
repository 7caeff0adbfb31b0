//! 授权
//!
//! 根据请求方法与路径找到受保护资源，再由资源自身判定用户是否有权访问。

use std::sync::Arc;
use tracing::debug;

use super::model::{AbacResource, AbacUser, UserAuthInfo};
use super::store::AuthStore;
use crate::utils::Result;

/// ABAC 策略求值器
///
/// 闭包 `Fn(&AbacUser, &AbacResource) -> Result<bool>` 自动实现该 trait。
pub trait PolicyEvaluator: Send + Sync {
    /// `Ok(true)` 放行，`Ok(false)` 拒绝
    fn evaluate(&self, user: &AbacUser, resource: &AbacResource) -> Result<bool>;
}

impl<F> PolicyEvaluator for F
where
    F: Fn(&AbacUser, &AbacResource) -> Result<bool> + Send + Sync,
{
    fn evaluate(&self, user: &AbacUser, resource: &AbacResource) -> Result<bool> {
        self(user, resource)
    }
}

/// 授权器
#[derive(Clone)]
pub struct Authorization {
    store: Arc<dyn AuthStore>,
    evaluator: Option<Arc<dyn PolicyEvaluator>>,
}

impl Authorization {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self {
            store,
            evaluator: None,
        }
    }

    /// 设置 ABAC 策略求值器
    pub fn with_evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// 判断用户能否以 `method` 访问 `path`
    ///
    /// 没有任何资源匹配时默认放行；匹配到资源后由资源判定，
    /// 用户与资源的访问控制类型不一致时拒绝。
    pub async fn check(&self, user: &UserAuthInfo, method: &str, path: &str) -> Result<()> {
        let Some(resource) = self.store.get_resource_info(method, path).await? else {
            debug!(user_id = user.user_id(), method, path, "未匹配受保护资源，默认放行");
            return Ok(());
        };

        resource.is_user_permitted(user, self.evaluator.as_deref())?;
        debug!(user_id = user.user_id(), method, path, "授权通过");
        Ok(())
    }
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorization")
            .field("has_evaluator", &self.evaluator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::model::{AbacUser, ControlType, RbacResource, RbacUser, ResourceInfo};
    use crate::auth::store::StaticAuthStore;
    use crate::utils::CoreError;

    fn rbac(roles: &[&str]) -> UserAuthInfo {
        UserAuthInfo::Rbac(RbacUser {
            user_id: "u".to_string(),
            username: None,
            password: None,
            groups: vec![],
            roles: roles.iter().map(|r| r.to_string()).collect(),
        })
    }

    fn abac_user() -> UserAuthInfo {
        UserAuthInfo::Abac(AbacUser {
            user_id: "svc".to_string(),
            username: None,
            password: None,
            groups: vec!["sales".to_string()],
            policies: vec![],
        })
    }

    fn store() -> Arc<dyn AuthStore> {
        Arc::new(StaticAuthStore::new(ControlType::Rbac).with_resource(ResourceInfo::Rbac(
            RbacResource {
                action: "orders.delete".to_string(),
                path: "/api/orders/:id".to_string(),
                method: "DELETE".to_string(),
                permitted_roles: vec!["admin".to_string()],
            },
        )))
    }

    #[tokio::test]
    async fn test_unprotected_path_allowed() {
        let authz = Authorization::new(Arc::new(StaticAuthStore::new(ControlType::Rbac)));
        assert!(authz.check(&rbac(&[]), "GET", "/unprotected").await.is_ok());
    }

    #[tokio::test]
    async fn test_rbac_grant_and_deny() {
        let authz = Authorization::new(store());
        assert!(authz.check(&rbac(&["admin"]), "DELETE", "/api/orders/9").await.is_ok());

        let err = authz
            .check(&rbac(&["viewer"]), "DELETE", "/api/orders/9")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));

        // 方法不同视为未受保护
        assert!(authz.check(&rbac(&["viewer"]), "GET", "/api/orders/9").await.is_ok());
    }

    #[tokio::test]
    async fn test_type_mismatch_denied() {
        let authz = Authorization::new(store());
        let err = authz
            .check(&abac_user(), "DELETE", "/api/orders/9")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_abac_requires_evaluator() {
        let yaml = "resources:\n  - method: GET\n    path: /api/reports\n";
        let store: Arc<dyn AuthStore> =
            Arc::new(StaticAuthStore::from_yaml(ControlType::Abac, yaml).unwrap());

        let authz = Authorization::new(store.clone());
        let err = authz.check(&abac_user(), "GET", "/api/reports").await.unwrap_err();
        assert!(matches!(err, CoreError::AbacNotImplemented(_)));

        let evaluator = |user: &AbacUser, _: &AbacResource| -> Result<bool> {
            Ok(user.groups.iter().any(|g| g == "sales"))
        };
        let authz = Authorization::new(store).with_evaluator(Arc::new(evaluator));
        assert!(authz.check(&abac_user(), "GET", "/api/reports").await.is_ok());
    }
}
