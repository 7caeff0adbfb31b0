//! 用户与资源存储
//!
//! 存储负责两件事：根据校验器提取的凭证找到匹配的用户，
//! 以及根据请求方法和路径找到受保护的资源。

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use super::model::{
    AbacResource, AbacUser, ControlType, RbacResource, RbacUser, ResourceInfo, UserAuthInfo,
};
use super::validator::AuthValidator;
use crate::router::WebRequest;
use crate::utils::{CoreError, Result};

/// 认证存储
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// 查找与凭证匹配的用户
    ///
    /// 线性扫描所有用户，第一个校验通过的用户胜出；
    /// 没有用户匹配时，返回扫描过程中最后一次校验错误，否则返回 `UserNotFound`。
    async fn get_user_auth_info(
        &self,
        req: &WebRequest,
        validator: &dyn AuthValidator,
        credential: &str,
    ) -> Result<UserAuthInfo>;

    /// 查找与请求匹配的资源，没有匹配时返回 `None`
    async fn get_resource_info(&self, method: &str, path: &str) -> Result<Option<ResourceInfo>>;
}

/// 去掉资源路径中的参数段（第一个 `/:` 之后）与查询串（`?` 之后）
pub fn clean_resource_path(path: &str) -> &str {
    let path = match path.find("/:") {
        Some(idx) => &path[..idx],
        None => path,
    };
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

// ==================== StaticAuthStore ====================

#[derive(Debug, Default, Deserialize)]
struct RbacAccessFile {
    #[serde(default)]
    users: Vec<RbacUser>,
    #[serde(default)]
    resources: Vec<RbacResource>,
}

#[derive(Debug, Default, Deserialize)]
struct AbacAccessFile {
    #[serde(default)]
    users: Vec<AbacUser>,
    #[serde(default)]
    resources: Vec<AbacResource>,
}

/// 内存中的用户与资源表
///
/// 通常从访问文件（`access.yaml`）加载，文件结构由访问控制类型决定：
///
/// ```yaml
/// users:
///   - key: k-123
///     user: alice
///     password: secret
///     permissions: [admin]
/// resources:
///   - action: orders.list
///     method: GET
///     path: /api/orders/:id
///     permissions: [admin]
/// ```
#[derive(Debug, Clone)]
pub struct StaticAuthStore {
    control: ControlType,
    users: Vec<UserAuthInfo>,
    resources: Vec<ResourceInfo>,
}

impl StaticAuthStore {
    /// 创建空存储
    pub fn new(control: ControlType) -> Self {
        Self {
            control,
            users: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// 添加用户
    pub fn with_user(mut self, user: UserAuthInfo) -> Self {
        self.users.push(user);
        self
    }

    /// 添加资源
    pub fn with_resource(mut self, resource: ResourceInfo) -> Self {
        self.resources.push(resource);
        self
    }

    /// 从 YAML 文本解析
    pub fn from_yaml(control: ControlType, content: &str) -> Result<Self> {
        let store = match control {
            ControlType::Rbac => {
                let file: RbacAccessFile = serde_yaml::from_str(content)?;
                Self {
                    control,
                    users: file.users.into_iter().map(UserAuthInfo::Rbac).collect(),
                    resources: file.resources.into_iter().map(ResourceInfo::Rbac).collect(),
                }
            }
            ControlType::Abac => {
                let file: AbacAccessFile = serde_yaml::from_str(content)?;
                Self {
                    control,
                    users: file.users.into_iter().map(UserAuthInfo::Abac).collect(),
                    resources: file.resources.into_iter().map(ResourceInfo::Abac).collect(),
                }
            }
        };
        Ok(store)
    }

    /// 从访问文件加载
    pub async fn load(control: ControlType, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("访问文件 {} 加载失败: {}", path.display(), e))
        })?;
        let store = Self::from_yaml(control, &content)?;
        info!(
            path = %path.display(),
            control = %control,
            users = store.users.len(),
            resources = store.resources.len(),
            "访问文件已加载"
        );
        Ok(store)
    }

    pub fn control(&self) -> ControlType {
        self.control
    }

    pub fn users(&self) -> &[UserAuthInfo] {
        &self.users
    }

    pub fn resources(&self) -> &[ResourceInfo] {
        &self.resources
    }
}

#[async_trait]
impl AuthStore for StaticAuthStore {
    async fn get_user_auth_info(
        &self,
        req: &WebRequest,
        validator: &dyn AuthValidator,
        credential: &str,
    ) -> Result<UserAuthInfo> {
        let mut last_error = None;
        for user in &self.users {
            match validator.verify_user(req, credential, user) {
                Ok(true) => return Ok(user.clone()),
                Ok(false) => {}
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Err(CoreError::UserNotFound("Invalid or expired credential".to_string())),
        }
    }

    async fn get_resource_info(&self, method: &str, path: &str) -> Result<Option<ResourceInfo>> {
        let found = self.resources.iter().find(|resource| {
            resource.method() == method && path.starts_with(clean_resource_path(resource.path()))
        });
        if let Some(resource) = found {
            debug!(method, path, resource = resource.path(), "匹配到受保护资源");
        }
        Ok(found.cloned())
    }
}
