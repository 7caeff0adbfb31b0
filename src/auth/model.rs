//! 认证授权数据模型
//!
//! 用户与资源记录都按访问控制类型（RBAC / ABAC）区分为两个变体，
//! 权限判定通过穷尽匹配完成：用户与资源类型不一致时直接拒绝。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::authorization::PolicyEvaluator;
use crate::utils::{CoreError, Result};

// ==================== 访问控制类型 ====================

/// 访问控制类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    /// 基于角色
    #[serde(rename = "RBAC")]
    Rbac,
    /// 基于属性
    #[serde(rename = "ABAC")]
    Abac,
}

impl ControlType {
    /// 配置中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Rbac => "RBAC",
            ControlType::Abac => "ABAC",
        }
    }

    /// 从配置值解析
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "RBAC" => Ok(ControlType::Rbac),
            "ABAC" => Ok(ControlType::Abac),
            other => Err(CoreError::InvalidConfigValue {
                key: "auth.control".to_string(),
                reason: format!("未知的访问控制类型: {}", other),
            }),
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== ABAC 策略 ====================

/// 策略效果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// 策略条件，多个条件之间是 AND 关系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// ABAC 策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub effect: Effect,
    #[serde(default)]
    pub action: String,
    #[serde(default, rename = "condition")]
    pub conditions: Vec<Condition>,
}

// ==================== 用户 ====================

/// RBAC 用户记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbacUser {
    /// API Key 与 JWT 使用的用户标识
    #[serde(rename = "key")]
    pub user_id: String,
    /// Basic 认证用户名
    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic 认证密码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    /// 用户所有分组合并后的角色
    #[serde(default, rename = "permissions")]
    pub roles: Vec<String>,
}

/// ABAC 用户记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbacUser {
    #[serde(rename = "key")]
    pub user_id: String,
    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub policies: Vec<Policy>,
}

/// 用户认证信息
#[derive(Debug, Clone, PartialEq)]
pub enum UserAuthInfo {
    Rbac(RbacUser),
    Abac(AbacUser),
}

impl UserAuthInfo {
    /// 访问控制类型
    pub fn control_type(&self) -> ControlType {
        match self {
            UserAuthInfo::Rbac(_) => ControlType::Rbac,
            UserAuthInfo::Abac(_) => ControlType::Abac,
        }
    }

    /// 用户标识
    pub fn user_id(&self) -> &str {
        match self {
            UserAuthInfo::Rbac(u) => &u.user_id,
            UserAuthInfo::Abac(u) => &u.user_id,
        }
    }

    /// 用户名
    pub fn username(&self) -> Option<&str> {
        match self {
            UserAuthInfo::Rbac(u) => u.username.as_deref(),
            UserAuthInfo::Abac(u) => u.username.as_deref(),
        }
    }

    /// 密码
    pub fn password(&self) -> Option<&str> {
        match self {
            UserAuthInfo::Rbac(u) => u.password.as_deref(),
            UserAuthInfo::Abac(u) => u.password.as_deref(),
        }
    }

    /// 分组
    pub fn groups(&self) -> &[String] {
        match self {
            UserAuthInfo::Rbac(u) => &u.groups,
            UserAuthInfo::Abac(u) => &u.groups,
        }
    }
}

// ==================== 资源 ====================

/// RBAC 资源记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbacResource {
    #[serde(default)]
    pub action: String,
    pub path: String,
    pub method: String,
    /// 允许访问的角色
    #[serde(default, rename = "permissions")]
    pub permitted_roles: Vec<String>,
}

/// ABAC 资源记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbacResource {
    #[serde(default)]
    pub action: String,
    pub path: String,
    pub method: String,
    #[serde(default, rename = "policies")]
    pub permitted_policies: Vec<Policy>,
}

/// 资源权限信息
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceInfo {
    Rbac(RbacResource),
    Abac(AbacResource),
}

impl ResourceInfo {
    /// 访问控制类型
    pub fn control_type(&self) -> ControlType {
        match self {
            ResourceInfo::Rbac(_) => ControlType::Rbac,
            ResourceInfo::Abac(_) => ControlType::Abac,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            ResourceInfo::Rbac(r) => &r.action,
            ResourceInfo::Abac(r) => &r.action,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            ResourceInfo::Rbac(r) => &r.method,
            ResourceInfo::Abac(r) => &r.method,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ResourceInfo::Rbac(r) => &r.path,
            ResourceInfo::Abac(r) => &r.path,
        }
    }

    /// 判断用户是否有权访问该资源
    ///
    /// - RBAC：用户角色与资源允许角色有交集才放行
    /// - ABAC：只能通过提供的策略求值器判定，否则失败
    /// - 类型不一致：拒绝
    pub fn is_user_permitted(
        &self,
        user: &UserAuthInfo,
        evaluator: Option<&dyn PolicyEvaluator>,
    ) -> Result<()> {
        match (self, user) {
            (ResourceInfo::Rbac(resource), UserAuthInfo::Rbac(user)) => {
                let granted = user
                    .roles
                    .iter()
                    .any(|role| resource.permitted_roles.contains(role));
                if granted {
                    Ok(())
                } else {
                    Err(CoreError::PermissionDenied(format!(
                        "用户 '{}' 无权访问 {} {}",
                        user.user_id, resource.method, resource.path
                    )))
                }
            }
            (ResourceInfo::Abac(resource), UserAuthInfo::Abac(user)) => {
                let evaluator =
                    evaluator.ok_or_else(|| CoreError::AbacNotImplemented(resource.path.clone()))?;
                if evaluator.evaluate(user, resource)? {
                    Ok(())
                } else {
                    Err(CoreError::PermissionDenied(format!(
                        "用户 '{}' 不满足 {} {} 的策略",
                        user.user_id, resource.method, resource.path
                    )))
                }
            }
            (resource, user) => Err(CoreError::ControlTypeMismatch {
                user: user.control_type().to_string(),
                resource: resource.control_type().to_string(),
            }),
        }
    }
}
