//! webcore 错误类型定义
//!
//! 本模块定义了脚手架中使用的所有错误类型，按照来源分组：
//! 配置、注册、依赖图、初始化、库构建、认证授权以及路由。

use thiserror::Error;

/// 核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== 模块注册错误 ====================

    /// 模块定义无效（名称或版本为空等）
    #[error("模块校验失败: {0}")]
    InvalidModule(String),

    /// 模块已注册
    #[error("模块已注册: '{0}'")]
    ModuleAlreadyRegistered(String),

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    // ==================== 依赖图错误 ====================

    /// 模块依赖自身
    #[error("模块 '{0}' 依赖自身")]
    SelfDependency(String),

    /// 依赖模块未找到
    #[error("依赖模块 '{0}' 未找到 (dependency not found)")]
    DependencyNotFound(String),

    /// 循环依赖
    #[error("检测到循环依赖: 模块 '{0}'")]
    CircularDependency(String),

    // ==================== 模块初始化错误 ====================

    /// 模块初始化失败
    #[error("模块初始化失败: '{module}' - {source}")]
    ModuleInitFailed {
        module: String,
        #[source]
        source: Box<CoreError>,
    },

    /// 模块运行期错误（由模块自身返回）
    #[error("模块 '{module}' 错误: {reason}")]
    ModuleFailed {
        module: String,
        reason: String,
    },

    // ==================== 库管理错误 ====================

    /// 加载器未注册
    #[error("库加载器未找到: '{0}'")]
    LoaderNotFound(String),

    /// 库实例构建失败
    #[error("库构建失败: '{loader}' - {reason}")]
    LibraryInitFailed {
        loader: String,
        reason: String,
    },

    /// 构建参数类型不匹配
    #[error("库构建参数无效: 位置 {index} 需要类型 {expected}")]
    InvalidLibraryArgs {
        index: usize,
        expected: &'static str,
    },

    /// 库实例未找到
    #[error("库实例未找到: '{loader}' / '{key}'")]
    LibraryNotFound {
        loader: String,
        key: String,
    },

    /// 库卸载失败
    #[error("库卸载失败: '{loader}' / '{key}' - {reason}")]
    LibraryTeardownFailed {
        loader: String,
        key: String,
        reason: String,
    },

    // ==================== 认证授权错误 ====================

    /// 请求中缺少凭证
    #[error("缺少凭证: {0}")]
    MissingCredential(String),

    /// 凭证无效或已过期
    #[error("凭证无效: {0}")]
    InvalidCredential(String),

    /// 找不到与凭证匹配的用户
    #[error("用户不存在: {0}")]
    UserNotFound(String),

    /// 权限被拒绝
    #[error("权限被拒绝: {0}")]
    PermissionDenied(String),

    /// 用户与资源的访问控制类型不一致
    #[error("访问控制类型不匹配: 用户 ({user}) 与资源 ({resource})")]
    ControlTypeMismatch {
        user: String,
        resource: String,
    },

    /// ABAC 策略求值器未提供
    #[error("ABAC 策略求值未实现: 资源 '{0}'")]
    AbacNotImplemented(String),

    // ==================== 路由错误 ====================

    /// 路由未找到
    #[error("路由未找到: {method} {path}")]
    RouteNotFound {
        method: String,
        path: String,
    },

    /// 请求无效（请求体无法读取或解析）
    #[error("请求无效: {0}")]
    InvalidRequest(String),

    /// 客户端在当前窗口内的请求数已达上限
    #[error("请求过于频繁，请稍后重试")]
    RateLimited {
        limit: u64,
        reset_at: String,
    },

    // ==================== 事件系统错误 ====================

    /// 订阅未找到
    #[error("订阅未找到: '{0}'")]
    SubscriptionNotFound(String),

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 状态码常量
pub mod status_code {
    /// 成功
    pub const OK: u16 = 200;

    /// 请求格式错误
    pub const BAD_REQUEST: u16 = 400;

    /// 未授权
    pub const UNAUTHORIZED: u16 = 401;

    /// 权限不足
    pub const FORBIDDEN: u16 = 403;

    /// 未找到
    pub const NOT_FOUND: u16 = 404;

    /// 冲突
    pub const CONFLICT: u16 = 409;

    /// 请求过多
    pub const TOO_MANY_REQUESTS: u16 = 429;

    /// 内部错误
    pub const INTERNAL_ERROR: u16 = 500;

    /// 服务不可用
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// 错误码常量
pub mod error_code {
    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 模块错误 (MODULE-xxx)
    pub const MODULE_INVALID: &str = "MODULE-001";
    pub const MODULE_DUPLICATE: &str = "MODULE-002";
    pub const MODULE_NOT_FOUND: &str = "MODULE-003";
    pub const MODULE_SELF_DEPENDENCY: &str = "MODULE-004";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-005";
    pub const MODULE_DEPENDENCY_NOT_FOUND: &str = "MODULE-006";
    pub const MODULE_INIT_FAILED: &str = "MODULE-007";

    // 库错误 (LIBRARY-xxx)
    pub const LIBRARY_LOADER_NOT_FOUND: &str = "LIBRARY-001";
    pub const LIBRARY_INIT_FAILED: &str = "LIBRARY-002";
    pub const LIBRARY_INVALID_ARGS: &str = "LIBRARY-003";
    pub const LIBRARY_NOT_FOUND: &str = "LIBRARY-004";

    // 认证错误 (AUTH-xxx)
    pub const AUTH_UNAUTHORIZED: &str = "AUTH-001";
    pub const AUTH_FORBIDDEN: &str = "AUTH-002";

    // 路由错误 (ROUTE-xxx)
    pub const ROUTE_NOT_FOUND: &str = "ROUTE-001";
    pub const ROUTE_INVALID_REQUEST: &str = "ROUTE-002";
    pub const ROUTE_RATE_LIMITED: &str = "ROUTE-003";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::InvalidModule(_) => error_code::MODULE_INVALID,
            CoreError::ModuleAlreadyRegistered(_) => error_code::MODULE_DUPLICATE,
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::SelfDependency(_) => error_code::MODULE_SELF_DEPENDENCY,
            CoreError::CircularDependency(_) => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::DependencyNotFound(_) => error_code::MODULE_DEPENDENCY_NOT_FOUND,
            CoreError::ModuleInitFailed { .. } => error_code::MODULE_INIT_FAILED,
            CoreError::LoaderNotFound(_) => error_code::LIBRARY_LOADER_NOT_FOUND,
            CoreError::LibraryInitFailed { .. } => error_code::LIBRARY_INIT_FAILED,
            CoreError::InvalidLibraryArgs { .. } => error_code::LIBRARY_INVALID_ARGS,
            CoreError::LibraryNotFound { .. } => error_code::LIBRARY_NOT_FOUND,
            CoreError::RouteNotFound { .. } => error_code::ROUTE_NOT_FOUND,
            CoreError::InvalidRequest(_) => error_code::ROUTE_INVALID_REQUEST,
            CoreError::RateLimited { .. } => error_code::ROUTE_RATE_LIMITED,
            e if e.is_auth_error() => {
                if e.status_code() == status_code::FORBIDDEN {
                    error_code::AUTH_FORBIDDEN
                } else {
                    error_code::AUTH_UNAUTHORIZED
                }
            }
            _ => "UNKNOWN",
        }
    }

    /// 获取 HTTP 状态码
    ///
    /// 凭证类失败统一为 401，权限类失败统一为 403。
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::MissingCredential(_)
            | CoreError::InvalidCredential(_)
            | CoreError::UserNotFound(_) => status_code::UNAUTHORIZED,
            CoreError::PermissionDenied(_)
            | CoreError::ControlTypeMismatch { .. }
            | CoreError::AbacNotImplemented(_) => status_code::FORBIDDEN,
            CoreError::RouteNotFound { .. } => status_code::NOT_FOUND,
            CoreError::ModuleNotFound(_) => status_code::NOT_FOUND,
            CoreError::ModuleAlreadyRegistered(_) => status_code::CONFLICT,
            CoreError::RateLimited { .. } => status_code::TOO_MANY_REQUESTS,
            CoreError::InvalidConfigValue { .. } | CoreError::InvalidRequest(_) => {
                status_code::BAD_REQUEST
            }
            _ => status_code::INTERNAL_ERROR,
        }
    }

    /// 是否属于认证/授权类错误
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            CoreError::MissingCredential(_)
                | CoreError::InvalidCredential(_)
                | CoreError::UserNotFound(_)
                | CoreError::PermissionDenied(_)
                | CoreError::ControlTypeMismatch { .. }
                | CoreError::AbacNotImplemented(_)
        )
    }

    /// 对外展示的错误名
    pub fn error_name(&self) -> &'static str {
        match self.status_code() {
            status_code::UNAUTHORIZED => "UNAUTHORIZED",
            status_code::FORBIDDEN => "FORBIDDEN",
            status_code::NOT_FOUND => "NOT_FOUND",
            status_code::CONFLICT => "CONFLICT",
            status_code::BAD_REQUEST => "BAD_REQUEST",
            status_code::TOO_MANY_REQUESTS => "TOO_MANY_REQUESTS",
            _ => "INTERNAL_ERROR",
        }
    }
}
