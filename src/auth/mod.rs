//! 认证授权
//!
//! 请求准入分三步：校验器从请求中提取凭证，认证器在存储中找到匹配的用户，
//! 授权器按请求方法与路径找到受保护资源并判定权限。

pub mod authenticator;
pub mod authorization;
pub mod guard;
pub mod loaders;
pub mod model;
pub mod store;
pub mod validator;

pub use authenticator::Authenticator;
pub use authorization::{Authorization, PolicyEvaluator};
pub use guard::AuthGuard;
pub use loaders::{
    default_auth_loaders, ApiKeyAuthLoader, AuthStoreLibrary, BasicAuthLoader, JwtAuthLoader,
    YamlAuthStoreLoader,
};
pub use model::{
    AbacResource, AbacUser, Condition, ControlType, Effect, Policy, RbacResource, RbacUser,
    ResourceInfo, UserAuthInfo,
};
pub use store::{clean_resource_path, AuthStore, StaticAuthStore};
pub use validator::{ApiKeyValidator, AuthValidator, BasicValidator, Claims, JwtValidator};
