//! 认证授权端到端测试
//!
//! 通过 WebCore 装配访问文件、认证库与模块路由，验证请求准入的完整流程：
//! 凭证提取 → 用户解析 → 资源权限判定 → 错误信封。

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::Method;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use webcore::auth::{
    AbacResource, AbacUser, Authorization, JwtValidator, RbacResource, RbacUser,
};
use webcore::{
    handler_fn, AppConfig, AppContext, ApiResponse, ControlType, CoreError, LibraryLoader, Module,
    ModuleRoute, ResourceInfo, StaticAuthStore, UserAuthInfo, WebCore, WebRequest,
};

// ============================================================================
// 测试辅助结构
// ============================================================================

const SECRET: &str = "integration-secret";

const RBAC_ACCESS: &str = r#"
users:
  - key: admin-1
    user: alice
    password: wonderland
    groups: [ops]
    permissions: [admin]
  - key: viewer-1
    user: bob
    password: builder
    permissions: [viewer]
resources:
  - action: orders.delete
    method: DELETE
    path: /api/orders/:id
    permissions: [admin]
  - action: orders.list
    method: GET
    path: /api/orders
    permissions: [admin, viewer]
"#;

const ABAC_ACCESS: &str = r#"
users:
  - key: auditor-1
    policies:
      - effect: Allow
        action: reports.read
resources:
  - action: reports.read
    method: GET
    path: /api/reports
"#;

/// 订单模块：受保护的 API 路由与一个公开路由
struct OrdersModule;

#[async_trait]
impl Module for OrdersModule {
    fn name(&self) -> &str {
        "orders"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn routes(&self) -> Vec<ModuleRoute> {
        vec![
            ModuleRoute::api(
                Method::GET,
                "/orders",
                handler_fn(|req: WebRequest| async move {
                    let user = req.user.as_ref().map(|u| u.user_id().to_string());
                    Ok(ApiResponse::success(json!({ "user": user })))
                }),
            ),
            ModuleRoute::api(
                Method::DELETE,
                "/orders/:id",
                handler_fn(|req: WebRequest| async move {
                    Ok(ApiResponse::success(json!({ "deleted": req.param("id") })))
                }),
            ),
            ModuleRoute::api(
                Method::GET,
                "/unprotected",
                handler_fn(|_req| async { Ok(ApiResponse::message("open")) }),
            ),
            ModuleRoute::api(
                Method::GET,
                "/reports",
                handler_fn(|_req| async { Ok(ApiResponse::message("report")) }),
            ),
            ModuleRoute::public(
                Method::GET,
                "/ping",
                handler_fn(|_req| async { Ok(ApiResponse::message("pong")) }),
            ),
        ]
    }

    async fn init(&self, _ctx: &AppContext) -> webcore::Result<()> {
        Ok(())
    }
}

struct Fixture {
    core: WebCore,
    _dir: TempDir,
}

async fn fixture(auth_type: &str, control: &str, access: &str, environment: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let access_file = dir.path().join("access.yaml");
    tokio::fs::write(&access_file, access).await.unwrap();

    let config = AppConfig::builder()
        .environment(environment)
        .auth_type(auth_type)
        .auth_control(control)
        .secret_key(SECRET)
        .access_file(&access_file)
        .build();

    let core = WebCore::new(
        config,
        Vec::<(String, Arc<dyn LibraryLoader>)>::new(),
        vec![Arc::new(OrdersModule) as Arc<dyn Module>],
    )
    .await
    .unwrap();
    Fixture { core, _dir: dir }
}

async fn ready(fixture: &Fixture) {
    fixture.core.start().await.unwrap();
    fixture.core.initialize().await.unwrap();
}

fn bearer(user_id: &str) -> String {
    let token = JwtValidator::new(SECRET, 3600)
        .unwrap()
        .issue_token(user_id)
        .unwrap();
    format!("Bearer {}", token)
}

fn request(method: Method, path: &str, authorization: Option<&str>) -> WebRequest {
    let req = WebRequest::new(method, path);
    match authorization {
        Some(value) => req.with_header("Authorization", value),
        None => req,
    }
}

// ============================================================================
// JWT + RBAC
// ============================================================================

#[tokio::test]
async fn test_jwt_admin_granted() {
    let fixture = fixture("jwt", "RBAC", RBAC_ACCESS, "production").await;
    ready(&fixture).await;

    let response = fixture
        .core
        .dispatch(request(Method::DELETE, "/api/orders/7", Some(&bearer("admin-1"))))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.data, Some(json!({ "deleted": "7" })));

    let response = fixture
        .core
        .dispatch(request(Method::GET, "/api/orders", Some(&bearer("admin-1"))))
        .await;
    assert_eq!(response.data, Some(json!({ "user": "admin-1" })));
}

#[tokio::test]
async fn test_jwt_viewer_denied_with_generic_message() {
    let fixture = fixture("jwt", "RBAC", RBAC_ACCESS, "production").await;
    ready(&fixture).await;

    let response = fixture
        .core
        .dispatch(request(Method::DELETE, "/api/orders/7", Some(&bearer("viewer-1"))))
        .await;
    assert_eq!(response.status(), 403);
    assert_eq!(response.error_code.as_deref(), Some("AUTH-002"));
    assert_eq!(response.error_name.as_deref(), Some("FORBIDDEN"));
    assert_eq!(response.message.as_deref(), Some("Forbidden"));
    assert!(response.details.is_none());
    assert!(response.stack.is_empty());

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["httpCode"], 403);
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_doubled_slashes_still_authorized() {
    let fixture = fixture("jwt", "RBAC", RBAC_ACCESS, "production").await;
    ready(&fixture).await;

    for path in ["//api/orders/7", "/api//orders/7", "/api/orders/7/"] {
        let response = fixture
            .core
            .dispatch(request(Method::DELETE, path, Some(&bearer("viewer-1"))))
            .await;
        assert_eq!(response.status(), 403, "{}", path);
        assert!(response.data.is_none());
    }

    let response = fixture
        .core
        .dispatch(request(Method::DELETE, "//api//orders/7", Some(&bearer("admin-1"))))
        .await;
    assert_eq!(response.data, Some(json!({ "deleted": "7" })));
}

#[tokio::test]
async fn test_development_includes_details() {
    let fixture = fixture("jwt", "RBAC", RBAC_ACCESS, "development").await;
    ready(&fixture).await;

    let response = fixture
        .core
        .dispatch(request(Method::DELETE, "/api/orders/7", Some(&bearer("viewer-1"))))
        .await;
    assert_eq!(response.status(), 403);
    assert_eq!(response.message.as_deref(), Some("Forbidden"));
    assert!(response.details.unwrap().contains("viewer-1"));
}

#[tokio::test]
async fn test_missing_and_invalid_credentials() {
    let fixture = fixture("jwt", "RBAC", RBAC_ACCESS, "production").await;
    ready(&fixture).await;

    let response = fixture
        .core
        .dispatch(request(Method::GET, "/api/orders", None))
        .await;
    assert_eq!(response.status(), 401);
    assert_eq!(response.error_code.as_deref(), Some("AUTH-001"));
    assert_eq!(response.message.as_deref(), Some("Unauthorized"));

    let response = fixture
        .core
        .dispatch(request(Method::GET, "/api/orders", Some("Bearer not-a-token")))
        .await;
    assert_eq!(response.status(), 401);

    let response = fixture
        .core
        .dispatch(request(Method::GET, "/api/orders", Some(&bearer("ghost"))))
        .await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_unprotected_path_allowed() {
    let fixture = fixture("jwt", "RBAC", RBAC_ACCESS, "production").await;
    ready(&fixture).await;

    let response = fixture
        .core
        .dispatch(request(Method::GET, "/api/unprotected", Some(&bearer("viewer-1"))))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.message.as_deref(), Some("open"));

    // 公开路由不经过认证
    let response = fixture
        .core
        .dispatch(request(Method::GET, "/ping", None))
        .await;
    assert_eq!(response.status(), 200);
}

// ============================================================================
// API Key / Basic
// ============================================================================

#[tokio::test]
async fn test_api_key_header() {
    let fixture = fixture("apikey", "RBAC", RBAC_ACCESS, "production").await;
    ready(&fixture).await;

    let req = WebRequest::new(Method::DELETE, "/api/orders/9").with_header("X-API-Key", "admin-1");
    assert_eq!(fixture.core.dispatch(req).await.status(), 200);

    let req = WebRequest::new(Method::DELETE, "/api/orders/9")
        .with_header("Authorization", "APIKey viewer-1");
    assert_eq!(fixture.core.dispatch(req).await.status(), 403);

    let req = WebRequest::new(Method::GET, "/api/orders").with_header("X-API-Key", "nobody");
    assert_eq!(fixture.core.dispatch(req).await.status(), 401);
}

#[tokio::test]
async fn test_basic_auth() {
    let fixture = fixture("basic", "RBAC", RBAC_ACCESS, "production").await;
    ready(&fixture).await;

    let good = format!("Basic {}", STANDARD.encode("alice:wonderland"));
    let response = fixture
        .core
        .dispatch(request(Method::DELETE, "/api/orders/1", Some(&good)))
        .await;
    assert_eq!(response.status(), 200);

    let wrong = format!("Basic {}", STANDARD.encode("alice:guess"));
    let response = fixture
        .core
        .dispatch(request(Method::DELETE, "/api/orders/1", Some(&wrong)))
        .await;
    assert_eq!(response.status(), 401);
}

// ============================================================================
// ABAC
// ============================================================================

#[tokio::test]
async fn test_abac_without_evaluator_is_forbidden() {
    let fixture = fixture("apikey", "ABAC", ABAC_ACCESS, "production").await;
    ready(&fixture).await;

    let req = WebRequest::new(Method::GET, "/api/reports").with_header("X-API-Key", "auditor-1");
    let response = fixture.core.dispatch(req).await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_abac_with_evaluator() {
    let fixture = fixture("apikey", "ABAC", ABAC_ACCESS, "production").await;
    let evaluator = |user: &AbacUser, resource: &AbacResource| -> webcore::Result<bool> {
        Ok(user.policies.iter().any(|p| p.action == resource.action))
    };
    let core = fixture.core.with_policy_evaluator(Arc::new(evaluator));
    core.start().await.unwrap();
    core.initialize().await.unwrap();

    let req = WebRequest::new(Method::GET, "/api/reports").with_header("X-API-Key", "auditor-1");
    let response = core.dispatch(req).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.message.as_deref(), Some("report"));
    core.stop().await;
}

#[tokio::test]
async fn test_abac_user_against_rbac_resource_denied() {
    let user = UserAuthInfo::Abac(AbacUser {
        user_id: "auditor-1".to_string(),
        username: None,
        password: None,
        groups: vec![],
        policies: vec![],
    });
    let store = StaticAuthStore::new(ControlType::Rbac).with_resource(ResourceInfo::Rbac(
        RbacResource {
            action: "orders.list".to_string(),
            path: "/api/orders".to_string(),
            method: "GET".to_string(),
            permitted_roles: vec!["admin".to_string()],
        },
    ));
    let authorization = Authorization::new(Arc::new(store));

    let err = authorization.check(&user, "GET", "/api/orders").await.unwrap_err();
    assert!(matches!(err, CoreError::ControlTypeMismatch { .. }));
    assert_eq!(err.status_code(), 403);

    let admin = UserAuthInfo::Rbac(RbacUser {
        user_id: "admin-1".to_string(),
        username: None,
        password: None,
        groups: vec![],
        roles: vec!["admin".to_string()],
    });
    authorization.check(&admin, "GET", "/api/orders").await.unwrap();
}

// ============================================================================
// 装配错误
// ============================================================================

#[tokio::test]
async fn test_missing_access_file_fails_start() {
    let config = AppConfig::builder()
        .auth_type("jwt")
        .secret_key(SECRET)
        .access_file("/nonexistent/access.yaml")
        .build();
    let core = WebCore::new(config, Vec::<(String, Arc<dyn LibraryLoader>)>::new(), Vec::new())
        .await
        .unwrap();

    let err = core.start().await.unwrap_err();
    assert!(matches!(err, CoreError::ConfigLoadFailed(_)));
}

#[tokio::test]
async fn test_jwt_without_secret_fails_start() {
    let dir = TempDir::new().unwrap();
    let access_file = dir.path().join("access.yaml");
    tokio::fs::write(&access_file, RBAC_ACCESS).await.unwrap();

    let config = AppConfig::builder()
        .auth_type("jwt")
        .secret_key("")
        .access_file(&access_file)
        .build();
    let core = WebCore::new(config, Vec::<(String, Arc<dyn LibraryLoader>)>::new(), Vec::new())
        .await
        .unwrap();

    let err = core.start().await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfigValue { ref key, .. } if key == "auth.secret_key"));
}
