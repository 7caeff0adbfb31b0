//! 路由表
//!
//! 按方法与路径模式匹配请求，模式按 `/` 分段：
//!
//! - 静态段：逐字匹配
//! - `:name`：匹配任意单段，写入 `params["name"]`
//! - 结尾的 `*`：匹配剩余全部路径（可为空），写入 `params["*"]`
//!
//! 多条路由同时匹配时，静态段多者优先，其次是先注册者。
//! `Api` 分组的路由挂在 `server.path` 前缀下，分发前经过认证守卫。
//! 启用 `app.rate_limit` 时，所有请求在查找路由之前先经过限流。

use http::Method;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::rate_limit::{client_id, RateLimiter};
use super::request::{handler_fn, ApiResponse, RouteHandler, WebRequest};
use crate::auth::AuthGuard;
use crate::core::config::AppConfig;
use crate::module::{ModuleRoute, RouterGroup};
use crate::utils::CoreError;

/// 内置路由所属的模块名
pub const BUILTIN_MODULE: &str = "core";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard,
}

fn parse_segments(path: &str) -> Vec<Segment> {
    let parts: Vec<&str> = split_path(path).collect();
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| match *part {
            "*" if i == last => Segment::Wildcard,
            p if p.starts_with(':') && p.len() > 1 => Segment::Param(p[1..].to_string()),
            p => Segment::Static(p.to_string()),
        })
        .collect()
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// 拼接路径前缀，结果总以 `/` 开头且不含重复的 `/`
pub fn join_path(prefix: &str, path: &str) -> String {
    let joined: Vec<&str> = split_path(prefix).chain(split_path(path)).collect();
    format!("/{}", joined.join("/"))
}

struct RouteEntry {
    module: String,
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    group: RouterGroup,
    handler: Arc<dyn RouteHandler>,
}

impl RouteEntry {
    /// 匹配成功时返回 (静态段数, 路径参数)
    fn matches(&self, method: &Method, path: &str) -> Option<(usize, HashMap<String, String>)> {
        if self.method != *method {
            return None;
        }

        let parts: Vec<&str> = split_path(path).collect();
        let mut params = HashMap::new();
        let mut statics = 0;

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard => {
                    params.insert("*".to_string(), parts.get(i..).unwrap_or(&[]).join("/"));
                    return Some((statics, params));
                }
                Segment::Static(s) => {
                    if parts.get(i) != Some(&s.as_str()) {
                        return None;
                    }
                    statics += 1;
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), (*value).to_string());
                }
            }
        }

        (parts.len() == self.segments.len()).then_some((statics, params))
    }
}

/// 路由列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub module: String,
    pub method: String,
    pub path: String,
    pub group: RouterGroup,
}

/// 路由表
pub struct RouteTable {
    routes: RwLock<Vec<RouteEntry>>,
    path_prefix: String,
    development: bool,
    guard: RwLock<Option<Arc<AuthGuard>>>,
    limiter: Option<RateLimiter>,
}

impl RouteTable {
    /// 创建路由表并注册 `/health` 与 `/info`
    pub fn new(config: &AppConfig) -> Self {
        let info = json!({
            "name": config.app.name,
            "version": config.app.version,
            "environment": config.app.environment,
        });

        let builtin = vec![
            ModuleRoute::public(
                Method::GET,
                "/health",
                handler_fn(|_req| async { Ok(ApiResponse::success(json!({ "status": "ok" }))) }),
            ),
            ModuleRoute::public(
                Method::GET,
                "/info",
                handler_fn(move |_req| {
                    let info = info.clone();
                    async move { Ok(ApiResponse::success(info)) }
                }),
            ),
        ];

        let path_prefix = config.server.path_prefix.clone();
        let routes = builtin
            .into_iter()
            .map(|route| entry(&path_prefix, BUILTIN_MODULE, route))
            .collect();

        Self {
            routes: RwLock::new(routes),
            path_prefix,
            development: config.is_development(),
            guard: RwLock::new(None),
            limiter: RateLimiter::from_config(&config.app.rate_limit),
        }
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// 添加模块路由，同方法同模式的路由会被替换
    pub async fn add(&self, module: &str, route: ModuleRoute) {
        let entry = entry(&self.path_prefix, module, route);
        let mut routes = self.routes.write().await;

        if let Some(existing) = routes
            .iter_mut()
            .find(|r| r.method == entry.method && r.segments == entry.segments)
        {
            warn!(
                method = %entry.method,
                path = %entry.pattern,
                previous = %existing.module,
                module,
                "路由已存在，将被替换"
            );
            *existing = entry;
            return;
        }

        debug!(method = %entry.method, path = %entry.pattern, module, "注册路由");
        routes.push(entry);
    }

    /// 批量添加 (模块名, 路由)
    pub async fn add_all(&self, routes: impl IntoIterator<Item = (String, ModuleRoute)>) -> usize {
        let mut count = 0;
        for (module, route) in routes {
            self.add(&module, route).await;
            count += 1;
        }
        info!(count, "模块路由已安装");
        count
    }

    /// 移除模块的全部路由，返回移除数量
    pub async fn remove_module(&self, module: &str) -> usize {
        let mut routes = self.routes.write().await;
        let before = routes.len();
        routes.retain(|r| r.module != module);
        before - routes.len()
    }

    /// 设置认证守卫，`None` 表示 API 路由不做认证
    pub async fn set_guard(&self, guard: Option<Arc<AuthGuard>>) {
        *self.guard.write().await = guard;
    }

    pub async fn has_guard(&self) -> bool {
        self.guard.read().await.is_some()
    }

    /// 查找路由，返回处理器、分组与路径参数
    async fn find(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<dyn RouteHandler>, RouterGroup, HashMap<String, String>)> {
        let routes = self.routes.read().await;
        let mut best: Option<(usize, &RouteEntry, HashMap<String, String>)> = None;

        for route in routes.iter() {
            if let Some((score, params)) = route.matches(method, path) {
                if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
                    best = Some((score, route, params));
                }
            }
        }

        best.map(|(_, route, params)| (Arc::clone(&route.handler), route.group, params))
    }

    /// 是否存在匹配的路由
    pub async fn contains(&self, method: &Method, path: &str) -> bool {
        self.find(method, path).await.is_some()
    }

    /// 分发请求
    ///
    /// 超出限流时返回 429 信封；未匹配时返回 404 信封；
    /// `Api` 路由先经过认证守卫，拒绝时返回 401/403 信封。
    /// 启用限流时每个响应都带 `X-RateLimit-*` 头。
    pub async fn dispatch(&self, req: WebRequest) -> ApiResponse {
        let Some(limiter) = &self.limiter else {
            return self.route(req).await;
        };

        let client = client_id(&req);
        let decision = limiter.check(&client).await;
        if !decision.allowed {
            warn!(
                request_id = %req.request_id,
                path = %req.path,
                limit = decision.limit,
                "请求超出限流"
            );
            let err = CoreError::RateLimited {
                limit: decision.limit,
                reset_at: decision.reset_rfc3339(),
            };
            return decision.apply(self.error_response(&err));
        }
        decision.apply(self.route(req).await)
    }

    async fn route(&self, mut req: WebRequest) -> ApiResponse {
        let Some((handler, group, params)) = self.find(&req.method, &req.path).await else {
            debug!(method = %req.method, path = %req.path, "路由未找到");
            return self.error_response(&CoreError::RouteNotFound {
                method: req.method.to_string(),
                path: req.path.clone(),
            });
        };
        req.params = params;

        if group == RouterGroup::Api {
            let guard = self.guard.read().await.clone();
            if let Some(guard) = guard {
                if let Err(e) = guard.check(&mut req).await {
                    warn!(
                        request_id = %req.request_id,
                        path = %req.path,
                        error_code = e.error_code(),
                        error = %e,
                        "请求被拒绝"
                    );
                    return self.error_response(&e);
                }
            }
        }

        let request_id = req.request_id.clone();
        match handler.handle(req).await {
            Ok(response) => response,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "请求处理失败");
                self.error_response(&e)
            }
        }
    }

    fn error_response(&self, err: &CoreError) -> ApiResponse {
        ApiResponse::from_error(err, self.development)
    }

    /// 路由列表，按注册顺序
    pub async fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .read()
            .await
            .iter()
            .map(|r| RouteInfo {
                module: r.module.clone(),
                method: r.method.to_string(),
                path: r.pattern.clone(),
                group: r.group,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("path_prefix", &self.path_prefix)
            .field("development", &self.development)
            .finish()
    }
}

fn entry(path_prefix: &str, module: &str, route: ModuleRoute) -> RouteEntry {
    let pattern = match route.group {
        RouterGroup::Api => join_path(path_prefix, &route.path),
        RouterGroup::Public => join_path("", &route.path),
    };
    RouteEntry {
        module: module.to_string(),
        method: route.method,
        segments: parse_segments(&pattern),
        pattern,
        group: route.group,
        handler: route.handler,
    }
}

/// 返回固定 JSON 的处理器，便于测试与简单路由
pub fn static_handler(data: serde_json::Value) -> Arc<dyn RouteHandler> {
    handler_fn(move |_req| {
        let data = data.clone();
        async move { Ok::<_, CoreError>(ApiResponse::success(data)) }
    })
}
