//! Web 请求与响应
//!
//! [`WebRequest`] 是与具体 HTTP 框架无关的请求表示，认证链与模块路由只依赖它；
//! [`ApiResponse`] 是统一的响应信封。

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::net::IpAddr;
use std::future::Future;
use std::sync::Arc;

use crate::auth::UserAuthInfo;
use crate::utils::{generate_uuid, status_code, CoreError, Result};

// ==================== WebRequest ====================

/// Web 请求
#[derive(Debug, Clone)]
pub struct WebRequest {
    /// 请求唯一标识（UUID v4）
    pub request_id: String,
    pub method: Method,
    /// 不含查询串的路径
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    /// 路由匹配出的路径参数
    pub params: HashMap<String, String>,
    pub body: Vec<u8>,
    /// 认证通过后的用户
    pub user: Option<Arc<UserAuthInfo>>,
    /// 对端地址，由 HTTP 服务从连接信息填入
    pub client_ip: Option<IpAddr>,
}

impl WebRequest {
    /// 由方法与 URI（可带查询串）创建
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (uri, HashMap::new()),
        };
        Self {
            request_id: generate_uuid(),
            method,
            path: normalize_path(path),
            query,
            headers: HeaderMap::new(),
            params: HashMap::new(),
            body: Vec::new(),
            user: None,
            client_ip: None,
        }
    }

    /// 添加请求头，名称或值不合法时忽略
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// 请求头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// 把请求体解析为 JSON，失败时返回 400
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| CoreError::InvalidRequest(e.to_string()))
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// 合并空段：`//api//orders/7/` 与 `/api/orders/7` 是同一路径
///
/// 路由匹配与授权都读取 `WebRequest::path`，两者必须看到同一个字符串。
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

// ==================== ApiResponse ====================

/// 统一响应信封
///
/// 成功时只携带 `data` / `message`；失败时携带错误码与错误名，
/// 开发环境下额外附带错误链（`stack`）与详情（`details`）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub http_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, rename = "stack", skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// 额外的 HTTP 响应头，不进入响应体
    #[serde(skip)]
    pub headers: Vec<(String, String)>,
}

impl ApiResponse {
    /// 成功响应
    pub fn success(data: Value) -> Self {
        Self {
            http_code: status_code::OK,
            data: Some(data),
            ..Default::default()
        }
    }

    /// 仅带消息的成功响应
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            http_code: status_code::OK,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// 错误响应
    pub fn error(
        http_code: u16,
        error_code: impl Into<String>,
        error_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            http_code,
            error_code: Some(error_code.into()),
            error_name: Some(error_name.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// 由错误生成响应
    ///
    /// 认证授权失败对外只给出通用消息，具体原因只在开发环境的 `details` 中出现。
    pub fn from_error(err: &CoreError, development: bool) -> Self {
        let message = match err.status_code() {
            status_code::UNAUTHORIZED => "Unauthorized".to_string(),
            status_code::FORBIDDEN => "Forbidden".to_string(),
            _ => err.to_string(),
        };
        let mut response = Self::error(err.status_code(), err.error_code(), err.error_name(), message);

        if development {
            response.details = Some(err.to_string());
            let mut source = err.source();
            while let Some(cause) = source {
                response.stack.push(cause.to_string());
                source = cause.source();
            }
        }
        response
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// HTTP 状态码
    pub fn status(&self) -> u16 {
        if self.http_code == 0 {
            status_code::OK
        } else {
            self.http_code
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status())
    }
}

// ==================== RouteHandler ====================

/// 路由处理器
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, req: WebRequest) -> Result<ApiResponse>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(WebRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ApiResponse>> + Send,
{
    async fn handle(&self, req: WebRequest) -> Result<ApiResponse> {
        (self.0)(req).await
    }
}

/// 把异步闭包包装为路由处理器
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(WebRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
