//! HTTP 服务
//!
//! 把 [`RouteTable`] 挂到 axum 监听器上：所有请求进入同一个回退处理器，
//! 转换为 [`WebRequest`] 后由路由表分发，响应信封以 JSON 返回。

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use super::request::{ApiResponse, WebRequest};
use super::route_table::RouteTable;
use crate::utils::{CoreError, Result};

/// 请求体上限
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// 启动服务，收到 Ctrl+C 后优雅退出
pub async fn serve(table: Arc<RouteTable>, addr: &str) -> Result<()> {
    serve_with_shutdown(table, addr, shutdown_signal()).await
}

/// 启动服务，`signal` 完成时优雅退出
pub async fn serve_with_shutdown<F>(table: Arc<RouteTable>, addr: &str, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP 服务已启动");

    axum::serve(
        listener,
        app(table).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
        .await?;

    info!("HTTP 服务已停止");
    Ok(())
}

/// 构建 axum 应用
pub fn app(table: Arc<RouteTable>) -> axum::Router {
    axum::Router::new().fallback(handle).with_state(table)
}

async fn handle(State(table): State<Arc<RouteTable>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    // 未经 `serve` 挂载（如直接调用 `app`）时没有连接信息
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = CoreError::InvalidRequest(format!("请求体读取失败: {}", e));
            return into_http(ApiResponse::from_error(&err, false));
        }
    };

    let mut req = WebRequest::new(parts.method, &uri)
        .with_headers(parts.headers)
        .with_body(body.to_vec());
    if let Some(ip) = peer {
        req = req.with_client_ip(ip);
    }
    into_http(table.dispatch(req).await)
}

fn into_http(mut response: ApiResponse) -> Response {
    let status = StatusCode::from_u16(response.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = std::mem::take(&mut response.headers);
    let mut http = (status, Json(response)).into_response();
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "响应头不合法，已忽略"),
        }
    }
    http
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "无法监听 Ctrl+C 信号");
        std::future::pending::<()>().await;
    }
    info!("收到退出信号");
}
