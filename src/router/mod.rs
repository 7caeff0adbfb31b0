//! Web 层与事件系统
//!
//! - 请求/响应与路由处理器
//! - 路由表、限流与 HTTP 服务
//! - 事件与事件总线

pub mod event;
pub mod event_bus;
pub mod rate_limit;
pub mod request;
pub mod route_table;
pub mod server;

pub use event::{lifecycle_events, matches_pattern, Event};
pub use event_bus::{DispatchStats, EventBus, EventCallback, PublishReport};
pub use rate_limit::{client_id, RateDecision, RateLimiter};
pub use request::{handler_fn, normalize_path, ApiResponse, RouteHandler, WebRequest};
pub use route_table::{join_path, static_handler, RouteInfo, RouteTable, BUILTIN_MODULE};
pub use server::{serve, serve_with_shutdown};
