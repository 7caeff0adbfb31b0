//! 固定窗口限流
//!
//! 每个客户端在一个窗口内最多放行 `max` 个请求，窗口从该客户端的首个请求开始计时。
//! 客户端标识依次取 `X-API-Key`、Bearer 令牌、来源 IP。

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::request::{ApiResponse, WebRequest};
use crate::core::config::RateLimitConfig;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// 客户端表超过该大小时清理已过期的窗口
const SWEEP_THRESHOLD: usize = 10_000;

/// 没有任何标识的请求共用的客户端键
const UNKNOWN_CLIENT: &str = "unknown";

/// 一次限流判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    pub fn reset_rfc3339(&self) -> String {
        self.reset_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// 把 `X-RateLimit-*` 头写入响应
    pub fn apply(&self, response: ApiResponse) -> ApiResponse {
        response
            .with_header(HEADER_LIMIT, self.limit.to_string())
            .with_header(HEADER_REMAINING, self.remaining.to_string())
            .with_header(HEADER_RESET, self.reset_rfc3339())
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u64,
}

/// 按客户端计数的固定窗口限流器
#[derive(Debug)]
pub struct RateLimiter {
    limit: u64,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u64, window: Duration) -> Self {
        debug!(limit, window_secs = window.as_secs(), "创建限流器");
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// 配置未启用时返回 `None`
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max, Duration::from_secs(config.window_secs)))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// 记录一次请求并给出判定
    pub async fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now()).await
    }

    async fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        // limit 为 0 时拒绝一切请求
        if self.limit == 0 {
            return self.decision(false, 0, self.window);
        }

        let mut clients = self.clients.lock().await;
        if clients.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.saturating_duration_since(w.started) <= window);
        }

        let window = clients.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(window.started) > self.window {
            window.started = now;
            window.count = 0;
        }

        let until_reset = (window.started + self.window).saturating_duration_since(now);
        if window.count >= self.limit {
            return self.decision(false, 0, until_reset);
        }
        window.count += 1;
        self.decision(true, self.limit - window.count, until_reset)
    }

    fn decision(&self, allowed: bool, remaining: u64, until_reset: Duration) -> RateDecision {
        let offset = chrono::Duration::from_std(until_reset).unwrap_or_else(|_| chrono::Duration::zero());
        RateDecision {
            allowed,
            limit: self.limit,
            remaining,
            reset_at: Utc::now() + offset,
        }
    }

    /// 当前跟踪的客户端数
    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// 请求的客户端标识
pub fn client_id(req: &WebRequest) -> String {
    if let Some(key) = req.header("X-API-Key").filter(|k| !k.is_empty()) {
        return key.to_string();
    }
    if let Some(token) = req
        .header("Authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
    {
        return token.to_string();
    }
    req.client_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
