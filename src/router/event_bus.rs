//! 事件总线
//!
//! 应用内的发布-订阅通道。模块生命周期事件通过它广播，
//! 模块之间也可以借此松耦合地通信。
//!
//! - 单个订阅者 panic 或超时不影响其他订阅者
//! - `publish` 异步分发不等待，`publish_sync` 等待全部订阅者并返回统计
//!
//! # 使用示例
//!
//! ```ignore
//! use webcore::router::{Event, EventBus};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let id = bus
//!     .subscribe("audit", "module.*", Arc::new(|event| println!("{}", event.event_type)))
//!     .await?;
//! bus.publish(Event::new("module.initialized", "core", serde_json::json!({}))).await?;
//! bus.unsubscribe(&id).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::event::{matches_pattern, Event};
use crate::utils::{generate_id, CoreError, Result};

/// 默认订阅者处理超时时间（秒）
const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 5;

/// 事件回调
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Clone)]
struct SubscriptionEntry {
    subscription_id: String,
    subscriber_id: String,
    pattern: String,
    callback: EventCallback,
}

/// 分发统计
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub total_dispatched: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// 单次同步发布的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub successful: usize,
    pub failed: usize,
    pub timeouts: usize,
}

#[derive(Debug)]
enum DispatchResult {
    Success,
    Failed(String),
    Timeout,
}

/// 事件总线
#[derive(Clone)]
pub struct EventBus {
    /// 订阅 ID -> 订阅
    subscriptions: Arc<RwLock<HashMap<String, SubscriptionEntry>>>,
    stats: Arc<RwLock<DispatchStats>>,
    handler_timeout: Duration,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_HANDLER_TIMEOUT_SECS))
    }

    /// 指定订阅者处理超时
    pub fn with_timeout(handler_timeout: Duration) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(DispatchStats::default())),
            handler_timeout,
        }
    }

    /// 订阅事件，返回订阅 ID
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        pattern: impl Into<String>,
        callback: EventCallback,
    ) -> Result<String> {
        let entry = SubscriptionEntry {
            subscription_id: generate_id(),
            subscriber_id: subscriber_id.into(),
            pattern: pattern.into(),
            callback,
        };
        let subscription_id = entry.subscription_id.clone();

        info!(
            subscription_id = %subscription_id,
            subscriber_id = %entry.subscriber_id,
            pattern = %entry.pattern,
            "事件订阅成功"
        );
        self.subscriptions
            .write()
            .await
            .insert(subscription_id.clone(), entry);
        Ok(subscription_id)
    }

    /// 取消订阅
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let removed = self.subscriptions.write().await.remove(subscription_id);
        match removed {
            Some(entry) => {
                debug!(
                    subscription_id,
                    subscriber_id = %entry.subscriber_id,
                    "取消订阅"
                );
                Ok(())
            }
            None => Err(CoreError::SubscriptionNotFound(subscription_id.to_string())),
        }
    }

    /// 取消订阅者的全部订阅，返回取消数量
    pub async fn unsubscribe_all(&self, subscriber_id: &str) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|_, entry| entry.subscriber_id != subscriber_id);
        before - subscriptions.len()
    }

    /// 异步发布，返回匹配的订阅者数量
    pub async fn publish(&self, event: Event) -> Result<usize> {
        trace!(event_id = %event.event_id, event_type = %event.event_type, "发布事件");

        let matching = self.find_matching(&event).await;
        let count = matching.len();

        for entry in matching {
            let event = event.clone();
            let stats = Arc::clone(&self.stats);
            let handler_timeout = self.handler_timeout;

            tokio::spawn(async move {
                let result = invoke_with_timeout(entry.callback, event, handler_timeout).await;
                log_result(&entry.subscription_id, &result);
                record(&stats, &[result]).await;
            });
        }
        Ok(count)
    }

    /// 同步发布，等待全部订阅者处理完成
    pub async fn publish_sync(&self, event: Event) -> Result<PublishReport> {
        let matching = self.find_matching(&event).await;
        if matching.is_empty() {
            debug!(event_type = %event.event_type, "没有匹配的订阅者");
            return Ok(PublishReport::default());
        }

        let handler_timeout = self.handler_timeout;
        let tasks: Vec<_> = matching
            .into_iter()
            .map(|entry| {
                let event = event.clone();
                tokio::spawn(async move {
                    let result = invoke_with_timeout(entry.callback, event, handler_timeout).await;
                    log_result(&entry.subscription_id, &result);
                    result
                })
            })
            .collect();

        let results: Vec<DispatchResult> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap_or_else(|e| DispatchResult::Failed(format!("任务执行失败: {}", e))))
            .collect();

        let report = PublishReport {
            successful: results.iter().filter(|r| matches!(r, DispatchResult::Success)).count(),
            failed: results.iter().filter(|r| matches!(r, DispatchResult::Failed(_))).count(),
            timeouts: results.iter().filter(|r| matches!(r, DispatchResult::Timeout)).count(),
        };
        record(&self.stats, &results).await;
        Ok(report)
    }

    async fn find_matching(&self, event: &Event) -> Vec<SubscriptionEntry> {
        self.subscriptions
            .read()
            .await
            .values()
            .filter(|entry| matches_pattern(&entry.pattern, &event.event_type))
            .cloned()
            .collect()
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// 是否有订阅者会收到该类型的事件
    pub async fn has_subscribers(&self, event_type: &str) -> bool {
        self.subscriptions
            .read()
            .await
            .values()
            .any(|entry| matches_pattern(&entry.pattern, event_type))
    }

    pub async fn stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }
}

/// 同步回调放到阻塞线程池执行，超时后不再等待其结果
async fn invoke_with_timeout(
    callback: EventCallback,
    event: Event,
    handler_timeout: Duration,
) -> DispatchResult {
    let task = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || callback(event)))
    });

    match timeout(handler_timeout, task).await {
        Ok(Ok(Ok(()))) => DispatchResult::Success,
        Ok(Ok(Err(_))) => DispatchResult::Failed("回调函数 panic".to_string()),
        Ok(Err(e)) => DispatchResult::Failed(format!("任务执行失败: {}", e)),
        Err(_) => DispatchResult::Timeout,
    }
}

fn log_result(subscription_id: &str, result: &DispatchResult) {
    match result {
        DispatchResult::Success => trace!(subscription_id, "事件处理成功"),
        DispatchResult::Failed(e) => warn!(subscription_id, error = %e, "事件处理失败"),
        DispatchResult::Timeout => warn!(subscription_id, "事件处理超时"),
    }
}

async fn record(stats: &RwLock<DispatchStats>, results: &[DispatchResult]) {
    let mut stats = stats.write().await;
    for result in results {
        stats.total_dispatched += 1;
        match result {
            DispatchResult::Success => stats.successful += 1,
            DispatchResult::Failed(_) => stats.failed += 1,
            DispatchResult::Timeout => stats.timeouts += 1,
        }
    }
    stats.last_dispatch_at = Some(Utc::now());
}
