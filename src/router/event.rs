//! 事件数据结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::generate_uuid;

/// 事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识
    pub event_id: String,

    /// 事件类型（格式: category.name，如 module.initialized）
    pub event_type: String,

    /// 发送方
    pub sender: String,

    #[serde(default)]
    pub data: Value,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, sender: impl Into<String>, data: Value) -> Self {
        Self {
            event_id: generate_uuid(),
            event_type: event_type.into(),
            sender: sender.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// 事件类型是否匹配订阅模式
///
/// 支持 `*`（全部）与 `prefix.*`（前缀之下的所有事件，不含前缀本身）。
pub fn matches_pattern(pattern: &str, event_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => event_type
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with('.') && rest.len() > 1),
        None => pattern == event_type,
    }
}

/// 内置事件类型
pub mod lifecycle_events {
    /// 模块注册完成
    pub const MODULE_REGISTERED: &str = "module.registered";
    /// 模块初始化完成
    pub const MODULE_INITIALIZED: &str = "module.initialized";
    /// 模块被卸载
    pub const MODULE_UNLOADED: &str = "module.unloaded";
    /// 模块销毁
    pub const MODULE_DESTROYED: &str = "module.destroyed";
    /// 应用启动完成
    pub const APP_STARTED: &str = "app.started";
    /// 应用停止
    pub const APP_STOPPED: &str = "app.stopped";
}
