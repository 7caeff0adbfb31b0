//! 工具模块
//!
//! 包含错误类型、ID 生成和日志系统。

pub mod error;
pub mod id;
pub mod logger;

pub use error::{error_code, status_code, CoreError, Result};
pub use id::{generate_id, generate_uuid};
pub use logger::{LogGuard, Logger, LoggerConfig, RotationStrategy};
