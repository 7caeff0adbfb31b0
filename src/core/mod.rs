//! 核心组件
//!
//! 应用配置与运行时上下文。

pub mod config;
pub mod context;

pub use config::{
    AppConfig, AppConfigBuilder, AppSection, AuthConfig, Configurable, DatabaseConfig,
    FeaturesConfig, KafkaConfig, LoggingConfig, ModuleConfig, PubSubConfig, RateLimitConfig,
    RedisConfig, ServerConfig,
};
pub use context::{loader_category, AppContext};
