//! 日志初始化
//!
//! 由 `app.logging` 配置段安装全局 tracing 订阅者：
//! 控制台始终输出，配置了 `log_dir` 时追加按时间轮转的文件输出，
//! `RUST_LOG` 存在时优先于配置中的级别。
//!
//! ```rust,no_run
//! use webcore::{AppConfig, Logger, LoggerConfig};
//!
//! let config = AppConfig::default();
//! let _guard = Logger::init(LoggerConfig::from_logging_config(&config.app.logging))
//!     .expect("logger");
//! tracing::info!(module = "orders", "模块已加载");
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::core::config::LoggingConfig;
use crate::utils::{CoreError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// 日志文件轮转周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    Never,
    Hourly,
    #[default]
    Daily,
}

impl RotationStrategy {
    /// 无法识别的取值按天轮转
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "never" | "none" => Self::Never,
            "hourly" => Self::Hourly,
            _ => Self::Daily,
        }
    }

    fn rotation(self) -> Rotation {
        match self {
            Self::Never => Rotation::NEVER,
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
        }
    }
}

/// 订阅者参数
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub level: String,
    pub json_format: bool,
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
    pub rotation: RotationStrategy,
    /// 追加的过滤指令，逗号分隔，如 `webcore::auth=debug,axum=warn`
    pub directives: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::from_logging_config(&LoggingConfig::default())
    }
}

impl LoggerConfig {
    pub fn from_logging_config(logging: &LoggingConfig) -> Self {
        Self {
            level: logging.level.clone(),
            json_format: logging.json_format,
            log_dir: logging.log_dir.clone(),
            file_name: "webcore.log".to_string(),
            rotation: RotationStrategy::parse(&logging.rotation),
            directives: None,
        }
    }

    /// 命令行指定的级别覆盖配置文件
    pub fn with_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let extra = self.directives.as_deref().unwrap_or_default();
        for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let parsed = directive.parse().map_err(|e| CoreError::InvalidConfigValue {
                key: "app.logging.directives".to_string(),
                reason: format!("{}: {}", directive, e),
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// 持有非阻塞写入线程，丢弃时刷新剩余日志
#[derive(Default)]
pub struct LogGuard {
    _workers: Vec<WorkerGuard>,
}

pub struct Logger;

impl Logger {
    /// 安装全局订阅者，进程内只能成功一次
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(CoreError::Internal("日志系统已初始化".to_string()));
        }

        let filter = match config.filter() {
            Ok(filter) => filter,
            Err(e) => {
                INSTALLED.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let mut guard = LogGuard::default();
        let mut layers: Vec<BoxedLayer> = Vec::new();

        let (stdout, worker) = tracing_appender::non_blocking(std::io::stdout());
        guard._workers.push(worker);
        layers.push(output_layer(stdout, config.json_format, true));

        if let Some(dir) = &config.log_dir {
            let appender =
                RollingFileAppender::new(config.rotation.rotation(), dir, &config.file_name);
            let (file, worker) = tracing_appender::non_blocking(appender);
            guard._workers.push(worker);
            layers.push(output_layer(file, config.json_format, false));
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| CoreError::Internal(format!("日志系统初始化失败: {}", e)))?;
        Ok(guard)
    }
}

fn output_layer(
    writer: tracing_appender::non_blocking::NonBlocking,
    json: bool,
    ansi: bool,
) -> BoxedLayer {
    if json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_writer(writer).with_ansi(ansi).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_parse() {
        assert_eq!(RotationStrategy::parse("HOURLY"), RotationStrategy::Hourly);
        assert_eq!(RotationStrategy::parse("none"), RotationStrategy::Never);
        assert_eq!(RotationStrategy::parse("weekly"), RotationStrategy::Daily);
    }

    #[test]
    fn test_from_logging_config() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            json_format: true,
            log_dir: Some(PathBuf::from("/var/log/webcore")),
            rotation: "hourly".to_string(),
        };
        let config = LoggerConfig::from_logging_config(&logging).with_level(Some("debug".into()));
        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert_eq!(config.rotation, RotationStrategy::Hourly);
        assert_eq!(config.log_dir, logging.log_dir);

        let config = LoggerConfig::from_logging_config(&logging).with_level(None);
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn test_invalid_directive_rejected() {
        let config = LoggerConfig {
            directives: Some("webcore=notalevel[".to_string()),
            ..Default::default()
        };
        assert!(config.filter().is_err());
    }
}
