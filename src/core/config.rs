//! 应用配置
//!
//! 定义应用配置的各个领域（app / server / auth / database / redis / kafka / pubsub），
//! 以及 `Configurable` 接口：可配置对象声明自身的默认值与环境变量绑定，
//! 由 `apply_env` 统一把环境变量写回到配置树上。

use crate::utils::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ==================== Configurable ====================

/// 可配置对象
///
/// 键使用点分路径（例如 `server.port`），与序列化后的字段结构一一对应。
pub trait Configurable: Send + Sync {
    /// 默认值表：配置键 → 默认值
    fn defaults(&self) -> BTreeMap<String, Value>;

    /// 环境变量绑定表：配置键 → 环境变量名
    fn env_bindings(&self) -> BTreeMap<String, String>;

    /// 使用进程环境变量覆盖已绑定的配置键
    fn apply_env(&mut self) -> Result<()>
    where
        Self: Serialize + DeserializeOwned + Sized,
    {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// 使用给定的查找函数覆盖已绑定的配置键
    ///
    /// 环境变量的字符串值按照目标字段当前的类型转换：
    /// 数字、布尔值按字面解析，数组按逗号拆分。
    fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        Self: Serialize + DeserializeOwned + Sized,
        F: Fn(&str) -> Option<String>,
    {
        let mut tree = serde_json::to_value(&*self)?;
        let mut applied = 0usize;

        for (key, env_name) in self.env_bindings() {
            let Some(raw) = lookup(&env_name) else {
                continue;
            };
            let current = get_path(&tree, &key).cloned().unwrap_or(Value::Null);
            let value = coerce_env_value(&key, &raw, &current)?;
            set_path(&mut tree, &key, value);
            debug!(key = %key, env = %env_name, "配置键被环境变量覆盖");
            applied += 1;
        }

        if applied > 0 {
            *self = serde_json::from_value(tree).map_err(|e| CoreError::ConfigLoadFailed(
                format!("环境变量覆盖后配置无效: {}", e),
            ))?;
        }
        Ok(())
    }

    /// 将默认值表写入当前值为空的配置键
    fn fill_defaults(&mut self) -> Result<()>
    where
        Self: Serialize + DeserializeOwned + Sized,
    {
        let mut tree = serde_json::to_value(&*self)?;
        for (key, default) in self.defaults() {
            let missing = match get_path(&tree, &key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                _ => false,
            };
            if missing {
                set_path(&mut tree, &key, default);
            }
        }
        *self = serde_json::from_value(tree)?;
        Ok(())
    }
}

fn get_path<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(tree, |node, part| node.get(part))
}

fn set_path(tree: &mut Value, key: &str, value: Value) {
    if !tree.is_object() {
        *tree = Value::Object(Default::default());
    }
    let Value::Object(map) = tree else {
        return;
    };
    match key.split_once('.') {
        Some((head, rest)) => {
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            set_path(child, rest, value);
        }
        None => {
            map.insert(key.to_string(), value);
        }
    }
}

fn coerce_env_value(key: &str, raw: &str, current: &Value) -> Result<Value> {
    let invalid = |reason: &str| CoreError::InvalidConfigValue {
        key: key.to_string(),
        reason: format!("{} ('{}')", reason, raw),
    };

    let value = match current {
        Value::Bool(_) => Value::Bool(raw.trim().parse().map_err(|_| invalid("需要布尔值"))?),
        Value::Number(n) if n.is_f64() => {
            json!(raw.trim().parse::<f64>().map_err(|_| invalid("需要数字"))?)
        }
        Value::Number(_) => json!(raw.trim().parse::<i64>().map_err(|_| invalid("需要整数"))?),
        Value::Array(_) => Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    };
    Ok(value)
}

// ==================== app ====================

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志文件目录，为空时只输出到控制台
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// 模块管理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// 禁用的模块名列表
    #[serde(default)]
    pub disabled: Vec<String>,

    /// 模块来源目录
    #[serde(default = "default_module_base_path")]
    pub base_path: String,
}

fn default_module_base_path() -> String {
    "./libs".to_string()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            base_path: default_module_base_path(),
        }
    }
}

/// 功能开关
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub recovery: bool,
    #[serde(default)]
    pub metrics: bool,
    #[serde(default)]
    pub tracing: bool,
    #[serde(default)]
    pub profiling: bool,
}

/// 按客户端的固定窗口限流
///
/// 客户端依次按 `X-API-Key`、Bearer 令牌、来源 IP 区分。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    /// 每个窗口允许的请求数，0 表示拒绝所有请求
    #[serde(default = "default_rate_limit_max")]
    pub max: u64,
    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
}

fn default_rate_limit_max() -> u64 {
    1000
}

fn default_rate_limit_window() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max: default_rate_limit_max(),
            window_secs: default_rate_limit_window(),
        }
    }
}

/// 应用基础信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    /// 应用名称
    #[serde(default = "default_app_name")]
    pub name: String,

    /// 应用版本
    #[serde(default = "default_app_version")]
    pub version: String,

    /// 运行环境：development / production
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub module: ModuleConfig,

    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_app_name() -> String {
    "webcore".to_string()
}

fn default_app_version() -> String {
    "1.0.0".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            module: ModuleConfig::default(),
            features: FeaturesConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

// ==================== server ====================

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// API 路由组的挂载前缀
    #[serde(default = "default_path_prefix", rename = "path")]
    pub path_prefix: String,

    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7272
}

fn default_path_prefix() -> String {
    "/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path_prefix: default_path_prefix(),
            read_timeout_secs: default_timeout_secs(),
            write_timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// 监听地址 `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ==================== auth ====================

/// 认证授权配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 访问控制类型：RBAC / ABAC
    #[serde(default = "default_control")]
    pub control: String,

    /// 用户与资源存储：yaml
    #[serde(default = "default_store")]
    pub store: String,

    /// 凭证类型：jwt / apikey / basic / none
    #[serde(default = "default_auth_type", rename = "type")]
    pub auth_type: String,

    /// JWT 签名密钥
    #[serde(default)]
    pub secret_key: String,

    /// 令牌有效期（秒）
    #[serde(default = "default_expires_in")]
    pub expires_in_secs: u64,

    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    #[serde(default)]
    pub api_key_prefix: String,

    /// 用户与资源文件路径（yaml 存储使用）
    #[serde(default = "default_access_file")]
    pub access_file: PathBuf,
}

fn default_control() -> String {
    "RBAC".to_string()
}

fn default_store() -> String {
    "yaml".to_string()
}

fn default_auth_type() -> String {
    "jwt".to_string()
}

fn default_expires_in() -> u64 {
    24 * 60 * 60
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_access_file() -> PathBuf {
    PathBuf::from("access.yaml")
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            control: default_control(),
            store: default_store(),
            auth_type: default_auth_type(),
            secret_key: String::new(),
            expires_in_secs: default_expires_in(),
            api_key_header: default_api_key_header(),
            api_key_prefix: String::new(),
            access_file: default_access_file(),
        }
    }
}

impl AuthConfig {
    /// 认证链是否启用
    pub fn is_enabled(&self) -> bool {
        !self.auth_type.is_empty() && !self.auth_type.eq_ignore_ascii_case("none")
    }
}

// ==================== database / redis / kafka / pubsub ====================

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 驱动：postgres / mysql / sqlite / mongodb
    #[serde(default = "default_db_driver")]
    pub driver: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,
    #[serde(default = "default_conn_max_lifetime")]
    pub conn_max_lifetime_secs: u64,
}

fn default_db_driver() -> String {
    "postgres".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_idle_conns() -> u32 {
    10
}

fn default_max_open_conns() -> u32 {
    100
}

fn default_conn_max_lifetime() -> u64 {
    300
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_db_driver(),
            host: String::new(),
            port: default_db_port(),
            user: String::new(),
            password: String::new(),
            name: String::new(),
            ssl_mode: default_ssl_mode(),
            attributes: HashMap::new(),
            max_idle_conns: default_max_idle_conns(),
            max_open_conns: default_max_open_conns(),
            conn_max_lifetime_secs: default_conn_max_lifetime(),
        }
    }
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: u32,
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_redis_port(),
            password: String::new(),
            db: 0,
        }
    }
}

/// Kafka 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaConfig {
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub offset_reset: String,
}

/// PubSub 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub subscription: String,
    #[serde(default)]
    pub credentials: String,
    #[serde(default = "default_max_messages")]
    pub max_messages_per_pull: u32,
}

fn default_max_messages() -> u32 {
    50
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            topic: String::new(),
            subscription: String::new(),
            credentials: String::new(),
            max_messages_per_pull: default_max_messages(),
        }
    }
}

// ==================== AppConfig ====================

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub kafka: KafkaConfig,

    #[serde(default)]
    pub pubsub: PubSubConfig,
}

impl AppConfig {
    /// 创建配置构建器
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// 从文件加载配置，按扩展名选择 JSON 或 YAML
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
        })?;

        let mut config: AppConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 加载配置：文件不存在时使用默认值，随后应用环境变量覆盖
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "加载配置文件");
            Self::from_file(path).await?
        } else {
            info!(path = %path.display(), "配置文件不存在，使用默认配置");
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验必需的配置项
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "server.port".to_string(),
                reason: "端口不能为 0".to_string(),
            });
        }
        if !self.server.path_prefix.starts_with('/') {
            return Err(CoreError::InvalidConfigValue {
                key: "server.path".to_string(),
                reason: format!("路径前缀必须以 '/' 开头: {}", self.server.path_prefix),
            });
        }
        if self.app.rate_limit.enabled && self.app.rate_limit.window_secs == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "app.rate_limit.window_secs".to_string(),
                reason: "限流窗口不能为 0".to_string(),
            });
        }
        let control = self.auth.control.as_str();
        if control != "RBAC" && control != "ABAC" {
            return Err(CoreError::InvalidConfigValue {
                key: "auth.control".to_string(),
                reason: format!("未知的访问控制类型: {}", control),
            });
        }
        Ok(())
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app.environment.eq_ignore_ascii_case("development")
    }

    /// 模块是否在禁用列表中
    pub fn is_module_disabled(&self, name: &str) -> bool {
        self.app.module.disabled.iter().any(|d| d == name)
    }
}

impl Configurable for AppConfig {
    fn defaults(&self) -> BTreeMap<String, Value> {
        let pairs: [(&str, Value); 20] = [
            ("app.name", json!(default_app_name())),
            ("app.version", json!(default_app_version())),
            ("app.environment", json!(default_environment())),
            ("app.logging.level", json!(default_log_level())),
            ("app.logging.rotation", json!(default_rotation())),
            ("app.module.base_path", json!(default_module_base_path())),
            ("app.module.disabled", json!([])),
            ("server.host", json!(default_host())),
            ("server.port", json!(default_port())),
            ("server.path", json!(default_path_prefix())),
            ("server.read_timeout_secs", json!(default_timeout_secs())),
            ("server.write_timeout_secs", json!(default_timeout_secs())),
            ("auth.control", json!(default_control())),
            ("auth.store", json!(default_store())),
            ("auth.type", json!(default_auth_type())),
            ("auth.expires_in_secs", json!(default_expires_in())),
            ("auth.api_key_header", json!(default_api_key_header())),
            ("database.driver", json!(default_db_driver())),
            ("database.port", json!(default_db_port())),
            ("redis.port", json!(default_redis_port())),
        ];
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn env_bindings(&self) -> BTreeMap<String, String> {
        [
            ("app.name", "APP_NAME"),
            ("app.version", "APP_VERSION"),
            ("app.environment", "APP_ENVIRONMENT"),
            ("app.logging.level", "APP_LOGGING_LEVEL"),
            ("app.logging.json_format", "APP_LOGGING_JSON"),
            ("app.module.base_path", "APP_MODULE_BASE_PATH"),
            ("app.module.disabled", "APP_MODULE_DISABLED"),
            ("app.rate_limit.enabled", "APP_RATE_LIMIT_ENABLED"),
            ("app.rate_limit.max", "APP_RATE_LIMIT_MAX"),
            ("app.rate_limit.window_secs", "APP_RATE_LIMIT_WINDOW"),
            ("server.host", "SERVER_HOST"),
            ("server.port", "SERVER_PORT"),
            ("server.path", "SERVER_PATH"),
            ("server.read_timeout_secs", "SERVER_READ_TIMEOUT"),
            ("server.write_timeout_secs", "SERVER_WRITE_TIMEOUT"),
            ("auth.control", "AUTH_CONTROL"),
            ("auth.store", "AUTH_STORE"),
            ("auth.type", "AUTH_TYPE"),
            ("auth.secret_key", "AUTH_SECRET_KEY"),
            ("auth.expires_in_secs", "AUTH_EXPIRES_IN"),
            ("auth.api_key_header", "AUTH_API_KEY_HEADER"),
            ("auth.api_key_prefix", "AUTH_API_KEY_PREFIX"),
            ("auth.access_file", "AUTH_ACCESS_FILE"),
            ("database.driver", "DATABASE_DRIVER"),
            ("database.host", "DATABASE_HOST"),
            ("database.port", "DATABASE_PORT"),
            ("database.user", "DATABASE_USER"),
            ("database.password", "DATABASE_PASSWORD"),
            ("database.name", "DATABASE_NAME"),
            ("database.ssl_mode", "DATABASE_SSL_MODE"),
            ("redis.host", "REDIS_HOST"),
            ("redis.port", "REDIS_PORT"),
            ("redis.password", "REDIS_PASSWORD"),
            ("redis.db", "REDIS_DB"),
            ("kafka.brokers", "KAFKA_BROKERS"),
            ("kafka.group_id", "KAFKA_GROUP_ID"),
            ("kafka.topic", "KAFKA_TOPIC"),
            ("kafka.offset_reset", "KAFKA_AUTO_OFFSET_RESET"),
            ("pubsub.project_id", "PROJECT_ID"),
            ("pubsub.topic", "PUBSUB_TOPIC"),
            ("pubsub.subscription", "PUBSUB_SUBSCRIPTION"),
            ("pubsub.credentials", "PUBSUB_CREDENTIALS"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// 设置应用名称
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app.name = name.into();
        self
    }

    /// 设置运行环境
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.config.app.environment = env.into();
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.app.logging.level = level.into();
        self
    }

    /// 禁用模块
    pub fn disable_module(mut self, name: impl Into<String>) -> Self {
        self.config.app.module.disabled.push(name.into());
        self
    }

    /// 设置监听端口
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// 设置 API 路由前缀
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.server.path_prefix = prefix.into();
        self
    }

    /// 设置认证类型
    pub fn auth_type(mut self, auth_type: impl Into<String>) -> Self {
        self.config.auth.auth_type = auth_type.into();
        self
    }

    /// 设置访问控制类型
    pub fn auth_control(mut self, control: impl Into<String>) -> Self {
        self.config.auth.control = control.into();
        self
    }

    /// 设置 JWT 密钥
    pub fn secret_key(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.secret_key = secret.into();
        self
    }

    /// 设置访问文件
    pub fn access_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.auth.access_file = path.into();
        self
    }

    /// 设置数据库地址
    pub fn database(mut self, driver: impl Into<String>, host: impl Into<String>) -> Self {
        self.config.database.driver = driver.into();
        self.config.database.host = host.into();
        self
    }

    /// 设置 Redis 地址
    pub fn redis_host(mut self, host: impl Into<String>) -> Self {
        self.config.redis.host = host.into();
        self
    }

    /// 启用限流：每 `window_secs` 秒最多 `max` 个请求
    pub fn rate_limit(mut self, max: u64, window_secs: u64) -> Self {
        self.config.app.rate_limit = RateLimitConfig {
            enabled: true,
            max,
            window_secs,
        };
        self
    }

    /// 构建配置
    pub fn build(self) -> AppConfig {
        self.config
    }
}
