//! WebCore 端到端测试
//!
//! 基础设施库按配置加载、模块路由安装、HTTP 服务与停止顺序。

use async_trait::async_trait;
use http::Method;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use webcore::core::{DatabaseConfig, KafkaConfig};
use webcore::router::lifecycle_events;
use webcore::{
    handler_fn, ApiResponse, AppConfig, AppContext, CoreError, CoreState, Event, Library, LibraryArgs,
    LibraryLoader, Module, ModuleRoute, WebCore, WebRequest,
};

// ============================================================================
// 测试辅助结构
// ============================================================================

type Log = Arc<Mutex<Vec<String>>>;

struct FakeDriver {
    name: String,
    log: Log,
}

#[async_trait]
impl Library for FakeDriver {
    async fn install(&self, _args: &LibraryArgs) -> webcore::Result<()> {
        Ok(())
    }

    async fn uninstall(&self) -> webcore::Result<()> {
        self.log.lock().unwrap().push(format!("uninstall:{}", self.name));
        Ok(())
    }
}

/// 校验标准参数（上下文 + 配置段）的加载器
struct DatabaseLoader {
    log: Log,
}

#[async_trait]
impl LibraryLoader for DatabaseLoader {
    async fn init(&self, args: &LibraryArgs) -> webcore::Result<Arc<dyn Library>> {
        let ctx = args.get::<AppContext>(0)?;
        let config = args.get::<DatabaseConfig>(1)?;
        assert_eq!(ctx.config().database.host, config.host);
        self.log.lock().unwrap().push(format!("load:database:{}", config.host));
        Ok(Arc::new(FakeDriver {
            name: "database".to_string(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct KafkaLoader {
    log: Log,
}

#[async_trait]
impl LibraryLoader for KafkaLoader {
    async fn init(&self, args: &LibraryArgs) -> webcore::Result<Arc<dyn Library>> {
        let config = args.get::<KafkaConfig>(1)?;
        self.log
            .lock()
            .unwrap()
            .push(format!("load:kafka:{}", config.brokers.join(",")));
        Ok(Arc::new(FakeDriver {
            name: "kafka".to_string(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct Greeter {
    log: Log,
}

#[async_trait]
impl Module for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn routes(&self) -> Vec<ModuleRoute> {
        vec![ModuleRoute::api(
            Method::POST,
            "/greet/:name",
            handler_fn(|req: WebRequest| async move {
                let body: serde_json::Value = req.json()?;
                let greeting = format!(
                    "{}, {}",
                    body["salutation"].as_str().unwrap_or("hello"),
                    req.param("name").unwrap_or_default()
                );
                Ok::<_, CoreError>(ApiResponse::success(json!({ "greeting": greeting })))
            }),
        )]
    }

    async fn init(&self, ctx: &AppContext) -> webcore::Result<()> {
        // 模块初始化时基础设施库已就绪
        assert!(ctx.libraries().get_singleton("database:postgres").await.is_some());
        self.log.lock().unwrap().push("init:greeter".to_string());
        Ok(())
    }

    async fn destroy(&self) -> webcore::Result<()> {
        self.log.lock().unwrap().push("destroy:greeter".to_string());
        Ok(())
    }
}

fn config(port: u16) -> AppConfig {
    let mut config = AppConfig::builder()
        .auth_type("none")
        .environment("production")
        .database("postgres", "db.internal")
        .port(port)
        .build();
    config.server.host = "127.0.0.1".to_string();
    config.kafka.brokers = vec!["k1:9092".to_string()];
    config
}

async fn core(config: AppConfig, log: &Log) -> WebCore {
    let loaders: Vec<(&str, Arc<dyn LibraryLoader>)> = vec![
        ("database:postgres", Arc::new(DatabaseLoader { log: Arc::clone(log) })),
        ("kafka", Arc::new(KafkaLoader { log: Arc::clone(log) })),
    ];
    let modules: Vec<Arc<dyn Module>> = vec![Arc::new(Greeter { log: Arc::clone(log) })];
    WebCore::new(config, loaders, modules).await.unwrap()
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

// ============================================================================
// 测试
// ============================================================================

#[tokio::test]
async fn test_infrastructure_loaded_before_modules() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let core = core(config(7272), &log).await;

    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    core.events()
        .subscribe(
            "test",
            lifecycle_events::APP_STARTED,
            Arc::new(move |_: Event| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

    core.start().await.unwrap();
    core.initialize().await.unwrap();
    assert_eq!(core.state().await, CoreState::Initialized);

    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec!["load:database:db.internal", "load:kafka:k1:9092", "init:greeter"]
    );

    let routes = core.routes().routes().await;
    assert!(routes.iter().any(|r| r.path == "/api/greet/:name" && r.module == "greeter"));

    for _ in 0..50 {
        if started.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_destroys_libraries_then_modules() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let core = core(config(7272), &log).await;
    core.start().await.unwrap();
    core.initialize().await.unwrap();
    log.lock().unwrap().clear();

    core.stop().await;
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries.last().map(String::as_str), Some("destroy:greeter"));
    assert!(entries[..2].iter().all(|e| e.starts_with("uninstall:")));
    assert_eq!(core.libraries().instance_count().await, 0);
    assert!(core.modules().is_empty().await);
}

#[tokio::test]
async fn test_instances_are_independent() {
    let log_a: Log = Arc::new(Mutex::new(Vec::new()));
    let log_b: Log = Arc::new(Mutex::new(Vec::new()));
    let a = core(config(7272), &log_a).await;
    let b = core(config(7273), &log_b).await;

    a.start().await.unwrap();
    assert_eq!(a.libraries().instance_count().await, 2);
    assert_eq!(b.libraries().instance_count().await, 0);
    assert!(log_b.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_serve_over_http() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let port = free_port();
    let core = Arc::new(core(config(port), &log).await);
    core.start().await.unwrap();
    core.initialize().await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn({
        let core = Arc::clone(&core);
        async move {
            core.serve_until(async {
                let _ = rx.await;
            })
            .await
        }
    });

    let body = r#"{"salutation":"hi"}"#;
    let request = format!(
        "POST /api/greet/ada HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let raw = send(port, &request).await;
    assert!(raw.starts_with("HTTP/1.1 200"), "{}", raw);
    assert!(raw.contains(r#""greeting":"hi, ada""#));

    let raw = send(port, "GET /api/missing HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
    assert!(raw.starts_with("HTTP/1.1 404"));
    assert!(raw.contains(r#""errorCode":"ROUTE-001""#));

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    core.stop().await;
}

#[tokio::test]
async fn test_rate_limited_by_peer_address() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let port = free_port();
    let mut config = config(port);
    config.app.rate_limit.enabled = true;
    config.app.rate_limit.max = 1;
    let core = Arc::new(core(config, &log).await);
    core.start().await.unwrap();
    core.initialize().await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn({
        let core = Arc::clone(&core);
        async move {
            core.serve_until(async {
                let _ = rx.await;
            })
            .await
        }
    });

    let health = "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
    let raw = send(port, health).await.to_ascii_lowercase();
    assert!(raw.starts_with("http/1.1 200"), "{}", raw);
    assert!(raw.contains("x-ratelimit-limit: 1"));
    assert!(raw.contains("x-ratelimit-remaining: 0"));

    // 同一来源地址的第二个请求被拒绝
    let raw = send(port, health).await;
    assert!(raw.starts_with("HTTP/1.1 429"), "{}", raw);
    assert!(raw.contains(r#""errorCode":"ROUTE-003""#));
    assert!(raw.to_ascii_lowercase().contains("x-ratelimit-reset: "));

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    core.stop().await;
}

async fn send(port: u16, request: &str) -> String {
    let mut stream = None;
    for _ in 0..50 {
        match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut stream = stream.expect("服务未启动");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    raw
}
