//! 库管理器集成测试
//!
//! 覆盖单例并发构造、按键实例、构造失败重试、参数类型校验、卸载与销毁。

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use webcore::core::RedisConfig;
use webcore::library::{downcast_library, Connector, DEFAULT_INSTANCE_KEY};
use webcore::{CoreError, Library, LibraryArgs, LibraryLoader, LibraryManager};

// ============================================================================
// 测试辅助结构
// ============================================================================

/// 模拟的缓存客户端
struct FakeCache {
    host: String,
    connected: AtomicBool,
    fail_disconnect: bool,
}

#[async_trait]
impl Library for FakeCache {
    async fn install(&self, args: &LibraryArgs) -> webcore::Result<()> {
        let config = args.get::<RedisConfig>(0)?;
        assert_eq!(config.host, self.host);
        Ok(())
    }

    async fn uninstall(&self) -> webcore::Result<()> {
        Ok(())
    }

    fn as_connector(&self) -> Option<&dyn Connector> {
        Some(self)
    }
}

#[async_trait]
impl Connector for FakeCache {
    async fn connect(&self) -> webcore::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> webcore::Result<()> {
        if self.fail_disconnect {
            return Err(CoreError::Internal("connection reset".to_string()));
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// 记录构造次数的加载器，构造时模拟一次慢速建连
#[derive(Default)]
struct CountingLoader {
    calls: AtomicUsize,
    fail_first: bool,
    fail_disconnect: bool,
    built: Mutex<Vec<Arc<FakeCache>>>,
}

#[async_trait]
impl LibraryLoader for CountingLoader {
    async fn init(&self, args: &LibraryArgs) -> webcore::Result<Arc<dyn Library>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_first && call == 0 {
            return Err(CoreError::LibraryInitFailed {
                loader: "redis".to_string(),
                reason: "dial tcp: connection refused".to_string(),
            });
        }

        let config = args.get::<RedisConfig>(0)?;
        let cache = FakeCache {
            host: config.host.clone(),
            connected: AtomicBool::new(false),
            fail_disconnect: self.fail_disconnect,
        };
        cache.install(args).await?;
        cache.connect().await?;
        let cache = Arc::new(cache);
        self.built.lock().unwrap().push(Arc::clone(&cache));
        Ok(cache)
    }
}

fn redis(host: &str) -> LibraryArgs {
    LibraryArgs::new().with(RedisConfig {
        host: host.to_string(),
        ..Default::default()
    })
}

async fn manager_with(loader: Arc<CountingLoader>) -> LibraryManager {
    let manager = LibraryManager::new();
    manager.register("redis", loader).await;
    manager
}

// ============================================================================
// 单例与按键实例
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_singleton_constructed_once() {
    let loader = Arc::new(CountingLoader::default());
    let manager = Arc::new(manager_with(Arc::clone(&loader)).await);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.load_singleton("redis", redis("cache-1")).await })
        })
        .collect();

    let instances: Vec<Arc<dyn Library>> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }
    assert_eq!(manager.instance_count().await, 1);
}

#[tokio::test]
async fn test_keyed_instances_are_distinct() {
    let loader = Arc::new(CountingLoader::default());
    let manager = manager_with(Arc::clone(&loader)).await;

    let primary = manager.load_keyed("redis", "primary", redis("a")).await.unwrap();
    let replica = manager.load_keyed("redis", "replica", redis("b")).await.unwrap();
    let again = manager.load_keyed("redis", "primary", redis("ignored")).await.unwrap();

    assert!(!Arc::ptr_eq(&primary, &replica));
    assert!(Arc::ptr_eq(&primary, &again));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);

    let primary = downcast_library::<FakeCache>(primary).unwrap();
    assert_eq!(primary.host, "a");
    assert!(primary.connected.load(Ordering::SeqCst));
    assert!(manager.get("redis", "missing").await.is_none());
}

#[tokio::test]
async fn test_failed_construction_not_cached() {
    let loader = Arc::new(CountingLoader {
        fail_first: true,
        ..Default::default()
    });
    let manager = manager_with(Arc::clone(&loader)).await;

    let err = manager.load_singleton("redis", redis("a")).await.err().unwrap();
    assert!(matches!(err, CoreError::LibraryInitFailed { .. }));
    assert!(manager.get_singleton("redis").await.is_none());
    assert_eq!(manager.slot_count().await, 0);

    manager.load_singleton("redis", redis("a")).await.unwrap();
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_keyed_loads_leave_no_slots() {
    let manager = manager_with(Arc::new(CountingLoader::default())).await;

    for i in 0..20 {
        let key = format!("tenant-{}", i);
        let result = manager.load_keyed("redis", &key, LibraryArgs::new()).await;
        assert!(result.is_err());
    }
    assert_eq!(manager.slot_count().await, 0);

    manager.load_keyed("redis", "tenant-0", redis("a")).await.unwrap();
    assert_eq!(manager.slot_count().await, 1);
}

#[tokio::test]
async fn test_unknown_loader_and_wrong_args() {
    let manager = manager_with(Arc::new(CountingLoader::default())).await;

    let err = manager
        .load_singleton("database:mongo", LibraryArgs::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CoreError::LoaderNotFound(ref n) if n == "database:mongo"));

    let err = manager
        .load_singleton("redis", LibraryArgs::new().with(6379u16))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, CoreError::InvalidLibraryArgs { index: 0, .. }));
    assert_eq!(manager.instance_count().await, 0);
}

#[tokio::test]
async fn test_last_registration_wins() {
    let first = Arc::new(CountingLoader::default());
    let second = Arc::new(CountingLoader::default());
    let manager = manager_with(Arc::clone(&first)).await;
    manager.register("redis", Arc::clone(&second) as Arc<dyn LibraryLoader>).await;

    manager.load_singleton("redis", redis("a")).await.unwrap();
    assert_eq!(first.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.loader_names().await, vec!["redis"]);
}

// ============================================================================
// 卸载与销毁
// ============================================================================

#[tokio::test]
async fn test_unload_disconnects_and_removes() {
    let manager = manager_with(Arc::new(CountingLoader::default())).await;
    let cache = manager
        .load_singleton_as::<FakeCache>("redis", redis("a"))
        .await
        .unwrap();

    manager.unload("redis", DEFAULT_INSTANCE_KEY).await.unwrap();
    assert!(!cache.connected.load(Ordering::SeqCst));
    assert!(manager.get_singleton("redis").await.is_none());

    let err = manager.unload("redis", DEFAULT_INSTANCE_KEY).await.unwrap_err();
    assert!(matches!(err, CoreError::LibraryNotFound { .. }));
}

#[tokio::test]
async fn test_failed_unload_keeps_instance() {
    let manager = manager_with(Arc::new(CountingLoader {
        fail_disconnect: true,
        ..Default::default()
    }))
    .await;
    manager.load_singleton("redis", redis("a")).await.unwrap();

    let err = manager.unload("redis", DEFAULT_INSTANCE_KEY).await.unwrap_err();
    assert!(matches!(err, CoreError::LibraryTeardownFailed { .. }));
    assert!(manager.get_singleton("redis").await.is_some());
}

#[tokio::test]
async fn test_construction_racing_destroy_is_torn_down() {
    let loader = Arc::new(CountingLoader::default());
    let manager = Arc::new(manager_with(Arc::clone(&loader)).await);

    let pending = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.load_keyed("redis", "late", redis("a")).await }
    });
    // 加载器构造耗时 20ms，destroy 在构造中途执行
    tokio::time::sleep(Duration::from_millis(5)).await;
    manager.destroy().await;

    let err = pending.await.unwrap().err().unwrap();
    assert!(matches!(err, CoreError::LibraryInitFailed { .. }));
    assert_eq!(manager.instance_count().await, 0);

    let built = loader.built.lock().unwrap().clone();
    assert_eq!(built.len(), 1);
    assert!(!built[0].connected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_destroy_clears_all_despite_failures() {
    let manager = manager_with(Arc::new(CountingLoader {
        fail_disconnect: true,
        ..Default::default()
    }))
    .await;
    manager.load_keyed("redis", "a", redis("a")).await.unwrap();
    manager.load_keyed("redis", "b", redis("b")).await.unwrap();
    assert_eq!(manager.instance_count().await, 2);

    manager.destroy().await;
    assert_eq!(manager.instance_count().await, 0);
    assert!(manager.get("redis", "a").await.is_none());
}
