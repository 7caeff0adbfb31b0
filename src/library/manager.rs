//! 库管理器
//!
//! 维护加载器注册表与两级实例缓存：加载器名 → 实例键 → 实例。
//! 单例使用键 `"default"`，多实例使用调用方给定的键。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, instrument, warn};

use super::loader::{downcast_library, Library, LibraryArgs, LibraryLoader, NamedLoader};
use crate::utils::{CoreError, Result};

/// 单例实例使用的键
pub const DEFAULT_INSTANCE_KEY: &str = "default";

/// 每个 (加载器, 键) 对应一个槽位
///
/// 并发的首次调用共享同一次构造；构造失败时槽位被移除，下次调用会重试。
#[derive(Default)]
struct SlotCell {
    cell: OnceCell<Arc<dyn Library>>,
    /// 实例已被（或正在被）卸载
    released: AtomicBool,
}

impl SlotCell {
    fn get(&self) -> Option<&Arc<dyn Library>> {
        self.cell.get()
    }

    fn initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// 取得卸载权，只有第一个调用者成功
    fn claim(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }

    fn unclaim(&self) {
        self.released.store(false, Ordering::SeqCst);
    }
}

type Slot = Arc<SlotCell>;

/// 库管理器
#[derive(Default)]
pub struct LibraryManager {
    /// 已注册的加载器
    loaders: RwLock<HashMap<String, NamedLoader>>,
    /// 实例缓存
    instances: RwLock<HashMap<String, HashMap<String, Slot>>>,
}

impl LibraryManager {
    /// 创建空的库管理器
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用一组加载器创建，加载器名取自表的键
    pub async fn with_loaders<I, S>(loaders: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn LibraryLoader>)>,
        S: Into<String>,
    {
        let manager = Self::new();
        for (name, loader) in loaders {
            manager.register(name, loader).await;
        }
        manager
    }

    // ==================== 加载器 ====================

    /// 注册加载器
    ///
    /// 同名加载器后注册者覆盖先注册者。
    pub async fn register(&self, name: impl Into<String>, loader: Arc<dyn LibraryLoader>) {
        let name = name.into();
        let mut loaders = self.loaders.write().await;
        if loaders.contains_key(&name) {
            warn!(loader = %name, "加载器已存在，将被覆盖");
        }
        debug!(loader = %name, "注册加载器");
        loaders.insert(name.clone(), NamedLoader::new(name, loader));
    }

    /// 获取加载器
    pub async fn loader(&self, name: &str) -> Option<NamedLoader> {
        self.loaders.read().await.get(name).cloned()
    }

    /// 所有加载器名称（已排序）
    pub async fn loader_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaders.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    // ==================== 实例加载 ====================

    /// 加载单例实例
    pub async fn load_singleton(&self, name: &str, args: LibraryArgs) -> Result<Arc<dyn Library>> {
        self.load_keyed(name, DEFAULT_INSTANCE_KEY, args).await
    }

    /// 按键加载实例
    ///
    /// 实例已存在时直接返回；否则调用加载器构造并缓存。
    /// 同一 (加载器, 键) 的并发首次调用只会触发一次构造。
    #[instrument(skip_all, fields(loader = %name, key = %key))]
    pub async fn load_keyed(
        &self,
        name: &str,
        key: &str,
        args: LibraryArgs,
    ) -> Result<Arc<dyn Library>> {
        let loader = self
            .loader(name)
            .await
            .ok_or_else(|| CoreError::LoaderNotFound(name.to_string()))?;

        let slot = self.slot(name, key).await;
        let mut constructed = false;
        let flag = &mut constructed;
        let (loader, args) = (&loader, &args);
        let outcome = slot
            .cell
            .get_or_try_init(move || {
                *flag = true;
                async move {
                    info!("构造库实例");
                    loader.init(args).await
                }
            })
            .await
            .map(Arc::clone);

        let library = match outcome {
            Ok(library) => library,
            Err(e) => {
                self.discard_empty(name, key, &slot).await;
                return Err(e);
            }
        };

        // 构造期间缓存被 destroy 清空：没有人会再卸载这个实例
        if constructed && !self.holds(name, key, &slot).await {
            if slot.claim() {
                if let Err(e) = teardown(&library).await {
                    warn!(error = %e, "丢弃的库实例卸载失败");
                }
            }
            return Err(CoreError::LibraryInitFailed {
                loader: name.to_string(),
                reason: "库管理器已销毁，新构造的实例已丢弃".to_string(),
            });
        }

        Ok(library)
    }

    /// 按类型加载单例
    pub async fn load_singleton_as<T: Library>(&self, name: &str, args: LibraryArgs) -> Result<Arc<T>> {
        let library = self.load_singleton(name, args).await?;
        downcast_library::<T>(library).ok_or_else(|| {
            CoreError::Internal(format!(
                "库 '{}' 不是 {} 类型",
                name,
                std::any::type_name::<T>()
            ))
        })
    }

    async fn slot(&self, name: &str, key: &str) -> Slot {
        if let Some(slot) = self
            .instances
            .read()
            .await
            .get(name)
            .and_then(|m| m.get(key))
        {
            return Arc::clone(slot);
        }

        let mut instances = self.instances.write().await;
        Arc::clone(
            instances
                .entry(name.to_string())
                .or_default()
                .entry(key.to_string())
                .or_insert_with(Slot::default),
        )
    }

    /// 槽位仍在缓存中
    async fn holds(&self, name: &str, key: &str, slot: &Slot) -> bool {
        self.instances
            .read()
            .await
            .get(name)
            .and_then(|m| m.get(key))
            .is_some_and(|cached| Arc::ptr_eq(cached, slot))
    }

    /// 构造失败后移除空槽位
    ///
    /// 写锁内其他调用者无法再取得该槽位；引用计数为 2（缓存 + 本调用）
    /// 说明没有别的调用者正在等待它。
    async fn discard_empty(&self, name: &str, key: &str, slot: &Slot) {
        let mut instances = self.instances.write().await;
        let Some(map) = instances.get_mut(name) else {
            return;
        };
        let removable = map.get(key).is_some_and(|cached| {
            Arc::ptr_eq(cached, slot) && !slot.initialized() && Arc::strong_count(slot) == 2
        });
        if removable {
            map.remove(key);
            if map.is_empty() {
                instances.remove(name);
            }
        }
    }

    /// 已缓存的槽位数（含构造中的）
    pub async fn slot_count(&self) -> usize {
        self.instances.read().await.values().map(HashMap::len).sum()
    }

    // ==================== 查询 ====================

    /// 查找已构造的实例，从不触发构造
    pub async fn get(&self, name: &str, key: &str) -> Option<Arc<dyn Library>> {
        self.instances
            .read()
            .await
            .get(name)
            .and_then(|m| m.get(key))
            .and_then(|slot| slot.get().cloned())
    }

    /// 查找单例实例
    pub async fn get_singleton(&self, name: &str) -> Option<Arc<dyn Library>> {
        self.get(name, DEFAULT_INSTANCE_KEY).await
    }

    /// 按类型查找实例
    pub async fn get_as<T: Library>(&self, name: &str, key: &str) -> Option<Arc<T>> {
        self.get(name, key).await.and_then(downcast_library::<T>)
    }

    /// 已构造的实例数
    pub async fn instance_count(&self) -> usize {
        self.instances
            .read()
            .await
            .values()
            .flat_map(|m| m.values())
            .filter(|slot| slot.initialized())
            .count()
    }

    // ==================== 卸载 ====================

    /// 卸载单个实例：断开连接、卸载并移出缓存
    ///
    /// 卸载失败时实例保留在缓存中。
    #[instrument(skip_all, fields(loader = %name, key = %key))]
    pub async fn unload(&self, name: &str, key: &str) -> Result<()> {
        let not_found = || CoreError::LibraryNotFound {
            loader: name.to_string(),
            key: key.to_string(),
        };

        let slot = self
            .instances
            .read()
            .await
            .get(name)
            .and_then(|m| m.get(key))
            .filter(|slot| slot.initialized())
            .cloned()
            .ok_or_else(not_found)?;
        let library = slot.get().cloned().ok_or_else(not_found)?;

        if !slot.claim() {
            return Err(not_found());
        }
        if let Err(e) = teardown(&library).await {
            slot.unclaim();
            return Err(CoreError::LibraryTeardownFailed {
                loader: name.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            });
        }

        let mut instances = self.instances.write().await;
        if let Some(map) = instances.get_mut(name) {
            if map.get(key).is_some_and(|cached| Arc::ptr_eq(cached, &slot)) {
                map.remove(key);
            }
            if map.is_empty() {
                instances.remove(name);
            }
        }
        info!("库实例已卸载");
        Ok(())
    }

    /// 销毁所有实例
    ///
    /// 单个实例失败只记录警告，最终总会清空全部缓存。
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        let drained: Vec<(String, String, Slot)> = {
            let mut instances = self.instances.write().await;
            instances
                .drain()
                .flat_map(|(name, map)| {
                    map.into_iter()
                        .map(move |(key, slot)| (name.clone(), key, slot))
                })
                .collect()
        };

        for (name, key, slot) in drained {
            let Some(library) = slot.get() else {
                continue;
            };
            if !slot.claim() {
                continue;
            }
            if let Err(e) = teardown(library).await {
                warn!(loader = %name, key = %key, error = %e, "库实例卸载失败");
            }
        }
        info!("库管理器已销毁");
    }
}

async fn teardown(library: &Arc<dyn Library>) -> Result<()> {
    if let Some(connector) = library.as_connector() {
        connector.disconnect().await?;
    }
    library.uninstall().await
}
