//! 库与加载器接口
//!
//! 库（Library）是可插拔的基础设施驱动实例，例如数据库连接、缓存客户端、
//! 认证存储。加载器（LibraryLoader）负责根据构建参数生产某一类库实例。

use async_trait::async_trait;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::utils::{CoreError, Result};

// ==================== 向下转型 ====================

/// 为 trait 对象提供向下转型能力
pub trait AsAny: Any + Send + Sync {
    /// 以 `&dyn Any` 形式借用
    fn as_any(&self) -> &dyn Any;

    /// 转为 `Arc<dyn Any>`，用于 `Arc::downcast`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ==================== Library / Connector ====================

/// 库实例
///
/// 至少支持安装与卸载；需要建立连接的库通过 `as_connector` 暴露 [`Connector`]。
#[async_trait]
pub trait Library: AsAny {
    /// 安装（通常在加载器的 `init` 中调用）
    async fn install(&self, args: &LibraryArgs) -> Result<()>;

    /// 卸载
    async fn uninstall(&self) -> Result<()>;

    /// 连接能力
    fn as_connector(&self) -> Option<&dyn Connector> {
        None
    }
}

/// 可连接的库
#[async_trait]
pub trait Connector: Send + Sync {
    /// 建立连接
    async fn connect(&self) -> Result<()>;

    /// 断开连接
    async fn disconnect(&self) -> Result<()>;
}

/// 将库实例向下转型为具体类型
pub fn downcast_library<T: Library>(library: Arc<dyn Library>) -> Option<Arc<T>> {
    library.into_any().downcast::<T>().ok()
}

// ==================== LibraryLoader ====================

/// 库加载器
///
/// 一个加载器只生产一类库。加载器的名称在注册时由 [`LibraryManager`] 指定，
/// 惯例为 `类别:变体`，例如 `database:postgres`。
///
/// [`LibraryManager`]: super::LibraryManager
#[async_trait]
pub trait LibraryLoader: Send + Sync {
    /// 构造库实例
    ///
    /// 失败时不会缓存任何东西，调用方可以重试。
    async fn init(&self, args: &LibraryArgs) -> Result<Arc<dyn Library>>;
}

/// 已命名的加载器
#[derive(Clone)]
pub struct NamedLoader {
    name: String,
    loader: Arc<dyn LibraryLoader>,
}

impl NamedLoader {
    pub(crate) fn new(name: String, loader: Arc<dyn LibraryLoader>) -> Self {
        Self { name, loader }
    }

    /// 注册时指定的名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 构造库实例
    pub async fn init(&self, args: &LibraryArgs) -> Result<Arc<dyn Library>> {
        self.loader.init(args).await
    }
}

impl fmt::Debug for NamedLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedLoader").field("name", &self.name).finish()
    }
}

// ==================== LibraryArgs ====================

/// 有序、带类型的构建参数
///
/// # 示例
///
/// ```
/// use webcore::library::LibraryArgs;
///
/// let args = LibraryArgs::new().with(5432u16).with("primary".to_string());
/// assert_eq!(*args.get::<u16>(0).unwrap(), 5432);
/// assert!(args.get::<u16>(1).is_err());
/// ```
#[derive(Clone, Default)]
pub struct LibraryArgs {
    values: Vec<Arc<dyn Any + Send + Sync>>,
}

impl LibraryArgs {
    /// 创建空参数
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个参数
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    /// 追加一个参数
    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Arc::new(value));
    }

    /// 按位置取参数，类型不符时返回 `InvalidLibraryArgs`
    pub fn get<T: Any>(&self, index: usize) -> Result<&T> {
        self.values
            .get(index)
            .and_then(|v| v.downcast_ref::<T>())
            .ok_or(CoreError::InvalidLibraryArgs {
                index,
                expected: type_name::<T>(),
            })
    }

    /// 取第一个类型为 `T` 的参数
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.values.iter().find_map(|v| v.downcast_ref::<T>())
    }

    /// 参数个数
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for LibraryArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryArgs").field("len", &self.values.len()).finish()
    }
}
