//! 库管理系统
//!
//! 可替换的基础设施驱动（数据库、缓存、消息队列、认证存储）以库的形式接入，
//! 由命名加载器按需构造，并以单例或多实例方式缓存。

pub mod loader;
pub mod manager;

pub use loader::{
    downcast_library, AsAny, Connector, Library, LibraryArgs, LibraryLoader, NamedLoader,
};
pub use manager::{LibraryManager, DEFAULT_INSTANCE_KEY};
