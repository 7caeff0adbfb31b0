//! 模块管理
//!
//! - 模块接口与元数据
//! - 依赖图与初始化顺序
//! - 模块来源
//! - 模块管理器

pub mod dependency;
pub mod manager;
pub mod metadata;
pub mod source;

pub use dependency::DependencyGraph;
pub use manager::ModuleManager;
pub use metadata::{LoadedModule, Module, ModuleInfo, ModuleRoute, RouterGroup, ServiceHandle};
pub use source::{ModuleFactory, ModuleSource, StaticModuleSource};
