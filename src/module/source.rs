//! 模块来源
//!
//! 模块在编译期静态链接，通过显式的“名称 → 构造函数”表提供给模块管理器。
//! 其他来源（远程拉取等）只需实现 [`ModuleSource`]，依赖排序逻辑不受影响。

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::metadata::Module;
use crate::utils::{CoreError, Result};

/// 模块来源
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// 来源描述，记录在 `LoadedModule::source` 中
    fn describe(&self) -> String;

    /// 可提供的模块名称
    fn available(&self) -> Vec<String>;

    /// 构造指定名称的模块
    async fn load(&self, name: &str) -> Result<Arc<dyn Module>>;
}

/// 模块构造函数
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

/// 静态模块表
#[derive(Clone, Default)]
pub struct StaticModuleSource {
    factories: Vec<(String, ModuleFactory)>,
}

impl StaticModuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加构造函数，同名时覆盖
    pub fn with<F, M>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Module,
    {
        let name = name.into();
        let factory: ModuleFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn Module>);
        self.factories.retain(|(n, _)| *n != name);
        self.factories.push((name, factory));
        self
    }
}

impl fmt::Debug for StaticModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|(name, _)| name))
            .finish()
    }
}

#[async_trait]
impl ModuleSource for StaticModuleSource {
    fn describe(&self) -> String {
        // 静态链接的模块没有来源路径
        String::new()
    }

    fn available(&self) -> Vec<String> {
        self.factories.iter().map(|(name, _)| name.clone()).collect()
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn Module>> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory())
            .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))
    }
}
