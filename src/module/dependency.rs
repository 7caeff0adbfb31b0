//! 模块依赖图
//!
//! 依赖图只保存模块名与其声明的依赖名，与模块实例本身无关，
//! 因此可以单独构建、排序和测试。
//!
//! # 示例
//!
//! ```rust
//! use webcore::module::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_module("orders", ["users", "billing"]);
//! graph.add_module("users", Vec::<String>::new());
//! graph.add_module("billing", ["users"]);
//!
//! let order = graph.load_order().unwrap();
//! assert_eq!(order, vec!["users", "billing", "orders"]);
//! ```

use std::collections::{HashMap, HashSet};

use crate::utils::{CoreError, Result};

/// 深度优先遍历中的节点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// 模块依赖图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 按加入顺序排列的模块名，决定遍历顺序
    nodes: Vec<String>,
    /// 模块名 -> 依赖的模块名（已去重）
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由 (模块名, 依赖列表) 序列构建
    pub fn build<I, N, D>(modules: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let mut graph = Self::new();
        for (name, deps) in modules {
            graph.add_module(name, deps);
        }
        graph
    }

    /// 加入模块及其依赖，同名模块再次加入时覆盖依赖列表
    pub fn add_module<D>(&mut self, name: impl Into<String>, dependencies: D)
    where
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let name = name.into();
        let mut deps: Vec<String> = Vec::new();
        for dep in dependencies {
            let dep = dep.into();
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        if !self.edges.contains_key(&name) {
            self.nodes.push(name.clone());
        }
        self.edges.insert(name, deps);
    }

    /// 移除模块（不修改其他模块对它的依赖声明）
    pub fn remove_module(&mut self, name: &str) {
        if self.edges.remove(name).is_some() {
            self.nodes.retain(|n| n != name);
        }
    }

    /// 检查是否有模块依赖自身
    pub fn check_self_dependencies(&self) -> Result<()> {
        for name in &self.nodes {
            if self.dependencies(name).iter().any(|dep| dep == name) {
                return Err(CoreError::SelfDependency(name.clone()));
            }
        }
        Ok(())
    }

    /// 计算初始化顺序：依赖总在依赖方之前
    ///
    /// 依次检查自依赖、缺失依赖和循环依赖，任一问题都会让整个排序失败。
    pub fn load_order(&self) -> Result<Vec<String>> {
        self.check_self_dependencies()?;

        let mut marks: HashMap<&str, Mark> =
            self.nodes.iter().map(|n| (n.as_str(), Mark::Unvisited)).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        for name in &self.nodes {
            self.visit(name, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(name).copied() {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => return Err(CoreError::CircularDependency(name.to_string())),
            Some(Mark::Unvisited) => {}
            None => return Err(CoreError::DependencyNotFound(name.to_string())),
        }

        marks.insert(name, Mark::InProgress);
        for dep in self.dependencies(name) {
            self.visit(dep, marks, order)?;
        }
        marks.insert(name, Mark::Done);
        order.push(name.to_string());
        Ok(())
    }

    /// 卸载顺序（初始化顺序的逆序）
    pub fn unload_order(&self) -> Result<Vec<String>> {
        let mut order = self.load_order()?;
        order.reverse();
        Ok(order)
    }

    /// 直接依赖
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 直接依赖该模块的模块
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| self.dependencies(n).iter().any(|d| d == name))
            .cloned()
            .collect()
    }

    /// 传递依赖（不含自身）
    pub fn all_dependencies(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = self.dependencies(name).iter().map(String::as_str).collect();
        let mut result = Vec::new();

        while let Some(dep) = stack.pop() {
            if dep == name || !seen.insert(dep) {
                continue;
            }
            result.push(dep.to_string());
            stack.extend(self.dependencies(dep).iter().map(String::as_str));
        }
        result
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn modules(&self) -> &[String] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> Vec<String> {
        Vec::new()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_registration_order_c_a_b() {
        let mut graph = DependencyGraph::new();
        graph.add_module("C", ["A", "B"]);
        graph.add_module("A", none());
        graph.add_module("B", ["A"]);

        assert_eq!(graph.load_order().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_shared_dependency_visited_once() {
        let graph = DependencyGraph::build([
            ("app", vec!["auth", "orders"]),
            ("orders", vec!["db"]),
            ("auth", vec!["db"]),
            ("db", vec![]),
        ]);
        let order = graph.load_order().unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "db") < position(&order, "auth"));
        assert!(position(&order, "db") < position(&order, "orders"));
        assert_eq!(order.last().unwrap(), "app");
    }

    #[test]
    fn test_duplicate_dependencies_deduplicated() {
        let mut graph = DependencyGraph::new();
        graph.add_module("a", ["b", "b"]);
        assert_eq!(graph.dependencies("a"), ["b".to_string()]);
    }

    #[test]
    fn test_self_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_module("X", ["X"]);
        assert!(matches!(graph.load_order(), Err(CoreError::SelfDependency(ref n)) if n == "X"));
    }

    #[test]
    fn test_cycle() {
        let graph = DependencyGraph::build([("a", vec!["b"]), ("b", vec!["c"]), ("c", vec!["a"])]);
        match graph.load_order() {
            Err(CoreError::CircularDependency(name)) => {
                assert!(["a", "b", "c"].contains(&name.as_str()))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let graph = DependencyGraph::build([("orders", vec!["billing"])]);
        let err = graph.load_order().unwrap_err();
        assert!(matches!(err, CoreError::DependencyNotFound(ref n) if n == "billing"));
        assert!(err.to_string().contains("dependency not found"));
    }

    #[test]
    fn test_dependents_and_transitive() {
        let graph = DependencyGraph::build([
            ("db", vec![]),
            ("users", vec!["db"]),
            ("orders", vec!["users"]),
        ]);
        assert_eq!(graph.dependents("db"), vec!["users"]);
        let mut all = graph.all_dependencies("orders");
        all.sort();
        assert_eq!(all, vec!["db", "users"]);
        assert_eq!(graph.unload_order().unwrap(), vec!["orders", "users", "db"]);
    }

    #[test]
    fn test_remove_module() {
        let mut graph = DependencyGraph::build([("a", vec![]), ("b", vec!["a"])]);
        graph.remove_module("a");
        assert!(!graph.contains("a"));
        assert_eq!(graph.len(), 1);
        assert!(graph.load_order().is_err());
    }
}
