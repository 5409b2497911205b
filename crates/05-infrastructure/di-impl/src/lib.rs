//! # 依赖注入具体实现
//!
//! 提供依赖解析引擎和容器实现：
//!
//! - [`ComponentRegistry`] - 组件注册表
//! - [`GraphBuilder`] - 依赖图构建
//! - [`CycleAnalyzer`] - 循环依赖分析，决定哪些边由延迟代理满足
//! - [`ResolutionPlanner`] - 实例化顺序
//! - [`ScopeManager`] - 单例缓存与瞬时实例
//! - [`DiContainerImpl`] - 容器门面

pub mod container;
pub mod cycles;
pub mod graph;
pub mod planner;
pub mod registry;
pub mod scope;

pub use container::DiContainerImpl;
pub use cycles::{CycleAnalysis, CycleAnalyzer};
pub use graph::{DependencyEdge, DependencyGraph, GraphBuilder};
pub use planner::{InstantiationPlan, ResolutionPlanner};
pub use registry::ComponentRegistry;
pub use scope::{ScopeManager, SingletonRecord};
