//! # DI Common
//!
//! 依赖注入容器各层共享的基础类型。
//!
//! ## 核心类型
//!
//! - [`TypeInfo`] - 组件与契约的类型标识
//! - [`Scope`] - 组件生命周期策略
//! - [`ContainerState`] - 容器状态机
//! - [`Disposable`] - 单例释放钩子
//! - [`DependencyError`] - 依赖注入错误分类

pub mod errors;
pub mod lifecycle;
pub mod metadata;

pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
