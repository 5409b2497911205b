//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义组件描述、依赖解析和延迟代理的核心接口。
//!
//! ## 核心接口
//!
//! - [`ComponentDescriptor`] - 规范化的组件描述符
//! - [`DescriptorSource`] - 描述符来源（扫描器、显式注册等）
//! - [`ComponentResolver`] - 组件解析器接口
//! - [`DiContainer`] - 容器门面接口
//! - [`LazyProxy`] - 用于打破循环依赖的延迟代理

pub mod container;
pub mod descriptor;
pub mod proxy;
pub mod resolver;
pub mod scanner;

pub use container::*;
pub use descriptor::*;
pub use proxy::*;
pub use resolver::*;
pub use scanner::*;

pub use di_common::{
    ComponentError, ConfigurationProblem, ConfigurationReport, ContainerState, DependencyError,
    DependencyResult, Disposable, ErrorKind, Scope, TypeInfo,
};
