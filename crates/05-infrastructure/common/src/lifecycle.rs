//! 组件生命周期管理

use serde::{Deserialize, Serialize};
use std::fmt;

/// 组件作用域
///
/// 决定容器如何缓存组件实例
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// 单例模式 - 每个容器最多创建一个实例，由所有使用者共享
    #[default]
    Singleton,
    /// 瞬时模式 - 每次解析都创建新实例
    Transient,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("singleton"),
            Self::Transient => f.write_str("transient"),
        }
    }
}

/// 容器生命周期状态
///
/// `Unconfigured → Validated → Ready → Closed`，其中 `Closed` 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// 未验证，可以继续注册组件
    #[default]
    Unconfigured,
    /// 依赖图已验证，实例化计划已生成
    Validated,
    /// 已开始提供实例
    Ready,
    /// 已关闭
    Closed,
}

impl ContainerState {
    /// 是否允许注册组件
    pub fn accepts_registration(self) -> bool {
        matches!(self, Self::Unconfigured)
    }

    /// 是否已进入终态
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "Unconfigured",
            Self::Validated => "Validated",
            Self::Ready => "Ready",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// 可释放组件 trait
///
/// 单例在容器关闭时按构造的逆序调用 [`Disposable::dispose`]
pub trait Disposable: Send + Sync {
    /// 释放组件持有的资源
    fn dispose(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
