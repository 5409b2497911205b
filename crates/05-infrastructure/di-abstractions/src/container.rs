//! 依赖注入容器抽象接口
//!
//! 提供依赖注入容器的核心抽象

use crate::descriptor::ComponentDescriptor;
use crate::resolver::ComponentResolver;
use di_common::{ContainerState, DependencyResult, TypeInfo};
use serde::{Deserialize, Serialize};

/// 依赖注入容器 trait
///
/// 生命周期为 `Unconfigured → Validated → Ready → Closed`：
/// 注册只在 `Unconfigured` 下允许，`validate` 一次性分析整张依赖图，
/// 第一次解析使容器进入 `Ready`，`close` 按构造逆序释放单例。
pub trait DiContainer: ComponentResolver {
    /// 注册组件描述符
    fn register(&self, descriptor: ComponentDescriptor) -> DependencyResult<()>;

    /// 批量注册，遇到第一个错误即停止
    fn register_all(
        &self,
        descriptors: impl IntoIterator<Item = ComponentDescriptor>,
    ) -> DependencyResult<()>
    where
        Self: Sized,
    {
        descriptors
            .into_iter()
            .try_for_each(|descriptor| self.register(descriptor))
    }

    /// 验证依赖图并生成实例化计划
    ///
    /// 所有配置问题汇总在一个 `InvalidConfiguration` 中返回
    fn validate(&self) -> DependencyResult<()>;

    /// 丢弃验证结果，回到 `Unconfigured` 以便继续注册
    fn reset(&self) -> DependencyResult<()>;

    /// 关闭容器并释放单例
    fn close(&self) -> DependencyResult<()>;

    /// 当前状态
    fn state(&self) -> ContainerState;

    /// 检查是否已注册组件（使用类型信息）
    fn is_registered_by_key(&self, key: &TypeInfo) -> bool;

    /// 获取所有已注册组件的类型信息，按类型名排序
    fn registered_components(&self) -> Vec<TypeInfo>;

    /// 容器统计信息
    fn stats(&self) -> ContainerStats;

    /// 检查是否已注册组件
    fn is_registered<T: Send + Sync + 'static>(&self) -> bool
    where
        Self: Sized,
    {
        self.is_registered_by_key(&TypeInfo::of::<T>())
    }
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 进入 `Ready` 时是否按计划顺序预先创建全部单例
    pub eager_singletons: bool,
    /// 等待其他线程构造单例的超时时间（毫秒），0 表示一直等到构造结束
    ///
    /// 构造耗时超过该值时，等待方返回 `ResolutionTimeout`，构造本身不受影响，
    /// 完成后的实例照常缓存。构造可能很慢的组件应调大该值或设为 0。
    pub resolution_timeout_ms: u64,
    /// 单线程内最大解析深度，0 表示不限
    pub max_resolution_depth: usize,
    /// 验证成功后是否在 info 级别输出依赖图
    pub log_dependency_graph: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            eager_singletons: true,
            resolution_timeout_ms: 5000,
            max_resolution_depth: 100,
            log_dependency_graph: false,
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    /// 已注册组件数量
    pub registered_components: usize,
    /// 活跃单例数量
    pub active_singletons: usize,
    /// 成功解析次数
    pub total_resolutions: u64,
    /// 解析错误数量
    pub resolution_errors: u64,
    /// 已创建的延迟代理数量
    pub proxies_created: u64,
}
