//! 错误类型定义

use crate::lifecycle::ContainerState;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// 共享的底层错误，保证 [`DependencyError`] 可以克隆给所有等待者
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// 配置问题
///
/// 在 `validate()` 期间收集，每一项都指明涉及的类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationProblem {
    #[error("依赖未满足: {consumer} 需要 {dependency}")]
    UnsatisfiedDependency { consumer: String, dependency: String },

    #[error("依赖不明确: {consumer} 需要 {dependency}, 候选: {}", .candidates.join(", "))]
    AmbiguousDependency {
        consumer: String,
        dependency: String,
        candidates: Vec<String>,
    },

    #[error("检测到无法打破的循环依赖: {{{}}}", .members.join(", "))]
    FatalCycle { members: Vec<String> },
}

impl ConfigurationProblem {
    /// 问题涉及的全部类型名
    pub fn implicated_types(&self) -> Vec<&str> {
        match self {
            Self::UnsatisfiedDependency {
                consumer,
                dependency,
            } => vec![consumer.as_str(), dependency.as_str()],
            Self::AmbiguousDependency {
                consumer,
                dependency,
                candidates,
            } => {
                let mut names = vec![consumer.as_str(), dependency.as_str()];
                names.extend(candidates.iter().map(String::as_str));
                names
            }
            Self::FatalCycle { members } => members.iter().map(String::as_str).collect(),
        }
    }
}

/// 配置诊断报告
///
/// 一次 `validate()` 发现的全部问题
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationReport {
    pub problems: Vec<ConfigurationProblem>,
}

impl ConfigurationReport {
    /// 从问题列表创建报告
    pub fn new(problems: Vec<ConfigurationProblem>) -> Self {
        Self { problems }
    }

    /// 是否没有任何问题
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// 问题数量
    pub fn len(&self) -> usize {
        self.problems.len()
    }

    /// 未满足的依赖
    pub fn unsatisfied(&self) -> impl Iterator<Item = &ConfigurationProblem> {
        self.problems
            .iter()
            .filter(|p| matches!(p, ConfigurationProblem::UnsatisfiedDependency { .. }))
    }

    /// 不明确的依赖
    pub fn ambiguous(&self) -> impl Iterator<Item = &ConfigurationProblem> {
        self.problems
            .iter()
            .filter(|p| matches!(p, ConfigurationProblem::AmbiguousDependency { .. }))
    }

    /// 致命循环
    pub fn fatal_cycles(&self) -> impl Iterator<Item = &ConfigurationProblem> {
        self.problems
            .iter()
            .filter(|p| matches!(p, ConfigurationProblem::FatalCycle { .. }))
    }
}

impl fmt::Display for ConfigurationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "发现 {} 个配置问题", self.problems.len())?;
        for problem in &self.problems {
            write!(f, "\n  - {problem}")?;
        }
        Ok(())
    }
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 组件声明有误，修正后可重新验证
    Configuration,
    /// 调用方请求了无法解析的类型
    Resolution,
    /// 组件工厂或释放钩子失败
    Construction,
    /// 容器内部不变量被破坏，属于缺陷
    InternalConsistency,
    /// 在非法状态下调用了容器操作
    State,
}

/// 依赖注入错误类型
#[derive(Error, Debug, Clone)]
pub enum DependencyError {
    #[error("组件未注册: {type_name}")]
    ComponentNotRegistered { type_name: String },

    #[error("组件重复注册: {type_name}")]
    DuplicateComponent { type_name: String },

    #[error("容器配置无效: {report}")]
    InvalidConfiguration { report: ConfigurationReport },

    #[error("契约存在多个实现: {contract}, 候选: {}", .candidates.join(", "))]
    AmbiguousResolution {
        contract: String,
        candidates: Vec<String>,
    },

    #[error("容器状态不允许该操作: {operation} (当前状态 {state})")]
    IllegalState {
        operation: &'static str,
        state: ContainerState,
    },

    #[error("组件创建失败: {type_name}, 原因: {source}")]
    ComponentCreationFailed {
        type_name: String,
        source: SharedError,
    },

    #[error("依赖解析失败: {type_name}, 原因: {message}")]
    DependencyResolutionFailed { type_name: String, message: String },

    #[error("类型转换失败: {type_name}")]
    TypeMismatch { type_name: String },

    #[error("实例化计划生成失败，剩余组件: {}", .remaining.join(", "))]
    PlanningError { remaining: Vec<String> },

    #[error("运行时检测到循环解析: {}", .chain.join(" -> "))]
    CircularResolution { chain: Vec<String> },

    #[error("等待单例构造超时: {type_name} ({waited_ms} ms)")]
    ResolutionTimeout { type_name: String, waited_ms: u64 },

    #[error("解析深度超过上限 {max_depth}: {type_name}")]
    ResolutionDepthExceeded { type_name: String, max_depth: usize },

    #[error("组件释放失败: {}", format_failures(.failures))]
    TeardownFailed { failures: Vec<(String, String)> },
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, reason)| format!("{name}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl DependencyError {
    /// 错误所属分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateComponent { .. } | Self::InvalidConfiguration { .. } => {
                ErrorKind::Configuration
            }
            Self::ComponentNotRegistered { .. }
            | Self::AmbiguousResolution { .. }
            | Self::TypeMismatch { .. } => ErrorKind::Resolution,
            Self::ComponentCreationFailed { .. }
            | Self::ResolutionTimeout { .. }
            | Self::TeardownFailed { .. } => ErrorKind::Construction,
            Self::DependencyResolutionFailed { .. }
            | Self::PlanningError { .. }
            | Self::CircularResolution { .. }
            | Self::ResolutionDepthExceeded { .. } => ErrorKind::InternalConsistency,
            Self::IllegalState { .. } => ErrorKind::State,
        }
    }

    /// 稍后重试是否可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ComponentCreationFailed { .. } | Self::ResolutionTimeout { .. }
        )
    }

    /// 配置报告（仅 `InvalidConfiguration`）
    pub fn report(&self) -> Option<&ConfigurationReport> {
        match self {
            Self::InvalidConfiguration { report } => Some(report),
            _ => None,
        }
    }

    /// 将工厂返回的错误包装为构造错误
    pub fn creation_failed(
        type_name: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::ComponentCreationFailed {
            type_name: type_name.into(),
            source: Arc::from(source),
        }
    }
}

/// 组件错误类型
///
/// 描述符来源（扫描器、注册构建器等）产生的错误
#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("组件扫描失败: {message}")]
    ScanError { message: String },

    #[error("组件元数据无效: {message}")]
    InvalidMetadata { message: String },

    #[error("组件注册失败: {source}")]
    RegistrationError {
        #[from]
        source: DependencyError,
    },
}

impl ComponentError {
    /// 创建扫描错误
    pub fn scan_error(message: impl Into<String>) -> Self {
        Self::ScanError {
            message: message.into(),
        }
    }

    /// 创建元数据错误
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }
}

/// 结果类型别名
pub type DependencyResult<T> = Result<T, DependencyError>;
pub type ComponentResult<T> = Result<T, ComponentError>;
