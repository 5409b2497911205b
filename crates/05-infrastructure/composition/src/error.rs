//! 启动错误

use di_common::{ComponentError, DependencyError};
use thiserror::Error;

/// 容器启动错误
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("容器配置加载失败: {source}")]
    Config {
        #[from]
        source: config::ConfigError,
    },

    #[error("描述符来源 {name} 失败: {source}")]
    Source {
        name: String,
        #[source]
        source: ComponentError,
    },

    #[error("容器启动失败: {source}")]
    Dependency {
        #[from]
        source: DependencyError,
    },

    #[error("日志初始化失败: {message}")]
    LoggingInit { message: String },
}

impl BootstrapError {
    /// 底层的依赖注入错误
    pub fn dependency_error(&self) -> Option<&DependencyError> {
        match self {
            Self::Dependency { source } => Some(source),
            _ => None,
        }
    }
}
