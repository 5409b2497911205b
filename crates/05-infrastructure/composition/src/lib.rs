//! # 容器组合层
//!
//! 负责把描述符来源、容器配置和日志组装成一个可以直接使用的容器。
//!
//! ## 主要功能
//!
//! - **容器启动器**: 收集描述符来源并完成注册和验证
//! - **配置加载**: 默认值、配置文件、环境变量逐层叠加
//! - **日志初始化**: 开发和生产环境的 `tracing-subscriber` 预设
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::{ComponentDescriptor, ComponentResolver};
//! use di_composition::{ContainerBootstrapper, LoggingConfig};
//!
//! struct AppConfig {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let container = ContainerBootstrapper::new()
//!         .with_logging(LoggingConfig::development())
//!         .with_env_prefix("LORN_DI")
//!         .register(ComponentDescriptor::instance(AppConfig {
//!             name: "demo".to_string(),
//!         }))
//!         .build()
//!         .await?;
//!
//!     let config = container.resolve::<AppConfig>()?;
//!     println!("应用名称: {}", config.name);
//!     Ok(())
//! }
//! ```

pub mod bootstrapper;
pub mod error;
pub mod logging;
pub mod settings;

pub use bootstrapper::ContainerBootstrapper;
pub use error::BootstrapError;
pub use logging::LoggingConfig;
pub use settings::load_container_config;

#[cfg(test)]
mod tests {
    mod integration_tests;
}
