//! 容器启动器

use crate::error::BootstrapError;
use crate::logging::LoggingConfig;
use crate::settings::layered_config;
use di_abstractions::{ComponentDescriptor, ContainerConfig, DescriptorSource, DiContainer};
use di_impl::DiContainerImpl;
use std::path::PathBuf;
use tracing::{debug, info};

/// 容器启动器
///
/// 收集描述符来源、加载配置、按需初始化日志，注册全部组件并验证，
/// 返回可以直接解析的容器
pub struct ContainerBootstrapper {
    /// 描述符来源列表
    sources: Vec<Box<dyn DescriptorSource>>,
    /// 手工注册的描述符
    descriptors: Vec<ComponentDescriptor>,
    /// 基础容器配置
    config: ContainerConfig,
    /// 配置文件
    config_file: Option<PathBuf>,
    /// 环境变量前缀
    env_prefix: Option<String>,
    /// 日志配置，`None` 时不初始化日志
    logging: Option<LoggingConfig>,
    /// 是否在返回前验证
    validation_enabled: bool,
}

impl ContainerBootstrapper {
    /// 创建新的启动器
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            descriptors: Vec::new(),
            config: ContainerConfig::default(),
            config_file: None,
            env_prefix: None,
            logging: None,
            validation_enabled: true,
        }
    }

    /// 添加描述符来源
    pub fn add_source<S: DescriptorSource + 'static>(mut self, source: S) -> Self {
        debug!("添加描述符来源: {}", source.name());
        self.sources.push(Box::new(source));
        self
    }

    /// 直接注册描述符
    pub fn register(mut self, descriptor: ComponentDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// 设置基础容器配置，配置文件和环境变量在其上叠加
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 从文件加载容器配置
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// 从环境变量加载容器配置
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// 启用或禁用启动时验证
    pub fn enable_validation(mut self, enabled: bool) -> Self {
        self.validation_enabled = enabled;
        self
    }

    /// 构建容器
    pub async fn build(self) -> Result<DiContainerImpl, BootstrapError> {
        // 只有在明确配置了日志时才初始化日志
        if let Some(logging) = &self.logging {
            logging.init()?;
        }
        info!("开始构建容器");

        let config = if self.config_file.is_some() || self.env_prefix.is_some() {
            layered_config(
                &self.config,
                self.config_file.as_deref(),
                self.env_prefix.as_deref(),
            )?
        } else {
            self.config
        };
        let container = DiContainerImpl::with_config(config);

        for source in &self.sources {
            let descriptors =
                source
                    .descriptors()
                    .await
                    .map_err(|e| BootstrapError::Source {
                        name: source.name().to_string(),
                        source: e,
                    })?;
            info!("描述符来源 {} 提供 {} 个组件", source.name(), descriptors.len());
            container.register_all(descriptors)?;
        }
        container.register_all(self.descriptors)?;

        if self.validation_enabled {
            container.validate()?;
        }

        info!("容器 {} 构建完成", container.id());
        Ok(container)
    }
}

impl Default for ContainerBootstrapper {
    fn default() -> Self {
        Self::new()
    }
}
