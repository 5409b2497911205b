//! 容器配置加载
//!
//! 以默认值为底，依次叠加配置文件和环境变量。环境变量形如
//! `<PREFIX>_EAGER_SINGLETONS`、`<PREFIX>_RESOLUTION_TIMEOUT_MS`。

use crate::error::BootstrapError;
use di_abstractions::ContainerConfig;
use std::path::Path;
use tracing::{debug, error};

/// 加载容器配置
///
/// 文件格式由扩展名决定（toml / json / yaml），未提供的字段使用默认值
pub fn load_container_config(
    file: Option<&Path>,
    env_prefix: Option<&str>,
) -> Result<ContainerConfig, BootstrapError> {
    layered_config(&ContainerConfig::default(), file, env_prefix)
}

pub(crate) fn layered_config(
    base: &ContainerConfig,
    file: Option<&Path>,
    env_prefix: Option<&str>,
) -> Result<ContainerConfig, BootstrapError> {
    let mut builder = config::Config::builder().add_source(config::Config::try_from(base)?);

    if let Some(path) = file {
        debug!("加载容器配置文件: {}", path.display());
        builder = builder.add_source(config::File::from(path).required(true));
    }
    if let Some(prefix) = env_prefix {
        debug!("加载容器配置环境变量，前缀: {}", prefix);
        builder = builder.add_source(config::Environment::with_prefix(prefix).try_parsing(true));
    }

    let settings = builder.build().map_err(|e| {
        error!("容器配置构建失败: {}", e);
        BootstrapError::from(e)
    })?;
    let loaded: ContainerConfig = settings.try_deserialize()?;

    debug!("容器配置: {:?}", loaded);
    Ok(loaded)
}
