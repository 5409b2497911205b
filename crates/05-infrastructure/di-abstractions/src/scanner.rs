//! 描述符来源抽象接口
//!
//! 组件发现与容器解耦：任何能产出 [`ComponentDescriptor`] 的东西都可以作为来源

use crate::descriptor::ComponentDescriptor;
use async_trait::async_trait;
use di_common::ComponentError;

/// 描述符来源 trait
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    /// 产出组件描述符
    async fn descriptors(&self) -> Result<Vec<ComponentDescriptor>, ComponentError>;

    /// 获取来源名称
    fn name(&self) -> &str;
}

/// 静态描述符来源
///
/// 持有一组手写的描述符，每次调用都返回副本
pub struct StaticDescriptorSource {
    name: String,
    descriptors: Vec<ComponentDescriptor>,
}

impl StaticDescriptorSource {
    /// 创建新的静态来源
    pub fn new(name: impl Into<String>, descriptors: Vec<ComponentDescriptor>) -> Self {
        Self {
            name: name.into(),
            descriptors,
        }
    }
}

#[async_trait]
impl DescriptorSource for StaticDescriptorSource {
    async fn descriptors(&self) -> Result<Vec<ComponentDescriptor>, ComponentError> {
        Ok(self.descriptors.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
