//! 组件注册表
//!
//! 纯数据存储：按类型保存描述符，并维护限定名和契约索引

use di_abstractions::ComponentDescriptor;
use di_common::{DependencyError, DependencyResult, TypeInfo};
use std::collections::BTreeMap;
use tracing::debug;

/// 组件注册表
///
/// 描述符按类型名有序存放，遍历顺序与注册顺序无关
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    descriptors: BTreeMap<TypeInfo, ComponentDescriptor>,
    qualifiers: BTreeMap<String, TypeInfo>,
}

impl ComponentRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加描述符
    ///
    /// 类型或限定名重复时返回 `DuplicateComponent`
    pub fn insert(&mut self, descriptor: ComponentDescriptor) -> DependencyResult<()> {
        if self.descriptors.contains_key(&descriptor.type_info) {
            return Err(DependencyError::DuplicateComponent {
                type_name: descriptor.type_info.name.clone(),
            });
        }
        if let Some(qualifier) = &descriptor.qualifier {
            if self.qualifiers.contains_key(qualifier) {
                return Err(DependencyError::DuplicateComponent {
                    type_name: format!("{} (限定名 {qualifier})", descriptor.type_info.name),
                });
            }
            self.qualifiers
                .insert(qualifier.clone(), descriptor.type_info.clone());
        }

        debug!(
            "登记组件: {} [{}] 依赖 {} 个",
            descriptor.type_info,
            descriptor.scope,
            descriptor.dependencies.len()
        );
        self.descriptors
            .insert(descriptor.type_info.clone(), descriptor);
        Ok(())
    }

    /// 获取描述符
    pub fn get(&self, key: &TypeInfo) -> Option<&ComponentDescriptor> {
        self.descriptors.get(key)
    }

    /// 是否包含指定类型
    pub fn contains(&self, key: &TypeInfo) -> bool {
        self.descriptors.contains_key(key)
    }

    /// 按限定名查找描述符
    pub fn by_qualifier(&self, qualifier: &str) -> Option<&ComponentDescriptor> {
        self.qualifiers
            .get(qualifier)
            .and_then(|key| self.descriptors.get(key))
    }

    /// 满足契约的全部组件，按类型名排序
    pub fn implementers(&self, contract: &TypeInfo) -> Vec<&ComponentDescriptor> {
        self.descriptors
            .values()
            .filter(|d| d.provides(contract))
            .collect()
    }

    /// 按类型名顺序遍历描述符
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.descriptors.values()
    }

    /// 已注册的类型，按类型名排序
    pub fn keys(&self) -> Vec<TypeInfo> {
        self.descriptors.keys().cloned().collect()
    }

    /// 已注册的限定名，按字典序排序
    pub fn qualifiers(&self) -> Vec<String> {
        self.qualifiers.keys().cloned().collect()
    }

    /// 组件数量
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    trait Store: Send + Sync {}

    struct Memory;
    impl Store for Memory {}

    struct Disk;
    impl Store for Disk {}

    fn memory() -> ComponentDescriptor {
        ComponentDescriptor::builder::<Memory>()
            .named("memory")
            .provides::<dyn Store>(|c| c as Arc<dyn Store>)
            .factory(|_| Ok(Memory))
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.insert(memory()).unwrap();

        let result = registry.insert(ComponentDescriptor::builder::<Memory>().factory(|_| Ok(Memory)));
        assert!(matches!(result, Err(DependencyError::DuplicateComponent { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_qualifier_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.insert(memory()).unwrap();

        let result = registry.insert(
            ComponentDescriptor::builder::<Disk>()
                .named("memory")
                .factory(|_| Ok(Disk)),
        );
        assert!(matches!(result, Err(DependencyError::DuplicateComponent { .. })));
        assert!(!registry.contains(&TypeInfo::of::<Disk>()));
    }

    #[test]
    fn test_implementers_sorted_by_name() {
        let mut registry = ComponentRegistry::new();
        registry.insert(memory()).unwrap();
        registry
            .insert(
                ComponentDescriptor::builder::<Disk>()
                    .provides::<dyn Store>(|c| c as Arc<dyn Store>)
                    .factory(|_| Ok(Disk)),
            )
            .unwrap();

        let names: Vec<&str> = registry
            .implementers(&TypeInfo::of::<dyn Store>())
            .iter()
            .map(|d| d.type_info.short_name())
            .collect();
        assert_eq!(names, vec!["Disk", "Memory"]);
        assert_eq!(
            registry.by_qualifier("memory").map(|d| d.type_info.short_name()),
            Some("Memory")
        );
    }
}
