//! 依赖图构建
//!
//! 每个组件一个节点，每条已满足的依赖声明一条边（使用方 → 提供方）。
//! 契约依赖的边指向唯一匹配的具体组件，边的类型保留声明时的依赖类型，
//! 循环分析据此判断哪些边可以用代理打破。

use crate::registry::ComponentRegistry;
use di_abstractions::{ComponentDescriptor, DependencyKind, DependencySpec};
use di_common::{ConfigurationProblem, TypeInfo};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 依赖边
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// 使用方
    pub consumer: TypeInfo,
    /// 提供方（具体组件）
    pub dependency: TypeInfo,
    /// 声明时的依赖类型
    pub kind: DependencyKind,
    /// 依赖在使用方声明中的位置
    pub slot: usize,
}

impl DependencyEdge {
    /// 是否为自环
    pub fn is_self_loop(&self) -> bool {
        self.consumer == self.dependency
    }

    /// 是否可以由代理满足
    pub fn is_contract(&self) -> bool {
        self.kind == DependencyKind::Contract
    }
}

/// 依赖图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<TypeInfo>,
    edges: Vec<DependencyEdge>,
    outgoing: BTreeMap<TypeInfo, Vec<usize>>,
    bindings: BTreeMap<TypeInfo, Vec<Option<TypeInfo>>>,
}

impl DependencyGraph {
    /// 全部节点，按类型名排序
    pub fn nodes(&self) -> &[TypeInfo] {
        &self.nodes
    }

    /// 全部边，按使用方和声明顺序排列
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// 从指定节点出发的边
    pub fn edges_from<'a>(&'a self, consumer: &TypeInfo) -> impl Iterator<Item = &'a DependencyEdge> {
        self.outgoing
            .get(consumer)
            .into_iter()
            .flatten()
            .map(move |&index| &self.edges[index])
    }

    /// 使用方每个依赖位置绑定的提供方，缺失的可选依赖为 `None`
    pub fn bindings(&self, consumer: &TypeInfo) -> &[Option<TypeInfo>] {
        self.bindings
            .get(consumer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// 节点数量
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 边数量
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// 在 info 级别输出每个节点及其出边
    pub fn log_structure(&self) {
        info!(
            "依赖图: {} 个节点, {} 条边",
            self.node_count(),
            self.edge_count()
        );
        for node in &self.nodes {
            let targets: Vec<String> = self
                .edges_from(node)
                .map(|edge| match edge.kind {
                    DependencyKind::Contract => format!("{} (契约)", edge.dependency.short_name()),
                    DependencyKind::Concrete => edge.dependency.short_name().to_string(),
                })
                .collect();
            if targets.is_empty() {
                info!("  {}", node.short_name());
            } else {
                info!("  {} -> [{}]", node.short_name(), targets.join(", "));
            }
        }
    }
}

/// 依赖图构建器
pub struct GraphBuilder;

impl GraphBuilder {
    /// 从注册表构建依赖图
    ///
    /// 未满足和不明确的依赖不会产生边，全部作为配置问题返回
    pub fn build(registry: &ComponentRegistry) -> (DependencyGraph, Vec<ConfigurationProblem>) {
        let mut graph = DependencyGraph {
            nodes: registry.keys(),
            ..DependencyGraph::default()
        };
        let mut problems = Vec::new();

        for descriptor in registry.iter() {
            let consumer = &descriptor.type_info;
            let mut slots = Vec::with_capacity(descriptor.dependencies.len());

            for (slot, spec) in descriptor.dependencies.iter().enumerate() {
                let candidates = Self::candidates(registry, spec);
                let provider = match candidates.as_slice() {
                    [] if spec.optional => {
                        warn!("可选依赖缺失: {} 需要 {}", consumer, spec.target);
                        None
                    }
                    [] => {
                        problems.push(ConfigurationProblem::UnsatisfiedDependency {
                            consumer: consumer.name.clone(),
                            dependency: Self::describe(spec),
                        });
                        None
                    }
                    [only] => Some(only.type_info.clone()),
                    many => {
                        problems.push(ConfigurationProblem::AmbiguousDependency {
                            consumer: consumer.name.clone(),
                            dependency: Self::describe(spec),
                            candidates: many.iter().map(|d| d.type_info.name.clone()).collect(),
                        });
                        None
                    }
                };

                if let Some(dependency) = &provider {
                    debug!("依赖边: {} -> {} [{:?}]", consumer, dependency, spec.kind);
                    graph
                        .outgoing
                        .entry(consumer.clone())
                        .or_default()
                        .push(graph.edges.len());
                    graph.edges.push(DependencyEdge {
                        consumer: consumer.clone(),
                        dependency: dependency.clone(),
                        kind: spec.kind,
                        slot,
                    });
                }
                slots.push(provider);
            }

            graph.bindings.insert(consumer.clone(), slots);
        }

        (graph, problems)
    }

    fn candidates<'a>(
        registry: &'a ComponentRegistry,
        spec: &DependencySpec,
    ) -> Vec<&'a ComponentDescriptor> {
        let matching: Vec<&ComponentDescriptor> = match spec.kind {
            DependencyKind::Concrete => registry.get(&spec.target).into_iter().collect(),
            DependencyKind::Contract => registry.implementers(&spec.target),
        };
        match &spec.qualifier {
            Some(qualifier) => matching
                .into_iter()
                .filter(|d| d.qualifier.as_deref() == Some(qualifier.as_str()))
                .collect(),
            None => matching,
        }
    }

    fn describe(spec: &DependencySpec) -> String {
        match &spec.qualifier {
            Some(qualifier) => format!("{} (限定名 {qualifier})", spec.target),
            None => spec.target.name.clone(),
        }
    }
}
