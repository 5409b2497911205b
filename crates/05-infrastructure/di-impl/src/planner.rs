//! 实例化计划
//!
//! 在去掉被打破的边之后对依赖图做拓扑排序，同时就绪的节点按类型名升序排列

use crate::cycles::CycleAnalysis;
use crate::graph::DependencyGraph;
use di_common::{DependencyError, DependencyResult, TypeInfo};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 实例化计划
///
/// 除被打破的边外，每个依赖都排在使用它的组件之前
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstantiationPlan {
    order: Vec<TypeInfo>,
}

impl InstantiationPlan {
    /// 构造顺序
    pub fn order(&self) -> &[TypeInfo] {
        &self.order
    }

    /// 组件在计划中的位置
    pub fn position(&self, key: &TypeInfo) -> Option<usize> {
        self.order.iter().position(|entry| entry == key)
    }

    /// 按顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.order.iter()
    }

    /// 组件数量
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 重新检查每条未打破的边是否满足先后顺序
    pub fn verify(&self, graph: &DependencyGraph, analysis: &CycleAnalysis) -> DependencyResult<()> {
        let positions: BTreeMap<&TypeInfo, usize> =
            self.order.iter().enumerate().map(|(i, key)| (key, i)).collect();

        let violations: BTreeSet<String> = graph
            .edges()
            .iter()
            .filter(|edge| !analysis.is_broken(edge))
            .filter(|edge| {
                match (positions.get(&edge.dependency), positions.get(&edge.consumer)) {
                    (Some(dependency), Some(consumer)) => dependency >= consumer,
                    _ => true,
                }
            })
            .map(|edge| edge.consumer.name.clone())
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(DependencyError::PlanningError {
                remaining: violations.into_iter().collect(),
            })
        }
    }
}

/// 解析计划生成器
pub struct ResolutionPlanner;

impl ResolutionPlanner {
    /// 生成实例化计划
    ///
    /// 残留的循环说明循环分析遗漏了问题，返回 `PlanningError`
    pub fn plan(graph: &DependencyGraph, analysis: &CycleAnalysis) -> DependencyResult<InstantiationPlan> {
        let mut pending: BTreeMap<&TypeInfo, usize> =
            graph.nodes().iter().map(|node| (node, 0)).collect();
        let mut dependents: BTreeMap<&TypeInfo, Vec<&TypeInfo>> = BTreeMap::new();

        for edge in graph.edges().iter().filter(|edge| !analysis.is_broken(edge)) {
            if let Some(count) = pending.get_mut(&edge.consumer) {
                *count += 1;
            }
            dependents.entry(&edge.dependency).or_default().push(&edge.consumer);
        }

        let mut ready: BTreeSet<&TypeInfo> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&node, _)| node)
            .collect();
        let mut order = Vec::with_capacity(graph.node_count());

        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            for &consumer in dependents.get(node).into_iter().flatten() {
                if let Some(count) = pending.get_mut(consumer) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(consumer);
                    }
                }
            }
        }

        if order.len() != graph.node_count() {
            let placed: BTreeSet<&TypeInfo> = order.iter().collect();
            let remaining = graph
                .nodes()
                .iter()
                .filter(|node| !placed.contains(node))
                .map(|node| node.name.clone())
                .collect();
            return Err(DependencyError::PlanningError { remaining });
        }

        debug!(
            "实例化顺序: {}",
            order.iter().map(TypeInfo::short_name).collect::<Vec<_>>().join(" -> ")
        );
        Ok(InstantiationPlan { order })
    }
}
