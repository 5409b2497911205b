//! 循环依赖分析
//!
//! 用强连通分量找出依赖图中的循环。每个非平凡分量内选出最小的契约边标记为
//! 打破（构造时由延迟代理满足），然后在剩余的图上重新计算，直到不存在循环。
//! 分量内没有契约边时记为致命循环。自环总是致命的。

use crate::graph::{DependencyEdge, DependencyGraph};
use di_common::{ConfigurationProblem, TypeInfo};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 循环分析结果
#[derive(Debug, Clone, Default)]
pub struct CycleAnalysis {
    broken_edges: Vec<DependencyEdge>,
    fatal_cycles: Vec<Vec<TypeInfo>>,
}

impl CycleAnalysis {
    /// 被打破的边，按选中的先后排列
    pub fn broken_edges(&self) -> &[DependencyEdge] {
        &self.broken_edges
    }

    /// 致命循环，每个循环的成员按类型名排序
    pub fn fatal_cycles(&self) -> &[Vec<TypeInfo>] {
        &self.fatal_cycles
    }

    /// 指定边是否被打破
    pub fn is_broken(&self, edge: &DependencyEdge) -> bool {
        self.is_broken_slot(&edge.consumer, edge.slot)
    }

    /// 使用方的指定依赖位置是否由代理满足
    pub fn is_broken_slot(&self, consumer: &TypeInfo, slot: usize) -> bool {
        self.broken_edges
            .iter()
            .any(|edge| &edge.consumer == consumer && edge.slot == slot)
    }

    /// 是否没有致命循环
    pub fn is_resolvable(&self) -> bool {
        self.fatal_cycles.is_empty()
    }

    /// 致命循环对应的配置问题
    pub fn problems(&self) -> Vec<ConfigurationProblem> {
        self.fatal_cycles
            .iter()
            .map(|members| ConfigurationProblem::FatalCycle {
                members: members.iter().map(|t| t.name.clone()).collect(),
            })
            .collect()
    }
}

/// 循环分析器
pub struct CycleAnalyzer;

impl CycleAnalyzer {
    /// 分析依赖图
    ///
    /// 收集全部致命循环后才返回，不会在第一个问题处停止
    pub fn analyze(graph: &DependencyGraph) -> CycleAnalysis {
        let mut analysis = CycleAnalysis::default();
        let mut excluded: BTreeSet<TypeInfo> = BTreeSet::new();

        for edge in graph.edges().iter().filter(|e| e.is_self_loop()) {
            if excluded.insert(edge.consumer.clone()) {
                debug!("自环: {}", edge.consumer);
                analysis.fatal_cycles.push(vec![edge.consumer.clone()]);
            }
        }

        loop {
            let active: Vec<&DependencyEdge> = graph
                .edges()
                .iter()
                .filter(|e| {
                    !e.is_self_loop()
                        && !excluded.contains(&e.consumer)
                        && !excluded.contains(&e.dependency)
                        && !analysis.is_broken(e)
                })
                .collect();

            let components: Vec<Vec<TypeInfo>> = strongly_connected(graph.nodes(), &active)
                .into_iter()
                .filter(|component| component.len() > 1)
                .collect();
            if components.is_empty() {
                break;
            }

            for members in components {
                let member_set: BTreeSet<&TypeInfo> = members.iter().collect();
                let candidate = active
                    .iter()
                    .filter(|e| {
                        e.is_contract()
                            && member_set.contains(&e.consumer)
                            && member_set.contains(&e.dependency)
                    })
                    .min_by(|a, b| {
                        (&a.consumer, &a.dependency, a.slot).cmp(&(&b.consumer, &b.dependency, b.slot))
                    });

                match candidate {
                    Some(edge) => {
                        debug!(
                            "打破循环边: {} -> {} (位置 {})",
                            edge.consumer, edge.dependency, edge.slot
                        );
                        analysis.broken_edges.push((*edge).clone());
                    }
                    None => {
                        debug!("致命循环: {:?}", members.iter().map(TypeInfo::short_name).collect::<Vec<_>>());
                        excluded.extend(members.iter().cloned());
                        analysis.fatal_cycles.push(members);
                    }
                }
            }
        }

        analysis
    }
}

/// Tarjan 强连通分量算法（迭代实现）
///
/// 返回的每个分量按类型名排序，分量之间按最小成员排序
fn strongly_connected(nodes: &[TypeInfo], edges: &[&DependencyEdge]) -> Vec<Vec<TypeInfo>> {
    const UNVISITED: usize = usize::MAX;

    let position: BTreeMap<&TypeInfo, usize> =
        nodes.iter().enumerate().map(|(i, node)| (node, i)).collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        if let (Some(&from), Some(&to)) = (position.get(&edge.consumer), position.get(&edge.dependency)) {
            adjacency[from].push(to);
        }
    }
    for targets in &mut adjacency {
        targets.sort_unstable();
        targets.dedup();
    }

    let mut index = vec![UNVISITED; nodes.len()];
    let mut low = vec![0; nodes.len()];
    let mut on_stack = vec![false; nodes.len()];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0;
    let mut components = Vec::new();

    for start in 0..nodes.len() {
        if index[start] != UNVISITED {
            continue;
        }

        index[start] = counter;
        low[start] = counter;
        counter += 1;
        stack.push(start);
        on_stack[start] = true;
        let mut work: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = work.last_mut() {
            let v = frame.0;
            if frame.1 < adjacency[v].len() {
                let w = adjacency[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = counter;
                    low[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(nodes[w].clone());
                    if w == v {
                        break;
                    }
                }
                component.sort();
                components.push(component);
            }
        }
    }

    components.sort();
    components
}
