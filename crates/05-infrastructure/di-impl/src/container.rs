//! 依赖注入容器实现
//!
//! 编排注册表、依赖图、循环分析、实例化计划和作用域管理。
//! `validate` 持有状态写锁完成整个分析阶段，其他调用方看不到中间结果。

use crate::cycles::{CycleAnalysis, CycleAnalyzer};
use crate::graph::{DependencyEdge, DependencyGraph, GraphBuilder};
use crate::planner::{InstantiationPlan, ResolutionPlanner};
use crate::registry::ComponentRegistry;
use crate::scope::{ScopeManager, SingletonRecord};
use di_abstractions::{
    ComponentDescriptor, ComponentResolver, ContainerConfig, ContainerStats, Dependencies,
    DependencySpec, DiContainer, Instance, ProxyResolver, ResolveContext, ResolvedDependency,
};
use di_common::{
    ConfigurationReport, ContainerState, DependencyError, DependencyResult, Scope, TypeInfo,
};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 验证成功后的不可变布线结果
struct Wiring {
    registry: ComponentRegistry,
    graph: DependencyGraph,
    analysis: CycleAnalysis,
    plan: InstantiationPlan,
}

impl Wiring {
    fn build(registry: ComponentRegistry, config: &ContainerConfig) -> DependencyResult<Self> {
        let (graph, mut problems) = GraphBuilder::build(&registry);
        if config.log_dependency_graph {
            graph.log_structure();
        }

        let analysis = CycleAnalyzer::analyze(&graph);
        problems.extend(analysis.problems());
        if !problems.is_empty() {
            let report = ConfigurationReport::new(problems);
            error!("容器验证失败: {}", report);
            return Err(DependencyError::InvalidConfiguration { report });
        }

        let plan = ResolutionPlanner::plan(&graph, &analysis)?;
        plan.verify(&graph, &analysis)?;

        Ok(Self {
            registry,
            graph,
            analysis,
            plan,
        })
    }
}

#[derive(Default)]
struct StatsCounters {
    resolutions: AtomicU64,
    errors: AtomicU64,
    proxies: AtomicU64,
}

struct ContainerInner {
    id: Uuid,
    config: ContainerConfig,
    state: RwLock<ContainerState>,
    registry: RwLock<ComponentRegistry>,
    wiring: RwLock<Option<Arc<Wiring>>>,
    scopes: ScopeManager,
    counters: StatsCounters,
}

impl ContainerInner {
    fn wiring(&self) -> DependencyResult<Arc<Wiring>> {
        let wiring = self.wiring.read().clone();
        wiring.ok_or_else(|| DependencyError::IllegalState {
            operation: "resolve",
            state: *self.state.read(),
        })
    }

    fn validate(&self) -> DependencyResult<()> {
        let mut state = self.state.write();
        match *state {
            ContainerState::Unconfigured => {}
            ContainerState::Validated | ContainerState::Ready => return Ok(()),
            ContainerState::Closed => {
                return Err(DependencyError::IllegalState {
                    operation: "validate",
                    state: ContainerState::Closed,
                })
            }
        }

        let registry = self.registry.read().clone();
        let component_count = registry.len();
        let wiring = Wiring::build(registry, &self.config)?;
        let broken = wiring.analysis.broken_edges().len();

        *self.wiring.write() = Some(Arc::new(wiring));
        *state = ContainerState::Validated;
        info!(
            "容器 {} 验证成功: {} 个组件, {} 条边由代理满足",
            self.id, component_count, broken
        );
        Ok(())
    }

    /// 确保容器处于 `Ready`，必要时先隐式验证并预热单例
    fn ensure_ready(self: &Arc<Self>) -> DependencyResult<Arc<Wiring>> {
        loop {
            let current = *self.state.read();
            match current {
                ContainerState::Ready => return self.wiring(),
                ContainerState::Closed => {
                    return Err(DependencyError::IllegalState {
                        operation: "resolve",
                        state: ContainerState::Closed,
                    })
                }
                ContainerState::Unconfigured => {
                    debug!("容器 {} 尚未验证，解析前隐式验证", self.id);
                    self.validate()?;
                }
                ContainerState::Validated => {
                    let mut state = self.state.write();
                    if *state != ContainerState::Validated {
                        continue;
                    }
                    *state = ContainerState::Ready;
                    drop(state);
                    info!("容器 {} 已就绪", self.id);

                    let wiring = self.wiring()?;
                    if self.config.eager_singletons {
                        self.prewarm(&wiring);
                    }
                    return Ok(wiring);
                }
            }
        }
    }

    fn prewarm(self: &Arc<Self>, wiring: &Arc<Wiring>) {
        let singletons: Vec<&TypeInfo> = wiring
            .plan
            .iter()
            .filter(|key| {
                wiring
                    .registry
                    .get(key)
                    .is_some_and(|d| d.scope == Scope::Singleton)
            })
            .collect();

        debug!("预热 {} 个单例", singletons.len());
        for key in singletons {
            if let Err(e) = self.resolve_component(wiring, key) {
                warn!("单例预热失败，留待按需重试: {} - {}", key, e);
            }
        }
    }

    fn resolve_component(
        self: &Arc<Self>,
        wiring: &Arc<Wiring>,
        key: &TypeInfo,
    ) -> DependencyResult<Instance> {
        let descriptor =
            wiring
                .registry
                .get(key)
                .ok_or_else(|| DependencyError::ComponentNotRegistered {
                    type_name: key.name.clone(),
                })?;

        if descriptor.scope == Scope::Singleton {
            if let Some(instance) = self.scopes.get(key) {
                return Ok(instance);
            }
        }

        let _guard = ResolveContext::enter(key, self.config.max_resolution_depth)?;
        self.scopes.get_or_create(
            key,
            descriptor.scope,
            descriptor.disposer(),
            || self.construct(wiring, descriptor),
        )
    }

    fn construct(
        self: &Arc<Self>,
        wiring: &Arc<Wiring>,
        descriptor: &ComponentDescriptor,
    ) -> DependencyResult<Instance> {
        let consumer = &descriptor.type_info;
        let bindings = wiring.graph.bindings(consumer);
        let mut resolved = Vec::with_capacity(descriptor.dependencies.len());

        for (slot, spec) in descriptor.dependencies.iter().enumerate() {
            let provider = bindings.get(slot).cloned().flatten();
            let value = match provider {
                None => {
                    debug!("可选依赖缺失: {} 的第 {} 个依赖 {}", consumer, slot, spec.target);
                    None
                }
                Some(provider) if wiring.analysis.is_broken_slot(consumer, slot) => {
                    Some(self.create_proxy(spec, provider)?)
                }
                Some(provider) => Some(self.dependency_view(wiring, spec, &provider)?),
            };
            resolved.push(ResolvedDependency {
                target: spec.target.clone(),
                kind: spec.kind,
                qualifier: spec.qualifier.clone(),
                value,
            });
        }

        let dependencies = Dependencies::new(consumer.clone(), resolved);
        // 工厂中调用的代理解析失败时以 DependencyError 为载荷 panic
        match panic::catch_unwind(AssertUnwindSafe(|| descriptor.create(&dependencies))) {
            Ok(result) => {
                result.map_err(|e| DependencyError::creation_failed(consumer.name.clone(), e))
            }
            Err(payload) => match payload.downcast::<DependencyError>() {
                Ok(error) => {
                    warn!("{} 的工厂中代理解析失败: {}", consumer, error);
                    Err(*error)
                }
                Err(other) => panic::resume_unwind(other),
            },
        }
    }

    fn dependency_view(
        self: &Arc<Self>,
        wiring: &Arc<Wiring>,
        spec: &DependencySpec,
        provider: &TypeInfo,
    ) -> DependencyResult<Instance> {
        if spec.is_contract() {
            self.contract_view(wiring, &spec.target, provider)
        } else {
            self.resolve_component(wiring, provider)
        }
    }

    fn contract_view(
        self: &Arc<Self>,
        wiring: &Arc<Wiring>,
        contract: &TypeInfo,
        provider: &TypeInfo,
    ) -> DependencyResult<Instance> {
        let instance = self.resolve_component(wiring, provider)?;
        wiring
            .registry
            .get(provider)
            .and_then(|d| d.contract_binding(contract))
            .and_then(|binding| binding.cast(instance))
            .ok_or_else(|| DependencyError::TypeMismatch {
                type_name: contract.name.clone(),
            })
    }

    /// 为被打破的边创建延迟代理，代理首次调用时经由作用域管理解析真实委托
    fn create_proxy(
        self: &Arc<Self>,
        spec: &DependencySpec,
        provider: TypeInfo,
    ) -> DependencyResult<Instance> {
        let container: Weak<ContainerInner> = Arc::downgrade(self);
        let contract = spec.target.clone();
        let resolver: ProxyResolver = Box::new(move || {
            let inner = container.upgrade().ok_or(DependencyError::IllegalState {
                operation: "proxy",
                state: ContainerState::Closed,
            })?;
            let wiring = inner.ensure_ready()?;
            inner.contract_view(&wiring, &contract, &provider)
        });

        let proxy = spec
            .create_proxy(resolver)
            .ok_or_else(|| DependencyError::TypeMismatch {
                type_name: spec.target.name.clone(),
            })?;
        self.counters.proxies.fetch_add(1, Ordering::Relaxed);
        debug!("创建延迟代理: {}", spec.target);
        Ok(proxy)
    }

    fn resolve_contract(
        self: &Arc<Self>,
        contract: &TypeInfo,
        qualifier: Option<&str>,
    ) -> DependencyResult<Instance> {
        let wiring = self.ensure_ready()?;
        let candidates: Vec<TypeInfo> = wiring
            .registry
            .implementers(contract)
            .into_iter()
            .filter(|d| qualifier.map_or(true, |q| d.qualifier.as_deref() == Some(q)))
            .map(|d| d.type_info.clone())
            .collect();

        match candidates.as_slice() {
            [] => Err(DependencyError::ComponentNotRegistered {
                type_name: match qualifier {
                    Some(q) => format!("{contract} (限定名 {q})"),
                    None => contract.name.clone(),
                },
            }),
            [provider] => self.contract_view(&wiring, contract, provider),
            many => Err(DependencyError::AmbiguousResolution {
                contract: contract.name.clone(),
                candidates: many.iter().map(|t| t.name.clone()).collect(),
            }),
        }
    }

    fn track<T>(&self, result: DependencyResult<T>) -> DependencyResult<T> {
        match &result {
            Ok(_) => {
                self.counters.resolutions.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!("容器 {} 解析失败: {}", self.id, e);
            }
        }
        result
    }
}

/// 具体的依赖注入容器实现
///
/// 克隆得到的是同一个容器的句柄
#[derive(Clone)]
pub struct DiContainerImpl {
    inner: Arc<ContainerInner>,
}

impl DiContainerImpl {
    /// 使用默认配置创建容器
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用指定配置创建容器
    pub fn with_config(config: ContainerConfig) -> Self {
        let wait_timeout = match config.resolution_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let id = Uuid::new_v4();
        debug!("创建容器 {}: {:?}", id, config);

        Self {
            inner: Arc::new(ContainerInner {
                id,
                config,
                state: RwLock::new(ContainerState::Unconfigured),
                registry: RwLock::new(ComponentRegistry::new()),
                wiring: RwLock::new(None),
                scopes: ScopeManager::new(wait_timeout),
                counters: StatsCounters::default(),
            }),
        }
    }

    /// 容器标识
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 在 tokio 阻塞线程池中解析组件
    ///
    /// 丢弃返回的 future 不会中止正在进行的构造
    pub async fn resolve_async<T>(&self) -> DependencyResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let container = self.clone();
        tokio::task::spawn_blocking(move || container.resolve::<T>())
            .await
            .map_err(|e| DependencyError::DependencyResolutionFailed {
                type_name: std::any::type_name::<T>().to_string(),
                message: e.to_string(),
            })?
    }

    /// 全部已创建的单例，按构造顺序排列
    pub fn singletons(&self) -> Vec<SingletonRecord> {
        self.inner.scopes.singletons()
    }

    /// 已注册的限定名，按字典序排序
    pub fn bean_names(&self) -> Vec<String> {
        self.inner.registry.read().qualifiers()
    }

    /// 实例化顺序，验证前为 `None`
    pub fn instantiation_order(&self) -> Option<Vec<TypeInfo>> {
        self.inner
            .wiring
            .read()
            .as_ref()
            .map(|wiring| wiring.plan.order().to_vec())
    }

    /// 由延迟代理满足的边，验证前为 `None`
    pub fn broken_edges(&self) -> Option<Vec<DependencyEdge>> {
        self.inner
            .wiring
            .read()
            .as_ref()
            .map(|wiring| wiring.analysis.broken_edges().to_vec())
    }
}

impl Default for DiContainerImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentResolver for DiContainerImpl {
    fn resolve_by_key(&self, key: &TypeInfo) -> DependencyResult<Instance> {
        let result = self
            .inner
            .ensure_ready()
            .and_then(|wiring| self.inner.resolve_component(&wiring, key));
        self.inner.track(result)
    }

    fn resolve_contract_by_key(
        &self,
        contract: &TypeInfo,
        qualifier: Option<&str>,
    ) -> DependencyResult<Instance> {
        let result = self.inner.resolve_contract(contract, qualifier);
        self.inner.track(result)
    }

    fn resolve_named(&self, name: &str) -> DependencyResult<Instance> {
        let result = self.inner.ensure_ready().and_then(|wiring| {
            let key = wiring
                .registry
                .by_qualifier(name)
                .map(|d| d.type_info.clone())
                .ok_or_else(|| DependencyError::ComponentNotRegistered {
                    type_name: name.to_string(),
                })?;
            self.inner.resolve_component(&wiring, &key)
        });
        self.inner.track(result)
    }

    fn can_resolve_by_key(&self, key: &TypeInfo) -> bool {
        self.inner.registry.read().contains(key)
    }
}

impl DiContainer for DiContainerImpl {
    fn register(&self, descriptor: ComponentDescriptor) -> DependencyResult<()> {
        let state = self.inner.state.read();
        if !state.accepts_registration() {
            return Err(DependencyError::IllegalState {
                operation: "register",
                state: *state,
            });
        }

        info!("注册组件: {} ({})", descriptor.type_info.short_name(), descriptor.scope);
        self.inner.registry.write().insert(descriptor)
    }

    fn validate(&self) -> DependencyResult<()> {
        self.inner.validate()
    }

    fn reset(&self) -> DependencyResult<()> {
        let mut state = self.inner.state.write();
        if *state != ContainerState::Validated {
            return Err(DependencyError::IllegalState {
                operation: "reset",
                state: *state,
            });
        }

        *self.inner.wiring.write() = None;
        *state = ContainerState::Unconfigured;
        info!("容器 {} 已重置", self.inner.id);
        Ok(())
    }

    fn close(&self) -> DependencyResult<()> {
        let mut state = self.inner.state.write();
        if *state != ContainerState::Ready {
            return Err(DependencyError::IllegalState {
                operation: "close",
                state: *state,
            });
        }
        *state = ContainerState::Closed;
        drop(state);

        info!("关闭容器 {}", self.inner.id);
        self.inner.scopes.close()
    }

    fn state(&self) -> ContainerState {
        *self.inner.state.read()
    }

    fn is_registered_by_key(&self, key: &TypeInfo) -> bool {
        self.inner.registry.read().contains(key)
    }

    fn registered_components(&self) -> Vec<TypeInfo> {
        self.inner.registry.read().keys()
    }

    fn stats(&self) -> ContainerStats {
        let counters = &self.inner.counters;
        ContainerStats {
            registered_components: self.inner.registry.read().len(),
            active_singletons: self.inner.scopes.active_count(),
            total_resolutions: counters.resolutions.load(Ordering::Relaxed),
            resolution_errors: counters.errors.load(Ordering::Relaxed),
            proxies_created: counters.proxies.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::contract_proxy;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    contract_proxy!(Clock {
        fn now(&self) -> u64;
    });

    struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> u64 {
            42
        }
    }

    struct Scheduler {
        clock: Arc<dyn Clock>,
    }

    fn clock() -> ComponentDescriptor {
        ComponentDescriptor::builder::<SystemClock>()
            .provides::<dyn Clock>(|c| c as Arc<dyn Clock>)
            .factory(|_| Ok(SystemClock))
    }

    fn scheduler() -> ComponentDescriptor {
        ComponentDescriptor::builder::<Scheduler>()
            .depends_on_contract::<dyn Clock>()
            .factory(|deps| {
                Ok(Scheduler {
                    clock: deps.contract::<dyn Clock>()?,
                })
            })
    }

    #[test]
    fn test_state_machine() {
        let container = DiContainerImpl::new();
        assert_eq!(container.state(), ContainerState::Unconfigured);

        container.register(clock()).unwrap();
        container.validate().unwrap();
        assert_eq!(container.state(), ContainerState::Validated);
        assert!(matches!(
            container.register(scheduler()),
            Err(DependencyError::IllegalState { operation: "register", .. })
        ));

        container.reset().unwrap();
        container.register(scheduler()).unwrap();
        let scheduler = container.resolve::<Scheduler>().unwrap();
        assert_eq!(scheduler.clock.now(), 42);
        assert_eq!(container.state(), ContainerState::Ready);
        assert!(container.reset().is_err());

        container.close().unwrap();
        assert_eq!(container.state(), ContainerState::Closed);
        assert!(matches!(
            container.resolve::<Scheduler>(),
            Err(DependencyError::IllegalState { .. })
        ));
        assert!(container.close().is_err());
    }

    #[test]
    fn test_close_requires_ready() {
        let container = DiContainerImpl::new();
        container.register(clock()).unwrap();
        container.validate().unwrap();
        assert!(matches!(
            container.close(),
            Err(DependencyError::IllegalState {
                state: ContainerState::Validated,
                ..
            })
        ));
    }

    #[test]
    fn test_failed_validation_stays_unconfigured() {
        let container = DiContainerImpl::new();
        container.register(scheduler()).unwrap();

        let error = container.validate().unwrap_err();
        assert_eq!(error.kind(), di_common::ErrorKind::Configuration);
        assert_eq!(container.state(), ContainerState::Unconfigured);

        container.register(clock()).unwrap();
        container.validate().unwrap();
    }

    #[test]
    fn test_unknown_type() {
        let container = DiContainerImpl::new();
        container.register(clock()).unwrap();
        assert!(matches!(
            container.resolve::<Scheduler>(),
            Err(DependencyError::ComponentNotRegistered { .. })
        ));
        assert_eq!(container.stats().resolution_errors, 1);
    }

    #[test]
    fn test_eager_prewarm_follows_plan() {
        let container = DiContainerImpl::new();
        container.register(scheduler()).unwrap();
        container.register(clock()).unwrap();

        container.resolve_contract::<dyn Clock>().unwrap();
        let created: Vec<String> = container
            .singletons()
            .iter()
            .map(|r| r.key.short_name().to_string())
            .collect();
        assert_eq!(created, vec!["SystemClock", "Scheduler"]);
    }

    struct Healthy;
    struct Broken;

    #[test]
    fn test_prewarm_failure_stays_with_its_component() {
        let attempts = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&attempts);
        let container = DiContainerImpl::new();
        container
            .register(ComponentDescriptor::builder::<Healthy>().factory(|_| Ok(Healthy)))
            .unwrap();
        container
            .register(ComponentDescriptor::builder::<Broken>().factory(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("db down".into())
            }))
            .unwrap();

        assert!(container.resolve::<Healthy>().is_ok());
        assert_eq!(container.state(), ContainerState::Ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        match container.resolve::<Broken>() {
            Err(DependencyError::ComponentCreationFailed { type_name, .. }) => {
                assert!(type_name.ends_with("Broken"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(container.stats().active_singletons, 1);
    }

    #[test]
    fn test_lazy_singletons_when_prewarm_disabled() {
        let container = DiContainerImpl::with_config(ContainerConfig {
            eager_singletons: false,
            ..ContainerConfig::default()
        });
        container.register(scheduler()).unwrap();
        container.register(clock()).unwrap();

        container.resolve_contract::<dyn Clock>().unwrap();
        assert_eq!(container.stats().active_singletons, 1);
    }
}
