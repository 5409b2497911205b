//! 组件描述符
//!
//! 组件在进入容器前被规范化为 [`ComponentDescriptor`]：类型标识、作用域、
//! 可选限定名、满足的契约以及按声明顺序排列的依赖。容器只消费描述符，
//! 不关心它是由扫描器、过程宏还是手写构建器产生的。

use crate::proxy::{Contract, LazyProxy};
use di_common::{DependencyError, DependencyResult, Disposable, Scope, TypeInfo};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 类型擦除后的组件实例
///
/// 具体组件以 `Arc<T>` 存放，契约视图以 `Arc<Arc<dyn C>>` 存放
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 工厂与释放钩子返回的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 组件工厂函数类型
pub type ComponentFactoryFn =
    Arc<dyn Fn(&Dependencies) -> Result<Instance, BoxError> + Send + Sync>;

/// 具体实例到契约视图的转换函数
pub type ContractCastFn = Arc<dyn Fn(Instance) -> Option<Instance> + Send + Sync>;

/// 代理首次调用时用来获取真实委托的解析函数
pub type ProxyResolver = Box<dyn Fn() -> DependencyResult<Instance> + Send + Sync>;

/// 代理构造函数类型
pub type ProxyFactoryFn = Arc<dyn Fn(ProxyResolver) -> Instance + Send + Sync>;

/// 单例释放函数类型
pub type DisposeFn = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// 将契约对象擦除为 [`Instance`]
pub fn erase_contract<C: ?Sized + Send + Sync + 'static>(value: Arc<C>) -> Instance {
    Arc::new(value)
}

/// 从 [`Instance`] 还原契约对象
pub fn downcast_contract<C: ?Sized + Send + Sync + 'static>(instance: Instance) -> Option<Arc<C>> {
    instance
        .downcast::<Arc<C>>()
        .ok()
        .map(|outer| Arc::clone(&*outer))
}

/// 依赖类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    /// 依赖具体组件类型，不能被代理
    Concrete,
    /// 依赖抽象契约，可在循环中被延迟代理替代
    Contract,
}

/// 依赖声明
#[derive(Clone)]
pub struct DependencySpec {
    /// 依赖的组件类型或契约
    pub target: TypeInfo,
    /// 依赖类型
    pub kind: DependencyKind,
    /// 是否为可选依赖
    pub optional: bool,
    /// 限定名，用于在多个实现中选择
    pub qualifier: Option<String>,
    proxy_factory: Option<ProxyFactoryFn>,
}

impl DependencySpec {
    /// 依赖具体组件
    pub fn concrete<T: Send + Sync + 'static>() -> Self {
        Self {
            target: TypeInfo::of::<T>(),
            kind: DependencyKind::Concrete,
            optional: false,
            qualifier: None,
            proxy_factory: None,
        }
    }

    /// 依赖契约
    pub fn contract<C: ?Sized + Contract>() -> Self {
        let contract = TypeInfo::of::<C>();
        let proxy_contract = contract.clone();
        let proxy_factory: ProxyFactoryFn = Arc::new(move |resolver: ProxyResolver| {
            let type_info = proxy_contract.clone();
            let proxy = LazyProxy::<C>::new(proxy_contract.clone(), move || {
                let instance = resolver()?;
                downcast_contract::<C>(instance).ok_or_else(|| DependencyError::TypeMismatch {
                    type_name: type_info.name.clone(),
                })
            });
            erase_contract::<C>(C::into_proxy(proxy))
        });

        Self {
            target: contract,
            kind: DependencyKind::Contract,
            optional: false,
            qualifier: None,
            proxy_factory: Some(proxy_factory),
        }
    }

    /// 标记为可选依赖
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 设置限定名
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// 是否为契约依赖
    pub fn is_contract(&self) -> bool {
        self.kind == DependencyKind::Contract
    }

    /// 是否可以由代理满足
    pub fn supports_proxy(&self) -> bool {
        self.proxy_factory.is_some()
    }

    /// 创建延迟代理，返回契约视图
    pub fn create_proxy(&self, resolver: ProxyResolver) -> Option<Instance> {
        self.proxy_factory.as_ref().map(|factory| factory(resolver))
    }
}

impl fmt::Debug for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencySpec")
            .field("target", &self.target.name)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .field("qualifier", &self.qualifier)
            .finish()
    }
}

/// 组件满足的契约
#[derive(Clone)]
pub struct ContractBinding {
    /// 契约类型
    pub contract: TypeInfo,
    cast: ContractCastFn,
}

impl ContractBinding {
    /// 将具体实例转换为契约视图
    pub fn cast(&self, instance: Instance) -> Option<Instance> {
        (self.cast)(instance)
    }
}

impl fmt::Debug for ContractBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractBinding")
            .field("contract", &self.contract.name)
            .finish()
    }
}

/// 组件描述符
#[derive(Clone)]
pub struct ComponentDescriptor {
    /// 组件类型信息
    pub type_info: TypeInfo,
    /// 组件作用域
    pub scope: Scope,
    /// 限定名（组件名称）
    pub qualifier: Option<String>,
    /// 组件满足的契约
    pub contracts: Vec<ContractBinding>,
    /// 按声明顺序排列的依赖
    pub dependencies: Vec<DependencySpec>,
    factory: ComponentFactoryFn,
    disposer: Option<DisposeFn>,
}

impl ComponentDescriptor {
    /// 创建描述符构建器
    pub fn builder<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new()
    }

    /// 将已有实例注册为单例
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        let shared = Arc::new(value);
        Self::builder::<T>()
            .singleton()
            .shared_factory(Arc::new(move |_: &Dependencies| {
                Ok::<Instance, BoxError>(Arc::clone(&shared) as Instance)
            }))
    }

    /// 组件名称
    pub fn name(&self) -> &str {
        &self.type_info.name
    }

    /// 是否满足指定契约
    pub fn provides(&self, contract: &TypeInfo) -> bool {
        self.contracts.iter().any(|b| &b.contract == contract)
    }

    /// 获取契约绑定
    pub fn contract_binding(&self, contract: &TypeInfo) -> Option<&ContractBinding> {
        self.contracts.iter().find(|b| &b.contract == contract)
    }

    /// 调用工厂创建实例
    pub fn create(&self, dependencies: &Dependencies) -> Result<Instance, BoxError> {
        (self.factory)(dependencies)
    }

    /// 释放钩子
    pub fn disposer(&self) -> Option<DisposeFn> {
        self.disposer.clone()
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("type_info", &self.type_info.name)
            .field("scope", &self.scope)
            .field("qualifier", &self.qualifier)
            .field("contracts", &self.contracts)
            .field("dependencies", &self.dependencies)
            .field("disposable", &self.disposer.is_some())
            .field("factory", &"<function>")
            .finish()
    }
}

/// 描述符构建器
///
/// 显式注册构建器，取代注解扫描
pub struct DescriptorBuilder<T> {
    type_info: TypeInfo,
    scope: Scope,
    qualifier: Option<String>,
    contracts: Vec<ContractBinding>,
    dependencies: Vec<DependencySpec>,
    disposer: Option<DisposeFn>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    fn new() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            scope: Scope::default(),
            qualifier: None,
            contracts: Vec::new(),
            dependencies: Vec::new(),
            disposer: None,
            _marker: PhantomData,
        }
    }

    /// 设置为单例
    pub fn singleton(self) -> Self {
        self.with_scope(Scope::Singleton)
    }

    /// 设置为瞬时
    pub fn transient(self) -> Self {
        self.with_scope(Scope::Transient)
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置限定名
    pub fn named(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// 声明组件满足的契约
    ///
    /// `cast` 通常写作 `|c| c as Arc<dyn Contract>`
    pub fn provides<C>(mut self, cast: impl Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let cast: ContractCastFn = Arc::new(move |instance: Instance| {
            instance
                .downcast::<T>()
                .ok()
                .map(|concrete| erase_contract::<C>(cast(concrete)))
        });
        self.contracts.push(ContractBinding {
            contract: TypeInfo::of::<C>(),
            cast,
        });
        self
    }

    /// 依赖具体组件
    pub fn depends_on<D: Send + Sync + 'static>(self) -> Self {
        self.with_dependency(DependencySpec::concrete::<D>())
    }

    /// 可选依赖具体组件
    pub fn depends_on_optional<D: Send + Sync + 'static>(self) -> Self {
        self.with_dependency(DependencySpec::concrete::<D>().optional())
    }

    /// 依赖契约
    pub fn depends_on_contract<C: ?Sized + Contract>(self) -> Self {
        self.with_dependency(DependencySpec::contract::<C>())
    }

    /// 可选依赖契约
    pub fn depends_on_optional_contract<C: ?Sized + Contract>(self) -> Self {
        self.with_dependency(DependencySpec::contract::<C>().optional())
    }

    /// 依赖指定限定名的契约实现
    pub fn depends_on_named<C: ?Sized + Contract>(self, qualifier: impl Into<String>) -> Self {
        self.with_dependency(DependencySpec::contract::<C>().qualified(qualifier))
    }

    /// 添加依赖声明
    pub fn with_dependency(mut self, spec: DependencySpec) -> Self {
        self.dependencies.push(spec);
        self
    }

    /// 设置工厂并完成构建
    pub fn factory<F>(self, factory: F) -> ComponentDescriptor
    where
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.shared_factory(Arc::new(move |deps: &Dependencies| {
            factory(deps).map(|component| Arc::new(component) as Instance)
        }))
    }

    fn shared_factory(self, factory: ComponentFactoryFn) -> ComponentDescriptor {
        ComponentDescriptor {
            type_info: self.type_info,
            scope: self.scope,
            qualifier: self.qualifier,
            contracts: self.contracts,
            dependencies: self.dependencies,
            factory,
            disposer: self.disposer,
        }
    }
}

impl<T: Disposable + 'static> DescriptorBuilder<T> {
    /// 容器关闭时调用 [`Disposable::dispose`]
    pub fn disposable(mut self) -> Self {
        self.disposer = Some(Arc::new(|instance: &Instance| {
            match instance.downcast_ref::<T>() {
                Some(component) => component.dispose(),
                None => Err(format!("实例类型不是 {}", std::any::type_name::<T>()).into()),
            }
        }));
        self
    }
}

/// 已解析的依赖
#[derive(Clone)]
pub struct ResolvedDependency {
    /// 依赖的组件类型或契约
    pub target: TypeInfo,
    /// 依赖类型
    pub kind: DependencyKind,
    /// 限定名
    pub qualifier: Option<String>,
    /// 解析结果，可选依赖缺失时为 `None`
    pub value: Option<Instance>,
}

/// 传给组件工厂的依赖集合
///
/// 顺序与描述符中的依赖声明一致
pub struct Dependencies {
    consumer: TypeInfo,
    resolved: Vec<ResolvedDependency>,
}

impl Dependencies {
    /// 创建依赖集合
    pub fn new(consumer: TypeInfo, resolved: Vec<ResolvedDependency>) -> Self {
        Self { consumer, resolved }
    }

    /// 使用依赖的组件
    pub fn consumer(&self) -> &TypeInfo {
        &self.consumer
    }

    /// 依赖数量
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// 是否没有依赖
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// 按声明顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.resolved.iter()
    }

    /// 获取必需的具体依赖
    pub fn get<T: Send + Sync + 'static>(&self) -> DependencyResult<Arc<T>> {
        let target = TypeInfo::of::<T>();
        let instance = self.required(DependencyKind::Concrete, &target, None)?;
        instance
            .downcast::<T>()
            .map_err(|_| DependencyError::TypeMismatch {
                type_name: target.name,
            })
    }

    /// 获取可选的具体依赖
    pub fn optional<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let target = TypeInfo::of::<T>();
        self.find(DependencyKind::Concrete, &target, None)
            .and_then(|d| d.value.clone())
            .and_then(|instance| instance.downcast::<T>().ok())
    }

    /// 获取必需的契约依赖
    pub fn contract<C: ?Sized + Send + Sync + 'static>(&self) -> DependencyResult<Arc<C>> {
        let target = TypeInfo::of::<C>();
        let instance = self.required(DependencyKind::Contract, &target, None)?;
        downcast_contract::<C>(instance).ok_or(DependencyError::TypeMismatch {
            type_name: target.name,
        })
    }

    /// 获取可选的契约依赖
    pub fn optional_contract<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        let target = TypeInfo::of::<C>();
        self.find(DependencyKind::Contract, &target, None)
            .and_then(|d| d.value.clone())
            .and_then(downcast_contract::<C>)
    }

    /// 获取指定限定名的契约依赖
    pub fn named<C: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> DependencyResult<Arc<C>> {
        let target = TypeInfo::of::<C>();
        let instance = self.required(DependencyKind::Contract, &target, Some(qualifier))?;
        downcast_contract::<C>(instance).ok_or(DependencyError::TypeMismatch {
            type_name: target.name,
        })
    }

    fn find(
        &self,
        kind: DependencyKind,
        target: &TypeInfo,
        qualifier: Option<&str>,
    ) -> Option<&ResolvedDependency> {
        self.resolved.iter().find(|d| {
            d.kind == kind
                && &d.target == target
                && qualifier.map_or(true, |q| d.qualifier.as_deref() == Some(q))
        })
    }

    fn required(
        &self,
        kind: DependencyKind,
        target: &TypeInfo,
        qualifier: Option<&str>,
    ) -> DependencyResult<Instance> {
        let Some(dependency) = self.find(kind, target, qualifier) else {
            return Err(DependencyError::DependencyResolutionFailed {
                type_name: self.consumer.name.clone(),
                message: format!("未声明依赖 {}", target.name),
            });
        };
        dependency
            .value
            .clone()
            .ok_or_else(|| DependencyError::DependencyResolutionFailed {
                type_name: self.consumer.name.clone(),
                message: format!("可选依赖 {} 不存在", target.name),
            })
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present: Vec<(&str, bool)> = self
            .resolved
            .iter()
            .map(|d| (d.target.name.as_str(), d.value.is_some()))
            .collect();
        f.debug_struct("Dependencies")
            .field("consumer", &self.consumer.name)
            .field("resolved", &present)
            .finish()
    }
}
