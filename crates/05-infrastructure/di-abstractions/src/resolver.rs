//! 组件解析器抽象接口
//!
//! 提供按类型、按契约、按限定名解析组件实例的能力

use crate::descriptor::{downcast_contract, Instance};
use di_common::{DependencyError, DependencyResult, TypeInfo};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

/// 组件解析器 trait
///
/// 对象安全的部分以 [`TypeInfo`] 为键，泛型便捷方法建立在其上
pub trait ComponentResolver: Send + Sync {
    /// 解析具体组件
    fn resolve_by_key(&self, key: &TypeInfo) -> DependencyResult<Instance>;

    /// 解析契约，返回契约视图
    ///
    /// 没有实现时返回 `ComponentNotRegistered`，多个实现且未指定限定名时
    /// 返回 `AmbiguousResolution`
    fn resolve_contract_by_key(
        &self,
        contract: &TypeInfo,
        qualifier: Option<&str>,
    ) -> DependencyResult<Instance>;

    /// 按限定名解析组件
    fn resolve_named(&self, name: &str) -> DependencyResult<Instance>;

    /// 检查类型是否已注册
    fn can_resolve_by_key(&self, key: &TypeInfo) -> bool;

    /// 解析指定类型的组件
    fn resolve<T>(&self) -> DependencyResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        Self: Sized,
    {
        let key = TypeInfo::of::<T>();
        self.resolve_by_key(&key)?
            .downcast::<T>()
            .map_err(|_| DependencyError::TypeMismatch { type_name: key.name })
    }

    /// 解析契约的唯一实现
    fn resolve_contract<C>(&self) -> DependencyResult<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
        Self: Sized,
    {
        let contract = TypeInfo::of::<C>();
        let view = self.resolve_contract_by_key(&contract, None)?;
        downcast_contract::<C>(view).ok_or(DependencyError::TypeMismatch {
            type_name: contract.name,
        })
    }

    /// 解析契约中指定限定名的实现
    fn resolve_named_contract<C>(&self, qualifier: &str) -> DependencyResult<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
        Self: Sized,
    {
        let contract = TypeInfo::of::<C>();
        let view = self.resolve_contract_by_key(&contract, Some(qualifier))?;
        downcast_contract::<C>(view).ok_or(DependencyError::TypeMismatch {
            type_name: contract.name,
        })
    }

    /// 按限定名解析并转换为具体类型
    fn resolve_named_as<T>(&self, name: &str) -> DependencyResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        Self: Sized,
    {
        self.resolve_named(name)?
            .downcast::<T>()
            .map_err(|_| DependencyError::TypeMismatch {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    /// 检查是否可以解析指定类型
    fn can_resolve<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
        Self: Sized,
    {
        self.can_resolve_by_key(&TypeInfo::of::<T>())
    }
}

thread_local! {
    static RESOLUTION_CHAIN: RefCell<Vec<TypeInfo>> = const { RefCell::new(Vec::new()) };
}

/// 解析上下文
///
/// 记录当前线程正在构造的组件链。静态分析之外的运行时兜底：
/// 同一线程重复进入同一个组件即为循环，链长超过上限即为深度超限。
pub struct ResolveContext;

impl ResolveContext {
    /// 进入组件的解析，返回的守卫在释放时退出
    pub fn enter(key: &TypeInfo, max_depth: usize) -> DependencyResult<ResolveGuard> {
        RESOLUTION_CHAIN.with(|chain| {
            let mut chain = chain.borrow_mut();
            if let Some(position) = chain.iter().position(|entry| entry == key) {
                let mut cycle: Vec<String> =
                    chain[position..].iter().map(|t| t.name.clone()).collect();
                cycle.push(key.name.clone());
                return Err(DependencyError::CircularResolution { chain: cycle });
            }
            if max_depth > 0 && chain.len() >= max_depth {
                return Err(DependencyError::ResolutionDepthExceeded {
                    type_name: key.name.clone(),
                    max_depth,
                });
            }
            chain.push(key.clone());
            Ok(ResolveGuard {
                _not_send: PhantomData,
            })
        })
    }

    /// 当前线程的解析深度
    pub fn depth() -> usize {
        RESOLUTION_CHAIN.with(|chain| chain.borrow().len())
    }

    /// 当前线程的解析链
    pub fn current_chain() -> Vec<TypeInfo> {
        RESOLUTION_CHAIN.with(|chain| chain.borrow().clone())
    }
}

/// 解析守卫
///
/// 只能在创建它的线程上释放
#[must_use]
pub struct ResolveGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ResolveGuard {
    fn drop(&mut self) {
        RESOLUTION_CHAIN.with(|chain| {
            chain.borrow_mut().pop();
        });
    }
}
