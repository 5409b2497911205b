//! 延迟代理
//!
//! 当循环依赖中存在契约类型的边时，容器用 [`LazyProxy`] 代替真实依赖注入给
//! 使用方。代理在第一次被调用时才通过解析函数获取真实委托，此后所有调用
//! 都转发给缓存的委托。
//!
//! 契约需要实现 [`Contract`]，通常由 [`contract_proxy!`](crate::contract_proxy)
//! 生成：
//!
//! ```rust
//! use di_abstractions::contract_proxy;
//!
//! pub trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//!     fn advance(&self, ticks: u64) -> u64;
//! }
//!
//! contract_proxy!(Clock {
//!     fn now(&self) -> u64;
//!     fn advance(&self, ticks: u64) -> u64;
//! });
//! ```

use di_common::{DependencyError, DependencyResult, TypeInfo};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// 可被代理的契约
///
/// 为 `dyn Trait` 实现，契约 trait 必须以 `Send + Sync` 为父 trait
pub trait Contract: Send + Sync + 'static {
    /// 将代理包装为契约对象
    fn into_proxy(proxy: LazyProxy<Self>) -> Arc<Self>;
}

type DelegateResolver<C> = Box<dyn Fn() -> DependencyResult<Arc<C>> + Send + Sync>;

/// 延迟代理
///
/// 持有目标契约和解析函数，第一次转发调用时解析委托并在代理的整个
/// 生命周期内缓存
pub struct LazyProxy<C: ?Sized> {
    contract: TypeInfo,
    resolver: DelegateResolver<C>,
    delegate: OnceCell<Arc<C>>,
    resolving_on: Mutex<Option<ThreadId>>,
}

impl<C: ?Sized + Send + Sync + 'static> LazyProxy<C> {
    /// 创建新的代理，此时不会调用解析函数
    pub fn new(
        contract: TypeInfo,
        resolver: impl Fn() -> DependencyResult<Arc<C>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            contract,
            resolver: Box::new(resolver),
            delegate: OnceCell::new(),
            resolving_on: Mutex::new(None),
        }
    }

    /// 代理的契约类型
    pub fn contract(&self) -> &TypeInfo {
        &self.contract
    }

    /// 委托是否已经解析
    pub fn is_resolved(&self) -> bool {
        self.delegate.get().is_some()
    }

    /// 获取委托，必要时解析
    ///
    /// 解析失败不会被缓存，下一次调用会重新尝试。同一线程在解析过程中
    /// 再次调用同一个代理会返回 [`DependencyError::CircularResolution`]。
    pub fn try_delegate(&self) -> DependencyResult<Arc<C>> {
        if let Some(delegate) = self.delegate.get() {
            return Ok(Arc::clone(delegate));
        }

        let current = thread::current().id();
        if *self.resolving_on.lock() == Some(current) {
            return Err(DependencyError::CircularResolution {
                chain: vec![self.contract.name.clone(), self.contract.name.clone()],
            });
        }

        self.delegate
            .get_or_try_init(|| {
                *self.resolving_on.lock() = Some(current);
                let _resolving = ResolvingMarker {
                    resolving_on: &self.resolving_on,
                };
                debug!("代理解析委托: {}", self.contract);
                (self.resolver)()
            })
            .map(Arc::clone)
    }

    /// 获取委托
    ///
    /// # Panics
    ///
    /// 契约方法没有错误通道，委托无法解析时以 [`DependencyError`] 为载荷
    /// panic（[`std::panic::panic_any`]）。容器在调用组件工厂时会捕获这个载荷并
    /// 还原为错误返回给解析方。直接持有代理时使用 [`LazyProxy::try_delegate`]。
    pub fn delegate(&self) -> Arc<C> {
        match self.try_delegate() {
            Ok(delegate) => delegate,
            Err(e) => {
                debug!("代理 {} 无法解析委托: {}", self.contract, e);
                std::panic::panic_any(e)
            }
        }
    }
}

/// 解析结束（包括 panic 退出）时清除正在解析的线程标记
struct ResolvingMarker<'a> {
    resolving_on: &'a Mutex<Option<ThreadId>>,
}

impl Drop for ResolvingMarker<'_> {
    fn drop(&mut self) {
        *self.resolving_on.lock() = None;
    }
}

impl<C: ?Sized> fmt::Debug for LazyProxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProxy")
            .field("contract", &self.contract.name)
            .field("resolved", &self.delegate.get().is_some())
            .finish()
    }
}

/// 为契约生成代理实现
///
/// 生成 `impl Trait for LazyProxy<dyn Trait>`（每个方法都转发给委托）和
/// `impl Contract for dyn Trait`。方法必须以 `&self` 为接收者并返回拥有所有权的值。
#[macro_export]
macro_rules! contract_proxy {
    ($contract:ident {
        $(fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) $(-> $ret:ty)?;)*
    }) => {
        impl $contract for $crate::LazyProxy<dyn $contract> {
            $(
                fn $method(&self $(, $arg: $arg_ty)*) $(-> $ret)? {
                    self.delegate().$method($($arg),*)
                }
            )*
        }

        impl $crate::Contract for dyn $contract {
            fn into_proxy(proxy: $crate::LazyProxy<Self>) -> ::std::sync::Arc<Self> {
                ::std::sync::Arc::new(proxy)
            }
        }
    };
}
