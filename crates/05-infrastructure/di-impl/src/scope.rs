//! 作用域管理
//!
//! 单例按类型各自持有一把锁：第一个请求者负责构造，并发的其他请求者等待
//! 它完成后拿到同一个实例或同一个错误。构造失败会释放槽位，下次解析重新尝试。
//! 瞬时组件每次都调用工厂，不做缓存。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use di_abstractions::{DisposeFn, Instance};
use di_common::{DependencyError, DependencyResult, Scope, TypeInfo};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 已构造的单例
#[derive(Clone)]
pub struct SingletonRecord {
    /// 组件类型
    pub key: TypeInfo,
    /// 实例
    pub instance: Instance,
    /// 构造完成时间
    pub created_at: DateTime<Utc>,
    disposer: Option<DisposeFn>,
}

impl std::fmt::Debug for SingletonRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRecord")
            .field("key", &self.key.name)
            .field("created_at", &self.created_at)
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}

#[derive(Default)]
struct SlotState {
    instance: Option<Instance>,
    constructing: bool,
    attempt: u64,
    waiters: usize,
    last_failure: Option<(u64, DependencyError)>,
}

#[derive(Default)]
struct SingletonSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// 构造者异常退出（panic）时释放槽位并唤醒等待者
struct ConstructionGuard<'a> {
    slot: &'a SingletonSlot,
    armed: bool,
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.slot.state.lock();
            state.constructing = false;
            self.slot.ready.notify_all();
        }
    }
}

/// 作用域管理器
pub struct ScopeManager {
    slots: DashMap<TypeInfo, Arc<SingletonSlot>>,
    records: Mutex<Vec<SingletonRecord>>,
    wait_timeout: Option<Duration>,
}

impl ScopeManager {
    /// 创建作用域管理器
    ///
    /// `wait_timeout` 为等待其他线程构造单例的上限，`None` 表示一直等待
    pub fn new(wait_timeout: Option<Duration>) -> Self {
        Self {
            slots: DashMap::new(),
            records: Mutex::new(Vec::new()),
            wait_timeout,
        }
    }

    /// 获取或创建实例
    pub fn get_or_create<F>(
        &self,
        key: &TypeInfo,
        scope: Scope,
        disposer: Option<DisposeFn>,
        factory: F,
    ) -> DependencyResult<Instance>
    where
        F: FnOnce() -> DependencyResult<Instance>,
    {
        match scope {
            Scope::Transient => factory(),
            Scope::Singleton => self.singleton(key, disposer, factory),
        }
    }

    /// 已缓存的单例
    pub fn get(&self, key: &TypeInfo) -> Option<Instance> {
        let slot = self.slots.get(key).map(|entry| Arc::clone(entry.value()))?;
        let state = slot.state.lock();
        state.instance.clone()
    }

    /// 全部单例，按构造顺序排列
    pub fn singletons(&self) -> Vec<SingletonRecord> {
        self.records.lock().clone()
    }

    /// 活跃单例数量
    pub fn active_count(&self) -> usize {
        self.records.lock().len()
    }

    /// 按构造逆序释放全部单例
    ///
    /// 某个释放钩子失败不会中断后续释放，失败在最后汇总返回
    pub fn close(&self) -> DependencyResult<()> {
        let records = std::mem::take(&mut *self.records.lock());
        self.slots.clear();

        let mut failures = Vec::new();
        for record in records.iter().rev() {
            let Some(disposer) = &record.disposer else {
                continue;
            };
            debug!("释放单例: {}", record.key);
            if let Err(e) = disposer(&record.instance) {
                warn!("单例释放失败: {} - {}", record.key, e);
                failures.push((record.key.name.clone(), e.to_string()));
            }
        }

        info!("已释放 {} 个单例", records.len());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DependencyError::TeardownFailed { failures })
        }
    }

    /// 正在等待指定单例构造完成的线程数
    pub fn waiting(&self, key: &TypeInfo) -> usize {
        self.slots
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .map_or(0, |slot| slot.state.lock().waiters)
    }

    fn singleton<F>(
        &self,
        key: &TypeInfo,
        disposer: Option<DisposeFn>,
        factory: F,
    ) -> DependencyResult<Instance>
    where
        F: FnOnce() -> DependencyResult<Instance>,
    {
        let slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());
        let mut state = slot.state.lock();
        let deadline = self.wait_timeout.map(|timeout| Instant::now() + timeout);
        let started = Instant::now();

        loop {
            if let Some(instance) = &state.instance {
                debug!("单例缓存命中: {}", key);
                return Ok(Arc::clone(instance));
            }
            if !state.constructing {
                break;
            }

            let attempt = state.attempt;
            state.waiters += 1;
            let timed_out = match deadline {
                Some(deadline) => slot.ready.wait_until(&mut state, deadline).timed_out(),
                None => {
                    slot.ready.wait(&mut state);
                    false
                }
            };
            state.waiters -= 1;

            if let Some((failed_attempt, error)) = &state.last_failure {
                if *failed_attempt == attempt && state.instance.is_none() {
                    return Err(error.clone());
                }
            }
            if timed_out && state.constructing && state.instance.is_none() {
                return Err(DependencyError::ResolutionTimeout {
                    type_name: key.name.clone(),
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        state.constructing = true;
        state.attempt += 1;
        let attempt = state.attempt;
        drop(state);

        let mut guard = ConstructionGuard {
            slot: &slot,
            armed: true,
        };
        let result = factory();
        guard.armed = false;

        let mut state = slot.state.lock();
        state.constructing = false;
        match &result {
            Ok(instance) => {
                self.records.lock().push(SingletonRecord {
                    key: key.clone(),
                    instance: Arc::clone(instance),
                    created_at: Utc::now(),
                    disposer,
                });
                state.instance = Some(Arc::clone(instance));
                state.last_failure = None;
                debug!("单例已创建: {}", key);
            }
            Err(e) => {
                state.last_failure = Some((attempt, e.clone()));
                debug!("单例创建失败，槽位已释放: {} - {}", key, e);
            }
        }
        slot.ready.notify_all();
        result
    }
}
