//! Centralized integration tests for the resolution engine
use anyhow::Result;
use di_abstractions::{
    contract_proxy, ComponentDescriptor, ComponentResolver, ContainerConfig, DiContainer,
    Disposable,
};
use di_common::{ConfigurationProblem, DependencyError, ErrorKind, TypeInfo};
use di_impl::{DependencyEdge, DiContainerImpl};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

/// 按顺序记录释放事件
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn lazy_config() -> ContainerConfig {
    ContainerConfig {
        eager_singletons: false,
        ..ContainerConfig::default()
    }
}

// ---- 场景 1：单例共享 ----

struct Engine;

struct Car {
    engine: Arc<Engine>,
}

#[test]
fn test_singleton_dependency_shared() -> Result<()> {
    let container = DiContainerImpl::new();
    container.register(ComponentDescriptor::builder::<Engine>().factory(|_| Ok(Engine)))?;
    container.register(
        ComponentDescriptor::builder::<Car>()
            .depends_on::<Engine>()
            .factory(|deps| {
                Ok(Car {
                    engine: deps.get::<Engine>()?,
                })
            }),
    )?;

    container.validate()?;
    let first = container.resolve::<Car>()?;
    let second = container.resolve::<Car>()?;

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.engine, &second.engine));
    assert!(Arc::ptr_eq(&first.engine, &container.resolve::<Engine>()?));
    Ok(())
}

// ---- 场景 2：具体类型循环 ----

struct Left;
struct Right;

#[test]
fn test_concrete_cycle_is_fatal() {
    let container = DiContainerImpl::new();
    container
        .register(
            ComponentDescriptor::builder::<Left>()
                .depends_on::<Right>()
                .factory(|_| Ok(Left)),
        )
        .unwrap();
    container
        .register(
            ComponentDescriptor::builder::<Right>()
                .depends_on::<Left>()
                .factory(|_| Ok(Right)),
        )
        .unwrap();

    let error = container.validate().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Configuration);
    let report = error.report().unwrap();
    let cycles: Vec<&ConfigurationProblem> = report.fatal_cycles().collect();
    assert_eq!(cycles.len(), 1);

    let members = cycles[0].implicated_types();
    assert_eq!(members.len(), 2);
    assert!(members[0].ends_with("Left"));
    assert!(members[1].ends_with("Right"));
}

// ---- 场景 3：经由契约的循环 ----

trait Pricing: Send + Sync {
    fn price(&self, sku: String) -> u32;
}

contract_proxy!(Pricing {
    fn price(&self, sku: String) -> u32;
});

struct Checkout {
    pricing: Arc<dyn Pricing>,
}

struct Catalog {
    checkout: Arc<Checkout>,
}

impl Pricing for Catalog {
    fn price(&self, sku: String) -> u32 {
        sku.len() as u32 * 100
    }
}

fn checkout_cycle(catalog_builds: Arc<AtomicUsize>) -> Vec<ComponentDescriptor> {
    vec![
        ComponentDescriptor::builder::<Checkout>()
            .depends_on_contract::<dyn Pricing>()
            .factory(|deps| {
                Ok(Checkout {
                    pricing: deps.contract::<dyn Pricing>()?,
                })
            }),
        ComponentDescriptor::builder::<Catalog>()
            .provides::<dyn Pricing>(|c| c as Arc<dyn Pricing>)
            .depends_on::<Checkout>()
            .factory(move |deps| {
                catalog_builds.fetch_add(1, Ordering::SeqCst);
                Ok(Catalog {
                    checkout: deps.get::<Checkout>()?,
                })
            }),
    ]
}

#[test]
fn test_contract_cycle_broken_by_proxy() -> Result<()> {
    let builds = Arc::new(AtomicUsize::new(0));
    let container = DiContainerImpl::with_config(lazy_config());
    container.register_all(checkout_cycle(Arc::clone(&builds)))?;
    container.validate()?;

    let broken = container.broken_edges().unwrap_or_default();
    assert_eq!(broken.len(), 1);
    assert!(broken[0].consumer.name.ends_with("Checkout"));

    let checkout = container.resolve::<Checkout>()?;
    assert_eq!(builds.load(Ordering::SeqCst), 0);

    assert_eq!(checkout.pricing.price("abc".into()), 300);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(checkout.pricing.price("abcd".into()), 400);
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    let catalog = container.resolve::<Catalog>()?;
    assert!(Arc::ptr_eq(&catalog.checkout, &checkout));
    assert_eq!(container.stats().proxies_created, 1);
    Ok(())
}

#[test]
fn test_proxy_matches_direct_call() -> Result<()> {
    let container = DiContainerImpl::new();
    container.register_all(checkout_cycle(Arc::new(AtomicUsize::new(0))))?;

    let checkout = container.resolve::<Checkout>()?;
    let direct = container.resolve_contract::<dyn Pricing>()?;
    for sku in ["a", "bb", "ccc"] {
        assert_eq!(checkout.pricing.price(sku.into()), direct.price(sku.into()));
    }
    Ok(())
}

// ---- 场景 4：不明确的契约 ----

trait Storage: Send + Sync {
    fn kind(&self) -> String;
}

contract_proxy!(Storage {
    fn kind(&self) -> String;
});

struct LocalDisk;
impl Storage for LocalDisk {
    fn kind(&self) -> String {
        "disk".into()
    }
}

struct ObjectStore;
impl Storage for ObjectStore {
    fn kind(&self) -> String {
        "s3".into()
    }
}

struct Uploader;

#[test]
fn test_ambiguous_dependency_names_candidates() {
    let container = DiContainerImpl::new();
    container
        .register_all([
            ComponentDescriptor::builder::<LocalDisk>()
                .provides::<dyn Storage>(|c| c as Arc<dyn Storage>)
                .factory(|_| Ok(LocalDisk)),
            ComponentDescriptor::builder::<ObjectStore>()
                .provides::<dyn Storage>(|c| c as Arc<dyn Storage>)
                .factory(|_| Ok(ObjectStore)),
            ComponentDescriptor::builder::<Uploader>()
                .depends_on_contract::<dyn Storage>()
                .factory(|_| Ok(Uploader)),
        ])
        .unwrap();

    let error = container.validate().unwrap_err();
    let report = error.report().unwrap();
    match report.ambiguous().next() {
        Some(ConfigurationProblem::AmbiguousDependency {
            consumer,
            candidates,
            ..
        }) => {
            assert!(consumer.ends_with("Uploader"));
            assert_eq!(candidates.len(), 2);
            assert!(candidates[0].ends_with("LocalDisk"));
            assert!(candidates[1].ends_with("ObjectStore"));
        }
        other => panic!("unexpected: {other:?}"),
    };
}

// ---- 场景 5：瞬时依赖 ----

struct RequestId(usize);

struct Billing {
    request: Arc<RequestId>,
}

struct Shipping {
    request: Arc<RequestId>,
}

#[test]
fn test_transient_dependency_is_fresh_per_consumer() -> Result<()> {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = DiContainerImpl::new();
    container.register(
        ComponentDescriptor::builder::<RequestId>()
            .transient()
            .factory(move |_| Ok(RequestId(counter.fetch_add(1, Ordering::SeqCst)))),
    )?;
    container.register(
        ComponentDescriptor::builder::<Billing>()
            .depends_on::<RequestId>()
            .factory(|deps| {
                Ok(Billing {
                    request: deps.get::<RequestId>()?,
                })
            }),
    )?;
    container.register(
        ComponentDescriptor::builder::<Shipping>()
            .depends_on::<RequestId>()
            .factory(|deps| {
                Ok(Shipping {
                    request: deps.get::<RequestId>()?,
                })
            }),
    )?;

    let billing = container.resolve::<Billing>()?;
    let shipping = container.resolve::<Shipping>()?;
    assert!(!Arc::ptr_eq(&billing.request, &shipping.request));
    assert_ne!(billing.request.0, shipping.request.0);

    let first = container.resolve::<RequestId>()?;
    let second = container.resolve::<RequestId>()?;
    assert!(!Arc::ptr_eq(&first, &second));
    Ok(())
}

// ---- 并发 ----

struct SlowService;

#[test]
fn test_concurrent_first_access_constructs_once() -> Result<()> {
    const CALLERS: usize = 16;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let container = DiContainerImpl::with_config(lazy_config());
    container.register(ComponentDescriptor::builder::<SlowService>().factory(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        Ok(SlowService)
    }))?;
    container.validate()?;

    let barrier = Barrier::new(CALLERS);
    let instances: Vec<Arc<SlowService>> = thread::scope(|s| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    container.resolve::<SlowService>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_resolution() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let container = DiContainerImpl::with_config(lazy_config());
    container.register(ComponentDescriptor::builder::<SlowService>().factory(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(SlowService)
    }))?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move { container.resolve_async::<SlowService>().await })
        })
        .collect();

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await??);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    Ok(())
}

// ---- 关闭 ----

struct Tracked {
    label: &'static str,
    journal: Journal,
}

impl Disposable for Tracked {
    fn dispose(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.journal.record(self.label);
        Ok(())
    }
}

struct Settings(Tracked);
struct Pool(Tracked);
struct Repository(Tracked);

impl Disposable for Settings {
    fn dispose(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.dispose()
    }
}

impl Disposable for Pool {
    fn dispose(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.dispose()
    }
}

impl Disposable for Repository {
    fn dispose(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err(format!("{} still has open transactions", self.0.label).into())
    }
}

#[test]
fn test_close_releases_in_reverse_construction_order() -> Result<()> {
    let journal = Journal::default();
    let (j1, j2, j3) = (journal.clone(), journal.clone(), journal.clone());

    let container = DiContainerImpl::new();
    container.register(
        ComponentDescriptor::builder::<Pool>()
            .depends_on::<Settings>()
            .disposable()
            .factory(move |_| {
                Ok(Pool(Tracked {
                    label: "pool",
                    journal: j1.clone(),
                }))
            }),
    )?;
    container.register(
        ComponentDescriptor::builder::<Settings>()
            .disposable()
            .factory(move |_| {
                Ok(Settings(Tracked {
                    label: "settings",
                    journal: j2.clone(),
                }))
            }),
    )?;
    container.register(
        ComponentDescriptor::builder::<Repository>()
            .depends_on::<Pool>()
            .disposable()
            .factory(move |_| {
                Ok(Repository(Tracked {
                    label: "repository",
                    journal: j3.clone(),
                }))
            }),
    )?;

    container.resolve::<Repository>()?;
    let created: Vec<String> = container
        .singletons()
        .iter()
        .map(|record| record.key.short_name().to_string())
        .collect();
    assert_eq!(created, vec!["Settings", "Pool", "Repository"]);

    match container.close() {
        Err(DependencyError::TeardownFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].0.ends_with("Repository"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(journal.entries(), vec!["pool", "settings"]);

    assert!(matches!(
        container.resolve::<Settings>(),
        Err(DependencyError::IllegalState { .. })
    ));
    Ok(())
}

// ---- 确定性与错误汇总 ----

#[test]
fn test_wiring_is_deterministic() -> Result<()> {
    let first = wire()?;
    for _ in 0..10 {
        assert_eq!(wire()?, first);
    }
    Ok(())
}

fn wire() -> Result<(Option<Vec<TypeInfo>>, Option<Vec<DependencyEdge>>)> {
    let container = DiContainerImpl::new();
    container.register(ComponentDescriptor::builder::<Engine>().factory(|_| Ok(Engine)))?;
    container.register_all(checkout_cycle(Arc::new(AtomicUsize::new(0))))?;
    container.validate()?;
    Ok((container.instantiation_order(), container.broken_edges()))
}

struct Reporter;
struct Exporter;

#[test]
fn test_independent_problems_reported_together() {
    let container = DiContainerImpl::new();
    container
        .register_all([
            ComponentDescriptor::builder::<Reporter>()
                .depends_on::<Engine>()
                .factory(|_| Ok(Reporter)),
            ComponentDescriptor::builder::<Exporter>()
                .depends_on::<RequestId>()
                .factory(|_| Ok(Exporter)),
            ComponentDescriptor::builder::<Left>()
                .depends_on::<Right>()
                .factory(|_| Ok(Left)),
            ComponentDescriptor::builder::<Right>()
                .depends_on::<Left>()
                .factory(|_| Ok(Right)),
        ])
        .unwrap();

    let error = container.validate().unwrap_err();
    let report = error.report().unwrap();
    assert_eq!(report.unsatisfied().count(), 2);
    assert_eq!(report.fatal_cycles().count(), 1);
    assert_eq!(report.len(), 3);
}

// ---- 运行时保护 ----

struct Level1;
struct Level2;
struct Level3;

#[test]
fn test_resolution_depth_limit() {
    let container = DiContainerImpl::with_config(ContainerConfig {
        max_resolution_depth: 2,
        eager_singletons: false,
        ..ContainerConfig::default()
    });
    container
        .register_all([
            ComponentDescriptor::builder::<Level1>()
                .depends_on::<Level2>()
                .factory(|_| Ok(Level1)),
            ComponentDescriptor::builder::<Level2>()
                .depends_on::<Level3>()
                .factory(|_| Ok(Level2)),
            ComponentDescriptor::builder::<Level3>().factory(|_| Ok(Level3)),
        ])
        .unwrap();

    assert!(matches!(
        container.resolve::<Level1>(),
        Err(DependencyError::ResolutionDepthExceeded { max_depth: 2, .. })
    ));
    assert!(container.resolve::<Level2>().is_ok());
}

struct QuotingCheckout {
    quoted: u32,
}

struct PriceList {
    checkout: Arc<QuotingCheckout>,
}

impl Pricing for PriceList {
    fn price(&self, sku: String) -> u32 {
        sku.len() as u32 + self.checkout.quoted
    }
}

#[test]
fn test_proxy_used_during_construction_reports_circular_resolution() {
    let container = DiContainerImpl::with_config(lazy_config());
    container
        .register_all([
            ComponentDescriptor::builder::<QuotingCheckout>()
                .depends_on_contract::<dyn Pricing>()
                .factory(|deps| {
                    let pricing = deps.contract::<dyn Pricing>()?;
                    Ok(QuotingCheckout {
                        quoted: pricing.price("abc".into()),
                    })
                }),
            ComponentDescriptor::builder::<PriceList>()
                .provides::<dyn Pricing>(|c| c as Arc<dyn Pricing>)
                .depends_on::<QuotingCheckout>()
                .factory(|deps| {
                    Ok(PriceList {
                        checkout: deps.get::<QuotingCheckout>()?,
                    })
                }),
        ])
        .unwrap();
    container.validate().unwrap();

    match container.resolve::<QuotingCheckout>() {
        Err(DependencyError::CircularResolution { chain }) => {
            assert_eq!(chain.len(), 3);
            assert!(chain[0].ends_with("QuotingCheckout"));
            assert!(chain[1].ends_with("PriceList"));
            assert!(chain[2].ends_with("QuotingCheckout"));
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
    assert_eq!(container.state(), di_common::ContainerState::Ready);
    assert!(container.singletons().is_empty());
}
