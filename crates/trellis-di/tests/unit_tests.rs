//! Unit tests for definitions, factories and lifecycle callbacks

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_di::*;

#[derive(Default)]
struct Calls {
    after_set: AtomicUsize,
    destroy: AtomicUsize,
}

struct Widget {
    calls: Arc<Calls>,
    fail: bool,
}

impl Initializing for Widget {
    fn bean_after_set(&self) -> anyhow::Result<()> {
        self.calls.after_set.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("widget refused to start");
        }
        Ok(())
    }
}

impl Disposable for Widget {
    fn bean_destroy(&self) -> anyhow::Result<()> {
        self.calls.destroy.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

bean!(Widget: dyn Initializing, dyn Disposable);

fn widget_name() -> &'static str {
    std::any::type_name::<Widget>()
}

#[test]
fn test_object_lifecycle_fires_once() -> DIResult<()> {
    let calls = Arc::new(Calls::default());
    let container = Container::new();
    let definition = container.register(Arc::new(Widget {
        calls: calls.clone(),
        fail: false,
    }))?;

    assert_eq!(definition.kind(), DefinitionKind::Object);
    assert!(definition.is_object());

    definition.after_set()?;
    definition.after_set()?;
    definition.destroy()?;
    definition.destroy()?;

    assert_eq!(calls.after_set.load(Ordering::SeqCst), 1);
    assert_eq!(calls.destroy.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_function_definition_reaches_every_instance() -> DIResult<()> {
    let calls = Arc::new(Calls::default());
    let shared = calls.clone();
    let container = Container::new();
    let definition = container.register(move || {
        Arc::new(Widget {
            calls: shared.clone(),
            fail: false,
        })
    })?;
    assert_eq!(definition.kind(), DefinitionKind::Function);

    let first = container.get(widget_name())?;
    let second = container.get(widget_name())?;
    assert!(!first.ptr_eq(&second));
    assert_eq!(definition.instances().len(), 2);

    definition.after_set()?;
    definition.after_set()?;
    assert_eq!(calls.after_set.load(Ordering::SeqCst), 2);

    definition.destroy()?;
    definition.destroy()?;
    assert_eq!(calls.destroy.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_singleton_factory_produces_once() -> DIResult<()> {
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = produced.clone();
    let container = Container::new();
    let definition = container.register(
        Factory::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(Widget {
                calls: Arc::new(Calls::default()),
                fail: false,
            })
        })
        .singleton(),
    )?;

    let first = container.get_by_type::<Widget>()?;
    let second = container.get_by_type::<Widget>()?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(produced.load(Ordering::SeqCst), 1);
    assert_eq!(definition.instances().len(), 1);
    Ok(())
}

#[test]
fn test_lifecycle_errors_are_collected() -> DIResult<()> {
    let container = Container::new();
    let definition = container.register(Arc::new(Widget {
        calls: Arc::new(Calls::default()),
        fail: true,
    }))?;

    match definition.after_set() {
        Err(DIError::Lifecycle { errors, .. }) => {
            assert_eq!(errors.len(), 1);
            assert!(errors.to_string().contains("refused"));
        }
        other => panic!("expected lifecycle error, got {:?}", other),
    }
    Ok(())
}

// ============================================================================
// Cycles
// ============================================================================

#[derive(Debug)]
struct Left;
impl Bean for Left {}

struct Right;
impl Bean for Right {}

#[test]
fn test_self_dependency_is_circular() -> DIResult<()> {
    let container = Container::new();
    container.register(|_: Arc<Left>| Arc::new(Left))?;

    let err = container.get_by_type::<Left>().unwrap_err();
    assert!(err.is_circular_dependency(), "unexpected error: {}", err);
    Ok(())
}

#[test]
fn test_transitive_cycle_is_detected_and_guard_resets() -> DIResult<()> {
    let container = Container::new();
    container.register(|_: Arc<Right>| Arc::new(Left))?;
    container.register(|_: Arc<Left>| Arc::new(Right))?;

    for _ in 0..2 {
        let err = container.get_by_type::<Left>().unwrap_err();
        assert!(err.is_circular_dependency(), "unexpected error: {}", err);
    }
    Ok(())
}

struct Slow;
impl Bean for Slow {}

#[test]
fn test_concurrent_resolution_is_not_a_cycle() {
    let container = Arc::new(Container::new());
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = produced.clone();
    container
        .register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(200));
            Arc::new(Slow)
        })
        .unwrap();

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                container.get_by_type::<Slow>().map(|_| ())
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert!(result.is_ok(), "unexpected error: {:?}", result.err());
    }
    assert_eq!(produced.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_singleton_resolution_shares_first_value() {
    let container = Arc::new(Container::new());
    container
        .register(
            Factory::new(|| {
                std::thread::sleep(std::time::Duration::from_millis(50));
                Arc::new(Slow)
            })
            .singleton(),
        )
        .unwrap();

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                container.get_by_type::<Slow>().unwrap()
            })
        })
        .collect();

    let beans: Vec<Arc<Slow>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(Arc::ptr_eq(&beans[0], &beans[1]));
    assert!(Arc::ptr_eq(&beans[0], &container.get_by_type::<Slow>().unwrap()));
}

#[derive(Default)]
struct LeftHolder {
    left: Autowired<Arc<Left>>,
}

impl Injectable for LeftHolder {
    fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
        vec![InjectionPoint::new("left", ",omiterror", &self.left)]
    }
}

bean!(LeftHolder: dyn Injectable);

#[test]
#[should_panic(expected = "circular dependency")]
fn test_cycle_aborts_even_when_slot_omits_errors() {
    let container = Container::new();
    container.register(|_: Arc<Left>| Arc::new(Left)).unwrap();

    let holder = LeftHolder::default();
    let _ = container.injector().inject(&container, &holder);
}

#[test]
#[should_panic(expected = "circular dependency")]
fn test_cycle_aborts_inject_function_with_omit_policy() {
    let container = Container::new();
    container.register(|_: Arc<Left>| Arc::new(Left)).unwrap();

    let registry = FunctionRegistry::new(container.injector().clone());
    registry.register(|_: Arc<Left>| {}, &[",omiterror"]).unwrap();
    let _ = registry.inject_all(&container);
}

// ============================================================================
// Custom factories
// ============================================================================

struct Server {
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl Server {
    fn new() -> Self {
        Self {
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    fn start(&self) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Bean for Server {}

method_table!(Server {
    "start" => Server::start,
    "stop" => Server::stop,
});

#[test]
fn test_custom_factory_runs_named_hooks() -> DIResult<()> {
    let container = Container::new();
    let definition = container.register(
        CustomFactory::<Server>::new(|| Arc::new(Server::new()))
            .init_method("start")
            .destroy_method("stop")
            .singleton(),
    )?;
    assert_eq!(definition.kind(), DefinitionKind::Custom);

    let server = container.get_by_type::<Server>()?;
    definition.after_set()?;
    definition.destroy()?;
    definition.destroy()?;

    assert_eq!(server.started.load(Ordering::SeqCst), 1);
    assert_eq!(server.stopped.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_custom_factory_validates_hooks() {
    let container = Container::new();

    let err = container
        .register(CustomFactory::<Server>::new(|| Arc::new(Server::new())).init_method("launch"))
        .unwrap_err();
    assert!(matches!(err, DIError::HookNotFound { .. }));

    let err = container
        .register(CustomFactory::<Server>::new(|| Arc::new(Server::new())).destroy_method("_stop"))
        .unwrap_err();
    assert!(matches!(err, DIError::PrivateHook { .. }));

    assert!(container.is_empty());
}

// ============================================================================
// Collections
// ============================================================================

trait Plugin: Send + Sync {
    fn id(&self) -> u32;
}

struct NumberedPlugin(u32);
impl Plugin for NumberedPlugin {
    fn id(&self) -> u32 {
        self.0
    }
}

bean!(NumberedPlugin: dyn Plugin);
bean!(dyn Plugin);

#[test]
fn test_registered_slice_is_found_by_canonical_name() -> DIResult<()> {
    let container = Container::new();
    let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(NumberedPlugin(1)), Arc::new(NumberedPlugin(2))];
    let definition = container.register(plugins)?;

    assert_eq!(definition.kind(), DefinitionKind::Slice);
    assert_eq!(definition.name(), TargetType::slice::<dyn Plugin>().name());
    assert!(definition.instances().is_empty());
    assert!(!definition.classify(|_| Ok(true))?);

    let resolved: Vec<Arc<dyn Plugin>> = container.injector().resolve(&container, "")?;
    let ids: Vec<u32> = resolved.iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    Ok(())
}

#[test]
fn test_registered_map_keeps_keys() -> DIResult<()> {
    let container = Container::new();
    let mut plugins: HashMap<String, Arc<dyn Plugin>> = HashMap::new();
    plugins.insert("b".into(), Arc::new(NumberedPlugin(2)));
    plugins.insert("a".into(), Arc::new(NumberedPlugin(1)));
    let definition = container.register(plugins)?;
    assert_eq!(definition.kind(), DefinitionKind::Map);

    let collection = definition.collection().expect("map definition");
    let keys: Vec<&str> = collection.entries().iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);

    let resolved: HashMap<String, Arc<dyn Plugin>> = container.injector().resolve(&container, "")?;
    assert_eq!(resolved["b"].id(), 2);
    Ok(())
}

#[test]
fn test_factory_param_names_select_beans() -> DIResult<()> {
    let container = Container::new();
    container.register_by_name("first", Arc::new(NumberedPlugin(1)))?;
    container.register_by_name("second", Arc::new(NumberedPlugin(2)))?;

    let chosen = Arc::new(AtomicUsize::new(0));
    let seen = chosen.clone();
    container.register_by_name(
        "sample",
        Factory::new(move |p: Arc<dyn Plugin>| {
            seen.store(p.id() as usize, Ordering::SeqCst);
            Arc::new(Left)
        })
        .names(["second"]),
    )?;
    container.get("sample")?;
    assert_eq!(chosen.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_classify_reports_handled_instances() -> DIResult<()> {
    let container = Container::new();
    let definition = container.register(Arc::new(NumberedPlugin(7)))?;

    let mut seen = Vec::new();
    let handled = definition.classify(|bean| {
        seen.push(bean.cast::<dyn Plugin>().map(|p| p.id()));
        Ok(bean.is::<dyn Plugin>())
    })?;
    assert!(handled);
    assert_eq!(seen, vec![Some(7)]);
    Ok(())
}

static CREATED: AtomicUsize = AtomicUsize::new(0);

fn counting_object_creator(source: BeanSource) -> DIResult<Definition> {
    CREATED.fetch_add(1, Ordering::SeqCst);
    definition::create_object(source)
}

#[test]
fn test_definition_creators_are_replaceable() -> DIResult<()> {
    let creators = DefinitionCreators::default().with_creator(DefinitionKind::Object, counting_object_creator);
    let container = Container::builder().creators(creators).build();

    container.register(Arc::new(NumberedPlugin(1)))?;
    assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    Ok(())
}
