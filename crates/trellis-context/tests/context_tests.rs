//! Lifecycle tests for the application context

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use trellis_context::*;
use trellis_di::{
    bean, Autowired, BeanRef, Container, Disposable, Initializing, Injectable, InjectionPoint,
    RegisterOptions,
};
use trellis_events::{
    ApplicationEvent, ApplicationEventConsumer, ApplicationEventPublisher, BaseEvent,
    ConsumerRegistry,
};

#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

fn quiet() -> MapProperties {
    MapProperties::new().with("application.bannerMode", "off")
}

fn context_with(properties: MapProperties) -> ApplicationContext {
    let context = ApplicationContext::new();
    context.init(Arc::new(properties)).unwrap();
    context
}

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        7
    }
}

bean!(FixedClock: dyn Clock);

struct Service {
    journal: Arc<Journal>,
    clock: Autowired<Arc<dyn Clock>>,
    application: Mutex<Option<String>>,
}

impl Service {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            clock: Autowired::new(),
            application: Mutex::new(None),
        }
    }
}

impl Injectable for Service {
    fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
        vec![InjectionPoint::new("clock", "", &self.clock)]
    }
}

impl ApplicationContextAware for Service {
    fn set_application_context(&self, context: &ApplicationContext) {
        *self.application.lock() = Some(context.application_name());
        self.journal.push("aware");
    }
}

impl Initializing for Service {
    fn bean_after_set(&self) -> anyhow::Result<()> {
        self.journal.push("after_set");
        Ok(())
    }
}

impl Disposable for Service {
    fn bean_destroy(&self) -> anyhow::Result<()> {
        self.journal.push("destroy");
        Ok(())
    }
}

bean!(
    Service: dyn Injectable,
    dyn ApplicationContextAware,
    dyn Initializing,
    dyn Disposable
);

struct Recorder {
    journal: Arc<Journal>,
    fail: bool,
}

impl Processor for Recorder {
    fn init(&self, _properties: &dyn Properties, _container: &Container) -> anyhow::Result<()> {
        self.journal.push("init");
        Ok(())
    }

    fn classify(&self, bean: &BeanRef) -> anyhow::Result<bool> {
        match bean.downcast::<Service>() {
            Some(service) => {
                let wired = if service.clock.is_set() { "wired" } else { "unwired" };
                self.journal.push(format!("classify:{}", wired));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn process(&self) -> anyhow::Result<()> {
        self.journal.push("process");
        if self.fail {
            anyhow::bail!("cannot process");
        }
        Ok(())
    }

    fn destroy(&self) -> anyhow::Result<()> {
        self.journal.push("processor_destroy");
        Ok(())
    }
}

bean!(Recorder: dyn Processor);

fn record_context_events(context: &ApplicationContext, journal: &Arc<Journal>) {
    let j = journal.clone();
    context.add_fn(move |_: &ContextStartedEvent| j.push("started"));
    let j = journal.clone();
    context.add_fn(move |_: &ContextStoppedEvent| j.push("stopped"));
    let j = journal.clone();
    context.add_fn(move |_: &ContextClosedEvent| j.push("closed"));
}

#[test]
fn test_start_and_close_run_phases_in_order() -> ContextResult<()> {
    let journal = Arc::new(Journal::default());
    let context = context_with(quiet().with("application.name", "phases"));
    record_context_events(&context, &journal);

    let service = Arc::new(Service::new(journal.clone()));
    context.register_bean(Arc::new(FixedClock))?;
    context.register_bean(service.clone())?;
    context.register_bean(Arc::new(Recorder {
        journal: journal.clone(),
        fail: false,
    }))?;
    let j = journal.clone();
    context.add_inject_function(
        move |service: Arc<Service>| {
            assert!(service.clock.is_set());
            j.push("function");
        },
        &[],
    )?;

    context.start()?;
    assert_eq!(context.state(), ContextState::Initialized);
    assert_eq!(service.clock.get().map(|clock| clock.now()), Some(7));
    assert_eq!(service.application.lock().as_deref(), Some("phases"));

    context.close()?;
    assert_eq!(
        journal.entries(),
        vec![
            "init",
            "aware",
            "classify:wired",
            "function",
            "after_set",
            "process",
            "started",
            "stopped",
            "destroy",
            "processor_destroy",
            "closed",
        ]
    );
    Ok(())
}

#[test]
fn test_processor_failure_aborts_start() -> ContextResult<()> {
    let journal = Arc::new(Journal::default());
    let context = context_with(quiet());
    record_context_events(&context, &journal);
    context.add_processor(Arc::new(Recorder {
        journal: journal.clone(),
        fail: true,
    }))?;

    let result = context.start();
    assert!(matches!(result, Err(ContextError::Processor { ref message, .. }) if message.contains("cannot process")));
    assert_eq!(context.state(), ContextState::Initializing);

    context.close()?;
    let entries = journal.entries();
    assert!(!entries.contains(&"started".to_string()));
    assert!(entries.contains(&"closed".to_string()));
    Ok(())
}

#[test]
fn test_inject_disable_skips_wiring_and_functions() -> ContextResult<()> {
    let journal = Arc::new(Journal::default());
    let context = context_with(quiet().with("inject.disable", "true"));
    let service = Arc::new(Service::new(journal.clone()));
    context.register_bean(Arc::new(FixedClock))?;
    context.register_bean(service.clone())?;

    let called = Arc::new(AtomicUsize::new(0));
    let counter = called.clone();
    context.add_inject_function(
        move |_: Arc<dyn Clock>| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        &[],
    )?;

    context.start()?;
    assert!(!service.clock.is_set());
    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert!(journal.entries().contains(&"after_set".to_string()));
    context.close()?;
    Ok(())
}

struct Ordered {
    name: &'static str,
    journal: Arc<Journal>,
}

impl Disposable for Ordered {
    fn bean_destroy(&self) -> anyhow::Result<()> {
        self.journal.push(self.name);
        Ok(())
    }
}

bean!(Ordered: dyn Disposable);

#[test]
fn test_beans_are_destroyed_in_container_order() -> ContextResult<()> {
    let journal = Arc::new(Journal::default());
    let context = context_with(quiet());
    for (name, order) in [("late", 10), ("default", 0), ("early", -5)] {
        context.register_bean_by_name_with(
            name,
            Arc::new(Ordered {
                name,
                journal: journal.clone(),
            }),
            RegisterOptions::order(order),
        )?;
    }

    context.start()?;
    context.close()?;
    context.close()?;
    assert_eq!(journal.entries(), vec!["early", "default", "late"]);
    Ok(())
}

#[derive(Debug)]
struct OrderPlaced {
    base: BaseEvent,
    id: u32,
}

impl ApplicationEvent for OrderPlaced {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.occurred_at()
    }
}

struct OrderAudit {
    seen: Mutex<Vec<u32>>,
}

impl ApplicationEventConsumer for OrderAudit {
    fn register_consumer(self: Arc<Self>, registry: &mut ConsumerRegistry) -> anyhow::Result<()> {
        registry.register(move |event: &OrderPlaced| self.seen.lock().push(event.id));
        Ok(())
    }
}

bean!(OrderAudit: dyn ApplicationEventConsumer);

#[test]
fn test_consumer_beans_receive_events() -> ContextResult<()> {
    let context = context_with(quiet());
    let audit = Arc::new(OrderAudit {
        seen: Mutex::new(Vec::new()),
    });
    context.register_bean(audit.clone())?;
    context.start()?;

    for id in 1..=3 {
        context.publish_event(Arc::new(OrderPlaced {
            base: BaseEvent::new(),
            id,
        }))?;
    }
    context.close()?;
    assert_eq!(*audit.seen.lock(), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_publisher_bean_reaches_the_same_listeners() -> ContextResult<()> {
    let context = context_with(quiet());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    context.add_fn(move |_: &OrderPlaced| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let publisher = context.get_bean_by_type::<dyn ApplicationEventPublisher>()?;
    publisher.send_event(&OrderPlaced {
        base: BaseEvent::new(),
        id: 9,
    })?;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    context.close()?;
    Ok(())
}

#[test]
fn test_disabled_events_skip_lifecycle_notifications() -> ContextResult<()> {
    let journal = Arc::new(Journal::default());
    let context = ApplicationContext::builder().disable_events().build();
    context.init(Arc::new(quiet()))?;
    record_context_events(&context, &journal);

    context.start()?;
    context.close()?;
    assert!(journal.entries().is_empty());
    Ok(())
}
