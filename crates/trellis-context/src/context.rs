//! Application context
//!
//! [`ApplicationContext`] owns the container, the function registry, the
//! event processor and the registered processors, and drives them through
//! start and close:
//!
//! ```text
//! None --start()--> Initializing --(process ok)--> Initialized
//! ```
//!
//! `start` runs, in order: aware callbacks, auto-wiring of object beans,
//! processor classification, function injection, post-injection
//! callbacks, processor `process`, and finally publishes
//! [`ContextStartedEvent`]. `close` may be called from any state and only
//! the first call does anything.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trellis_di::{
    BeanRef, Container, Definition, FunctionRegistry, InjectFn, InjectFunction, Injector,
    IntoBean, RegisterOptions,
};
use trellis_events::{
    ApplicationEvent, ApplicationEventListener, ApplicationEventProcessor,
    ApplicationEventPublisher, DefaultEventProcessor, DisabledEventProcessor, EventResult,
};

use crate::banner;
use crate::config::{
    is_switched_off, MapProperties, Properties, APPLICATION_NAME, DEFAULT_APPLICATION_NAME,
    EVENT_MODE, INJECT_DISABLE,
};
use crate::error::{ContextError, ContextResult};
use crate::events::{ContextClosedEvent, ContextStartedEvent, ContextStoppedEvent};
use crate::processor::Processor;

/// Beans that want a handle to their context. Called at the start of
/// `start`, before injection.
pub trait ApplicationContextAware: Send + Sync {
    fn set_application_context(&self, context: &ApplicationContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    None,
    Initializing,
    Initialized,
}

impl ContextState {
    const NONE: u8 = 0;
    const INITIALIZING: u8 = 1;
    const INITIALIZED: u8 = 2;

    fn from_u8(value: u8) -> Self {
        match value {
            Self::NONE => ContextState::None,
            Self::INITIALIZING => ContextState::Initializing,
            _ => ContextState::Initialized,
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextState::None => "None",
            ContextState::Initializing => "Initializing",
            ContextState::Initialized => "Initialized",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct Settings {
    application_name: String,
    inject_disabled: bool,
    events_disabled: bool,
}

struct ContextInner {
    container: Arc<Container>,
    functions: FunctionRegistry,
    event_processor: RwLock<Arc<dyn ApplicationEventProcessor>>,
    properties: RwLock<Arc<dyn Properties>>,
    settings: RwLock<Settings>,
    awares: Mutex<Vec<Arc<dyn ApplicationContextAware>>>,
    processors: Mutex<Vec<Arc<dyn Processor>>>,
    state: AtomicU8,
    closed: Mutex<bool>,
}

/// Cheaply cloneable handle to one application context.
#[derive(Clone)]
pub struct ApplicationContext {
    inner: Arc<ContextInner>,
}

impl ApplicationContext {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    /// Read the recognized keys from `properties`, register the event
    /// publisher as a bean and start event delivery.
    pub fn init(&self, properties: Arc<dyn Properties>) -> ContextResult<()> {
        let events_off = properties
            .get(EVENT_MODE)
            .map(|mode| is_switched_off(&mode))
            .unwrap_or(false);
        let settings = {
            let mut settings = self.inner.settings.write();
            settings.application_name = properties.get_or(APPLICATION_NAME, DEFAULT_APPLICATION_NAME);
            settings.inject_disabled = properties.get_or(INJECT_DISABLE, "false") == "true";
            settings.events_disabled |= events_off;
            settings.clone()
        };
        *self.inner.properties.write() = properties;

        if settings.events_disabled {
            *self.inner.event_processor.write() = Arc::new(DisabledEventProcessor::new());
        }
        let processor = self.event_processor();
        self.inner.container.register(processor.clone().as_publisher())?;

        debug!(
            application = %settings.application_name,
            inject_disabled = settings.inject_disabled,
            events_disabled = settings.events_disabled,
            "Application context initialized"
        );
        processor.start()?;
        Ok(())
    }

    pub fn application_name(&self) -> String {
        self.inner.settings.read().application_name.clone()
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.inner.container
    }

    pub fn properties(&self) -> Arc<dyn Properties> {
        self.inner.properties.read().clone()
    }

    pub fn event_processor(&self) -> Arc<dyn ApplicationEventProcessor> {
        self.inner.event_processor.read().clone()
    }

    fn events_disabled(&self) -> bool {
        self.inner.settings.read().events_disabled
    }

    fn inject_disabled(&self) -> bool {
        self.inner.settings.read().inject_disabled
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_bean<M>(&self, bean: impl IntoBean<M>) -> ContextResult<Arc<Definition>> {
        self.register_bean_by_name_with("", bean, RegisterOptions::default())
    }

    pub fn register_bean_with<M>(
        &self,
        bean: impl IntoBean<M>,
        options: RegisterOptions,
    ) -> ContextResult<Arc<Definition>> {
        self.register_bean_by_name_with("", bean, options)
    }

    pub fn register_bean_by_name<M>(
        &self,
        name: &str,
        bean: impl IntoBean<M>,
    ) -> ContextResult<Arc<Definition>> {
        self.register_bean_by_name_with(name, bean, RegisterOptions::default())
    }

    /// Register a bean and hook up whatever capabilities it provides:
    /// event listeners and consumers, inject functions, context awareness
    /// and processors. Fails once the context has started.
    pub fn register_bean_by_name_with<M>(
        &self,
        name: &str,
        bean: impl IntoBean<M>,
        options: RegisterOptions,
    ) -> ContextResult<Arc<Definition>> {
        if self.state() != ContextState::None {
            return Err(ContextError::RegistrationClosed);
        }

        let definition = self
            .inner
            .container
            .register_by_name_with(name, bean, options)?;
        if let Some(bean) = definition.object() {
            self.attach_capabilities(bean)?;
        }
        Ok(definition)
    }

    fn attach_capabilities(&self, bean: &BeanRef) -> ContextResult<()> {
        if !self.events_disabled() && self.event_processor().add_bean_listeners(bean) {
            debug!(bean = bean.type_name(), "Bean attached as event listener");
        }
        if let Some(function) = bean.cast::<dyn InjectFunction>() {
            function.register_function(&self.inner.functions)?;
        }
        if let Some(aware) = bean.cast::<dyn ApplicationContextAware>() {
            self.inner.awares.lock().push(aware);
        }
        if let Some(processor) = bean.cast::<dyn Processor>() {
            self.add_processor(processor)?;
        }
        Ok(())
    }

    pub fn get_bean(&self, name: &str) -> ContextResult<BeanRef> {
        Ok(self.inner.container.get(name)?)
    }

    pub fn get_bean_as<T: ?Sized + 'static>(&self, name: &str) -> ContextResult<Arc<T>> {
        Ok(self.inner.container.get_as::<T>(name)?)
    }

    pub fn get_bean_by_type<T: ?Sized + 'static>(&self) -> ContextResult<Arc<T>> {
        Ok(self.inner.container.get_by_type::<T>()?)
    }

    /// Add a processor and run its `init` against the current properties.
    pub fn add_processor(&self, processor: Arc<dyn Processor>) -> ContextResult<()> {
        self.inner.processors.lock().push(processor.clone());
        let properties = self.properties();
        processor
            .init(properties.as_ref(), &self.inner.container)
            .map_err(|err| ContextError::processor(processor.processor_name(), err))?;
        debug!(processor = processor.processor_name(), "Added processor");
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn ApplicationEventListener>) {
        self.event_processor().add_listener(listener);
    }

    /// Add a callback for events of type `E`.
    pub fn add_fn<E, F>(&self, callback: F)
    where
        E: ApplicationEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.event_processor().add_fn(callback);
    }

    /// Register a function to run once during start with injected
    /// arguments. `names` pairs positionally with its parameters.
    pub fn add_inject_function<F, Args>(&self, function: F, names: &[&str]) -> ContextResult<()>
    where
        F: InjectFn<Args>,
    {
        Ok(self.inner.functions.register(function, names)?)
    }

    // ------------------------------------------------------------------
    // Start
    // ------------------------------------------------------------------

    pub fn start(&self) -> ContextResult<()> {
        banner::print_banner(self.properties().as_ref());

        self.transition(ContextState::None, ContextState::Initializing)?;
        info!(application = %self.application_name(), "Starting application context");

        self.notify_aware();
        self.inject_all();
        self.classify_beans();
        self.inject_functions();
        self.notify_bean_set();
        self.run_processors()?;

        self.transition(ContextState::Initializing, ContextState::Initialized)?;
        self.notify_started();
        info!(application = %self.application_name(), "Application context started");
        Ok(())
    }

    fn transition(&self, from: ContextState, to: ContextState) -> ContextResult<()> {
        match self.inner.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                debug!(from = %from, to = %to, "Context state changed");
                Ok(())
            }
            Err(current) => Err(ContextError::AlreadyStarted {
                state: ContextState::from_u8(current),
            }),
        }
    }

    fn notify_aware(&self) {
        let awares = self.inner.awares.lock().clone();
        for aware in awares {
            aware.set_application_context(self);
        }
    }

    fn inject_all(&self) {
        if self.inject_disabled() {
            return;
        }
        let container = &self.inner.container;
        let injector = container.injector();
        for definition in container.definitions() {
            let Some(bean) = definition.object() else {
                continue;
            };
            if !injector.can_inject(bean) {
                continue;
            }
            if let Err(err) = injector.inject_bean(container, bean) {
                error!(bean = definition.name(), error = %err, "Inject failed");
            }
        }
    }

    fn classify_beans(&self) {
        let processors = self.inner.processors.lock().clone();
        if processors.is_empty() {
            return;
        }
        for definition in self.inner.container.definitions() {
            for processor in &processors {
                if let Err(err) = definition.classify(|bean: &BeanRef| processor.classify(bean)) {
                    error!(
                        processor = processor.processor_name(),
                        error = %err,
                        "Classify failed"
                    );
                }
            }
        }
    }

    fn inject_functions(&self) {
        if self.inject_disabled() {
            return;
        }
        if let Err(err) = self.inner.functions.inject_all(&self.inner.container) {
            error!(error = %err, "Function injection failed");
        }
    }

    fn notify_bean_set(&self) {
        for definition in self.inner.container.definitions() {
            if let Err(err) = definition.after_set() {
                error!(error = %err, "Bean after set failed");
            }
        }
    }

    fn run_processors(&self) -> ContextResult<()> {
        let processors = self.inner.processors.lock().clone();
        for processor in processors {
            if let Err(err) = processor.process() {
                let err = ContextError::processor(processor.processor_name(), err);
                error!(error = %err, "Processor failed, aborting start");
                return Err(err);
            }
        }
        Ok(())
    }

    fn notify_started(&self) {
        if self.events_disabled() {
            return;
        }
        if let Err(err) = self
            .event_processor()
            .publish_event(Arc::new(ContextStartedEvent::new(self)))
        {
            warn!(error = %err, "Failed to publish context started event");
        }
    }

    // ------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------

    /// Drain queued events, tear down every bean and processor, and notify
    /// listeners. Errors are logged. Later calls return immediately.
    pub fn close(&self) -> ContextResult<()> {
        let mut closed = self.inner.closed.lock();
        if *closed {
            return Ok(());
        }
        *closed = true;

        info!(application = %self.application_name(), "Closing application context");
        let processor = self.event_processor();
        if let Err(err) = processor.close() {
            error!(error = %err, "Failed to close event processor");
        }
        self.notify(processor.as_ref(), &ContextStoppedEvent::new(self));
        self.destroy_beans();
        self.destroy_processors();
        self.notify(processor.as_ref(), &ContextClosedEvent::new(self));
        info!(application = %self.application_name(), "Application context closed");
        Ok(())
    }

    fn notify(&self, processor: &dyn ApplicationEventProcessor, event: &dyn ApplicationEvent) {
        if self.events_disabled() {
            return;
        }
        if let Err(err) = processor.notify_event(event) {
            error!(error = %err, "Failed to notify context event");
        }
    }

    fn destroy_beans(&self) {
        for definition in self.inner.container.definitions() {
            if let Err(err) = definition.destroy() {
                error!(error = %err, "Bean destroy failed");
            }
        }
    }

    fn destroy_processors(&self) {
        let processors = self.inner.processors.lock().clone();
        for processor in processors {
            if let Err(err) = processor.destroy() {
                error!(
                    processor = processor.processor_name(),
                    error = %format!("{:#}", err),
                    "Processor destroy failed"
                );
            }
        }
    }
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("application", &self.application_name())
            .field("state", &self.state())
            .field("beans", &self.inner.container.len())
            .finish()
    }
}

#[async_trait]
impl ApplicationEventPublisher for ApplicationContext {
    fn publish_event(&self, event: Arc<dyn ApplicationEvent>) -> EventResult<()> {
        self.event_processor().publish_event(event)
    }

    async fn post_event(
        &self,
        cancel: &CancellationToken,
        event: Arc<dyn ApplicationEvent>,
    ) -> EventResult<()> {
        let processor = self.event_processor();
        processor.post_event(cancel, event).await
    }

    fn send_event(&self, event: &dyn ApplicationEvent) -> EventResult<()> {
        self.event_processor().send_event(event)
    }
}

/// Builder for [`ApplicationContext`].
pub struct ApplicationContextBuilder {
    container: Option<Arc<Container>>,
    injector: Option<Arc<Injector>>,
    event_processor: Option<Arc<dyn ApplicationEventProcessor>>,
    disable_events: bool,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            container: None,
            injector: None,
            event_processor: None,
            disable_events: false,
        }
    }

    /// Use an existing container. Its injector is used for everything.
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    /// Injector for the container the builder creates. Ignored when a
    /// container is supplied.
    pub fn injector(mut self, injector: Arc<Injector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn event_processor(mut self, processor: Arc<dyn ApplicationEventProcessor>) -> Self {
        self.event_processor = Some(processor);
        self
    }

    /// Turn events off regardless of configuration.
    pub fn disable_events(mut self) -> Self {
        self.disable_events = true;
        self
    }

    pub fn build(self) -> ApplicationContext {
        let container = match (self.container, self.injector) {
            (Some(container), _) => container,
            (None, Some(injector)) => Arc::new(Container::builder().injector(injector).build()),
            (None, None) => Arc::new(Container::new()),
        };
        let event_processor = self
            .event_processor
            .unwrap_or_else(|| Arc::new(DefaultEventProcessor::new()));
        let functions = FunctionRegistry::new(container.injector().clone());
        let properties: Arc<dyn Properties> = Arc::new(MapProperties::new());

        ApplicationContext {
            inner: Arc::new(ContextInner {
                container,
                functions,
                event_processor: RwLock::new(event_processor),
                properties: RwLock::new(properties),
                settings: RwLock::new(Settings {
                    application_name: DEFAULT_APPLICATION_NAME.to_string(),
                    inject_disabled: false,
                    events_disabled: self.disable_events,
                }),
                awares: Mutex::new(Vec::new()),
                processors: Mutex::new(Vec::new()),
                state: AtomicU8::new(ContextState::NONE),
                closed: Mutex::new(false),
            }),
        }
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
