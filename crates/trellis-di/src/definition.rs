//! Bean definitions: one producer plus its lifecycle state

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::debug;

use crate::container::Container;
use crate::error::{DIError, DIResult, ErrorList};
use crate::lifecycle::{Disposable, Hook, Initializing, OnceFlags};
use crate::source::{BeanSource, CollectionSource, CustomSource, FunctionSource, Producer};
use crate::target::{Resolved, TargetType};
use crate::types::{Bean, BeanRef, BeanType, TypeKey};

/// Producer shape of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionKind {
    Object,
    Slice,
    Map,
    Function,
    Custom,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DefinitionKind::Object => "Object",
            DefinitionKind::Slice => "Slice",
            DefinitionKind::Map => "Map",
            DefinitionKind::Function => "Function",
            DefinitionKind::Custom => "Custom",
        };
        f.write_str(name)
    }
}

/// The container's wrapper around one registered producer.
pub enum Definition {
    Object(ObjectDefinition),
    Slice(CollectionDefinition),
    Map(CollectionDefinition),
    Function(FunctionDefinition),
    Custom(CustomDefinition),
}

impl Definition {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Definition::Object(_) => DefinitionKind::Object,
            Definition::Slice(_) => DefinitionKind::Slice,
            Definition::Map(_) => DefinitionKind::Map,
            Definition::Function(_) => DefinitionKind::Function,
            Definition::Custom(_) => DefinitionKind::Custom,
        }
    }

    /// Default registration name: the produced type's name.
    pub fn name(&self) -> &str {
        match self {
            Definition::Object(d) => d.bean.type_name(),
            Definition::Slice(d) | Definition::Map(d) => &d.name,
            Definition::Function(d) => d.bean_type.name(),
            Definition::Custom(d) => d.function.bean_type.name(),
        }
    }

    pub fn bean_type(&self) -> &BeanType {
        match self {
            Definition::Object(d) => d.bean.bean_type(),
            Definition::Slice(d) | Definition::Map(d) => d.bean.bean_type(),
            Definition::Function(d) => &d.bean_type,
            Definition::Custom(d) => &d.function.bean_type,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Definition::Object(_))
    }

    /// The registered instance of an object definition.
    pub fn object(&self) -> Option<&BeanRef> {
        match self {
            Definition::Object(d) => Some(&d.bean),
            _ => None,
        }
    }

    pub fn collection(&self) -> Option<&CollectionDefinition> {
        match self {
            Definition::Slice(d) | Definition::Map(d) => Some(d),
            _ => None,
        }
    }

    /// Produce the bean. Function shapes run their factory on every call
    /// unless registered as singletons.
    pub fn value(&self, container: &Container) -> DIResult<BeanRef> {
        match self {
            Definition::Object(d) => Ok(d.bean.clone()),
            Definition::Slice(d) | Definition::Map(d) => Ok(d.bean.clone()),
            Definition::Function(d) => d.value(container),
            Definition::Custom(d) => d.function.value(container),
        }
    }

    /// Every instance lifecycle callbacks will reach.
    pub fn instances(&self) -> Vec<BeanRef> {
        match self {
            Definition::Object(d) => vec![d.bean.clone()],
            Definition::Slice(_) | Definition::Map(_) => Vec::new(),
            Definition::Function(d) => d.instances(),
            Definition::Custom(d) => d.function.instances(),
        }
    }

    /// Offer each instance to `classifier`; true if any was handled.
    pub fn classify<F>(&self, mut classifier: F) -> DIResult<bool>
    where
        F: FnMut(&BeanRef) -> anyhow::Result<bool>,
    {
        let mut handled = false;
        let mut errors = ErrorList::new();
        for bean in self.instances() {
            match classifier(&bean) {
                Ok(true) => handled = true,
                Ok(false) => {}
                Err(err) => errors.push(format!("{:#}", err)),
            }
        }
        errors.into_lifecycle(self.name())?;
        Ok(handled)
    }

    /// Run post-injection callbacks. Only the first call does anything.
    pub fn after_set(&self) -> DIResult<()> {
        match self {
            Definition::Object(d) => d.after_set(),
            Definition::Slice(_) | Definition::Map(_) => Ok(()),
            Definition::Function(d) => d.after_set_with(None),
            Definition::Custom(d) => d.function.after_set_with(d.init.as_ref()),
        }
    }

    /// Run teardown callbacks. Only the first call does anything.
    pub fn destroy(&self) -> DIResult<()> {
        match self {
            Definition::Object(d) => d.destroy(),
            Definition::Slice(_) | Definition::Map(_) => Ok(()),
            Definition::Function(d) => d.destroy_with(None),
            Definition::Custom(d) => d.function.destroy_with(d.destroy.as_ref()),
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

// ============================================================================
// Object
// ============================================================================

pub struct ObjectDefinition {
    bean: BeanRef,
    flags: OnceFlags,
}

impl ObjectDefinition {
    pub fn new(bean: BeanRef) -> Self {
        Self {
            bean,
            flags: OnceFlags::default(),
        }
    }

    fn after_set(&self) -> DIResult<()> {
        if !self.flags.begin_after_set() {
            return Ok(());
        }
        let mut errors = ErrorList::new();
        if let Some(bean) = self.bean.cast::<dyn Initializing>() {
            if let Err(err) = bean.bean_after_set() {
                errors.push(format!("{:#}", err));
            }
        }
        errors.into_lifecycle(self.bean.type_name())
    }

    fn destroy(&self) -> DIResult<()> {
        if !self.flags.begin_destroy() {
            return Ok(());
        }
        let mut errors = ErrorList::new();
        if let Some(bean) = self.bean.cast::<dyn Disposable>() {
            if let Err(err) = bean.bean_destroy() {
                errors.push(format!("{:#}", err));
            }
        }
        errors.into_lifecycle(self.bean.type_name())
    }
}

// ============================================================================
// Slice / Map
// ============================================================================

/// A materialized collection, as returned by `value()` on slice and map
/// definitions.
#[derive(Debug, Clone)]
pub struct BeanCollection {
    element: TypeKey,
    entries: Vec<(String, BeanRef)>,
}

impl Bean for BeanCollection {}

impl BeanCollection {
    pub fn element(&self) -> TypeKey {
        self.element
    }

    pub fn entries(&self) -> &[(String, BeanRef)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Elements viewable as `T`, in stored order.
    pub fn to_vec<T: ?Sized + 'static>(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter_map(|(_, bean)| bean.cast::<T>())
            .collect()
    }

    /// Elements viewable as `T`, keyed by entry name.
    pub fn to_map<T: ?Sized + 'static>(&self) -> HashMap<String, Arc<T>> {
        self.entries
            .iter()
            .filter_map(|(key, bean)| bean.cast::<T>().map(|value| (key.clone(), value)))
            .collect()
    }
}

pub struct CollectionDefinition {
    name: String,
    collection: Arc<BeanCollection>,
    bean: BeanRef,
}

impl CollectionDefinition {
    pub fn new(name: impl Into<String>, element: TypeKey, entries: Vec<(String, BeanRef)>) -> Self {
        let collection = Arc::new(BeanCollection { element, entries });
        Self {
            name: name.into(),
            bean: BeanRef::new(collection.clone()),
            collection,
        }
    }

    pub fn element(&self) -> TypeKey {
        self.collection.element
    }

    pub fn entries(&self) -> &[(String, BeanRef)] {
        &self.collection.entries
    }

    /// Entries whose bean is assignable to `target`.
    pub fn assignable_entries(&self, target: TypeKey) -> Vec<(String, BeanRef)> {
        self.collection
            .entries
            .iter()
            .filter(|(_, bean)| bean.bean_type().assignable_to(target))
            .cloned()
            .collect()
    }
}

// ============================================================================
// Function / Custom
// ============================================================================

/// Marks a function definition as in flight on the current thread;
/// clears the mark on drop. Other threads may resolve the same
/// definition concurrently.
struct ResolveGuard<'a> {
    resolving: &'a Mutex<Vec<ThreadId>>,
    thread: ThreadId,
}

impl<'a> ResolveGuard<'a> {
    /// `None` when the current thread is already resolving this definition.
    fn enter(resolving: &'a Mutex<Vec<ThreadId>>) -> Option<Self> {
        let thread = thread::current().id();
        let mut threads = resolving.lock();
        if threads.contains(&thread) {
            return None;
        }
        threads.push(thread);
        Some(Self { resolving, thread })
    }
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        self.resolving.lock().retain(|thread| *thread != self.thread);
    }
}

pub struct FunctionDefinition {
    kind: DefinitionKind,
    function: &'static str,
    bean_type: Arc<BeanType>,
    params: Vec<TargetType>,
    names: Vec<String>,
    producer: Producer,
    resolving: Mutex<Vec<ThreadId>>,
    singleton: Option<Mutex<Option<BeanRef>>>,
    instances: Mutex<Vec<BeanRef>>,
    flags: OnceFlags,
}

impl FunctionDefinition {
    pub fn new(source: FunctionSource) -> Self {
        Self::with_kind(source, DefinitionKind::Function)
    }

    fn with_kind(source: FunctionSource, kind: DefinitionKind) -> Self {
        let names = pad_names(source.names, source.params.len());
        Self {
            kind,
            function: source.function,
            bean_type: source.bean_type,
            params: source.params,
            names,
            producer: source.producer,
            resolving: Mutex::new(Vec::new()),
            singleton: source.singleton.then(|| Mutex::new(None)),
            instances: Mutex::new(Vec::new()),
            flags: OnceFlags::default(),
        }
    }

    pub fn params(&self) -> &[TargetType] {
        &self.params
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton.is_some()
    }

    fn value(&self, container: &Container) -> DIResult<BeanRef> {
        if let Some(cache) = &self.singleton {
            if let Some(bean) = cache.lock().clone() {
                return Ok(bean);
            }
        }

        let _guard = ResolveGuard::enter(&self.resolving).ok_or_else(|| {
            DIError::CircularDependency {
                kind: self.kind,
                name: self.bean_type.name().to_string(),
            }
        })?;

        let args = self.resolve_params(container)?;
        let mut bean = (self.producer)(args)?;

        if let Some(cache) = &self.singleton {
            // First producer to finish wins when threads race.
            let mut cached = cache.lock();
            match cached.as_ref() {
                Some(existing) => bean = existing.clone(),
                None => *cached = Some(bean.clone()),
            }
        }
        self.record(&bean);
        Ok(bean)
    }

    fn resolve_params(&self, container: &Container) -> DIResult<Vec<Resolved>> {
        let injector = container.injector();
        let mut args = Vec::with_capacity(self.params.len());
        for (index, param) in self.params.iter().enumerate() {
            // Policies only apply at the slot that asked for this bean.
            let tag = injector.listeners().parse(&self.names[index]);
            let resolved = injector
                .inject_value(container, &tag.name, param)
                .map_err(|err| DIError::FactoryParam {
                    factory: self.function.to_string(),
                    index,
                    param: param.name().to_string(),
                    source: Box::new(err),
                })?;
            args.push(resolved);
        }
        Ok(args)
    }

    fn record(&self, bean: &BeanRef) {
        let mut instances = self.instances.lock();
        if !instances.iter().any(|existing| existing.ptr_eq(bean)) {
            debug!(bean = self.bean_type.name(), "Recorded produced instance");
            instances.push(bean.clone());
        }
    }

    fn instances(&self) -> Vec<BeanRef> {
        self.instances.lock().clone()
    }

    fn after_set_with(&self, hook: Option<&Hook>) -> DIResult<()> {
        if !self.flags.begin_after_set() {
            return Ok(());
        }
        let mut errors = ErrorList::new();
        for bean in self.instances() {
            if let Some(value) = bean.cast::<dyn Initializing>() {
                if let Err(err) = value.bean_after_set() {
                    errors.push(format!("{:#}", err));
                }
            }
            if let Some(hook) = hook {
                if let Err(err) = hook(&bean) {
                    errors.push(format!("{:#}", err));
                }
            }
        }
        errors.into_lifecycle(self.bean_type.name())
    }

    fn destroy_with(&self, hook: Option<&Hook>) -> DIResult<()> {
        if !self.flags.begin_destroy() {
            return Ok(());
        }
        let mut errors = ErrorList::new();
        for bean in self.instances() {
            if let Some(hook) = hook {
                if let Err(err) = hook(&bean) {
                    errors.push(format!("{:#}", err));
                }
            }
            if let Some(value) = bean.cast::<dyn Disposable>() {
                if let Err(err) = value.bean_destroy() {
                    errors.push(format!("{:#}", err));
                }
            }
        }
        errors.into_lifecycle(self.bean_type.name())
    }
}

fn pad_names(mut names: Vec<String>, size: usize) -> Vec<String> {
    names.resize(size, String::new());
    names
}

pub struct CustomDefinition {
    function: FunctionDefinition,
    init: Option<Hook>,
    destroy: Option<Hook>,
}

impl CustomDefinition {
    pub fn new(source: CustomSource) -> DIResult<Self> {
        let type_name = source.function.bean_type.name();
        let init = resolve_hook(&source, type_name, "init", &source.init_method)?;
        let destroy = resolve_hook(&source, type_name, "destroy", &source.destroy_method)?;
        Ok(Self {
            function: FunctionDefinition::with_kind(source.function, DefinitionKind::Custom),
            init,
            destroy,
        })
    }
}

fn resolve_hook(
    source: &CustomSource,
    type_name: &str,
    hook: &'static str,
    method: &str,
) -> DIResult<Option<Hook>> {
    if method.is_empty() {
        return Ok(None);
    }
    if method.starts_with('_') {
        return Err(DIError::PrivateHook {
            type_name: type_name.to_string(),
            hook,
            method: method.to_string(),
        });
    }
    (source.lookup)(method)
        .map(Some)
        .ok_or_else(|| DIError::HookNotFound {
            type_name: type_name.to_string(),
            hook,
            method: method.to_string(),
        })
}

// ============================================================================
// Creator table
// ============================================================================

/// Builds a definition from a registration source.
pub type DefinitionCreator = fn(BeanSource) -> DIResult<Definition>;

/// Strategy table mapping each producer shape to its creator.
#[derive(Clone)]
pub struct DefinitionCreators {
    creators: HashMap<DefinitionKind, DefinitionCreator>,
}

impl DefinitionCreators {
    /// A table that accepts nothing.
    pub fn empty() -> Self {
        Self {
            creators: HashMap::new(),
        }
    }

    pub fn with_creator(mut self, kind: DefinitionKind, creator: DefinitionCreator) -> Self {
        self.set(kind, creator);
        self
    }

    pub fn set(&mut self, kind: DefinitionKind, creator: DefinitionCreator) {
        self.creators.insert(kind, creator);
    }

    pub fn remove(&mut self, kind: DefinitionKind) {
        self.creators.remove(&kind);
    }

    pub fn supports(&self, kind: DefinitionKind) -> bool {
        self.creators.contains_key(&kind)
    }

    pub fn create(&self, source: BeanSource) -> DIResult<Definition> {
        let kind = source.kind();
        let creator = self
            .creators
            .get(&kind)
            .ok_or(DIError::UnsupportedShape { kind })?;
        creator(source)
    }
}

impl Default for DefinitionCreators {
    fn default() -> Self {
        Self::empty()
            .with_creator(DefinitionKind::Object, create_object)
            .with_creator(DefinitionKind::Slice, create_slice)
            .with_creator(DefinitionKind::Map, create_map)
            .with_creator(DefinitionKind::Function, create_function)
            .with_creator(DefinitionKind::Custom, create_custom)
    }
}

impl fmt::Debug for DefinitionCreators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.creators.keys().copied().collect();
        kinds.sort();
        f.debug_struct("DefinitionCreators").field("kinds", &kinds).finish()
    }
}

fn mismatched(source: &BeanSource) -> DIError {
    DIError::UnsupportedShape {
        kind: source.kind(),
    }
}

pub fn create_object(source: BeanSource) -> DIResult<Definition> {
    match source {
        BeanSource::Object(bean) => Ok(Definition::Object(ObjectDefinition::new(bean))),
        other => Err(mismatched(&other)),
    }
}

fn collection(source: CollectionSource) -> CollectionDefinition {
    CollectionDefinition::new(source.name, source.element, source.entries)
}

pub fn create_slice(source: BeanSource) -> DIResult<Definition> {
    match source {
        BeanSource::Slice(source) => Ok(Definition::Slice(collection(source))),
        other => Err(mismatched(&other)),
    }
}

pub fn create_map(source: BeanSource) -> DIResult<Definition> {
    match source {
        BeanSource::Map(source) => Ok(Definition::Map(collection(source))),
        other => Err(mismatched(&other)),
    }
}

pub fn create_function(source: BeanSource) -> DIResult<Definition> {
    match source {
        BeanSource::Function(source) => Ok(Definition::Function(FunctionDefinition::new(source))),
        other => Err(mismatched(&other)),
    }
}

pub fn create_custom(source: BeanSource) -> DIResult<Definition> {
    match source {
        BeanSource::Custom(source) => Ok(Definition::Custom(CustomDefinition::new(source)?)),
        other => Err(mismatched(&other)),
    }
}
