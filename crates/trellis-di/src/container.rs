//! Ordered, concurrent bean registry

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::definition::{Definition, DefinitionCreators};
use crate::error::{DIError, DIResult};
use crate::injector::Injector;
use crate::source::IntoBean;
use crate::types::{BeanRef, TypeKey};

/// Order used when none is given. Lower orders are visited first.
pub const DEFAULT_ORDER: i32 = 0;

/// Per-registration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOptions {
    pub order: i32,
}

impl RegisterOptions {
    pub fn order(order: i32) -> Self {
        Self { order }
    }
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
        }
    }
}

struct Pool {
    entries: HashMap<String, Arc<Definition>>,
    order: BTreeMap<i32, Vec<String>>,
    keys: Option<Arc<Vec<String>>>,
}

impl Pool {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            keys: None,
        }
    }

    fn insert(&mut self, name: String, definition: Arc<Definition>, order: i32) -> DIResult<()> {
        if self.entries.contains_key(&name) {
            return Err(DIError::DuplicateName { name });
        }
        self.order.entry(order).or_default().push(name.clone());
        self.entries.insert(name, definition);
        self.keys = None;
        Ok(())
    }

    fn keys(&mut self, cache: bool) -> Arc<Vec<String>> {
        if let Some(keys) = &self.keys {
            return keys.clone();
        }
        let keys: Arc<Vec<String>> = Arc::new(self.order.values().flatten().cloned().collect());
        if cache {
            self.keys = Some(keys.clone());
        }
        keys
    }
}

/// Maps names to bean definitions and iterates them in registration order,
/// grouped by ascending [`RegisterOptions::order`].
///
/// The lock is never held while a definition produces a value or while a
/// scan visitor runs, so definitions may resolve their own dependencies
/// through the container.
pub struct Container {
    pool: Mutex<Pool>,
    creators: DefinitionCreators,
    injector: Arc<Injector>,
    key_cache: bool,
}

impl Container {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Register under the derived name of the bean's definition.
    pub fn register<M>(&self, bean: impl IntoBean<M>) -> DIResult<Arc<Definition>> {
        self.register_by_name_with("", bean, RegisterOptions::default())
    }

    pub fn register_with<M>(
        &self,
        bean: impl IntoBean<M>,
        options: RegisterOptions,
    ) -> DIResult<Arc<Definition>> {
        self.register_by_name_with("", bean, options)
    }

    /// Register under `name`. An empty name falls back to the derived name.
    pub fn register_by_name<M>(&self, name: &str, bean: impl IntoBean<M>) -> DIResult<Arc<Definition>> {
        self.register_by_name_with(name, bean, RegisterOptions::default())
    }

    pub fn register_by_name_with<M>(
        &self,
        name: &str,
        bean: impl IntoBean<M>,
        options: RegisterOptions,
    ) -> DIResult<Arc<Definition>> {
        let definition = Arc::new(self.creators.create(bean.into_source())?);
        let name = if name.is_empty() {
            definition.name().to_string()
        } else {
            name.to_string()
        };
        if name.is_empty() {
            return Err(DIError::EmptyName {
                type_name: definition.bean_type().name().to_string(),
            });
        }

        self.pool
            .lock()
            .insert(name.clone(), definition.clone(), options.order)?;
        debug!(
            name = %name,
            kind = %definition.kind(),
            order = options.order,
            "Registered bean"
        );
        Ok(definition)
    }

    /// Store an existing definition under an additional name.
    pub fn put_definition(&self, name: &str, definition: Arc<Definition>) -> DIResult<()> {
        self.pool
            .lock()
            .insert(name.to_string(), definition, DEFAULT_ORDER)?;
        debug!(name = %name, "Cached definition");
        Ok(())
    }

    pub fn get_definition(&self, name: &str) -> Option<Arc<Definition>> {
        self.pool.lock().entries.get(name).cloned()
    }

    /// Produce the bean registered as `name`.
    pub fn get(&self, name: &str) -> DIResult<BeanRef> {
        let definition = self.get_definition(name).ok_or_else(|| DIError::NotFound {
            name: name.to_string(),
        })?;
        definition.value(self)
    }

    /// Produce the bean registered as `name`, viewed as `T`.
    pub fn get_as<T: ?Sized + 'static>(&self, name: &str) -> DIResult<Arc<T>> {
        let bean = self.get(name)?;
        bean.cast::<T>().ok_or_else(|| DIError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found: bean.type_name().to_string(),
        })
    }

    /// Produce the bean registered under `T`'s type name.
    pub fn get_by_type<T: ?Sized + 'static>(&self) -> DIResult<Arc<T>> {
        self.get_as::<T>(TypeKey::of::<T>().name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pool.lock().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pool.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered name in scan order.
    pub fn keys(&self) -> Vec<String> {
        self.pool.lock().keys(self.key_cache).as_ref().clone()
    }

    /// Visit every entry in order until `visitor` returns false.
    ///
    /// Names cached through [`put_definition`](Self::put_definition) are
    /// visited too, so the same definition may be seen more than once.
    pub fn scan<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Arc<Definition>) -> bool,
    {
        let keys = self.pool.lock().keys(self.key_cache);
        for key in keys.iter() {
            let Some(definition) = self.get_definition(key) else {
                continue;
            };
            if !visitor(key, &definition) {
                break;
            }
        }
    }

    /// Distinct definitions in scan order.
    pub fn definitions(&self) -> Vec<Arc<Definition>> {
        let mut seen: Vec<Arc<Definition>> = Vec::new();
        self.scan(|_, definition| {
            if !seen.iter().any(|existing| Arc::ptr_eq(existing, definition)) {
                seen.push(definition.clone());
            }
            true
        });
        seen
    }

    pub fn injector(&self) -> &Arc<Injector> {
        &self.injector
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("beans", &self.len())
            .field("key_cache", &self.key_cache)
            .finish()
    }
}

/// Builder for [`Container`].
pub struct ContainerBuilder {
    creators: DefinitionCreators,
    injector: Option<Arc<Injector>>,
    key_cache: bool,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            creators: DefinitionCreators::default(),
            injector: None,
            key_cache: true,
        }
    }

    /// Replace the table that turns registrations into definitions.
    pub fn creators(mut self, creators: DefinitionCreators) -> Self {
        self.creators = creators;
        self
    }

    /// Injector used to resolve factory parameters.
    pub fn injector(mut self, injector: Arc<Injector>) -> Self {
        self.injector = Some(injector);
        self
    }

    /// Cache the ordered key list between scans. On by default.
    pub fn key_cache(mut self, enabled: bool) -> Self {
        self.key_cache = enabled;
        self
    }

    pub fn build(self) -> Container {
        Container {
            pool: Mutex::new(Pool::new()),
            creators: self.creators,
            injector: self.injector.unwrap_or_else(|| Arc::new(Injector::new())),
            key_cache: self.key_cache,
        }
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
