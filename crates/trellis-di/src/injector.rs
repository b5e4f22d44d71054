//! Dependency resolution
//!
//! The [`Injector`] fills [`Slot`](crate::Slot)s and factory parameters.
//! Each target is dispatched by its [`TargetShape`] to an [`Actuator`]:
//!
//! - **Reference** (`Arc<T>`): explicit name first, otherwise a scan for the
//!   single definition assignable to `T`. More than one candidate aborts.
//! - **Slice** (`Vec<Arc<T>>`) and **Map** (`HashMap<String, Arc<T>>`):
//!   every assignable definition, cached back as a collection definition.
//! - **Value** (`Box<T>`): always rejected; only shared references may be
//!   injected.
//!
//! Resolved matches are written back into the container so later lookups
//! of the same target are direct hits.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::container::Container;
use crate::definition::{CollectionDefinition, Definition};
use crate::error::{DIError, DIResult};
use crate::listener::{InjectListener, ListenerManager};
use crate::target::{InjectTarget, Injectable, Resolved, TargetShape, TargetType};
use crate::types::BeanRef;

/// Resolves one target shape. `name` is empty when the slot auto-wires.
pub type Actuator = fn(&Injector, &Container, &str, &TargetType) -> DIResult<Resolved>;

pub struct Injector {
    actuators: HashMap<TargetShape, Actuator>,
    listeners: Arc<ListenerManager>,
}

impl Injector {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::new()
    }

    /// Whether `bean` has fields to fill.
    pub fn can_inject(&self, bean: &BeanRef) -> bool {
        bean.is::<dyn Injectable>()
    }

    /// Whether a slot of this type could ever be filled.
    pub fn can_inject_type(&self, target: &TargetType) -> bool {
        match target.shape() {
            TargetShape::Value => false,
            TargetShape::Map if !target.has_string_key() => false,
            shape => self.actuators.contains_key(&shape),
        }
    }

    /// Fill every injection point of `target`.
    ///
    /// Each field is resolved on its own. A failure is handed to the
    /// field's listeners and never stops the remaining fields.
    pub fn inject(&self, container: &Container, target: &dyn Injectable) -> DIResult<()> {
        let owner = target.injectable_name();
        for point in target.injection_points() {
            let tag = self.listeners.parse(point.tag);
            let result = self
                .inject_value(container, &tag.name, &point.slot.target_type())
                .and_then(|resolved| point.slot.fill(resolved));
            if let Err(err) = result {
                let err = DIError::InjectionFailed {
                    owner: owner.to_string(),
                    field: point.field.to_string(),
                    source: Box::new(err),
                };
                tag.notify(&err);
            }
        }
        Ok(())
    }

    pub fn inject_bean(&self, container: &Container, bean: &BeanRef) -> DIResult<()> {
        let target = bean
            .cast::<dyn Injectable>()
            .ok_or_else(|| DIError::UnsupportedTarget {
                target: bean.type_name().to_string(),
            })?;
        self.inject(container, target.as_ref())
    }

    /// Resolve a single target, by `name` when given.
    pub fn inject_value(
        &self,
        container: &Container,
        name: &str,
        target: &TargetType,
    ) -> DIResult<Resolved> {
        let actuator = self
            .actuators
            .get(&target.shape())
            .ok_or_else(|| DIError::UnsupportedTarget {
                target: target.name().to_string(),
            })?;
        actuator(self, container, name, target)
    }

    /// Resolve a typed value from a `name[,policy]*` tag. Policies are not
    /// applied; the caller gets the error.
    pub fn resolve<T: InjectTarget>(&self, container: &Container, tag: &str) -> DIResult<T> {
        let tag = self.listeners.parse(tag);
        let resolved = self.inject_value(container, &tag.name, &T::target_type())?;
        T::from_resolved(resolved)
    }

    pub fn listeners(&self) -> &Arc<ListenerManager> {
        &self.listeners
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shapes: Vec<_> = self.actuators.keys().collect();
        shapes.sort_by_key(|shape| format!("{:?}", shape));
        f.debug_struct("Injector")
            .field("actuators", &shapes)
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// Builder for [`Injector`].
pub struct InjectorBuilder {
    actuators: HashMap<TargetShape, Actuator>,
    listeners: Option<Arc<ListenerManager>>,
    extra: Vec<(String, Arc<dyn InjectListener>)>,
}

impl InjectorBuilder {
    pub fn new() -> Self {
        let mut actuators: HashMap<TargetShape, Actuator> = HashMap::new();
        actuators.insert(TargetShape::Reference, inject_reference);
        actuators.insert(TargetShape::Slice, inject_slice);
        actuators.insert(TargetShape::Map, inject_map);
        actuators.insert(TargetShape::Value, inject_by_value);
        Self {
            actuators,
            listeners: None,
            extra: Vec::new(),
        }
    }

    /// Replace the actuator for one shape.
    pub fn actuator(mut self, shape: TargetShape, actuator: Actuator) -> Self {
        self.actuators.insert(shape, actuator);
        self
    }

    pub fn listener_manager(mut self, manager: Arc<ListenerManager>) -> Self {
        self.listeners = Some(manager);
        self
    }

    /// Add a named failure policy.
    pub fn listener(mut self, name: impl Into<String>, listener: Arc<dyn InjectListener>) -> Self {
        self.extra.push((name.into(), listener));
        self
    }

    pub fn build(self) -> Injector {
        let listeners = self
            .listeners
            .unwrap_or_else(|| Arc::new(ListenerManager::new()));
        for (name, listener) in self.extra {
            listeners.add_listener(name, listener);
        }
        Injector {
            actuators: self.actuators,
            listeners,
        }
    }
}

impl Default for InjectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Actuators
// ============================================================================

fn lookup_name<'a>(name: &'a str, target: &'a TargetType) -> &'a str {
    if name.is_empty() {
        target.name()
    } else {
        name
    }
}

fn cache(container: &Container, name: &str, definition: Arc<Definition>) {
    match container.put_definition(name, definition) {
        Ok(()) => debug!(name = %name, "Cached auto-wired definition"),
        Err(err) => warn!(name = %name, error = %err, "Failed to cache auto-wired definition"),
    }
}

/// Single reference: explicit name, else the one assignable definition.
///
/// Definitions registered under a custom name are skipped by the scan; a
/// slot that wants one of those must name it.
///
/// # Panics
///
/// When more than one definition is assignable to the target.
pub fn inject_reference(
    _injector: &Injector,
    container: &Container,
    name: &str,
    target: &TargetType,
) -> DIResult<Resolved> {
    if let Some(definition) = container.get_definition(lookup_name(name, target)) {
        return definition.value(container).map(Resolved::One);
    }

    let element = target.element();
    let mut found: Option<Arc<Definition>> = None;
    container.scan(|key, definition| {
        if key != definition.name() || !definition.bean_type().assignable_to(element) {
            return true;
        }
        if found.is_some() {
            panic!("Auto inject found more than one bean assignable to {}", target);
        }
        found = Some(definition.clone());
        true
    });

    let definition = found.ok_or_else(|| DIError::EmptyCollection {
        target: target.name().to_string(),
    })?;
    let bean = definition.value(container)?;
    cache(container, target.name(), definition);
    Ok(Resolved::One(bean))
}

/// Collect `(key, bean)` for every distinct definition assignable to the
/// target's element type, in scan order.
fn collect_assignable(container: &Container, target: &TargetType) -> DIResult<Vec<(String, BeanRef)>> {
    let element = target.element();
    let mut matched: Vec<(String, Arc<Definition>)> = Vec::new();
    container.scan(|key, definition| {
        let seen = matched.iter().any(|(_, d)| Arc::ptr_eq(d, definition));
        if !seen && definition.bean_type().assignable_to(element) {
            matched.push((key.to_string(), definition.clone()));
        }
        true
    });

    matched
        .into_iter()
        .map(|(key, definition)| Ok((key, definition.value(container)?)))
        .collect()
}

fn from_existing(
    container: &Container,
    definition: &Definition,
    target: &TargetType,
) -> DIResult<Vec<(String, BeanRef)>> {
    match definition.collection() {
        Some(collection) => Ok(collection.assignable_entries(target.element())),
        None => {
            let bean = definition.value(container)?;
            Err(DIError::TypeMismatch {
                name: definition.name().to_string(),
                expected: target.name().to_string(),
                found: bean.type_name().to_string(),
            })
        }
    }
}

/// Every assignable bean as a list.
pub fn inject_slice(
    _injector: &Injector,
    container: &Container,
    name: &str,
    target: &TargetType,
) -> DIResult<Resolved> {
    if let Some(definition) = container.get_definition(lookup_name(name, target)) {
        let entries = from_existing(container, &definition, target)?;
        return Ok(Resolved::Many(entries.into_iter().map(|(_, bean)| bean).collect()));
    }

    let entries: Vec<(String, BeanRef)> = collect_assignable(container, target)?
        .into_iter()
        .enumerate()
        .map(|(index, (_, bean))| (index.to_string(), bean))
        .collect();
    if entries.is_empty() {
        return Err(DIError::EmptyCollection {
            target: target.name().to_string(),
        });
    }

    let beans = entries.iter().map(|(_, bean)| bean.clone()).collect();
    let definition = CollectionDefinition::new(target.name(), target.element(), entries);
    cache(container, target.name(), Arc::new(Definition::Slice(definition)));
    Ok(Resolved::Many(beans))
}

/// Every assignable bean keyed by its registration name.
pub fn inject_map(
    _injector: &Injector,
    container: &Container,
    name: &str,
    target: &TargetType,
) -> DIResult<Resolved> {
    if let Some(definition) = container.get_definition(lookup_name(name, target)) {
        return from_existing(container, &definition, target).map(Resolved::Keyed);
    }
    if !target.has_string_key() {
        return Err(DIError::NonStringMapKey {
            target: target.name().to_string(),
            key: target.name().to_string(),
        });
    }

    let entries = collect_assignable(container, target)?;
    if entries.is_empty() {
        return Err(DIError::EmptyCollection {
            target: target.name().to_string(),
        });
    }

    let definition = CollectionDefinition::new(target.name(), target.element(), entries.clone());
    cache(container, target.name(), Arc::new(Definition::Map(definition)));
    Ok(Resolved::Keyed(entries))
}

/// Owned values are never injected.
pub fn inject_by_value(
    _injector: &Injector,
    container: &Container,
    name: &str,
    target: &TargetType,
) -> DIResult<Resolved> {
    let name = lookup_name(name, target);
    if container.contains(name) {
        Err(DIError::NotPointer {
            target: target.name().to_string(),
        })
    } else {
        Err(DIError::NotFound {
            name: name.to_string(),
        })
    }
}
