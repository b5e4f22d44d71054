//! Injection targets: the shapes a dependency slot can take

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{DIError, DIResult};
use crate::types::{BeanRef, TypeKey};

/// Kind of value a slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetShape {
    /// A shared reference to one bean (`Arc<T>`, `Arc<dyn Trait>`).
    Reference,
    /// Every assignable bean (`Vec<Arc<T>>`).
    Slice,
    /// Every assignable bean keyed by registration name (`HashMap<String, Arc<T>>`).
    Map,
    /// An owned copy (`Box<T>`). Never injectable.
    Value,
}

/// Static description of a slot: its shape, element type and canonical name.
#[derive(Debug, Clone)]
pub struct TargetType {
    shape: TargetShape,
    element: TypeKey,
    string_key: bool,
    name: String,
}

impl TargetType {
    pub fn reference<T: ?Sized + 'static>() -> Self {
        Self {
            shape: TargetShape::Reference,
            element: TypeKey::of::<T>(),
            string_key: false,
            name: std::any::type_name::<T>().to_string(),
        }
    }

    pub fn slice<T: ?Sized + 'static>() -> Self {
        Self {
            shape: TargetShape::Slice,
            element: TypeKey::of::<T>(),
            string_key: false,
            name: format!("[]{}", std::any::type_name::<T>()),
        }
    }

    pub fn map<K: 'static, T: ?Sized + 'static>() -> Self {
        let string_key = TypeId::of::<K>() == TypeId::of::<String>();
        let key = if string_key {
            "String"
        } else {
            std::any::type_name::<K>()
        };
        Self {
            shape: TargetShape::Map,
            element: TypeKey::of::<T>(),
            string_key,
            name: format!("map[{}]{}", key, std::any::type_name::<T>()),
        }
    }

    pub fn value<T: ?Sized + 'static>() -> Self {
        Self {
            shape: TargetShape::Value,
            element: TypeKey::of::<T>(),
            string_key: false,
            name: std::any::type_name::<T>().to_string(),
        }
    }

    pub fn shape(&self) -> TargetShape {
        self.shape
    }

    pub fn element(&self) -> TypeKey {
        self.element
    }

    /// Canonical lookup name, also used when caching auto-wired matches.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_string_key(&self) -> bool {
        self.string_key
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// What the injector produced for one slot.
#[derive(Debug, Clone)]
pub enum Resolved {
    One(BeanRef),
    Many(Vec<BeanRef>),
    Keyed(Vec<(String, BeanRef)>),
}

/// A Rust type that can receive an injected dependency.
pub trait InjectTarget: Sized + Send + Sync + 'static {
    fn target_type() -> TargetType;

    fn from_resolved(resolved: Resolved) -> DIResult<Self>;
}

fn unexpected(resolved: &Resolved, target: &TargetType) -> DIError {
    let found = match resolved {
        Resolved::One(bean) => bean.type_name().to_string(),
        Resolved::Many(_) => "slice".to_string(),
        Resolved::Keyed(_) => "map".to_string(),
    };
    DIError::TypeMismatch {
        name: target.name().to_string(),
        expected: target.name().to_string(),
        found,
    }
}

impl<T: ?Sized + Send + Sync + 'static> InjectTarget for Arc<T> {
    fn target_type() -> TargetType {
        TargetType::reference::<T>()
    }

    fn from_resolved(resolved: Resolved) -> DIResult<Self> {
        match resolved {
            Resolved::One(bean) => bean.cast::<T>().ok_or_else(|| DIError::TypeMismatch {
                name: std::any::type_name::<T>().to_string(),
                expected: std::any::type_name::<T>().to_string(),
                found: bean.type_name().to_string(),
            }),
            other => Err(unexpected(&other, &Self::target_type())),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> InjectTarget for Vec<Arc<T>> {
    fn target_type() -> TargetType {
        TargetType::slice::<T>()
    }

    fn from_resolved(resolved: Resolved) -> DIResult<Self> {
        match resolved {
            Resolved::Many(beans) => Ok(beans.iter().filter_map(BeanRef::cast::<T>).collect()),
            Resolved::One(bean) => Ok(bean.cast::<T>().into_iter().collect()),
            other => Err(unexpected(&other, &Self::target_type())),
        }
    }
}

impl<K, T> InjectTarget for HashMap<K, Arc<T>>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    fn target_type() -> TargetType {
        TargetType::map::<K, T>()
    }

    fn from_resolved(resolved: Resolved) -> DIResult<Self> {
        match resolved {
            Resolved::Keyed(entries) => {
                let mut map = HashMap::with_capacity(entries.len());
                for (key, bean) in entries {
                    let key: Box<dyn Any> = Box::new(key);
                    let key = key.downcast::<K>().map_err(|_| DIError::NonStringMapKey {
                        target: Self::target_type().name().to_string(),
                        key: std::any::type_name::<K>().to_string(),
                    })?;
                    if let Some(value) = bean.cast::<T>() {
                        map.insert(*key, value);
                    }
                }
                Ok(map)
            }
            other => Err(unexpected(&other, &Self::target_type())),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> InjectTarget for Box<T> {
    fn target_type() -> TargetType {
        TargetType::value::<T>()
    }

    fn from_resolved(_: Resolved) -> DIResult<Self> {
        Err(DIError::NotPointer {
            target: std::any::type_name::<T>().to_string(),
        })
    }
}

// ============================================================================
// Slots
// ============================================================================

/// Object-safe view of one injectable field.
pub trait Slot: Send + Sync {
    fn target_type(&self) -> TargetType;

    fn fill(&self, resolved: Resolved) -> DIResult<()>;

    fn is_filled(&self) -> bool;
}

/// A field the injector fills after the owning bean has been registered.
///
/// Beans are shared behind `Arc`, so the slot uses interior mutability.
pub struct Autowired<T> {
    value: RwLock<Option<T>>,
}

impl<T> Autowired<T> {
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }

    pub fn is_set(&self) -> bool {
        self.value.read().is_some()
    }

    pub fn set(&self, value: T) {
        *self.value.write() = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.value.write().take()
    }

    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.value.read().as_ref())
    }
}

impl<T: Clone> Autowired<T> {
    pub fn get(&self) -> Option<T> {
        self.value.read().clone()
    }
}

impl<T> Default for Autowired<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Autowired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autowired")
            .field("type", &std::any::type_name::<T>())
            .field("set", &self.is_set())
            .finish()
    }
}

impl<T: InjectTarget> Slot for Autowired<T> {
    fn target_type(&self) -> TargetType {
        T::target_type()
    }

    fn fill(&self, resolved: Resolved) -> DIResult<()> {
        let value = T::from_resolved(resolved)?;
        self.set(value);
        Ok(())
    }

    fn is_filled(&self) -> bool {
        self.is_set()
    }
}

/// One field of an [`Injectable`] bean.
pub struct InjectionPoint<'a> {
    pub field: &'static str,
    /// `name[,policy]*`; an empty name auto-wires by type.
    pub tag: &'a str,
    pub slot: &'a dyn Slot,
}

impl<'a> InjectionPoint<'a> {
    pub fn new(field: &'static str, tag: &'a str, slot: &'a dyn Slot) -> Self {
        Self { field, tag, slot }
    }
}

/// A bean with fields for the injector to fill.
pub trait Injectable: Send + Sync {
    fn injection_points(&self) -> Vec<InjectionPoint<'_>>;

    fn injectable_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine;
    crate::bean!(Engine);

    #[test]
    fn canonical_names() {
        assert_eq!(
            <Arc<Engine>>::target_type().name(),
            std::any::type_name::<Engine>()
        );
        assert!(<Vec<Arc<Engine>>>::target_type().name().starts_with("[]"));
        let map = <HashMap<String, Arc<Engine>>>::target_type();
        assert!(map.name().starts_with("map[String]"));
        assert!(map.has_string_key());
        assert!(!<HashMap<u32, Arc<Engine>>>::target_type().has_string_key());
        assert_eq!(<Box<Engine>>::target_type().shape(), TargetShape::Value);
    }

    #[test]
    fn autowired_fill_and_get() {
        let slot: Autowired<Arc<Engine>> = Autowired::new();
        assert!(!slot.is_filled());
        slot.fill(Resolved::One(BeanRef::new(Arc::new(Engine)))).unwrap();
        assert!(slot.is_filled());
        assert!(slot.get().is_some());
    }

    #[test]
    fn box_targets_are_rejected() {
        let result = <Box<Engine>>::from_resolved(Resolved::One(BeanRef::new(Arc::new(Engine))));
        assert!(matches!(result, Err(DIError::NotPointer { .. })));
    }

    #[test]
    fn non_string_keys_are_rejected() {
        let entries = vec![("a".to_string(), BeanRef::new(Arc::new(Engine)))];
        let result = <HashMap<u32, Arc<Engine>>>::from_resolved(Resolved::Keyed(entries));
        assert!(matches!(result, Err(DIError::NonStringMapKey { .. })));
    }
}
