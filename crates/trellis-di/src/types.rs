//! Type descriptors and type-erased bean handles
//!
//! A bean is always held behind an `Arc`. [`BeanRef`] erases the concrete
//! type while remembering the [`BeanType`] it was produced as, so the
//! container can answer "is this bean assignable to `dyn Trait`?" and hand
//! out a correctly typed `Arc` without runtime reflection.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::function::InjectFunction;
use crate::lifecycle::{Disposable, Initializing};
use crate::target::Injectable;

// ============================================================================
// TypeKey
// ============================================================================

/// Identity of a (possibly unsized) type together with its readable name.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// BeanType
// ============================================================================

type CastFn = Arc<dyn Fn(&BeanRef) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Describes a produced type and every target type it is assignable to.
///
/// The identity cast is always present. Additional targets are declared
/// through [`TypeBuilder::provides`] and are the only way a bean becomes
/// visible to interface-typed injection slots.
#[derive(Clone)]
pub struct BeanType {
    key: TypeKey,
    casts: Vec<(TypeKey, CastFn)>,
}

impl BeanType {
    /// Descriptor assignable only to `T` itself.
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::builder::<T>().build()
    }

    pub fn builder<T: ?Sized + Send + Sync + 'static>() -> TypeBuilder<T> {
        TypeBuilder::new()
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name
    }

    pub fn assignable_to(&self, target: TypeKey) -> bool {
        self.casts.iter().any(|(key, _)| *key == target)
    }

    /// All target types this type can be cast to, identity first.
    pub fn provided(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.casts.iter().map(|(key, _)| *key)
    }

    fn cast(&self, bean: &BeanRef, target: TypeKey) -> Option<Box<dyn Any + Send + Sync>> {
        self.casts
            .iter()
            .find(|(key, _)| *key == target)
            .and_then(|(_, cast)| cast(bean))
    }
}

impl fmt::Debug for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanType")
            .field("type", &self.key)
            .field("provides", &self.provided().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`BeanType`].
pub struct TypeBuilder<T: ?Sized> {
    casts: Vec<(TypeKey, CastFn)>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> TypeBuilder<T> {
    fn new() -> Self {
        let identity: CastFn = Arc::new(|bean: &BeanRef| {
            bean.downcast::<T>()
                .map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
        });
        Self {
            casts: vec![(TypeKey::of::<T>(), identity)],
            _marker: PhantomData,
        }
    }

    /// Declare that `T` can be viewed as `I`.
    ///
    /// `convert` is almost always the unsizing coercion `|v| v`.
    pub fn provides<I: ?Sized + Send + Sync + 'static>(mut self, convert: fn(Arc<T>) -> Arc<I>) -> Self {
        let key = TypeKey::of::<I>();
        if self.casts.iter().any(|(existing, _)| *existing == key) {
            return self;
        }
        let cast: CastFn = Arc::new(move |bean: &BeanRef| {
            bean.downcast::<T>()
                .map(|value| Box::new(convert(value)) as Box<dyn Any + Send + Sync>)
        });
        self.casts.push((key, cast));
        self
    }

    pub fn build(self) -> BeanType {
        BeanType {
            key: TypeKey::of::<T>(),
            casts: self.casts,
        }
    }
}

impl<T: Send + Sync + 'static> TypeBuilder<T> {
    pub fn initializing(self) -> Self
    where
        T: Initializing,
    {
        self.provides::<dyn Initializing>(|v| v)
    }

    pub fn disposable(self) -> Self
    where
        T: Disposable,
    {
        self.provides::<dyn Disposable>(|v| v)
    }

    pub fn injectable(self) -> Self
    where
        T: Injectable,
    {
        self.provides::<dyn Injectable>(|v| v)
    }

    pub fn inject_function(self) -> Self
    where
        T: InjectFunction,
    {
        self.provides::<dyn InjectFunction>(|v| v)
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<TypeBuilder<T>> for BeanType {
    fn from(builder: TypeBuilder<T>) -> Self {
        builder.build()
    }
}

// ============================================================================
// Bean
// ============================================================================

/// Anything that can live in the container.
///
/// The default descriptor is assignable only to `Self`. Override
/// [`Bean::bean_type`], or use the [`bean!`](crate::bean) macro, to expose
/// the interfaces and lifecycle capabilities the type implements. The trait
/// may also be implemented for `dyn Trait` so factories can produce
/// interface-typed values.
pub trait Bean: Send + Sync + 'static {
    fn bean_type() -> BeanType {
        BeanType::of::<Self>()
    }
}

/// Implement [`Bean`] for a type and list the types it is assignable to.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis_di::{bean, BeanRef};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".into()
///     }
/// }
/// bean!(English: dyn Greeter);
///
/// let bean = BeanRef::new(Arc::new(English));
/// assert_eq!(bean.cast::<dyn Greeter>().unwrap().greet(), "hello");
/// ```
#[macro_export]
macro_rules! bean {
    ($ty:ty $(: $($provides:ty),+ $(,)?)?) => {
        impl $crate::Bean for $ty {
            fn bean_type() -> $crate::BeanType {
                $crate::BeanType::builder::<Self>()
                    $($(.provides::<$provides>(|v| v))+)?
                    .build()
            }
        }
    };
}

// ============================================================================
// BeanRef
// ============================================================================

/// Type-erased, cheaply cloneable handle to one produced bean.
#[derive(Clone)]
pub struct BeanRef {
    // Always an `Arc<T>` for the produced `T`.
    inner: Arc<dyn Any + Send + Sync>,
    addr: usize,
    ty: Arc<BeanType>,
}

impl BeanRef {
    pub fn new<T: ?Sized + Bean>(value: Arc<T>) -> Self {
        Self::with_type(value, Arc::new(T::bean_type()))
    }

    /// Wrap `value` with a descriptor already built for `T`.
    pub fn with_type<T: ?Sized + Send + Sync + 'static>(value: Arc<T>, ty: Arc<BeanType>) -> Self {
        debug_assert_eq!(ty.key(), TypeKey::of::<T>());
        let addr = Arc::as_ptr(&value) as *const () as usize;
        Self {
            inner: Arc::new(value),
            addr,
            ty,
        }
    }

    /// Recover the bean as the exact type it was produced as.
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.inner.downcast_ref::<Arc<T>>().cloned()
    }

    /// View the bean as any type its descriptor declares.
    pub fn cast<I: ?Sized + 'static>(&self) -> Option<Arc<I>> {
        if let Some(value) = self.downcast::<I>() {
            return Some(value);
        }
        self.ty
            .cast(self, TypeKey::of::<I>())
            .and_then(|boxed| boxed.downcast::<Arc<I>>().ok())
            .map(|value| *value)
    }

    pub fn is<I: ?Sized + 'static>(&self) -> bool {
        self.ty.assignable_to(TypeKey::of::<I>())
    }

    /// Both handles point at the same instance.
    pub fn ptr_eq(&self, other: &BeanRef) -> bool {
        self.addr == other.addr
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn bean_type(&self) -> &BeanType {
        &self.ty
    }

    pub fn type_name(&self) -> &'static str {
        self.ty.name()
    }
}

impl fmt::Debug for BeanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRef")
            .field("type", &self.ty.key())
            .field("addr", &format_args!("{:#x}", self.addr))
            .finish()
    }
}
