//! Registration shapes accepted by the container
//!
//! Everything registered is first lowered to a [`BeanSource`]. The
//! container then asks its [`DefinitionCreators`](crate::DefinitionCreators)
//! table to turn that source into a [`Definition`](crate::Definition).

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::definition::DefinitionKind;
use crate::error::{DIError, DIResult};
use crate::lifecycle::{erase_hook, Hook, MethodTable};
use crate::target::{InjectTarget, Resolved, TargetType};
use crate::types::{Bean, BeanRef, BeanType, TypeKey};

pub(crate) type Producer = Box<dyn Fn(Vec<Resolved>) -> DIResult<BeanRef> + Send + Sync>;
pub(crate) type HookLookup = Box<dyn Fn(&str) -> Option<Hook> + Send + Sync>;

/// A registered value lowered to one of the known producer shapes.
pub enum BeanSource {
    Object(BeanRef),
    Slice(CollectionSource),
    Map(CollectionSource),
    Function(FunctionSource),
    Custom(CustomSource),
}

impl BeanSource {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            BeanSource::Object(_) => DefinitionKind::Object,
            BeanSource::Slice(_) => DefinitionKind::Slice,
            BeanSource::Map(_) => DefinitionKind::Map,
            BeanSource::Function(_) => DefinitionKind::Function,
            BeanSource::Custom(_) => DefinitionKind::Custom,
        }
    }
}

impl fmt::Debug for BeanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BeanSource").field(&self.kind()).finish()
    }
}

/// A pre-built collection of beans.
pub struct CollectionSource {
    pub(crate) name: String,
    pub(crate) element: TypeKey,
    pub(crate) entries: Vec<(String, BeanRef)>,
}

/// A factory with its parameter list already erased.
pub struct FunctionSource {
    pub(crate) function: &'static str,
    pub(crate) bean_type: Arc<BeanType>,
    pub(crate) params: Vec<TargetType>,
    pub(crate) names: Vec<String>,
    pub(crate) singleton: bool,
    pub(crate) producer: Producer,
}

/// A factory plus the names of the hooks to run on what it produces.
pub struct CustomSource {
    pub(crate) function: FunctionSource,
    pub(crate) init_method: String,
    pub(crate) destroy_method: String,
    pub(crate) lookup: HookLookup,
}

// ============================================================================
// Factory functions
// ============================================================================

/// A closure producing `Arc<T>` from zero or more injected parameters.
pub trait FactoryFn<Args, T: ?Sized>: Send + Sync + 'static {
    fn params() -> Vec<TargetType>;

    fn produce(&self, args: Vec<Resolved>) -> DIResult<Arc<T>>;
}

pub(crate) fn missing_argument(target: &TargetType) -> DIError {
    DIError::UnsupportedTarget {
        target: format!("missing argument for {}", target),
    }
}

macro_rules! impl_factory_fn {
    ($($arg:ident),*) => {
        impl<F, T, $($arg,)*> FactoryFn<($($arg,)*), T> for F
        where
            F: Fn($($arg),*) -> Arc<T> + Send + Sync + 'static,
            T: ?Sized + Send + Sync + 'static,
            $($arg: InjectTarget,)*
        {
            fn params() -> Vec<TargetType> {
                vec![$($arg::target_type()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn produce(&self, args: Vec<Resolved>) -> DIResult<Arc<T>> {
                let mut args = args.into_iter();
                $(
                    let $arg = match args.next() {
                        Some(resolved) => $arg::from_resolved(resolved)?,
                        None => return Err(missing_argument(&$arg::target_type())),
                    };
                )*
                Ok((self)($($arg),*))
            }
        }
    };
}

impl_factory_fn!();
impl_factory_fn!(A1);
impl_factory_fn!(A1, A2);
impl_factory_fn!(A1, A2, A3);
impl_factory_fn!(A1, A2, A3, A4);
impl_factory_fn!(A1, A2, A3, A4, A5);
impl_factory_fn!(A1, A2, A3, A4, A5, A6);

/// A factory registration with options.
///
/// Plain closures register through this with default options. Use it
/// directly to name parameters or to opt into singleton caching.
pub struct Factory {
    source: FunctionSource,
}

impl Factory {
    pub fn new<F, Args, T>(factory: F) -> Self
    where
        F: FactoryFn<Args, T>,
        T: ?Sized + Bean,
    {
        let bean_type = Arc::new(T::bean_type());
        let produced = bean_type.clone();
        let producer: Producer = Box::new(move |args| {
            let value = factory.produce(args)?;
            Ok(BeanRef::with_type(value, produced.clone()))
        });
        Self {
            source: FunctionSource {
                function: std::any::type_name::<F>(),
                bean_type,
                params: F::params(),
                names: Vec::new(),
                singleton: false,
                producer,
            },
        }
    }

    /// Per-parameter lookup tags, `name[,policy]*`, matched by position.
    ///
    /// Use `""` for parameters that should auto-wire.
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Cache the first produced value and return it on every later call.
    pub fn singleton(mut self) -> Self {
        self.source.singleton = true;
        self
    }
}

/// A factory whose product has named init and destroy hooks.
pub struct CustomFactory<T> {
    function: FunctionSource,
    init_method: String,
    destroy_method: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: MethodTable + Bean> CustomFactory<T> {
    pub fn new<F, Args>(factory: F) -> Self
    where
        F: FactoryFn<Args, T>,
    {
        Self {
            function: Factory::new(factory).source,
            init_method: String::new(),
            destroy_method: String::new(),
            _marker: PhantomData,
        }
    }

    pub fn init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method = name.into();
        self
    }

    pub fn destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy_method = name.into();
        self
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.function.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn singleton(mut self) -> Self {
        self.function.singleton = true;
        self
    }
}

// ============================================================================
// IntoBean
// ============================================================================

/// Values accepted by `Container::register`.
///
/// `Marker` only disambiguates the blanket implementations and is always
/// inferred.
pub trait IntoBean<Marker> {
    fn into_source(self) -> BeanSource;
}

#[doc(hidden)]
pub struct ObjectMarker;
#[doc(hidden)]
pub struct SliceMarker;
#[doc(hidden)]
pub struct MapMarker;
#[doc(hidden)]
pub struct FactoryMarker;
#[doc(hidden)]
pub struct CustomMarker;
#[doc(hidden)]
pub struct FnMarker<Args, T: ?Sized>(PhantomData<fn(Args) -> Arc<T>>);

impl<T: ?Sized + Bean> IntoBean<ObjectMarker> for Arc<T> {
    fn into_source(self) -> BeanSource {
        BeanSource::Object(BeanRef::new(self))
    }
}

impl<T: ?Sized + Bean> IntoBean<SliceMarker> for Vec<Arc<T>> {
    fn into_source(self) -> BeanSource {
        let ty = Arc::new(T::bean_type());
        let entries = self
            .into_iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), BeanRef::with_type(value, ty.clone())))
            .collect();
        BeanSource::Slice(CollectionSource {
            name: TargetType::slice::<T>().name().to_string(),
            element: TypeKey::of::<T>(),
            entries,
        })
    }
}

impl<T: ?Sized + Bean> IntoBean<MapMarker> for HashMap<String, Arc<T>> {
    fn into_source(self) -> BeanSource {
        let ty = Arc::new(T::bean_type());
        let mut entries: Vec<(String, BeanRef)> = self
            .into_iter()
            .map(|(key, value)| (key, BeanRef::with_type(value, ty.clone())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        BeanSource::Map(CollectionSource {
            name: TargetType::map::<String, T>().name().to_string(),
            element: TypeKey::of::<T>(),
            entries,
        })
    }
}

impl IntoBean<FactoryMarker> for Factory {
    fn into_source(self) -> BeanSource {
        BeanSource::Function(self.source)
    }
}

impl<T: MethodTable + Bean> IntoBean<CustomMarker> for CustomFactory<T> {
    fn into_source(self) -> BeanSource {
        BeanSource::Custom(CustomSource {
            function: self.function,
            init_method: self.init_method,
            destroy_method: self.destroy_method,
            lookup: Box::new(|name: &str| T::method(name).map(erase_hook::<T>)),
        })
    }
}

impl<F, Args, T> IntoBean<FnMarker<Args, T>> for F
where
    F: FactoryFn<Args, T>,
    T: ?Sized + Bean,
{
    fn into_source(self) -> BeanSource {
        Factory::new(self).into_source()
    }
}

impl IntoBean<BeanSource> for BeanSource {
    fn into_source(self) -> BeanSource {
        self
    }
}
