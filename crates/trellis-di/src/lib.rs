//! Bean container and injector for Trellis
//!
//! Beans are registered into a [`Container`] as objects, collections or
//! factories. Each registration becomes a [`Definition`]. The [`Injector`]
//! fills declared dependency slots either by explicit name or by scanning
//! the container for the single bean assignable to the slot's type.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_di::{bean, Autowired, Container, Injectable, InjectionPoint};
//!
//! trait Repository: Send + Sync {
//!     fn find(&self) -> &'static str;
//! }
//!
//! struct MemoryRepository;
//! impl Repository for MemoryRepository {
//!     fn find(&self) -> &'static str {
//!         "found"
//!     }
//! }
//! bean!(MemoryRepository: dyn Repository);
//!
//! #[derive(Default)]
//! struct Service {
//!     repository: Autowired<Arc<dyn Repository>>,
//! }
//! impl Injectable for Service {
//!     fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
//!         vec![InjectionPoint::new("repository", "", &self.repository)]
//!     }
//! }
//!
//! let container = Container::new();
//! container.register(Arc::new(MemoryRepository)).unwrap();
//!
//! let service = Service::default();
//! container.injector().inject(&container, &service).unwrap();
//! assert_eq!(service.repository.get().unwrap().find(), "found");
//! ```
//!
//! Factories are plain closures whose parameters are injection targets:
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_di::{Bean, Container};
//!
//! struct Config(u16);
//! impl Bean for Config {}
//!
//! struct Server(u16);
//! impl Bean for Server {}
//!
//! let container = Container::new();
//! container.register(Arc::new(Config(8080))).unwrap();
//! container.register(|config: Arc<Config>| Arc::new(Server(config.0))).unwrap();
//!
//! let server = container.get_by_type::<Server>().unwrap();
//! assert_eq!(server.0, 8080);
//! ```

pub mod container;
pub mod definition;
pub mod error;
pub mod function;
pub mod injector;
pub mod lifecycle;
pub mod listener;
pub mod source;
pub mod target;
pub mod types;

pub use container::{Container, ContainerBuilder, RegisterOptions, DEFAULT_ORDER};
pub use definition::{
    BeanCollection, CollectionDefinition, CustomDefinition, Definition, DefinitionCreator,
    DefinitionCreators, DefinitionKind, FunctionDefinition, ObjectDefinition,
};
pub use error::{DIError, DIResult, ErrorList};
pub use function::{FunctionRegistry, InjectFn, InjectFunction, InvokeResult};
pub use injector::{Actuator, Injector, InjectorBuilder};
pub use lifecycle::{Disposable, HookFn, Initializing, MethodTable};
pub use listener::{
    InjectListener, InjectTag, ListenerManager, OmitErrorListener, RequiredListener, OMIT_ERROR,
    REQUIRED,
};
pub use source::{BeanSource, CustomFactory, Factory, FactoryFn, IntoBean};
pub use target::{
    Autowired, InjectTarget, Injectable, InjectionPoint, Resolved, Slot, TargetShape, TargetType,
};
pub use types::{Bean, BeanRef, BeanType, TypeBuilder, TypeKey};
