//! Application context for Trellis
//!
//! Ties the bean container, the injector and the event processor into one
//! start/close lifecycle. Beans registered through the context are wired,
//! initialized, offered to [`Processor`]s and finally destroyed in
//! container order.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_context::{ApplicationContext, ContextStartedEvent, MapProperties};
//! use trellis_di::{bean, Autowired, Injectable, InjectionPoint};
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct FixedClock;
//! impl Clock for FixedClock {
//!     fn now(&self) -> u64 {
//!         42
//!     }
//! }
//! bean!(FixedClock: dyn Clock);
//!
//! #[derive(Default)]
//! struct Scheduler {
//!     clock: Autowired<Arc<dyn Clock>>,
//! }
//! impl Injectable for Scheduler {
//!     fn injection_points(&self) -> Vec<InjectionPoint<'_>> {
//!         vec![InjectionPoint::new("clock", "", &self.clock)]
//!     }
//! }
//! bean!(Scheduler: dyn Injectable);
//!
//! let context = ApplicationContext::new();
//! context
//!     .init(Arc::new(MapProperties::new().with("application.bannerMode", "off")))
//!     .unwrap();
//! context.register_bean(Arc::new(FixedClock)).unwrap();
//! context.register_bean(Arc::new(Scheduler::default())).unwrap();
//! context.add_fn(|event: &ContextStartedEvent| {
//!     assert_eq!(event.application_name(), "Trellis Application");
//! });
//!
//! context.start().unwrap();
//! let scheduler = context.get_bean_by_type::<Scheduler>().unwrap();
//! assert_eq!(scheduler.clock.get().unwrap().now(), 42);
//! context.close().unwrap();
//! ```

pub mod application;
pub mod banner;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod logging;
pub mod processor;

pub use application::Application;
pub use config::{ConfigProperties, MapProperties, Properties};
pub use context::{
    ApplicationContext, ApplicationContextAware, ApplicationContextBuilder, ContextState,
};
pub use error::{ContextError, ContextResult};
pub use events::{ContextClosedEvent, ContextStartedEvent, ContextStoppedEvent};
pub use logging::{init_env_logging, init_logging};
pub use processor::Processor;
