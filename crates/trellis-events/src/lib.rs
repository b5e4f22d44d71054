//! Application events for Trellis
//!
//! A processor decouples lifecycle notifications from the code that
//! reacts to them. Events published with
//! [`publish_event`](ApplicationEventPublisher::publish_event) are queued
//! and delivered in order by a background worker; events sent with
//! [`send_event`](ApplicationEventPublisher::send_event) are delivered
//! immediately on the caller's thread.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use trellis_events::{
//!     ApplicationEventProcessor, ApplicationEventPublisher, BaseEvent, DefaultEventProcessor,
//! };
//!
//! let processor: Arc<dyn ApplicationEventProcessor> = Arc::new(DefaultEventProcessor::new());
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! processor.add_fn(move |_: &BaseEvent| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! processor.start().unwrap();
//! processor.publish_event(Arc::new(BaseEvent::new())).unwrap();
//! processor.close().unwrap();
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

pub mod error;
pub mod event;
pub mod listener;
pub mod processor;

pub use error::{EventError, EventResult};
pub use event::{ApplicationEvent, AsAny, BaseEvent, PayloadEvent};
pub use listener::{
    ApplicationEventConsumer, ApplicationEventListener, ConsumerRegistry, FnListener,
    PayloadListener,
};
pub use processor::{
    ApplicationEventProcessor, ApplicationEventPublisher, DefaultEventProcessor,
    DisabledEventProcessor, ProcessorState, DEFAULT_EVENT_BUFFER_SIZE,
};
