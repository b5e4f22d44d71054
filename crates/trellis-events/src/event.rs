//! Application events
//!
//! Events are immutable records shared as `Arc<dyn ApplicationEvent>`.
//! Listeners recover the concrete type with
//! [`downcast_ref`](trait.ApplicationEvent.html#method.downcast_ref).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use trellis_di::{Bean, BeanRef};

/// Access to the concrete type behind a trait object.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Something that happened in the application.
pub trait ApplicationEvent: AsAny + fmt::Debug + Send + Sync + 'static {
    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}

impl dyn ApplicationEvent {
    pub fn is<E: ApplicationEvent>(&self) -> bool {
        self.as_any().is::<E>()
    }

    pub fn downcast_ref<E: ApplicationEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// Timestamp holder for events that carry nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseEvent {
    occurred_at: DateTime<Utc>,
}

impl BaseEvent {
    pub fn new() -> Self {
        Self {
            occurred_at: Utc::now(),
        }
    }

    pub fn at(occurred_at: DateTime<Utc>) -> Self {
        Self { occurred_at }
    }
}

impl Default for BaseEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationEvent for BaseEvent {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// An event addressed by the type of the value it carries.
///
/// [`PayloadListener`](crate::PayloadListener) callbacks fire when the
/// payload's type matches, independent of the wrapper. A payload built with
/// [`PayloadEvent::bean`] also matches every interface its bean type
/// declares.
#[derive(Clone)]
pub struct PayloadEvent {
    base: BaseEvent,
    payload: Arc<dyn Any + Send + Sync>,
    payload_type: &'static str,
    bean: Option<BeanRef>,
}

impl PayloadEvent {
    pub fn new<P: Any + Send + Sync>(payload: P) -> Self {
        Self {
            base: BaseEvent::new(),
            payload: Arc::new(payload),
            payload_type: std::any::type_name::<P>(),
            bean: None,
        }
    }

    /// Carry a bean as the payload, assignable to whatever its
    /// [`BeanType`](trellis_di::BeanType) provides.
    pub fn bean<T: ?Sized + Bean>(value: Arc<T>) -> Self {
        Self {
            base: BaseEvent::new(),
            payload: Arc::new(value.clone()),
            payload_type: std::any::type_name::<T>(),
            bean: Some(BeanRef::new(value)),
        }
    }

    pub fn payload(&self) -> &(dyn Any + Send + Sync) {
        self.payload.as_ref()
    }

    pub fn payload_ref<P: Any>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }

    pub fn payload_type(&self) -> &'static str {
        self.payload_type
    }

    /// View a bean payload as `I`, when its bean type is assignable to it.
    pub fn payload_as<I: ?Sized + 'static>(&self) -> Option<Arc<I>> {
        self.bean.as_ref().and_then(|bean| bean.cast::<I>())
    }
}

impl fmt::Debug for PayloadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadEvent")
            .field("occurred_at", &self.base.occurred_at)
            .field("payload_type", &self.payload_type)
            .finish()
    }
}

impl ApplicationEvent for PayloadEvent {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.occurred_at
    }
}
