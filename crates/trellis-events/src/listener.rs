//! Event listeners
//!
//! Three listener forms are accepted by a processor and all end up as an
//! [`ApplicationEventListener`]:
//!
//! - a direct listener implementation,
//! - a typed callback wrapped in [`FnListener`],
//! - an [`ApplicationEventConsumer`] that registers its own callbacks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::event::{ApplicationEvent, PayloadEvent};

/// Receives every delivered event. Implementations should return quickly.
pub trait ApplicationEventListener: Send + Sync {
    fn on_application_event(&self, event: &dyn ApplicationEvent);
}

type Invoker = Box<dyn Fn(&dyn ApplicationEvent) -> bool + Send + Sync>;

/// A callback that only fires for events of type `E`.
pub struct FnListener {
    event_type: &'static str,
    invoke: Invoker,
}

impl FnListener {
    pub fn new<E, F>(callback: F) -> Self
    where
        E: ApplicationEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        Self {
            event_type: std::any::type_name::<E>(),
            invoke: Box::new(move |event: &dyn ApplicationEvent| match event.downcast_ref::<E>() {
                Some(event) => {
                    callback(event);
                    true
                }
                None => false,
            }),
        }
    }

    /// Run the callback if `event` has the expected type.
    pub fn invoke(&self, event: &dyn ApplicationEvent) -> bool {
        (self.invoke)(event)
    }

    pub fn event_type(&self) -> &'static str {
        self.event_type
    }
}

impl ApplicationEventListener for FnListener {
    fn on_application_event(&self, event: &dyn ApplicationEvent) {
        self.invoke(event);
    }
}

impl fmt::Debug for FnListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener")
            .field("event_type", &self.event_type)
            .finish()
    }
}

/// Collects the callbacks of an [`ApplicationEventConsumer`].
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    callbacks: Vec<FnListener>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E, F>(&mut self, callback: F)
    where
        E: ApplicationEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.callbacks.push(FnListener::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl ApplicationEventListener for ConsumerRegistry {
    fn on_application_event(&self, event: &dyn ApplicationEvent) {
        for callback in &self.callbacks {
            callback.invoke(event);
        }
    }
}

/// An object that exposes its own typed callbacks.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use trellis_events::{ApplicationEventConsumer, BaseEvent, ConsumerRegistry};
///
/// struct Audit(AtomicUsize);
///
/// impl ApplicationEventConsumer for Audit {
///     fn register_consumer(self: Arc<Self>, registry: &mut ConsumerRegistry) -> anyhow::Result<()> {
///         registry.register(move |_: &BaseEvent| {
///             self.0.fetch_add(1, Ordering::SeqCst);
///         });
///         Ok(())
///     }
/// }
/// ```
pub trait ApplicationEventConsumer: Send + Sync {
    fn register_consumer(self: Arc<Self>, registry: &mut ConsumerRegistry) -> anyhow::Result<()>;
}

type PayloadInvoker = Box<dyn Fn(&PayloadEvent) -> bool + Send + Sync>;

/// Dispatches [`PayloadEvent`]s to callbacks keyed by payload type.
#[derive(Default)]
pub struct PayloadListener {
    callbacks: Vec<(&'static str, PayloadInvoker)>,
}

impl PayloadListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback for payloads of type `P`, carried by value or as a
    /// bean.
    pub fn on<P, F>(mut self, callback: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&P) + Send + Sync + 'static,
    {
        let invoker: PayloadInvoker = Box::new(move |event: &PayloadEvent| {
            if let Some(payload) = event.payload_ref::<P>() {
                callback(payload);
                return true;
            }
            match event.payload_as::<P>() {
                Some(payload) => {
                    callback(&*payload);
                    true
                }
                None => false,
            }
        });
        self.callbacks.push((std::any::type_name::<P>(), invoker));
        self
    }

    /// Add a callback for bean payloads assignable to `I`, typically a
    /// trait object.
    pub fn on_assignable<I, F>(mut self, callback: F) -> Self
    where
        I: ?Sized + 'static,
        F: Fn(&I) + Send + Sync + 'static,
    {
        let invoker: PayloadInvoker =
            Box::new(move |event: &PayloadEvent| match event.payload_as::<I>() {
                Some(payload) => {
                    callback(&*payload);
                    true
                }
                None => false,
            });
        self.callbacks.push((std::any::type_name::<I>(), invoker));
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl ApplicationEventListener for PayloadListener {
    fn on_application_event(&self, event: &dyn ApplicationEvent) {
        let Some(event) = event.downcast_ref::<PayloadEvent>() else {
            return;
        };
        for (_, callback) in &self.callbacks {
            callback(event);
        }
    }
}

impl fmt::Debug for PayloadListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<_> = self.callbacks.iter().map(|(name, _)| *name).collect();
        f.debug_struct("PayloadListener").field("payloads", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BaseEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fn_listener_filters_by_type() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let listener = FnListener::new(move |_: &BaseEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(listener.invoke(&BaseEvent::new()));
        assert!(!listener.invoke(&PayloadEvent::new("other")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_payload_listener_matches_payload_type() {
        let strings = Arc::new(AtomicUsize::new(0));
        let numbers = Arc::new(AtomicUsize::new(0));
        let (s, n) = (strings.clone(), numbers.clone());
        let listener = PayloadListener::new()
            .on(move |_: &String| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on(move |value: &u64| {
                n.fetch_add(*value as usize, Ordering::SeqCst);
            });

        listener.on_application_event(&PayloadEvent::new("hello".to_string()));
        listener.on_application_event(&PayloadEvent::new(5u64));
        listener.on_application_event(&BaseEvent::new());

        assert_eq!(strings.load(Ordering::SeqCst), 1);
        assert_eq!(numbers.load(Ordering::SeqCst), 5);
    }

    trait Notice: Send + Sync {
        fn weight(&self) -> usize;
    }

    struct Alert;

    impl Notice for Alert {
        fn weight(&self) -> usize {
            3
        }
    }

    trellis_di::bean!(Alert: dyn Notice);

    #[test]
    fn test_payload_listener_matches_assignable_beans() {
        let notices = Arc::new(AtomicUsize::new(0));
        let alerts = Arc::new(AtomicUsize::new(0));
        let (n, a) = (notices.clone(), alerts.clone());
        let listener = PayloadListener::new()
            .on_assignable(move |notice: &(dyn Notice + 'static)| {
                n.fetch_add(notice.weight(), Ordering::SeqCst);
            })
            .on(move |_: &Alert| {
                a.fetch_add(1, Ordering::SeqCst);
            });

        listener.on_application_event(&PayloadEvent::bean(Arc::new(Alert)));
        listener.on_application_event(&PayloadEvent::new(7usize));

        assert_eq!(notices.load(Ordering::SeqCst), 3);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    struct Audit(AtomicUsize);

    impl ApplicationEventConsumer for Audit {
        fn register_consumer(self: Arc<Self>, registry: &mut ConsumerRegistry) -> anyhow::Result<()> {
            registry.register(move |_: &BaseEvent| {
                self.0.fetch_add(1, Ordering::SeqCst);
            });
            Ok(())
        }
    }

    #[test]
    fn test_consumer_registers_callbacks() {
        let audit = Arc::new(Audit(AtomicUsize::new(0)));
        let mut registry = ConsumerRegistry::new();
        audit.clone().register_consumer(&mut registry).unwrap();
        assert_eq!(registry.len(), 1);

        registry.on_application_event(&BaseEvent::new());
        assert_eq!(audit.0.load(Ordering::SeqCst), 1);
    }
}
