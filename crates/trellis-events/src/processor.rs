//! Event processors
//!
//! [`DefaultEventProcessor`] queues published events in a bounded channel
//! and delivers them from one dedicated worker thread, in publish order.
//! Synchronous sends bypass the queue and may reach listeners before
//! events still waiting in it.
//!
//! ```text
//! Stopped --start()--> Running --close()--> Drained
//!    \_____________________close()_______________^
//! ```
//!
//! Events published while *Stopped* wait in the queue. `close()` delivers
//! everything still queued before it returns.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use trellis_di::BeanRef;

use crate::error::{EventError, EventResult};
use crate::event::ApplicationEvent;
use crate::listener::{
    ApplicationEventConsumer, ApplicationEventListener, ConsumerRegistry, FnListener,
};

/// Queue capacity used by [`DefaultEventProcessor::new`].
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Stopped,
    Running,
    Drained,
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessorState::Stopped => "Stopped",
            ProcessorState::Running => "Running",
            ProcessorState::Drained => "Drained",
        };
        f.write_str(name)
    }
}

/// Publishing side of the event processor. Registered as a bean so other
/// beans can publish.
#[async_trait]
pub trait ApplicationEventPublisher: Send + Sync {
    /// Queue `event` without blocking. Fails with `QueueFull` when the
    /// queue has no room.
    fn publish_event(&self, event: Arc<dyn ApplicationEvent>) -> EventResult<()>;

    /// Queue `event`, waiting for room until `cancel` fires.
    async fn post_event(
        &self,
        cancel: &CancellationToken,
        event: Arc<dyn ApplicationEvent>,
    ) -> EventResult<()>;

    /// Deliver `event` to every listener on the caller's thread.
    fn send_event(&self, event: &dyn ApplicationEvent) -> EventResult<()>;
}

trellis_di::bean!(dyn ApplicationEventPublisher);

pub trait ApplicationEventProcessor: ApplicationEventPublisher {
    fn start(&self) -> EventResult<()>;

    /// Stop accepting events and deliver what is queued. Later calls are
    /// no-ops.
    fn close(&self) -> EventResult<()>;

    /// Synchronous delivery that keeps working after `close`.
    fn notify_event(&self, event: &dyn ApplicationEvent) -> EventResult<()>;

    fn add_listener(&self, listener: Arc<dyn ApplicationEventListener>);

    fn add_consumer(&self, consumer: Arc<dyn ApplicationEventConsumer>) -> EventResult<()> {
        let mut registry = ConsumerRegistry::new();
        consumer
            .register_consumer(&mut registry)
            .map_err(|err| EventError::Consumer {
                message: format!("{:#}", err),
            })?;
        self.add_listener(Arc::new(registry));
        Ok(())
    }

    /// Attach `bean` if it is a listener or a consumer.
    fn add_bean_listeners(&self, bean: &BeanRef) -> bool {
        if let Some(listener) = bean.cast::<dyn ApplicationEventListener>() {
            self.add_listener(listener);
            return true;
        }
        if let Some(consumer) = bean.cast::<dyn ApplicationEventConsumer>() {
            return match self.add_consumer(consumer) {
                Ok(()) => true,
                Err(err) => {
                    error!(bean = bean.type_name(), error = %err, "Failed to register event consumer");
                    false
                }
            };
        }
        false
    }

    fn state(&self) -> ProcessorState;

    fn as_publisher(self: Arc<Self>) -> Arc<dyn ApplicationEventPublisher>;
}

impl<'a> dyn ApplicationEventProcessor + 'a {
    /// Add a callback for events of type `E`.
    pub fn add_fn<E, F>(&self, callback: F)
    where
        E: ApplicationEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener::new(callback)));
    }
}

// ============================================================================
// Default processor
// ============================================================================

type EventSender = mpsc::Sender<Arc<dyn ApplicationEvent>>;
type EventReceiver = mpsc::Receiver<Arc<dyn ApplicationEvent>>;

#[derive(Clone, Default)]
struct Listeners(Arc<RwLock<Vec<Arc<dyn ApplicationEventListener>>>>);

impl Listeners {
    fn add(&self, listener: Arc<dyn ApplicationEventListener>) {
        self.0.write().push(listener);
    }

    /// Deliver `event` to every listener. A panicking listener is logged
    /// and the remaining listeners still run.
    fn notify(&self, event: &dyn ApplicationEvent) {
        // Snapshot so listeners may add listeners.
        let listeners = self.0.read().clone();
        for listener in listeners {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                listener.on_application_event(event)
            }));
            if let Err(payload) = delivered {
                error!(
                    event = ?event,
                    panic = panic_message(payload.as_ref()),
                    "Event listener panicked"
                );
            }
        }
    }

    fn len(&self) -> usize {
        self.0.read().len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

/// Bounded queue plus a single delivery worker.
pub struct DefaultEventProcessor {
    capacity: usize,
    sender: Mutex<Option<EventSender>>,
    receiver: Mutex<Option<EventReceiver>>,
    listeners: Listeners,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<ProcessorState>,
    closing: Mutex<()>,
}

impl DefaultEventProcessor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            capacity,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            listeners: Listeners::default(),
            worker: Mutex::new(None),
            state: Mutex::new(ProcessorState::Stopped),
            closing: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for DefaultEventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultEventProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultEventProcessor")
            .field("capacity", &self.capacity)
            .field("listeners", &self.listeners.len())
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[async_trait]
impl ApplicationEventPublisher for DefaultEventProcessor {
    fn publish_event(&self, event: Arc<dyn ApplicationEvent>) -> EventResult<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(EventError::Closed)?;
        sender.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => EventError::QueueFull,
            TrySendError::Closed(_) => EventError::Closed,
        })
    }

    async fn post_event(
        &self,
        cancel: &CancellationToken,
        event: Arc<dyn ApplicationEvent>,
    ) -> EventResult<()> {
        let sender = self.sender.lock().clone().ok_or(EventError::Closed)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EventError::Cancelled),
            result = sender.send(event) => result.map_err(|_| EventError::Closed),
        }
    }

    fn send_event(&self, event: &dyn ApplicationEvent) -> EventResult<()> {
        self.listeners.notify(event);
        Ok(())
    }
}

impl ApplicationEventProcessor for DefaultEventProcessor {
    fn start(&self) -> EventResult<()> {
        let mut state = self.state.lock();
        if *state != ProcessorState::Stopped {
            return Err(EventError::InvalidState { state: *state });
        }
        let mut receiver = self.receiver.lock().take().ok_or(EventError::Closed)?;

        let listeners = self.listeners.clone();
        let worker = std::thread::Builder::new()
            .name("trellis-events".to_string())
            .spawn(move || {
                while let Some(event) = receiver.blocking_recv() {
                    listeners.notify(event.as_ref());
                }
                debug!("Event loop finished");
            })?;

        *self.worker.lock() = Some(worker);
        *state = ProcessorState::Running;
        debug!(capacity = self.capacity, "Event processor started");
        Ok(())
    }

    fn close(&self) -> EventResult<()> {
        let _closing = self.closing.lock();
        if *self.state.lock() == ProcessorState::Drained {
            return Ok(());
        }

        // Dropping the last sender lets the worker drain and exit.
        self.sender.lock().take();
        let worker = self.worker.lock().take();
        match worker {
            Some(worker) => {
                if worker.join().is_err() {
                    error!("Event worker panicked while delivering events");
                }
            }
            None => {
                if let Some(mut receiver) = self.receiver.lock().take() {
                    receiver.close();
                    while let Ok(event) = receiver.try_recv() {
                        self.listeners.notify(event.as_ref());
                    }
                }
            }
        }

        *self.state.lock() = ProcessorState::Drained;
        info!("Event processor closed");
        Ok(())
    }

    fn notify_event(&self, event: &dyn ApplicationEvent) -> EventResult<()> {
        self.listeners.notify(event);
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn ApplicationEventListener>) {
        self.listeners.add(listener);
        debug!(listeners = self.listeners.len(), "Added event listener");
    }

    fn state(&self) -> ProcessorState {
        *self.state.lock()
    }

    fn as_publisher(self: Arc<Self>) -> Arc<dyn ApplicationEventPublisher> {
        self
    }
}

// ============================================================================
// Disabled processor
// ============================================================================

/// Used when events are switched off. Publishing fails with `Disabled`;
/// lifecycle calls and notifications succeed and do nothing.
#[derive(Debug)]
pub struct DisabledEventProcessor {
    state: Mutex<ProcessorState>,
}

impl DisabledEventProcessor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessorState::Stopped),
        }
    }
}

impl Default for DisabledEventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApplicationEventPublisher for DisabledEventProcessor {
    fn publish_event(&self, _event: Arc<dyn ApplicationEvent>) -> EventResult<()> {
        Err(EventError::Disabled)
    }

    async fn post_event(
        &self,
        _cancel: &CancellationToken,
        _event: Arc<dyn ApplicationEvent>,
    ) -> EventResult<()> {
        Err(EventError::Disabled)
    }

    fn send_event(&self, _event: &dyn ApplicationEvent) -> EventResult<()> {
        Err(EventError::Disabled)
    }
}

impl ApplicationEventProcessor for DisabledEventProcessor {
    fn start(&self) -> EventResult<()> {
        let mut state = self.state.lock();
        if *state == ProcessorState::Stopped {
            *state = ProcessorState::Running;
        }
        Ok(())
    }

    fn close(&self) -> EventResult<()> {
        *self.state.lock() = ProcessorState::Drained;
        Ok(())
    }

    fn notify_event(&self, _event: &dyn ApplicationEvent) -> EventResult<()> {
        Ok(())
    }

    fn add_listener(&self, _listener: Arc<dyn ApplicationEventListener>) {
        debug!("Event processing disabled, listener ignored");
    }

    fn state(&self) -> ProcessorState {
        *self.state.lock()
    }

    fn as_publisher(self: Arc<Self>) -> Arc<dyn ApplicationEventPublisher> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BaseEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(processor: &dyn ApplicationEventProcessor) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        processor.add_fn(move |_: &BaseEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    #[test]
    fn test_queue_full_is_reported() {
        let processor = DefaultEventProcessor::with_capacity(2);
        assert!(processor.publish_event(Arc::new(BaseEvent::new())).is_ok());
        assert!(processor.publish_event(Arc::new(BaseEvent::new())).is_ok());
        assert!(matches!(
            processor.publish_event(Arc::new(BaseEvent::new())),
            Err(EventError::QueueFull)
        ));
    }

    #[test]
    fn test_close_without_start_drains_on_caller() {
        let processor = DefaultEventProcessor::with_capacity(8);
        let hits = counting(&processor);
        for _ in 0..3 {
            processor.publish_event(Arc::new(BaseEvent::new())).unwrap();
        }
        processor.close().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(processor.state(), ProcessorState::Drained);
    }

    #[test]
    fn test_start_then_close_delivers_everything() {
        let processor = DefaultEventProcessor::new();
        let hits = counting(&processor);
        processor.start().unwrap();
        for _ in 0..100 {
            processor.publish_event(Arc::new(BaseEvent::new())).unwrap();
        }
        processor.close().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_second_close_is_noop_and_publish_fails() {
        let processor = DefaultEventProcessor::new();
        processor.start().unwrap();
        processor.close().unwrap();
        processor.close().unwrap();
        assert!(matches!(
            processor.publish_event(Arc::new(BaseEvent::new())),
            Err(EventError::Closed)
        ));
        assert!(matches!(
            processor.start(),
            Err(EventError::InvalidState {
                state: ProcessorState::Drained
            })
        ));
    }

    #[test]
    fn test_notify_works_after_close() {
        let processor = DefaultEventProcessor::new();
        let hits = counting(&processor);
        processor.close().unwrap();
        processor.notify_event(&BaseEvent::new()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_event_respects_cancellation() {
        let processor = DefaultEventProcessor::with_capacity(1);
        processor.publish_event(Arc::new(BaseEvent::new())).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = processor.post_event(&cancel, Arc::new(BaseEvent::new())).await;
        assert!(matches!(result, Err(EventError::Cancelled)));
    }

    #[test]
    fn test_disabled_processor_rejects_publishing() {
        let processor = DisabledEventProcessor::new();
        processor.start().unwrap();
        assert!(matches!(
            processor.publish_event(Arc::new(BaseEvent::new())),
            Err(EventError::Disabled)
        ));
        assert!(matches!(
            processor.send_event(&BaseEvent::new()),
            Err(EventError::Disabled)
        ));
        assert!(processor.notify_event(&BaseEvent::new()).is_ok());
        processor.close().unwrap();
        assert_eq!(processor.state(), ProcessorState::Drained);
    }
}
