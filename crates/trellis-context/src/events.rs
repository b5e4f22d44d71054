//! Lifecycle events published by the context

use std::fmt;

use chrono::{DateTime, Utc};
use trellis_events::{ApplicationEvent, BaseEvent};

use crate::context::ApplicationContext;

macro_rules! context_event {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            base: BaseEvent,
            context: ApplicationContext,
        }

        impl $name {
            pub fn new(context: &ApplicationContext) -> Self {
                Self {
                    base: BaseEvent::new(),
                    context: context.clone(),
                }
            }

            pub fn application_context(&self) -> &ApplicationContext {
                &self.context
            }

            pub fn application_name(&self) -> String {
                self.context.application_name()
            }
        }

        impl ApplicationEvent for $name {
            fn occurred_at(&self) -> DateTime<Utc> {
                self.base.occurred_at()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("application", &self.application_name())
                    .field("occurred_at", &self.occurred_at())
                    .finish()
            }
        }
    };
}

context_event!(
    /// Published once start completes. Beans are injected and initialized.
    ContextStartedEvent
);

context_event!(
    /// Sent when the context begins to close. Listeners should release
    /// resources promptly.
    ContextStoppedEvent
);

context_event!(
    /// Sent last, after every bean has been destroyed.
    ContextClosedEvent
);
