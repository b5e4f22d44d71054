//! Application run loop
//!
//! [`Application`] wraps a context with a cancellation token: `run`
//! starts the context, waits until the token is cancelled (or a supplied
//! shutdown future resolves) and then closes the context within the
//! configured quit timeout.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trellis_di::{Definition, IntoBean, RegisterOptions};
use trellis_events::ApplicationEventListener;

use crate::config::{ConfigProperties, Properties, DEFAULT_QUIT_TIMEOUT_SEC, QUIT_TIMEOUT_SEC};
use crate::context::ApplicationContext;
use crate::error::{ContextError, ContextResult};

pub struct Application {
    context: ApplicationContext,
    cancel: CancellationToken,
    quit_timeout: Duration,
}

impl Application {
    pub fn new(properties: Arc<dyn Properties>) -> ContextResult<Self> {
        Self::with_context(ApplicationContext::new(), properties)
    }

    /// Load properties from `path` plus `TRELLIS` environment overrides.
    pub fn from_config_file(path: impl AsRef<Path>) -> ContextResult<Self> {
        let properties = ConfigProperties::load(path)?;
        Self::new(Arc::new(properties))
    }

    /// Initialize `context` with `properties` and wrap it.
    pub fn with_context(
        context: ApplicationContext,
        properties: Arc<dyn Properties>,
    ) -> ContextResult<Self> {
        let quit_timeout = quit_timeout(properties.as_ref());
        context.init(properties)?;
        Ok(Self {
            context,
            cancel: CancellationToken::new(),
            quit_timeout,
        })
    }

    pub fn context(&self) -> &ApplicationContext {
        &self.context
    }

    pub fn quit_timeout(&self) -> Duration {
        self.quit_timeout
    }

    pub fn register_bean<M>(&self, bean: impl IntoBean<M>) -> ContextResult<Arc<Definition>> {
        self.context.register_bean(bean)
    }

    pub fn register_bean_with<M>(
        &self,
        bean: impl IntoBean<M>,
        options: RegisterOptions,
    ) -> ContextResult<Arc<Definition>> {
        self.context.register_bean_with(bean, options)
    }

    pub fn register_bean_by_name<M>(
        &self,
        name: &str,
        bean: impl IntoBean<M>,
    ) -> ContextResult<Arc<Definition>> {
        self.context.register_bean_by_name(name, bean)
    }

    pub fn register_bean_by_name_with<M>(
        &self,
        name: &str,
        bean: impl IntoBean<M>,
        options: RegisterOptions,
    ) -> ContextResult<Arc<Definition>> {
        self.context.register_bean_by_name_with(name, bean, options)
    }

    pub fn add_listener(&self, listener: Arc<dyn ApplicationEventListener>) {
        self.context.add_listener(listener);
    }

    /// Token that ends [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Start the context and block until [`stop`](Self::stop) is called.
    pub async fn run(&self) -> ContextResult<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Start the context and block until stopped or `shutdown` resolves,
    /// for example `tokio::signal::ctrl_c()`.
    pub async fn run_until<F>(&self, shutdown: F) -> ContextResult<()>
    where
        F: Future + Send,
    {
        self.context.start()?;

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = shutdown => self.cancel.cancel(),
        }
        info!(
            application = %self.context.application_name(),
            timeout = ?self.quit_timeout,
            "Application stopping"
        );

        let context = self.context.clone();
        let closing = tokio::task::spawn_blocking(move || context.close());
        match tokio::time::timeout(self.quit_timeout, closing).await {
            Ok(joined) => joined?,
            Err(_) => Err(ContextError::QuitTimeout {
                timeout: self.quit_timeout,
            }),
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("context", &self.context)
            .field("quit_timeout", &self.quit_timeout)
            .finish()
    }
}

fn quit_timeout(properties: &dyn Properties) -> Duration {
    let seconds = match properties.get(QUIT_TIMEOUT_SEC) {
        None => DEFAULT_QUIT_TIMEOUT_SEC,
        Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
            warn!(value = %raw, "Invalid {}, using default", QUIT_TIMEOUT_SEC);
            DEFAULT_QUIT_TIMEOUT_SEC
        }),
    };
    Duration::from_secs(seconds)
}
