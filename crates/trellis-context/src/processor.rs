//! Processor plugins
//!
//! A processor sorts beans into whatever groups it cares about during
//! `classify`, then acts on them all at once in `process`. Both run once
//! per context start, after injection.

use trellis_di::{BeanRef, Container};

use crate::config::Properties;

pub trait Processor: Send + Sync {
    /// Called once when the processor is added to a context.
    fn init(&self, properties: &dyn Properties, container: &Container) -> anyhow::Result<()>;

    /// Offered every bean instance in container order. Returns whether the
    /// processor took the bean. May be called from several threads.
    fn classify(&self, bean: &BeanRef) -> anyhow::Result<bool>;

    /// Runs after classification and post-injection callbacks. An error
    /// aborts context start.
    fn process(&self) -> anyhow::Result<()>;

    /// Runs when the context closes.
    fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn processor_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

trellis_di::bean!(dyn Processor);
