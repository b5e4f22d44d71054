//! Lifecycle capabilities and named lifecycle hooks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::BeanRef;

/// Invoked once after the whole graph has been injected.
pub trait Initializing: Send + Sync {
    fn bean_after_set(&self) -> anyhow::Result<()>;
}

/// Invoked once when the owning context shuts down.
pub trait Disposable: Send + Sync {
    fn bean_destroy(&self) -> anyhow::Result<()>;
}

/// Signature of a named lifecycle hook.
pub type HookFn<T> = fn(&T) -> anyhow::Result<()>;

/// Table of methods that custom factories may name as lifecycle hooks.
///
/// Use [`method_table!`](crate::method_table) rather than implementing this
/// by hand.
pub trait MethodTable: Sized + Send + Sync + 'static {
    fn method(name: &str) -> Option<HookFn<Self>>;
}

/// Expose methods of a type as named lifecycle hooks.
///
/// ```rust
/// use trellis_di::{method_table, MethodTable};
///
/// struct Server;
///
/// impl Server {
///     fn start(&self) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
///
/// method_table!(Server { "start" => Server::start });
///
/// assert!(Server::method("start").is_some());
/// assert!(Server::method("stop").is_none());
/// ```
#[macro_export]
macro_rules! method_table {
    ($ty:ty { $($name:literal => $method:expr),* $(,)? }) => {
        impl $crate::MethodTable for $ty {
            fn method(name: &str) -> Option<$crate::HookFn<Self>> {
                match name {
                    $($name => Some($method as $crate::HookFn<Self>),)*
                    _ => None,
                }
            }
        }
    };
}

pub(crate) type Hook = Arc<dyn Fn(&BeanRef) -> anyhow::Result<()> + Send + Sync>;

/// Erase a typed hook so it can run against a [`BeanRef`].
pub(crate) fn erase_hook<T: MethodTable>(hook: HookFn<T>) -> Hook {
    Arc::new(move |bean: &BeanRef| match bean.downcast::<T>() {
        Some(value) => hook(&value),
        None => Err(anyhow::anyhow!(
            "bean {} is not a {}",
            bean.type_name(),
            std::any::type_name::<T>()
        )),
    })
}

/// Single-fire gates for `after_set` and `destroy`.
#[derive(Debug, Default)]
pub(crate) struct OnceFlags {
    after_set: AtomicBool,
    destroyed: AtomicBool,
}

impl OnceFlags {
    /// True for exactly one caller.
    pub(crate) fn begin_after_set(&self) -> bool {
        self.after_set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True for exactly one caller.
    pub(crate) fn begin_destroy(&self) -> bool {
        self.destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_flags_fire_once() {
        let flags = OnceFlags::default();
        assert!(flags.begin_after_set());
        assert!(!flags.begin_after_set());
        assert!(flags.begin_destroy());
        assert!(!flags.begin_destroy());
    }
}
