//! Per-slot failure policies
//!
//! An injection tag has the form `name[,policy]*`. Each policy names a
//! listener that is told about a failed injection. `required` aborts the
//! process, `omiterror` logs and leaves the slot empty. With no policy,
//! `required` applies. A circular dependency aborts under every policy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::error::DIError;

pub const REQUIRED: &str = "required";
pub const OMIT_ERROR: &str = "omiterror";

/// Told about every failed injection on a slot that names it.
pub trait InjectListener: Send + Sync {
    fn on_inject_failed(&self, err: &DIError);
}

/// Turns an injection failure into a panic.
#[derive(Debug, Default)]
pub struct RequiredListener;

impl InjectListener for RequiredListener {
    fn on_inject_failed(&self, err: &DIError) {
        panic!("{}", err);
    }
}

/// Logs an injection failure and carries on.
#[derive(Debug, Default)]
pub struct OmitErrorListener;

impl InjectListener for OmitErrorListener {
    fn on_inject_failed(&self, err: &DIError) {
        error!(error = %err, "Injection failed, slot left empty");
    }
}

/// A parsed injection tag.
pub struct InjectTag {
    pub name: String,
    pub listeners: Vec<Arc<dyn InjectListener>>,
}

impl InjectTag {
    /// Hand `err` to every policy listener. A circular dependency panics
    /// after the listeners ran, whatever the policies are.
    pub fn notify(&self, err: &DIError) {
        for listener in &self.listeners {
            listener.on_inject_failed(err);
        }
        if err.is_circular_dependency() {
            panic!("{}", err);
        }
    }
}

impl fmt::Debug for InjectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectTag")
            .field("name", &self.name)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Registry of named policies, shared by the injector and the function
/// registry.
pub struct ListenerManager {
    listeners: RwLock<HashMap<String, Arc<dyn InjectListener>>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        let mut listeners: HashMap<String, Arc<dyn InjectListener>> = HashMap::new();
        listeners.insert(REQUIRED.to_string(), Arc::new(RequiredListener));
        listeners.insert(OMIT_ERROR.to_string(), Arc::new(OmitErrorListener));
        Self {
            listeners: RwLock::new(listeners),
        }
    }

    /// Add or replace the policy called `name`.
    pub fn add_listener(&self, name: impl Into<String>, listener: Arc<dyn InjectListener>) {
        self.listeners.write().insert(name.into(), listener);
    }

    /// Split a tag into its lookup name and the listeners of its policies.
    ///
    /// Unknown policy names are ignored.
    pub fn parse(&self, tag: &str) -> InjectTag {
        let mut parts = tag.split(',').map(str::trim);
        let name = parts.next().unwrap_or_default().to_string();
        let mut policies: Vec<&str> = parts.filter(|p| !p.is_empty()).collect();
        if policies.is_empty() {
            policies.push(REQUIRED);
        }

        let registered = self.listeners.read();
        let listeners = policies
            .into_iter()
            .filter_map(|policy| registered.get(policy).cloned())
            .collect();
        InjectTag { name, listeners }
    }
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.listeners.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("ListenerManager").field("policies", &names).finish()
    }
}
