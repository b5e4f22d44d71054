//! Error types for the bean container and injector

use std::fmt;

use thiserror::Error;

use crate::definition::DefinitionKind;

/// Result alias used across the container and injector
pub type DIResult<T> = Result<T, DIError>;

/// Errors raised while registering, resolving or tearing down beans
#[derive(Debug, Error)]
pub enum DIError {
    #[error("Bean already registered: {name}")]
    DuplicateName { name: String },

    #[error("Cannot derive a bean name for type {type_name}")]
    EmptyName { type_name: String },

    #[error("No definition creator registered for {kind} beans")]
    UnsupportedShape { kind: DefinitionKind },

    #[error("Invalid function {function}: {message}")]
    InvalidFunction { function: String, message: String },

    #[error("Type {type_name} {hook} method {method} not found")]
    HookNotFound {
        type_name: String,
        hook: &'static str,
        method: String,
    },

    #[error("Type {type_name} {hook} method {method} is private")]
    PrivateHook {
        type_name: String,
        hook: &'static str,
        method: String,
    },

    #[error("Bean not found: {name}")]
    NotFound { name: String },

    #[error("Bean {name} of type {found} is not assignable to {expected}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Inject {target} failed: value must be pointer")]
    NotPointer { target: String },

    #[error("Inject {target} failed: map key type {key} must be String")]
    NonStringMapKey { target: String, key: String },

    #[error("Inject nothing, cannot find any implementation of {target}")]
    EmptyCollection { target: String },

    #[error("Cannot inject this kind: {target}")]
    UnsupportedTarget { target: String },

    #[error("Inject failed: field [{owner}.{field}] error: {source}")]
    InjectionFailed {
        owner: String,
        field: String,
        #[source]
        source: Box<DIError>,
    },

    #[error("Factory {factory} param {index} [{param}] failed: {source}")]
    FactoryParam {
        factory: String,
        index: usize,
        param: String,
        #[source]
        source: Box<DIError>,
    },

    #[error("Definition [{kind}] inject type [{name}] circular dependency")]
    CircularDependency { kind: DefinitionKind, name: String },

    #[error("Bean {bean} lifecycle failed: {errors}")]
    Lifecycle { bean: String, errors: ErrorList },

    #[error("{0}")]
    Aggregate(ErrorList),
}

impl DIError {
    /// Whether this error, or any error it wraps, is a circular dependency.
    pub fn is_circular_dependency(&self) -> bool {
        match self {
            DIError::CircularDependency { .. } => true,
            DIError::InjectionFailed { source, .. } | DIError::FactoryParam { source, .. } => {
                source.is_circular_dependency()
            }
            _ => false,
        }
    }
}

/// Collected failures that should be reported together rather than
/// stopping at the first one.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<String>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl fmt::Display) {
        self.errors.push(err.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(String::as_str)
    }

    /// `Ok(())` when nothing was collected, otherwise the aggregate error.
    pub fn into_result(self) -> DIResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DIError::Aggregate(self))
        }
    }

    pub(crate) fn into_lifecycle(self, bean: &str) -> DIResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DIError::Lifecycle {
                bean: bean.to_string(),
                errors: self,
            })
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.errors.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_list_joins_messages() {
        let mut errors = ErrorList::new();
        errors.push("first");
        errors.push(anyhow::anyhow!("second"));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.to_string(), "first, second");
        assert!(matches!(errors.into_result(), Err(DIError::Aggregate(_))));
    }

    #[test]
    fn empty_error_list_is_ok() {
        assert!(ErrorList::new().into_result().is_ok());
        assert!(ErrorList::new().into_lifecycle("bean").is_ok());
    }

    #[test]
    fn circular_dependency_is_found_through_wrappers() {
        let err = DIError::FactoryParam {
            factory: "make".into(),
            index: 0,
            param: "A".into(),
            source: Box::new(DIError::CircularDependency {
                kind: DefinitionKind::Function,
                name: "A".into(),
            }),
        };
        assert!(err.is_circular_dependency());
        assert!(!DIError::NotFound { name: "x".into() }.is_circular_dependency());
    }
}
