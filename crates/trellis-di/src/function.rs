//! Function-injection registry
//!
//! Functions registered here are not bean producers. They run once during
//! startup with every parameter resolved from the container, for side
//! effects such as wiring callbacks between beans.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::container::Container;
use crate::error::{DIError, DIResult, ErrorList};
use crate::injector::Injector;
use crate::source::missing_argument;
use crate::target::{InjectTarget, Resolved, TargetType};

/// A bean that contributes functions to the registry when registered.
pub trait InjectFunction: Send + Sync {
    fn register_function(&self, registry: &FunctionRegistry) -> DIResult<()>;
}

/// Return types accepted from injected functions.
pub trait InvokeResult {
    fn into_result(self) -> anyhow::Result<()>;
}

impl InvokeResult for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl InvokeResult for anyhow::Result<()> {
    fn into_result(self) -> anyhow::Result<()> {
        self
    }
}

/// A closure whose parameters are all injection targets.
pub trait InjectFn<Args>: Send + Sync + 'static {
    fn params() -> Vec<TargetType>;

    /// Outer error: the arguments did not convert. Inner: the call failed.
    fn invoke(&self, args: Vec<Resolved>) -> DIResult<anyhow::Result<()>>;
}

macro_rules! impl_inject_fn {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> InjectFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: InvokeResult,
            $($arg: InjectTarget,)*
        {
            fn params() -> Vec<TargetType> {
                vec![$($arg::target_type()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn invoke(&self, args: Vec<Resolved>) -> DIResult<anyhow::Result<()>> {
                let mut args = args.into_iter();
                $(
                    let $arg = match args.next() {
                        Some(resolved) => $arg::from_resolved(resolved)?,
                        None => return Err(missing_argument(&$arg::target_type())),
                    };
                )*
                Ok((self)($($arg),*).into_result())
            }
        }
    };
}

impl_inject_fn!();
impl_inject_fn!(A1);
impl_inject_fn!(A1, A2);
impl_inject_fn!(A1, A2, A3);
impl_inject_fn!(A1, A2, A3, A4);
impl_inject_fn!(A1, A2, A3, A4, A5);
impl_inject_fn!(A1, A2, A3, A4, A5, A6);

type Invoker = Box<dyn Fn(Vec<Resolved>) -> DIResult<anyhow::Result<()>> + Send + Sync>;

struct RegisteredFunction {
    function: &'static str,
    params: Vec<TargetType>,
    names: Vec<String>,
    invoker: Invoker,
}

/// Records functions and invokes them with injected arguments.
pub struct FunctionRegistry {
    injector: Arc<Injector>,
    functions: Mutex<Vec<Arc<RegisteredFunction>>>,
}

impl FunctionRegistry {
    pub fn new(injector: Arc<Injector>) -> Self {
        Self {
            injector,
            functions: Mutex::new(Vec::new()),
        }
    }

    /// Register `function`. `names` pairs positionally with its parameters
    /// and is padded or truncated to fit.
    pub fn register<F, Args>(&self, function: F, names: &[&str]) -> DIResult<()>
    where
        F: InjectFn<Args>,
    {
        let function_name = std::any::type_name::<F>();
        let params = F::params();
        if params.is_empty() {
            return Err(DIError::InvalidFunction {
                function: function_name.to_string(),
                message: "function must have at least one parameter".to_string(),
            });
        }
        if let Some(param) = params.iter().find(|p| !self.injector.can_inject_type(p)) {
            return Err(DIError::InvalidFunction {
                function: function_name.to_string(),
                message: format!("parameter {} cannot be injected", param),
            });
        }

        let mut names: Vec<String> = names.iter().map(|name| name.to_string()).collect();
        names.resize(params.len(), String::new());

        debug!(function = function_name, params = params.len(), "Registered inject function");
        self.functions.lock().push(Arc::new(RegisteredFunction {
            function: function_name,
            params,
            names,
            invoker: Box::new(move |args| function.invoke(args)),
        }));
        Ok(())
    }

    /// Invoke every registered function in registration order.
    ///
    /// A function whose parameters fail to resolve is skipped after its
    /// listeners fire. All failures are returned together.
    pub fn inject_all(&self, container: &Container) -> DIResult<()> {
        let functions: Vec<_> = self.functions.lock().clone();
        let mut errors = ErrorList::new();
        for function in functions {
            if let Err(err) = self.invoke(container, &function) {
                errors.push(err);
            }
        }
        errors.into_result()
    }

    fn invoke(&self, container: &Container, function: &RegisteredFunction) -> DIResult<()> {
        let mut args = Vec::with_capacity(function.params.len());
        for (index, param) in function.params.iter().enumerate() {
            let tag = self.injector.listeners().parse(&function.names[index]);
            match self.injector.inject_value(container, &tag.name, param) {
                Ok(resolved) => args.push(resolved),
                Err(err) => {
                    let err = DIError::FactoryParam {
                        factory: function.function.to_string(),
                        index,
                        param: param.name().to_string(),
                        source: Box::new(err),
                    };
                    tag.notify(&err);
                    return Err(err);
                }
            }
        }

        (function.invoker)(args)?.map_err(|err| DIError::InvalidFunction {
            function: function.function.to_string(),
            message: format!("{:#}", err),
        })
    }

    pub fn len(&self) -> usize {
        self.functions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.len())
            .finish()
    }
}
