//! # Function Registry
//!
//! Module-organised storage of task functions, with optional lazy module
//! loaders standing in for "import the module if it is not loaded yet".

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::FUNCTION_ID_SEPARATOR;
use crate::error::{panic_message, ExecutionError, ResolutionError};
use crate::messaging::{Args, CallEnvelope, Kwargs};

/// Result of one task function invocation
pub type TaskResult = Result<Value, ExecutionError>;

/// A callable task.
///
/// Implemented for every `Fn(&CallArgs) -> TaskResult + Send + Sync`, so plain
/// functions and closures can be registered directly.
pub trait TaskFunction: Send + Sync {
    fn call(&self, call: &CallArgs) -> TaskResult;
}

impl<F> TaskFunction for F
where
    F: Fn(&CallArgs) -> TaskResult + Send + Sync,
{
    fn call(&self, call: &CallArgs) -> TaskResult {
        self(call)
    }
}

/// Loader run once, on first resolution of a member of its module
pub type ModuleLoader = Box<dyn Fn(&mut ModuleBuilder) -> Result<(), String> + Send + Sync>;

/// Arguments handed to a task function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    args: Args,
    kwargs: Kwargs,
}

impl CallArgs {
    pub fn new(args: Args, kwargs: Kwargs) -> Self {
        Self { args, kwargs }
    }

    pub fn positional(args: Args) -> Self {
        Self::new(args, Kwargs::new())
    }

    pub fn named(kwargs: Kwargs) -> Self {
        Self::new(Args::new(), kwargs)
    }

    pub fn from_envelope(envelope: &CallEnvelope) -> Self {
        Self::new(envelope.args().to_vec(), envelope.kwargs().clone())
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Positional argument `index`, converted to `T`
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, ExecutionError> {
        let value = self.args.get(index).ok_or_else(|| {
            ExecutionError::invalid_arguments(format!("missing positional argument {index}"))
        })?;
        convert(value, || format!("positional argument {index}"))
    }

    /// Required named argument
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, ExecutionError> {
        self.kwarg_opt(name)?.ok_or_else(|| {
            ExecutionError::invalid_arguments(format!("missing keyword argument '{name}'"))
        })
    }

    /// Optional named argument; `null` counts as absent
    pub fn kwarg_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ExecutionError> {
        match self.kwargs.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => convert(value, || format!("keyword argument '{name}'")).map(Some),
        }
    }
}

fn convert<T, F>(value: &Value, describe: F) -> Result<T, ExecutionError>
where
    T: DeserializeOwned,
    F: FnOnce() -> String,
{
    T::deserialize(value)
        .map_err(|e| ExecutionError::invalid_arguments(format!("{}: {e}", describe())))
}

/// Split `module.path.member` at the last separator
pub fn split_function_id(function_id: &str) -> Result<(&str, &str), ResolutionError> {
    match function_id.rsplit_once(FUNCTION_ID_SEPARATOR) {
        Some((module, member)) if !module.is_empty() && !member.is_empty() => Ok((module, member)),
        _ => Err(ResolutionError::invalid_identifier(function_id)),
    }
}

/// Collects the members a [`ModuleLoader`] defines
pub struct ModuleBuilder {
    module: String,
    members: HashMap<String, Arc<dyn TaskFunction>>,
}

impl ModuleBuilder {
    fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            members: HashMap::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn function<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&CallArgs) -> TaskResult + Send + Sync + 'static,
    {
        self.members.insert(name.into(), Arc::new(function));
        self
    }
}

struct ModuleEntry {
    members: HashMap<String, Arc<dyn TaskFunction>>,
    loader: Option<ModuleLoader>,
    loaded: bool,
}

impl ModuleEntry {
    fn loaded() -> Self {
        Self {
            members: HashMap::new(),
            loader: None,
            loaded: true,
        }
    }
}

/// Registry of task functions grouped by module path
pub struct FunctionRegistry {
    modules: RwLock<HashMap<String, ModuleEntry>>,
    module_loads: AtomicUsize,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("modules", &self.module_names())
            .field("module_loads", &self.module_loads())
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            module_loads: AtomicUsize::new(0),
        }
    }

    /// Register one function under its fully qualified identifier
    pub fn register<F>(&self, function_id: &str, function: F) -> Result<(), ResolutionError>
    where
        F: Fn(&CallArgs) -> TaskResult + Send + Sync + 'static,
    {
        self.register_arc(function_id, Arc::new(function))
    }

    /// Register an already shared callable, e.g. a struct implementing [`TaskFunction`]
    pub fn register_arc(
        &self,
        function_id: &str,
        function: Arc<dyn TaskFunction>,
    ) -> Result<(), ResolutionError> {
        let (module, member) = split_function_id(function_id)?;

        let mut modules = self.modules.write();
        let entry = modules
            .entry(module.to_string())
            .or_insert_with(ModuleEntry::loaded);
        if entry
            .members
            .insert(member.to_string(), function)
            .is_some()
        {
            warn!(function_id = %function_id, "Replacing previously registered function");
        }

        debug!(function_id = %function_id, "Registered task function");
        Ok(())
    }

    /// Register a module whose members are defined lazily by `loader`.
    ///
    /// The loader runs without access to the registry, on the first resolution
    /// of any member of `module`. A failed or panicking load is retried on the
    /// next resolution.
    pub fn register_module<L>(&self, module: &str, loader: L)
    where
        L: Fn(&mut ModuleBuilder) -> Result<(), String> + Send + Sync + 'static,
    {
        let mut modules = self.modules.write();
        let entry = modules
            .entry(module.to_string())
            .or_insert_with(ModuleEntry::loaded);
        entry.loader = Some(Box::new(loader));
        entry.loaded = false;

        debug!(module = %module, "Registered lazy module");
    }

    /// Look up `member` in `module`, loading the module first if needed
    pub fn lookup(&self, module: &str, member: &str) -> Result<Arc<dyn TaskFunction>, ResolutionError> {
        {
            let modules = self.modules.read();
            let entry = modules
                .get(module)
                .ok_or_else(|| ResolutionError::module_not_found(module))?;
            if entry.loaded {
                return entry
                    .members
                    .get(member)
                    .cloned()
                    .ok_or_else(|| ResolutionError::member_not_found(module, member));
            }
        }

        let mut modules = self.modules.write();
        let entry = modules
            .get_mut(module)
            .ok_or_else(|| ResolutionError::module_not_found(module))?;

        // Another thread may have loaded it between the two locks
        if !entry.loaded {
            if let Some(loader) = entry.loader.as_ref() {
                let mut builder = ModuleBuilder::new(module);
                match panic::catch_unwind(AssertUnwindSafe(|| loader(&mut builder))) {
                    Ok(Ok(())) => {}
                    Ok(Err(reason)) => {
                        return Err(ResolutionError::module_load_failed(module, reason));
                    }
                    Err(panic_error) => {
                        let reason = format!("loader panicked: {}", panic_message(&*panic_error));
                        warn!(module = %module, reason = %reason, "Task module loader panicked");
                        return Err(ResolutionError::module_load_failed(module, reason));
                    }
                }

                for (name, function) in builder.members {
                    entry.members.entry(name).or_insert(function);
                }
            }
            entry.loaded = true;
            self.module_loads.fetch_add(1, Ordering::Relaxed);
            info!(module = %module, members = entry.members.len(), "Loaded task module");
        }

        entry
            .members
            .get(member)
            .cloned()
            .ok_or_else(|| ResolutionError::member_not_found(module, member))
    }

    pub fn is_loaded(&self, module: &str) -> bool {
        self.modules
            .read()
            .get(module)
            .is_some_and(|entry| entry.loaded)
    }

    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of lazy module loads performed so far
    pub fn module_loads(&self) -> usize {
        self.module_loads.load(Ordering::Relaxed)
    }
}
