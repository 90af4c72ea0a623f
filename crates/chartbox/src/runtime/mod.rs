//! Tree-walking interpreter for the snippet language
//!
//! The interpreter can only reach what the [`Environment`] bound: a fixed
//! builtins table, modules pre-registered by the builder, the scratch
//! handle and caller context. It checks the watchdog's interrupt flag at
//! every statement, loop iteration and call, and counts what the snippet
//! allocates against the memory ceiling.

mod expr;
pub mod fault;
pub mod format;
mod methods;
pub mod ops;
pub mod output;
mod stmt;
pub mod value;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::chart::Figures;
use crate::environment::{Binding, Environment, ModuleTable};
use crate::script::ast::Program;
use crate::types::{ExecutionLimits, SecurityLevel};
use crate::validator::policy;

pub(crate) use expr::make_range;
pub use fault::{ExcKind, Exception, Fault};
pub use output::{OutputBuffer, SharedOutput};
pub use value::{CallArgs, Dict, Footprint, NativeFn, Scope, Value};

/// Deepest call stack a snippet may build
pub const MAX_CALL_DEPTH: usize = 150;

/// Most files a single run may write into the scratch directory
pub const MAX_ARTIFACT_WRITES: usize = 100;

/// Deepest container nesting a snippet may build
pub const MAX_DATA_DEPTH: usize = 10_000;

/// Stack size for threads that run snippets
pub const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Ticks between sweeps of every live namespace for memory use
const MEMORY_SWEEP_INTERVAL: u64 = 4096;

/// Everything a run needs besides the environment
pub struct RunContext {
    pub interrupt: Arc<AtomicBool>,
    pub stdout: SharedOutput,
    pub stderr: SharedOutput,
    /// Largest value (and namespace) the snippet may build, in bytes
    pub max_memory_bytes: u64,
}

pub struct Interpreter {
    level: SecurityLevel,
    globals: HashMap<String, Value>,
    builtins: HashMap<&'static str, Value>,
    module_tables: HashMap<&'static str, ModuleTable>,
    modules: HashMap<&'static str, Rc<value::Module>>,
    /// Local scope of the executing function; `None` at module level
    scope: Option<Rc<Scope>>,
    /// Scopes of every active call, for memory sweeps
    call_stack: Vec<Rc<Scope>>,
    /// Exceptions being handled, innermost last, for bare `raise`
    handling: Vec<Exception>,
    /// Values under construction that no namespace holds yet
    pending: RefCell<Vec<Value>>,
    /// Estimated live bytes: the last sweep plus everything charged since
    charged: Cell<u64>,
    ticks: u64,
    interrupt: Arc<AtomicBool>,
    stdout: SharedOutput,
    stderr: SharedOutput,
    max_memory_bytes: u64,
    scratch: PathBuf,
    artifact_writes: usize,
    rng: StdRng,
    figures: Figures,
}

impl Interpreter {
    pub fn new(env: Environment, ctx: RunContext) -> Self {
        let parts = env.into_parts();

        let mut interp = Self {
            level: parts.level,
            globals: HashMap::new(),
            builtins: HashMap::new(),
            module_tables: parts.modules,
            modules: HashMap::new(),
            scope: None,
            call_stack: Vec::new(),
            handling: Vec::new(),
            pending: RefCell::default(),
            charged: Cell::new(0),
            ticks: 0,
            interrupt: ctx.interrupt,
            stdout: ctx.stdout,
            stderr: ctx.stderr,
            max_memory_bytes: ctx.max_memory_bytes,
            scratch: parts.scratch,
            artifact_writes: 0,
            rng: StdRng::from_entropy(),
            figures: Figures::default(),
        };

        for (name, binding) in parts.builtins {
            let value = interp.bind(name, &binding);
            interp.builtins.insert(name, value);
        }
        for (name, json) in parts.context {
            interp.globals.insert(name, Value::from_json(&json));
        }
        interp.charged.set(interp.memory_used());
        interp
    }

    /// Run a whole program at module level
    pub fn run(&mut self, program: &Program) -> Result<(), Fault> {
        // A stray top-level `return` or `break` just ends the run
        self.exec_block(&program.body)?;

        let used = self.memory_used();
        if used > self.max_memory_bytes {
            return Err(self.memory_fault(used));
        }
        Ok(())
    }

    /// Estimated size of the global namespace in bytes
    pub fn memory_used(&self) -> u64 {
        let names: u64 = self.globals.keys().map(|name| name.len() as u64).sum();
        names + Footprint::measure(self.globals.values()).bytes
    }

    // === Limits ===

    /// Called at every statement, loop iteration and call
    pub(crate) fn tick(&mut self) -> Result<(), Fault> {
        if self.interrupt.load(Ordering::Relaxed) {
            return Err(Fault::Interrupted);
        }
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % MEMORY_SWEEP_INTERVAL == 0 {
            let live = self.sweep_memory()?;
            if live > self.max_memory_bytes {
                return Err(self.memory_fault(live));
            }
            self.charged.set(live);
        }
        Ok(())
    }

    /// Measure every live namespace and pending value
    ///
    /// Fails if data is nested deeper than [`MAX_DATA_DEPTH`]; the caller
    /// compares the returned byte count with the ceiling.
    fn sweep_memory(&self) -> Result<u64, Fault> {
        let scopes: Vec<Value> = self
            .call_stack
            .iter()
            .flat_map(|scope| {
                let mut values = Vec::new();
                let mut current = Some(scope.clone());
                while let Some(scope) = current {
                    values.extend(scope.vars.borrow().values().cloned());
                    current = scope.parent.clone();
                }
                values
            })
            .collect();
        let pending = self.pending.borrow();
        let footprint = Footprint::measure(
            self.globals
                .values()
                .chain(scopes.iter())
                .chain(pending.iter()),
        );

        if footprint.depth > MAX_DATA_DEPTH {
            return Err(Fault::memory_error(format!(
                "data nested more than {MAX_DATA_DEPTH} levels deep"
            )));
        }
        Ok(footprint.bytes)
    }

    /// Count `bytes` the snippet just allocated
    ///
    /// Once the running total passes the ceiling every live namespace is
    /// measured, and the total restarts from that measurement.
    pub(crate) fn charge(&self, bytes: u64) -> Result<(), Fault> {
        let total = self.charged.get().saturating_add(bytes);
        if total <= self.max_memory_bytes {
            self.charged.set(total);
            return Ok(());
        }

        let live = self.sweep_memory()?.saturating_add(bytes);
        if live > self.max_memory_bytes {
            return Err(self.memory_fault(live));
        }
        self.charged.set(live);
        Ok(())
    }

    /// Charge the parts of a just-built `value` that nothing else holds
    pub(crate) fn charge_fresh(&self, value: &Value) -> Result<(), Fault> {
        match Footprint::fresh(value) {
            0 => Ok(()),
            bytes => self.charge(bytes),
        }
    }

    /// Check and charge `extra` slots added to a container of `len`
    pub(crate) fn grow(&self, len: usize, extra: usize) -> Result<(), Fault> {
        self.ensure_len(len.saturating_add(extra))?;
        self.charge(slots(extra))
    }

    /// Check and charge the entries a dict gained going from `before` to `after`
    pub(crate) fn grow_entries(&self, before: usize, after: usize) -> Result<(), Fault> {
        if after <= before {
            return Ok(());
        }
        self.ensure_len(after.saturating_mul(2))?;
        self.charge(slots((after - before) * 2))
    }

    /// Run `f`; values passed to [`Interpreter::hold`] inside it stay
    /// visible to memory sweeps until it returns
    pub(crate) fn holding<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Fault>,
    ) -> Result<T, Fault> {
        let mark = self.pending.borrow().len();
        let result = f(self);
        self.pending.borrow_mut().truncate(mark);
        result
    }

    /// Keep `value` visible to memory sweeps until the enclosing
    /// [`Interpreter::holding`] returns
    pub(crate) fn hold(&self, value: &Value) {
        if matches!(
            value,
            Value::Str(_) | Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Function(_)
        ) {
            self.pending.borrow_mut().push(value.clone());
        }
    }

    /// Empty list that stays visible to memory sweeps while it is filled
    ///
    /// Only meaningful inside [`Interpreter::holding`].
    pub(crate) fn held_list(&self) -> Rc<RefCell<Vec<Value>>> {
        let items = Rc::new(RefCell::new(Vec::new()));
        self.pending.borrow_mut().push(Value::List(items.clone()));
        items
    }

    /// Refuse to build a value of `bytes` bytes if it exceeds the ceiling
    pub(crate) fn ensure_size(&self, bytes: u64) -> Result<(), Fault> {
        if bytes > self.max_memory_bytes {
            return Err(self.memory_fault(bytes));
        }
        Ok(())
    }

    /// `ensure_size` for a container of `len` slots
    pub(crate) fn ensure_len(&self, len: usize) -> Result<(), Fault> {
        self.ensure_size(slots(len))
    }

    fn memory_fault(&self, bytes: u64) -> Fault {
        Fault::memory_error(format!(
            "memory use of {} bytes exceeds the {} MB limit",
            bytes,
            self.max_memory_bytes / ExecutionLimits::MB
        ))
    }

    // === Names ===

    pub(crate) fn lookup(&self, name: &str) -> Result<Value, Fault> {
        if let Some(scope) = &self.scope
            && let Some(value) = scope.lookup(name)
        {
            return Ok(value);
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.builtins.get(name) {
            return Ok(value.clone());
        }
        Err(Fault::name_error(name))
    }

    pub(crate) fn assign_name(&mut self, name: &str, value: Value) {
        match &self.scope {
            Some(scope) => {
                scope.vars.borrow_mut().insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    // === Modules ===

    /// Resolve `import name`, enforcing the same allow-list the validator uses
    pub(crate) fn import_module(&mut self, name: &str) -> Result<Rc<value::Module>, Fault> {
        if !policy::module_allowed(name, self.level) {
            return Err(Fault::import_error(format!(
                "import of '{name}' is not allowed at {} security level",
                self.level
            )));
        }
        self.module(name)
    }

    /// Resolve `from module import name`
    pub(crate) fn import_from(&mut self, module: &str, name: &str) -> Result<Value, Fault> {
        if !policy::from_import_allowed(module, name, self.level) {
            return Err(Fault::import_error(format!(
                "import of '{module}.{name}' is not allowed at {} security level",
                self.level
            )));
        }
        let table = self.module(module)?;
        table.attrs.get(name).cloned().ok_or_else(|| {
            Fault::import_error(format!("cannot import name '{name}' from '{module}'"))
        })
    }

    /// Pre-bound module by dotted name, built on first use
    pub(crate) fn module(&mut self, name: &str) -> Result<Rc<value::Module>, Fault> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }

        let Some((&key, table)) = self.module_tables.get_key_value(name) else {
            return Err(Fault::import_error(format!("No module named '{name}'")));
        };
        let members = table.members.clone();

        let mut attrs = HashMap::new();
        for (member, binding) in &members {
            let value = match binding {
                Binding::Module(sub) => Value::Module(self.module(sub)?),
                other => self.bind(member, other),
            };
            attrs.insert(member.to_string(), value);
        }

        let module = Rc::new(value::Module {
            name: key.to_string(),
            attrs,
        });
        self.modules.insert(key, module.clone());
        Ok(module)
    }

    fn bind(&mut self, name: &'static str, binding: &Binding) -> Value {
        match binding {
            Binding::Function(func) => Value::native(name, *func),
            Binding::Exception(kind) => Value::ExceptionType(*kind),
            Binding::Float(f) => Value::Float(*f),
            Binding::Scratch => Value::Scratch,
            Binding::Module(sub) => match self.module(sub) {
                Ok(module) => Value::Module(module),
                Err(_) => Value::None,
            },
        }
    }

    // === Host services for native functions ===

    pub(crate) fn write_stdout(&self, text: &str) {
        output::lock(&self.stdout).write(text);
    }

    pub(crate) fn write_stderr(&self, text: &str) {
        output::lock(&self.stderr).write(text);
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn figures(&mut self) -> &mut Figures {
        &mut self.figures
    }

    pub(crate) fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    /// Write a file directly inside the scratch directory
    ///
    /// `name` must already be a sanitized plain file name.
    pub(crate) fn write_artifact(&mut self, name: &str, contents: &[u8]) -> Result<(), Fault> {
        if self.artifact_writes >= MAX_ARTIFACT_WRITES {
            return Err(Fault::new(
                ExcKind::RuntimeError,
                format!("too many files written (limit {MAX_ARTIFACT_WRITES})"),
            ));
        }
        self.ensure_size(contents.len() as u64)?;

        let path = self.scratch.join(name);
        std::fs::write(&path, contents).map_err(|err| {
            Fault::new(ExcKind::RuntimeError, format!("could not write '{name}': {err}"))
        })?;
        self.artifact_writes += 1;
        debug!(file = name, bytes = contents.len(), "artifact written");
        Ok(())
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        let mut roots: Vec<Value> = self.globals.drain().map(|(_, value)| value).collect();
        roots.append(self.pending.get_mut());
        let mut scopes = std::mem::take(&mut self.call_stack);
        scopes.extend(self.scope.take());
        value::dismantle(roots, scopes);
    }
}

/// Bytes taken by `len` value slots
pub(crate) fn slots(len: usize) -> u64 {
    (len as u64).saturating_mul(std::mem::size_of::<Value>() as u64)
}
