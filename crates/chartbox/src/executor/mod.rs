//! Bounded executor
//!
//! Runs one snippet end to end: static validation, a fresh scratch
//! directory, the capability environment, a worker thread under a
//! deadline, output capture and artifact collection. Every internal
//! failure becomes an [`ExecutionResult`]; only malformed limits are
//! reported as an error.

mod collector;
mod scratch;
mod watchdog;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub use collector::{Collected, collect, export};
pub use scratch::{SCRATCH_PREFIX, ScratchDir, ScratchError};
pub use watchdog::Watchdog;

use crate::config::Config;
use crate::environment::Environment;
use crate::runtime::fault::{ExcKind, Fault};
use crate::runtime::output::{self, OutputBuffer};
use crate::runtime::{Interpreter, RunContext, WORKER_STACK_SIZE};
use crate::types::{
    ExecutionLimits, ExecutionResult, ExecutionStatus, LimitsError, LimitsOverride, SecurityLevel,
};
use crate::validator;

/// Caller-supplied values bound as globals
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Grace period used by the free [`execute_code`] function
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Host-side settings for one invocation
struct Settings<'a> {
    level: SecurityLevel,
    limits: &'a ExecutionLimits,
    scratch_root: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    grace_period: Duration,
}

/// What the worker reports back
struct WorkerReport {
    outcome: Result<(), Failure>,
    memory_used: u64,
}

enum Failure {
    Fault(Fault),
    Panic(String),
}

/// Entry point bound to a [`Config`]
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: Config,
}

impl Sandbox {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Sandbox using the embedded default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `source` at the configured level and limits
    pub fn execute_code(
        &self,
        source: &str,
        context: Option<&Context>,
    ) -> Result<ExecutionResult, LimitsError> {
        self.execute_code_with(source, self.config.security_level, None, context)
    }

    /// Run `source` with an explicit level and per-request limit overrides
    pub fn execute_code_with(
        &self,
        source: &str,
        level: SecurityLevel,
        overrides: Option<&LimitsOverride>,
        context: Option<&Context>,
    ) -> Result<ExecutionResult, LimitsError> {
        let limits = self.config.effective_limits(overrides);
        let settings = Settings {
            level,
            limits: &limits,
            scratch_root: self.config.scratch_root.clone(),
            export_dir: self.config.export_dir.clone(),
            grace_period: self.config.grace_period(),
        };
        run(&settings, source, context)
    }

    /// [`Sandbox::execute_code`] on tokio's blocking pool
    pub async fn execute_code_async(
        &self,
        source: String,
        context: Option<Context>,
    ) -> Result<ExecutionResult, LimitsError> {
        let sandbox = self.clone();
        let joined = tokio::task::spawn_blocking(move || {
            sandbox.execute_code(&source, context.as_ref())
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "blocking execution task failed");
                let mut result = ExecutionResult::new(ExecutionStatus::RuntimeError);
                result.error = Some(format!("execution task failed: {err}"));
                Ok(result)
            }
        }
    }
}

/// Run `source` at `level` under `limits`
///
/// Scratch directories go to the system temp dir and nothing is exported.
pub fn execute_code(
    source: &str,
    level: SecurityLevel,
    limits: &ExecutionLimits,
    context: Option<&Context>,
) -> Result<ExecutionResult, LimitsError> {
    let settings = Settings {
        level,
        limits,
        scratch_root: None,
        export_dir: None,
        grace_period: DEFAULT_GRACE_PERIOD,
    };
    run(&settings, source, context)
}

#[instrument(skip_all, fields(id = %Uuid::new_v4(), level = %settings.level))]
fn run(
    settings: &Settings<'_>,
    source: &str,
    context: Option<&Context>,
) -> Result<ExecutionResult, LimitsError> {
    let limits = settings.limits;
    limits.validate()?;
    let started = Instant::now();

    let (finding, program) = validator::check(source, settings.level);
    let Some(program) = program else {
        let status = if finding.syntax_error {
            ExecutionStatus::ValidationError
        } else {
            ExecutionStatus::SecurityViolation
        };
        debug!(%status, "snippet rejected before execution");
        let mut result = ExecutionResult::rejected(status, finding.warnings);
        result.execution_time = started.elapsed().as_secs_f64();
        return Ok(result);
    };

    let scratch = match ScratchDir::create(settings.scratch_root.as_deref()) {
        Ok(scratch) => scratch,
        Err(err) => {
            warn!(error = %err, "scratch directory unavailable");
            let mut result = ExecutionResult::new(ExecutionStatus::RuntimeError);
            result.error = Some(err.to_string());
            result.execution_time = started.elapsed().as_secs_f64();
            return Ok(result);
        }
    };

    let mut env = Environment::build(settings.level, scratch.path());
    if let Some(context) = context {
        env = env.with_context(context);
    }
    let mut warnings = env.warnings().to_vec();

    let stdout = OutputBuffer::shared(limits.max_output_lines);
    let stderr = OutputBuffer::shared(limits.max_output_lines);
    let watchdog = Watchdog::new();
    let run_context = RunContext {
        interrupt: watchdog.flag(),
        stdout: stdout.clone(),
        stderr: stderr.clone(),
        max_memory_bytes: limits.memory_bytes(),
    };

    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("chartbox-worker".to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            let mut interp = Interpreter::new(env, run_context);
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| interp.run(&program))) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(fault)) => Err(Failure::Fault(fault)),
                Err(payload) => Err(Failure::Panic(panic_message(payload.as_ref()))),
            };
            let memory_used = interp.memory_used();
            // The caller may have given up already
            let _ = tx.send(WorkerReport { outcome, memory_used });
        });

    let worker = match spawned {
        Ok(worker) => worker,
        Err(err) => {
            warn!(error = %err, "worker thread could not be spawned");
            let mut result = ExecutionResult::new(ExecutionStatus::RuntimeError);
            result.error = Some(format!("failed to start worker: {err}"));
            result.execution_time = started.elapsed().as_secs_f64();
            close(scratch);
            return Ok(result);
        }
    };
    debug!("worker spawned");

    let mut timed_out = false;
    let report = match rx.recv_timeout(limits.deadline()) {
        Ok(report) => {
            let _ = worker.join();
            Some(report)
        }
        Err(RecvTimeoutError::Timeout) => {
            timed_out = true;
            watchdog.fire();
            warn!(limit = limits.max_execution_time, "deadline exceeded");
            rx.recv_timeout(settings.grace_period).ok()
        }
        Err(RecvTimeoutError::Disconnected) => None,
    };
    let execution_time = started.elapsed().as_secs_f64();

    let (status, error, memory_used) = if timed_out {
        (
            ExecutionStatus::Timeout,
            Some(deadline_message(limits)),
            report.map_or(0, |r| r.memory_used),
        )
    } else {
        match report {
            Some(WorkerReport { outcome: Ok(()), memory_used }) => {
                (ExecutionStatus::Success, None, memory_used)
            }
            Some(WorkerReport { outcome: Err(failure), memory_used }) => {
                let (status, error) = classify(&failure, limits);
                (status, Some(error), memory_used)
            }
            None => (
                ExecutionStatus::RuntimeError,
                Some("worker exited without reporting a result".to_string()),
                0,
            ),
        }
    };
    drop(watchdog);

    let mut result = ExecutionResult::new(status);
    result.error = error;
    result.execution_time = execution_time;
    result.memory_used = memory_used;

    {
        let stdout = output::lock(&stdout);
        result.stdout = stdout.text().to_string();
        if stdout.truncated() {
            warnings.push(format!(
                "stdout exceeded {} lines and was truncated",
                limits.max_output_lines
            ));
        }
    }
    {
        let stderr = output::lock(&stderr);
        result.stderr = stderr.text().to_string();
        if stderr.truncated() {
            warnings.push(format!(
                "stderr exceeded {} lines and was truncated",
                limits.max_output_lines
            ));
        }
    }

    let collected = collect(scratch.path(), limits);
    warnings.extend(collected.warnings);
    if let Some(export_dir) = &settings.export_dir {
        warnings.extend(export(scratch.path(), &collected.files, export_dir));
    }
    result.generated_files = collected.files;
    result.security_warnings = warnings;
    close(scratch);

    debug!(
        status = %result.status,
        time = result.execution_time,
        files = result.generated_files.len(),
        "execution complete"
    );
    Ok(result)
}

/// Status and short diagnostic for a failed run
fn classify(failure: &Failure, limits: &ExecutionLimits) -> (ExecutionStatus, String) {
    match failure {
        Failure::Fault(Fault::Interrupted) => (ExecutionStatus::Timeout, deadline_message(limits)),
        Failure::Fault(Fault::Raised(exc)) if ExcKind::ImportError.catches(exc.kind) => {
            (ExecutionStatus::ImportError, exc.to_string())
        }
        Failure::Fault(Fault::Raised(exc)) => (ExecutionStatus::RuntimeError, exc.to_string()),
        Failure::Panic(message) => (
            ExecutionStatus::RuntimeError,
            format!("InternalError: {message}"),
        ),
    }
}

fn deadline_message(limits: &ExecutionLimits) -> String {
    format!("execution exceeded the {}s time limit", limits.max_execution_time)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

fn close(scratch: ScratchDir) {
    if let Err(err) = scratch.close() {
        warn!(error = %err, "scratch directory cleanup failed");
    }
}
