use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::event::OutputEvent;
use super::outcome::ExecutionOutcome;
use super::{ExecutionRequest, FailureKind};
use crate::config::{ExecutionConfig, SandboxIdentity};
use crate::error::Error;
use crate::process::{ProcessReport, ProcessRunner, ProcessStatus};
use crate::toolchain::{CompileResult, Toolchain, ToolchainAdapter, Toolchains};
use crate::validate::{Rejection, Validator};
use crate::workspace::Workspace;

/// Message surfaced for failures of the engine itself.
pub(crate) const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Drives requests through validate, workspace, compile, run and cleanup.
///
/// Holds only read-only configuration plus the runner's spawn counter, so a
/// single instance serves any number of concurrent requests.
#[derive(Debug)]
pub struct Orchestrator {
    config: ExecutionConfig,
    validator: Validator,
    toolchains: Toolchains,
    runner: ProcessRunner,
    identity: Option<SandboxIdentity>,
}

impl Orchestrator {
    pub fn new(config: ExecutionConfig) -> Self {
        let identity = config.effective_identity();
        if let Some(identity) = identity {
            tracing::info!("Child processes run as uid={} gid={}", identity.uid, identity.gid);
        }

        Self {
            validator: Validator::new(config.max_source_bytes),
            toolchains: Toolchains::new(&config.toolchains),
            runner: ProcessRunner::new(config.timeout, config.max_output_bytes),
            identity,
            config,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn toolchains(&self) -> &Toolchains {
        &self.toolchains
    }

    /// Number of child processes spawned so far, compilers included.
    pub fn spawn_count(&self) -> u64 {
        self.runner.spawn_count()
    }

    /// Run a request and return the buffered outcome.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        self.run_request(request, None).await
    }

    /// Run a request, emitting events to `events` as it progresses.
    ///
    /// Emits `Start`, the program's output chunks, at most one `Error` with
    /// the terminal message, then `Complete`. A dropped receiver does not
    /// stop the run.
    pub async fn execute_streaming(
        &self,
        request: &ExecutionRequest,
        events: &mpsc::UnboundedSender<OutputEvent>,
    ) -> ExecutionOutcome {
        let _ = events.send(OutputEvent::Start);
        let outcome = self.run_request(request, Some(events)).await;

        if let Some(message) = outcome.terminal_message() {
            let _ = events.send(OutputEvent::Error(message));
        }
        let _ = events.send(OutputEvent::Complete(outcome.clone()));
        outcome
    }

    /// Run a request on a background task and return its event stream.
    pub fn stream(self: &Arc<Self>, request: ExecutionRequest) -> mpsc::UnboundedReceiver<OutputEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.execute_streaming(&request, &tx).await;
        });
        rx
    }

    async fn run_request(
        &self,
        request: &ExecutionRequest,
        events: Option<&mpsc::UnboundedSender<OutputEvent>>,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let language = request.language;
        tracing::debug!(request = %request_id, %language, "Validating");

        let adapter = self.toolchains.get(language);
        let mut outcome = match self.precheck(adapter, &request.source) {
            Err(rejection) => {
                tracing::debug!(request = %request_id, kind = ?rejection.kind, "Rejected");
                ExecutionOutcome::failed(rejection.kind, rejection.message)
            }
            Ok(()) => self.run_in_workspace(request_id, adapter, request, events).await,
        };

        outcome.execution_time_ms = elapsed_ms(started.elapsed());
        tracing::debug!(
            request = %request_id,
            success = outcome.success,
            kind = ?outcome.failure,
            "Done in {} ms",
            outcome.execution_time_ms
        );
        outcome
    }

    fn precheck(&self, adapter: &dyn ToolchainAdapter, source: &str) -> Result<(), Rejection> {
        self.validator.validate(adapter.language(), source)?;
        adapter.precheck(source)
    }

    async fn run_in_workspace(
        &self,
        request_id: Uuid,
        adapter: &dyn ToolchainAdapter,
        request: &ExecutionRequest,
        events: Option<&mpsc::UnboundedSender<OutputEvent>>,
    ) -> ExecutionOutcome {
        tracing::debug!(request = %request_id, "PreparingWorkspace");
        let mut workspace = match Workspace::create(&self.config.workspace_root, self.identity) {
            Ok(workspace) => workspace,
            Err(e) => return internal_error(request_id, &e),
        };

        let outcome = self.build_and_run(request_id, adapter, request, &mut workspace, events).await;

        tracing::debug!(request = %request_id, workspace = %workspace.id(), "CleaningUp");
        workspace.destroy();
        outcome
    }

    async fn build_and_run(
        &self,
        request_id: Uuid,
        adapter: &dyn ToolchainAdapter,
        request: &ExecutionRequest,
        workspace: &mut Workspace,
        events: Option<&mpsc::UnboundedSender<OutputEvent>>,
    ) -> ExecutionOutcome {
        tracing::debug!(request = %request_id, "WritingSource");
        let file_name = adapter.source_file_name(&request.source);
        if let Err(e) = workspace.write_source(&file_name, &request.source) {
            return internal_error(request_id, &e);
        }
        if let Some(artifact) = adapter.artifact_name(&request.source) {
            workspace.reserve_artifact(&artifact);
        }

        let toolchain = Toolchain::new(adapter, &self.runner, self.identity);

        match toolchain.prepare(workspace).await {
            CompileResult::NotRequired => {}
            CompileResult::Compiled(report) => {
                tracing::debug!(request = %request_id, "Compiled in {:?}", report.elapsed);
            }
            CompileResult::Failed(report) => {
                tracing::debug!(request = %request_id, status = ?report.status, "CompileFailed");
                return self.compile_failure(request_id, report);
            }
        }

        tracing::debug!(request = %request_id, "Running");
        let report = toolchain.execute(workspace, events).await;
        self.run_outcome(request_id, adapter, report)
    }

    fn compile_failure(&self, request_id: Uuid, report: ProcessReport) -> ExecutionOutcome {
        let (kind, message) = match report.status {
            ProcessStatus::TimedOut => (
                FailureKind::Timeout,
                format!("Error: Compilation timed out after {} ms", self.timeout_ms()),
            ),
            ProcessStatus::LaunchFailed(reason) => {
                tracing::warn!(request = %request_id, "Compiler unavailable: {}", reason);
                (FailureKind::LaunchFailure, "Error: Compiler is not available".to_string())
            }
            ProcessStatus::Lost(reason) => {
                tracing::error!(request = %request_id, "Compiler lost: {}", reason);
                (FailureKind::InternalError, INTERNAL_ERROR_MESSAGE.to_string())
            }
            ProcessStatus::Exited(_) | ProcessStatus::Signaled(_) => {
                let message = if !report.stderr.trim().is_empty() {
                    report.stderr
                } else if !report.stdout.trim().is_empty() {
                    report.stdout
                } else {
                    "Compilation failed".to_string()
                };
                (FailureKind::CompileFailure, message)
            }
        };
        ExecutionOutcome::failed(kind, message)
    }

    fn run_outcome(
        &self,
        request_id: Uuid,
        adapter: &dyn ToolchainAdapter,
        report: ProcessReport,
    ) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome {
            exit_code: report.exit_code(),
            truncated: report.truncated,
            program_started: true,
            ..Default::default()
        };

        match &report.status {
            ProcessStatus::Exited(0) => {
                outcome.success = true;
            }
            ProcessStatus::Exited(_) | ProcessStatus::Signaled(_) => {
                outcome.failure = Some(FailureKind::RuntimeFailure);
                if report.stderr.is_empty() {
                    outcome.message = Some("Execution failed".to_string());
                }
            }
            ProcessStatus::TimedOut => {
                tracing::debug!(request = %request_id, "Timeout");
                outcome.failure = Some(FailureKind::Timeout);
                outcome.message = Some(format!(
                    "Error: Execution timed out after {} ms",
                    self.timeout_ms()
                ));
            }
            ProcessStatus::LaunchFailed(reason) => {
                tracing::warn!(request = %request_id, "Runtime unavailable: {}", reason);
                outcome.program_started = false;
                outcome.failure = Some(FailureKind::LaunchFailure);
                outcome.message = Some(format!(
                    "Error: {} runtime is not available",
                    adapter.language().display_name()
                ));
            }
            ProcessStatus::Lost(reason) => {
                tracing::error!(request = %request_id, "Program lost: {}", reason);
                outcome.failure = Some(FailureKind::InternalError);
                outcome.message = Some(INTERNAL_ERROR_MESSAGE.to_string());
            }
        }

        outcome.stdout = report.stdout;
        outcome.stderr = report.stderr;
        outcome
    }

    fn timeout_ms(&self) -> u128 {
        self.config.timeout.as_millis()
    }
}

fn internal_error(request_id: Uuid, error: &Error) -> ExecutionOutcome {
    tracing::error!(request = %request_id, "Internal error: {}", error);
    ExecutionOutcome::failed(FailureKind::InternalError, INTERNAL_ERROR_MESSAGE)
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
