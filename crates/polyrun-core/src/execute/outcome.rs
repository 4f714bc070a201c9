use serde::Serialize;

use super::FailureKind;

/// The normalized result of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Program stdout. Empty unless the program was started.
    pub stdout: String,
    /// Program stderr. Compiler diagnostics go to `message` instead.
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    pub failure: Option<FailureKind>,
    /// Terminal human-readable message for failures.
    pub message: Option<String>,
    pub truncated: bool,
    pub program_started: bool,
}

impl ExecutionOutcome {
    /// A failure that never reached the user program.
    pub(crate) fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(kind),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Program output, present only when the program was started.
    pub fn output(&self) -> Option<&str> {
        self.program_started.then_some(self.stdout.as_str())
    }

    /// Everything the caller should see as an error: program stderr followed
    /// by the terminal message.
    pub fn error(&self) -> Option<String> {
        let terminal = self.terminal_message();
        if self.stderr.is_empty() && terminal.is_none() {
            return None;
        }
        let mut error = self.stderr.clone();
        if let Some(terminal) = terminal {
            error.push_str(&terminal);
        }
        Some(error)
    }

    /// The terminal message as it is appended after stderr.
    ///
    /// A newline separates it from stderr that does not already end in one,
    /// so concatenating the streamed stderr chunks with this value yields
    /// exactly [`error`](Self::error).
    pub fn terminal_message(&self) -> Option<String> {
        let message = self.message.as_deref().filter(|m| !m.is_empty())?;
        if self.stderr.is_empty() || self.stderr.ends_with('\n') {
            Some(message.to_string())
        } else {
            Some(format!("\n{message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_requires_program_start() {
        let mut outcome = ExecutionOutcome::failed(FailureKind::CompileFailure, "main.c:1: error");
        assert_eq!(outcome.output(), None);
        assert_eq!(outcome.error().as_deref(), Some("main.c:1: error"));

        outcome.program_started = true;
        assert_eq!(outcome.output(), Some(""));
    }

    #[test]
    fn test_error_concatenation() {
        let outcome = ExecutionOutcome {
            stderr: "partial".to_string(),
            message: Some("Error: Execution timed out after 100 ms".to_string()),
            program_started: true,
            ..Default::default()
        };
        assert_eq!(
            outcome.error().as_deref(),
            Some("partial\nError: Execution timed out after 100 ms")
        );

        let clean = ExecutionOutcome {
            success: true,
            program_started: true,
            stdout: "hi\n".to_string(),
            ..Default::default()
        };
        assert_eq!(clean.error(), None);
        assert_eq!(clean.terminal_message(), None);
    }

    #[test]
    fn test_stderr_only_error() {
        let outcome = ExecutionOutcome {
            stderr: "Traceback...\n".to_string(),
            failure: Some(FailureKind::RuntimeFailure),
            program_started: true,
            ..Default::default()
        };
        assert_eq!(outcome.error().as_deref(), Some("Traceback...\n"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let outcome = ExecutionOutcome::failed(FailureKind::Timeout, "late");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["failure"], "timeout");
        assert_eq!(json["programStarted"], false);
        assert!(json.get("executionTimeMs").is_some());
    }
}
