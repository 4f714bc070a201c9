//! Wire types for the HTTP API and the WebSocket stream.

use polyrun_core::{ExecutionOutcome, Language, OutputEvent, ToolchainDescriptor};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/execute`. Fields are optional so missing ones can be
/// reported with a stable message instead of a deserializer error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub language: Option<String>,
    pub code: Option<String>,
}

/// Response of `POST /api/execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
}

impl From<&ExecutionOutcome> for ExecuteResponse {
    fn from(outcome: &ExecutionOutcome) -> Self {
        Self {
            success: outcome.success,
            output: outcome.output().map(str::to_string),
            error: outcome.error(),
            execution_time: Some(outcome.execution_time_ms),
        }
    }
}

/// Messages sent from client to server over `/ws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Build and run a snippet.
    Execute { language: String, code: String },
}

/// Messages sent from server to client over `/ws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Execution accepted.
    Start,

    /// A chunk of program stdout.
    Output { data: String },

    /// A chunk of program stderr, or the terminal failure message.
    Error { message: String },

    /// Execution finished.
    Complete {
        #[serde(rename = "executionTime")]
        execution_time: u64,
        success: bool,
        #[serde(rename = "exitCode", default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

impl From<OutputEvent> for ServerMessage {
    fn from(event: OutputEvent) -> Self {
        match event {
            OutputEvent::Start => ServerMessage::Start,
            OutputEvent::Stdout(data) => ServerMessage::Output { data },
            OutputEvent::Stderr(message) | OutputEvent::Error(message) => {
                ServerMessage::Error { message }
            }
            OutputEvent::Complete(outcome) => ServerMessage::Complete {
                execution_time: outcome.execution_time_ms,
                success: outcome.success,
                exit_code: outcome.exit_code,
            },
        }
    }
}

/// Entry of `GET /api/languages`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageInfo {
    pub name: &'static str,
    #[serde(flatten)]
    pub toolchain: ToolchainDescriptor,
    pub available: bool,
}

impl From<ToolchainDescriptor> for LanguageInfo {
    fn from(toolchain: ToolchainDescriptor) -> Self {
        Self {
            name: toolchain.language.display_name(),
            available: toolchain.is_available(),
            toolchain,
        }
    }
}

/// A language/code pair: template bodies and shared snippets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub language: Language,
    pub code: String,
}

/// Body of `POST /api/share`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareRequest {
    pub language: Option<String>,
    pub code: Option<String>,
}

/// Response of `POST /api/share`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub share_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyrun_core::FailureKind;

    #[test]
    fn test_response_omits_missing_fields() {
        let response = ExecuteResponse {
            success: false,
            output: None,
            error: Some("Language and code are required".to_string()),
            execution_time: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "Language and code are required" })
        );
    }

    #[test]
    fn test_response_from_outcome() {
        let outcome = ExecutionOutcome {
            success: true,
            stdout: "hi\n".to_string(),
            execution_time_ms: 42,
            program_started: true,
            exit_code: Some(0),
            ..Default::default()
        };
        let json = serde_json::to_value(ExecuteResponse::from(&outcome)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": true, "output": "hi\n", "executionTime": 42 })
        );
    }

    #[test]
    fn test_server_message_wire_format() {
        let complete = ServerMessage::from(OutputEvent::Complete(ExecutionOutcome {
            execution_time_ms: 7,
            failure: Some(FailureKind::RuntimeFailure),
            exit_code: Some(1),
            ..Default::default()
        }));
        assert_eq!(
            serde_json::to_value(&complete).unwrap(),
            serde_json::json!({ "type": "complete", "executionTime": 7, "success": false, "exitCode": 1 })
        );

        let output = ServerMessage::from(OutputEvent::Stdout("x".to_string()));
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            serde_json::json!({ "type": "output", "data": "x" })
        );

        let stderr = ServerMessage::from(OutputEvent::Stderr("oops".to_string()));
        assert_eq!(
            serde_json::to_value(&stderr).unwrap(),
            serde_json::json!({ "type": "error", "message": "oops" })
        );
    }

    #[test]
    fn test_client_message_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"execute","language":"python","code":"print(1)"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Execute {
                language: "python".to_string(),
                code: "print(1)".to_string()
            }
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"execute"}"#).is_err());
    }
}
