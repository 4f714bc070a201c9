//! Run command implementation for polyrun CLI.
//!
//! Builds and runs a single source file, streaming its output.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use polyrun_core::{ExecutionConfig, ExecutionOutcome, ExecutionRequest, Language, Orchestrator, OutputEvent};
use polyrun_server::protocol::ExecuteResponse;

use crate::colors;

/// Run a source file. Returns whether the program succeeded.
pub async fn execute(
    file: &Path,
    language: Option<&str>,
    config: ExecutionConfig,
    json: bool,
) -> anyhow::Result<bool> {
    let language = resolve_language(file, language)?;
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let orchestrator = Arc::new(Orchestrator::new(config));
    let request = ExecutionRequest::new(language, source);

    if json {
        let outcome = orchestrator.execute(&request).await;
        let response = ExecuteResponse::from(&outcome);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(outcome.success);
    }

    let mut events = orchestrator.stream(request);
    let mut success = false;
    while let Some(event) = events.recv().await {
        match event {
            OutputEvent::Start => {
                eprintln!(
                    "{}▶ Running{} {} {}({}){}",
                    colors::BOLD,
                    colors::RESET,
                    file.display(),
                    colors::DIM,
                    language.display_name(),
                    colors::RESET
                );
            }
            OutputEvent::Stdout(chunk) => print!("{chunk}"),
            OutputEvent::Stderr(chunk) => eprint!("{chunk}"),
            OutputEvent::Error(message) => {
                eprintln!("{}{}{}", colors::RED, message.trim_end(), colors::RESET);
            }
            OutputEvent::Complete(outcome) => {
                colors::flush();
                print_summary(&outcome);
                success = outcome.success;
            }
        }
        colors::flush();
    }

    Ok(success)
}

fn resolve_language(file: &Path, explicit: Option<&str>) -> anyhow::Result<Language> {
    match explicit {
        Some(name) => Ok(name.parse()?),
        None => Language::from_path(file).with_context(|| {
            format!(
                "Cannot infer language from {}; pass --language",
                file.display()
            )
        }),
    }
}

fn print_summary(outcome: &ExecutionOutcome) {
    let (color, label) = if outcome.success {
        (colors::GREEN, "Completed")
    } else {
        (colors::RED, "Failed")
    };

    let mut details = format!("{} ms", outcome.execution_time_ms);
    if let Some(code) = outcome.exit_code {
        details.push_str(&format!(", exit code {code}"));
    }
    if outcome.truncated {
        details.push_str(", output truncated");
    }

    eprintln!("{}{}{} in {}", color, label, colors::RESET, details);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_language() {
        assert_eq!(
            resolve_language(Path::new("a.cpp"), None).unwrap(),
            Language::Cpp
        );
        assert_eq!(
            resolve_language(Path::new("script"), Some("py")).unwrap(),
            Language::Python
        );
        assert!(resolve_language(Path::new("notes.txt"), None).is_err());
        assert!(resolve_language(Path::new("a.py"), Some("ruby")).is_err());
    }
}
