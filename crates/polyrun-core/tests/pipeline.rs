//! End-to-end tests for the execution pipeline.
//!
//! Tests that need a host toolchain return early when it is not installed.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use polyrun_core::{
    ExecutionConfig, ExecutionOutcome, ExecutionRequest, FailureKind, Language, Orchestrator,
    OutputEvent, ToolchainPaths, Toolchains,
};
use tempfile::TempDir;

fn orchestrator(root: &Path, timeout: Duration) -> Orchestrator {
    Orchestrator::new(
        ExecutionConfig::default()
            .with_workspace_root(root)
            .with_timeout(timeout)
            .with_sandbox_identity(None),
    )
}

fn available(language: Language) -> bool {
    let toolchains = Toolchains::new(&ToolchainPaths::detect());
    let ok = toolchains.get(language).descriptor().is_available();
    if !ok {
        eprintln!("skipping: no {} toolchain on this host", language.display_name());
    }
    ok
}

fn assert_no_workspaces(root: &Path) {
    if root.exists() {
        let leftover: Vec<_> = std::fs::read_dir(root).unwrap().collect();
        assert!(leftover.is_empty(), "workspaces left behind: {leftover:?}");
    }
}

async fn collect(orch: &Arc<Orchestrator>, request: ExecutionRequest) -> Vec<OutputEvent> {
    let mut rx = orch.stream(request);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn complete_of(events: &[OutputEvent]) -> &ExecutionOutcome {
    match events.last() {
        Some(OutputEvent::Complete(outcome)) => outcome,
        other => panic!("stream did not end with Complete: {other:?}"),
    }
}

#[tokio::test]
async fn test_python_hello_world() {
    if !available(Language::Python) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));

    let outcome = orch
        .execute(&ExecutionRequest::new(Language::Python, "print('Hello, World!')"))
        .await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.output(), Some("Hello, World!\n"));
    assert_eq!(outcome.error(), None);
    assert_eq!(outcome.exit_code, Some(0));
    assert_no_workspaces(temp.path());
}

#[tokio::test]
async fn test_same_request_twice_is_independent() {
    if !available(Language::Python) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));
    let request = ExecutionRequest::new(Language::Python, "print(\"hi\")");

    let first = orch.execute(&request).await;
    let second = orch.execute(&request).await;

    assert_eq!(first.output(), Some("hi\n"));
    assert_eq!(first.output(), second.output());
    assert_eq!(orch.spawn_count(), 2);
    assert_no_workspaces(temp.path());
}

#[tokio::test]
async fn test_rejections_never_spawn() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));

    let filler = format!("print(1)\n{}", "# filler\n".repeat(11 * 1024 / 9 + 1));
    let cases = [
        (Language::Python, "".to_string(), FailureKind::EmptyCode),
        (Language::Cpp, " \n\t".to_string(), FailureKind::EmptyCode),
        (
            Language::Python,
            "import os\nprint(1)".to_string(),
            FailureKind::RestrictedConstruct,
        ),
        (Language::Python, filler, FailureKind::PayloadTooLarge),
        (
            Language::C,
            "int main(){return 0;}".to_string(),
            FailureKind::MissingIncludeOrClass,
        ),
        (
            Language::Java,
            "public class Main { }".to_string(),
            FailureKind::MissingEntryPoint,
        ),
    ];

    for (language, source, kind) in cases {
        let outcome = orch.execute(&ExecutionRequest::new(language, source)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(kind));
        assert!(outcome.error().is_some());
        assert_eq!(outcome.output(), None);
    }

    assert_eq!(orch.spawn_count(), 0);
    assert!(!temp.path().exists() || std::fs::read_dir(temp.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_c_compile_error_reports_compiler_stderr() {
    if !available(Language::C) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));
    let source = "#include <stdio.h>\nint main() { undefined_call(; return 0; }\n";

    let outcome = orch.execute(&ExecutionRequest::new(Language::C, source)).await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::CompileFailure));
    assert_eq!(outcome.output(), None);
    let error = outcome.error().unwrap();
    assert!(error.contains("error"), "{error}");
    assert_eq!(Some(error), outcome.message);
    assert_no_workspaces(temp.path());
}

#[tokio::test]
async fn test_diagnostics_do_not_expose_workspace_path() {
    if !available(Language::C) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));
    let source = "#include <stdio.h>\nint main() { return nope; }\n";

    let outcome = orch.execute(&ExecutionRequest::new(Language::C, source)).await;

    let error = outcome.error().unwrap();
    assert!(error.contains("main.c:"), "{error}");
    assert!(!error.contains(&*temp.path().to_string_lossy()), "{error}");
}

#[tokio::test]
async fn test_python_traceback_does_not_expose_workspace_path() {
    if !available(Language::Python) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));

    let outcome = orch
        .execute(&ExecutionRequest::new(Language::Python, "x = 1\nraise ValueError('boom')\n"))
        .await;

    assert_eq!(outcome.failure, Some(FailureKind::RuntimeFailure));
    let error = outcome.error().unwrap();
    assert!(error.contains("line 2"), "{error}");
    assert!(!error.contains(&*temp.path().to_string_lossy()), "{error}");
}

#[tokio::test]
async fn test_children_run_as_sandbox_identity_when_root() {
    let config = ExecutionConfig::default();
    if config.effective_identity().is_none() {
        eprintln!("skipping: privilege drop needs root");
        return;
    }
    if !available(Language::C) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = Orchestrator::new(
        config
            .with_workspace_root(temp.path())
            .with_timeout(Duration::from_secs(10)),
    );
    let source = "#include <stdio.h>\n#include <unistd.h>\nint main() { printf(\"%d:%d\\n\", (int)getuid(), (int)getgid()); return 0; }\n";

    let outcome = orch.execute(&ExecutionRequest::new(Language::C, source)).await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.output(), Some("65534:65534\n"));
    assert_no_workspaces(temp.path());
}

#[tokio::test]
async fn test_c_program_runs() {
    if !available(Language::C) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));
    let source = polyrun_core::templates::template(Language::C);

    let outcome = orch.execute(&ExecutionRequest::new(Language::C, source)).await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.output(), Some("Hello, World!\n"));
    assert_eq!(orch.spawn_count(), 2);
}

#[tokio::test]
async fn test_cpp_nonzero_exit_is_runtime_failure() {
    if !available(Language::Cpp) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(10));
    let source = "#include <iostream>\nint main() { std::cout << \"partial\" << std::endl; return 3; }";

    let outcome = orch.execute(&ExecutionRequest::new(Language::Cpp, source)).await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::RuntimeFailure));
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.output(), Some("partial\n"));
    assert_eq!(outcome.error().as_deref(), Some("Execution failed"));
}

#[tokio::test]
async fn test_java_hello() {
    if !available(Language::Java) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_secs(30));
    let source =
        "public class Main { public static void main(String[] a){ System.out.println(\"hi\"); } }";

    let outcome = orch.execute(&ExecutionRequest::new(Language::Java, source)).await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.output(), Some("hi\n"));
    assert_no_workspaces(temp.path());
}

#[tokio::test]
async fn test_timeout_terminates_program() {
    if !available(Language::Python) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(temp.path(), Duration::from_millis(1000));

    let start = Instant::now();
    let outcome = orch
        .execute(&ExecutionRequest::new(
            Language::Python,
            "print('tick')\nwhile True:\n    pass\n",
        ))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::Timeout));
    assert_eq!(outcome.output(), Some("tick\n"));
    assert!(outcome.error().unwrap().contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(outcome.execution_time_ms >= 1000);
    assert_no_workspaces(temp.path());
}

#[tokio::test]
async fn test_streaming_matches_buffered() {
    if !available(Language::Python) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = Arc::new(orchestrator(temp.path(), Duration::from_secs(10)));
    let source = "print('a')\nprint('b')\nraise ValueError('boom')\n";

    let events = collect(&orch, ExecutionRequest::new(Language::Python, source)).await;
    assert_eq!(events.first(), Some(&OutputEvent::Start));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let streamed = complete_of(&events);
    let mut stdout = String::new();
    let mut errors = String::new();
    for event in &events {
        match event {
            OutputEvent::Stdout(chunk) => stdout.push_str(chunk),
            OutputEvent::Stderr(chunk) | OutputEvent::Error(chunk) => errors.push_str(chunk),
            _ => {}
        }
    }

    assert_eq!(Some(stdout.as_str()), streamed.output());
    assert_eq!(Some(errors), streamed.error());
    assert_eq!(streamed.failure, Some(FailureKind::RuntimeFailure));

    let buffered = orch
        .execute(&ExecutionRequest::new(Language::Python, source))
        .await;
    assert_eq!(buffered.output(), streamed.output());
    assert!(buffered.error().unwrap().contains("ValueError: boom"));
    assert_no_workspaces(temp.path());
}

#[tokio::test]
async fn test_streamed_compile_error_is_single_event() {
    if !available(Language::C) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = Arc::new(orchestrator(temp.path(), Duration::from_secs(10)));
    let source = "#include <stdio.h>\nint main() { return nope; }\n";

    let events = collect(&orch, ExecutionRequest::new(Language::C, source)).await;

    assert_eq!(events.len(), 3, "{events:?}");
    assert_eq!(events[0], OutputEvent::Start);
    assert!(matches!(&events[1], OutputEvent::Error(msg) if msg.contains("nope")));
    assert_eq!(complete_of(&events).failure, Some(FailureKind::CompileFailure));
}

#[tokio::test]
async fn test_concurrent_requests_use_separate_workspaces() {
    if !available(Language::Python) {
        return;
    }
    let temp = TempDir::new().unwrap();
    let orch = Arc::new(orchestrator(temp.path(), Duration::from_secs(20)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                let source = format!("print({i} * {i})");
                orch.execute(&ExecutionRequest::new(Language::Python, source))
                    .await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap();
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.output(), Some(format!("{}\n", i * i).as_str()));
    }
    assert_eq!(orch.spawn_count(), 8);
    assert_no_workspaces(temp.path());
}
