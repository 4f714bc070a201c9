use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{CommandLine, Stage, ToolchainAdapter, ToolchainDescriptor, workspace_file};
use crate::execute::FailureKind;
use crate::language::Language;
use crate::process::ResourceLimits;
use crate::validate::Rejection;
use crate::workspace::Workspace;

/// Entry class when no public class is declared.
const DEFAULT_CLASS: &str = "Main";

static CLASS_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(class|interface|enum)\b").expect("class pattern must compile"));

static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bpublic\s+(?:(?:final|abstract|static)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("public class pattern must compile")
});

/// JVM flags for running tiny programs quickly with a bounded heap.
const JVM_FLAGS: &[&str] = &[
    "-Xmx256m",
    "-Xss8m",
    "-XX:+UseSerialGC",
    "-XX:TieredStopAtLevel=1",
    "-XX:-UsePerfData",
];

/// javac + java, classes compiled into the workspace.
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    compiler: PathBuf,
    runtime: PathBuf,
}

impl JavaToolchain {
    pub fn new(compiler: PathBuf, runtime: PathBuf) -> Self {
        Self { compiler, runtime }
    }

    /// Name of the class `java` is launched with.
    pub fn entry_class(source: &str) -> &str {
        PUBLIC_CLASS
            .captures(source)
            .and_then(|c| c.get(1))
            .map_or(DEFAULT_CLASS, |m| m.as_str())
    }
}

impl ToolchainAdapter for JavaToolchain {
    fn language(&self) -> Language {
        Language::Java
    }

    fn descriptor(&self) -> ToolchainDescriptor {
        ToolchainDescriptor {
            language: Language::Java,
            source_extension: "java",
            compile_required: true,
            compiler: Some(self.compiler.clone()),
            runtime: Some(self.runtime.clone()),
        }
    }

    fn precheck(&self, source: &str) -> Result<(), Rejection> {
        if !CLASS_DECL.is_match(source) {
            return Err(Rejection::new(
                FailureKind::MissingIncludeOrClass,
                "Compilation Error: class, interface, or enum expected",
            ));
        }
        if !source.contains("public static void main") {
            return Err(Rejection::new(
                FailureKind::MissingEntryPoint,
                "Error: Main method not found in class Main\nPlease define the main method as:\n   public static void main(String[] args)",
            ));
        }
        Ok(())
    }

    fn source_file_name(&self, source: &str) -> String {
        // javac requires a public class to live in a file of the same name.
        format!("{}.java", Self::entry_class(source))
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<CommandLine> {
        let default = format!("{DEFAULT_CLASS}.java");
        Some(
            CommandLine::new(&self.compiler)
                .args(["-J-XX:-UsePerfData", "-encoding", "UTF-8", "-d", "."])
                .arg(workspace_file(workspace.source_path(), &default)),
        )
    }

    fn run_command(&self, workspace: &Workspace) -> CommandLine {
        let class = workspace
            .source_path()
            .and_then(Path::file_stem)
            .and_then(|s| s.to_str())
            .unwrap_or(DEFAULT_CLASS);

        CommandLine::new(&self.runtime)
            .args(JVM_FLAGS.iter().copied())
            .args(["-cp", "."])
            .arg(class)
    }

    fn limits(&self, _stage: Stage) -> ResourceLimits {
        // The JVM reserves far more address space than it uses, so no RLIMIT_AS.
        ResourceLimits {
            max_processes: Some(256),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> JavaToolchain {
        JavaToolchain::new(PathBuf::from("/usr/bin/javac"), PathBuf::from("/usr/bin/java"))
    }

    #[test]
    fn test_entry_class_detection() {
        assert_eq!(JavaToolchain::entry_class("public class Main {}"), "Main");
        assert_eq!(
            JavaToolchain::entry_class("import java.util.*;\npublic final class Solver { }"),
            "Solver"
        );
        assert_eq!(JavaToolchain::entry_class("class Hidden {}"), "Main");
    }

    #[test]
    fn test_prechecks() {
        let a = adapter();
        let err = a.precheck("System.out.println(1);").unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingIncludeOrClass);

        let err = a.precheck("public class Main { void run() {} }").unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingEntryPoint);
        assert!(err.message.starts_with("Error: Main method not found"));

        let ok = "public class Main { public static void main(String[] a){ System.out.println(\"hi\"); } }";
        assert!(a.precheck(ok).is_ok());
    }

    #[test]
    fn test_commands_use_detected_class() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut workspace = Workspace::create(temp.path(), None).unwrap();
        let a = adapter();
        let source = "public class Hello { public static void main(String[] a){} }";
        let name = a.source_file_name(source);
        assert_eq!(name, "Hello.java");
        workspace.write_source(&name, source).unwrap();

        let compile = a.compile_command(&workspace).unwrap();
        assert_eq!(compile.args[compile.args.len() - 3..], ["-d", ".", "Hello.java"]);

        let run = a.run_command(&workspace);
        assert_eq!(run.args.last().map(String::as_str), Some("Hello"));
        let cp = run.args.iter().position(|arg| arg == "-cp").unwrap();
        assert_eq!(run.args[cp + 1], ".");
        let root = workspace.root_dir().display().to_string();
        assert!(!compile.args.iter().chain(&run.args).any(|arg| arg.contains(&root)));
    }
}
