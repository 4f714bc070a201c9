//! Static pre-flight policy checks on untrusted source.
//!
//! The deny-list is a text heuristic applied before anything touches the
//! filesystem. It is not a sandbox: real confinement comes from the process
//! runner (dropped privileges, cleared environment, rlimits) and whatever
//! isolation the deployment wraps around it.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DEFAULT_MAX_SOURCE_BYTES;
use crate::execute::FailureKind;
use crate::language::Language;

/// A deny-list rule: a label for logs and the pattern it matches.
struct DenyRule {
    label: &'static str,
    pattern: Regex,
}

/// Module names whose import is rejected.
const RESTRICTED_MODULES: &str = "os|sys|subprocess|shutil|socket";

/// Call-like primitives rejected in any language.
const RESTRICTED_CALLS: &str = "exec|eval|open|system|popen|fork|kill|chmod|chown|__import__";

static DENY_LIST: LazyLock<Vec<DenyRule>> = LazyLock::new(|| {
    let rule = |label, pattern: String| DenyRule {
        label,
        pattern: Regex::new(&pattern).expect("deny-list pattern must compile"),
    };
    vec![
        rule(
            "restricted import",
            format!(r"(?i)\bimport\s+({RESTRICTED_MODULES})\b"),
        ),
        rule(
            "restricted import",
            format!(r"(?i)\bfrom\s+({RESTRICTED_MODULES})(\.\w+)*\s+import\b"),
        ),
        rule("process spawning", r"(?i)\bsubprocess\b".to_string()),
        rule(
            "restricted call",
            format!(r"(?i)(^|\W)({RESTRICTED_CALLS})\s*\("),
        ),
        rule("reflective import", r"(?i)\bimportlib\b".to_string()),
    ]
});

/// Why a request was refused before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: FailureKind,
    pub message: String,
}

impl Rejection {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Sandbox policy validator.
#[derive(Debug, Clone)]
pub struct Validator {
    max_source_bytes: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SOURCE_BYTES)
    }
}

impl Validator {
    pub fn new(max_source_bytes: usize) -> Self {
        Self { max_source_bytes }
    }

    /// Check `source` against the policy, stopping at the first failure.
    ///
    /// The same deny-list applies to every language.
    pub fn validate(&self, language: Language, source: &str) -> Result<(), Rejection> {
        if source.trim().is_empty() {
            return Err(Rejection::new(FailureKind::EmptyCode, "Empty code provided"));
        }

        if source.len() > self.max_source_bytes {
            return Err(Rejection::new(
                FailureKind::PayloadTooLarge,
                format!(
                    "Error: Source code is {} bytes, exceeding the maximum of {} bytes",
                    source.len(),
                    self.max_source_bytes
                ),
            ));
        }

        if let Some((label, matched)) = find_restricted(source) {
            tracing::debug!(%language, rule = label, "Rejected restricted construct: {}", matched);
            return Err(Rejection::new(
                FailureKind::RestrictedConstruct,
                format!(
                    "Error: Restricted construct detected (`{matched}`). System modules, \
                     process control and file access are not allowed for security reasons."
                ),
            ));
        }

        Ok(())
    }
}

/// Find the first deny-list match, returning its rule label and matched text.
fn find_restricted(source: &str) -> Option<(&'static str, String)> {
    DENY_LIST
        .iter()
        .filter_map(|rule| rule.pattern.find(source).map(|m| (rule, m)))
        .min_by_key(|(_, m)| m.start())
        .map(|(rule, m)| {
            let text = m
                .as_str()
                .trim_start_matches(|c: char| !c.is_alphanumeric() && c != '_')
                .trim();
            (rule.label, text.to_string())
        })
}
