use super::outcome::ExecutionOutcome;

/// One increment of a streamed execution.
///
/// A stream always opens with `Start` and closes with exactly one
/// `Complete`. `Stdout` and `Stderr` chunks keep pipe arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Start,
    Stdout(String),
    Stderr(String),
    /// Terminal failure message (compile errors, timeouts, rejections).
    Error(String),
    Complete(ExecutionOutcome),
}

impl OutputEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutputEvent::Complete(_))
    }
}
