use serde::{Deserialize, Serialize};

/// How a single step ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl StepStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::TimedOut)
    }
}

/// Overall result of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Classify a finished step.
///
/// With `fail_on_stderr`, any stderr output fails the step even on exit 0.
pub fn classify_step(
    exit_code: Option<i32>,
    timed_out: bool,
    wrote_stderr: bool,
    fail_on_stderr: bool,
) -> StepStatus {
    if timed_out {
        return StepStatus::TimedOut;
    }
    if fail_on_stderr && wrote_stderr {
        return StepStatus::Failed;
    }
    match exit_code {
        Some(0) => StepStatus::Succeeded,
        _ => StepStatus::Failed,
    }
}

pub fn classify_outcome<I>(statuses: I) -> Outcome
where
    I: IntoIterator<Item = StepStatus>,
{
    if statuses.into_iter().any(StepStatus::is_failure) {
        Outcome::Failed
    } else {
        Outcome::Succeeded
    }
}
