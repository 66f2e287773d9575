use std::fmt;

/// Result of a side-effecting pipeline step.
///
/// Steps never propagate their errors to the caller; the failure is carried
/// as a diagnostic so the handler can log it next to the status it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Failed(String),
}

impl StepOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
