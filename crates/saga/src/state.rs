//! Saga and step state machines.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a saga instance.
///
/// State transitions:
/// ```text
/// STARTED ──┬──► COMPLETED
///           └──► FAILED ──► COMPENSATING ──► COMPENSATED
/// ```
///
/// `FAILED` is only held between a step failure and the start of
/// compensation; a finished saga is either `COMPLETED` or `COMPENSATED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Steps are being executed.
    #[default]
    Started,

    /// All steps succeeded (terminal state).
    Completed,

    /// A step failed; compensation is about to begin.
    Failed,

    /// Completed steps are being undone.
    Compensating,

    /// Compensation has finished (terminal state).
    Compensated,
}

impl SagaStatus {
    /// Returns true if the saga may move from `self` to `target`.
    ///
    /// Transitions are monotonic; setting the current status again is allowed.
    pub fn can_transition_to(&self, target: SagaStatus) -> bool {
        use SagaStatus::*;
        *self == target
            || matches!(
                (self, target),
                (Started, Completed)
                    | (Started, Failed)
                    | (Started, Compensating)
                    | (Failed, Compensating)
                    | (Compensating, Compensated)
            )
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaStatus::Started | SagaStatus::Failed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Compensated)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(SagaStatus::Started),
            "COMPLETED" => Ok(SagaStatus::Completed),
            "FAILED" => Ok(SagaStatus::Failed),
            "COMPENSATING" => Ok(SagaStatus::Compensating),
            "COMPENSATED" => Ok(SagaStatus::Compensated),
            other => Err(format!("unknown saga status: {other}")),
        }
    }
}

/// The status of one step execution row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Compensated,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Success => "SUCCESS",
            StepStatus::Failed => "FAILED",
            StepStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StepStatus::Pending),
            "SUCCESS" => Ok(StepStatus::Success),
            "FAILED" => Ok(StepStatus::Failed),
            "COMPENSATED" => Ok(StepStatus::Compensated),
            other => Err(format!("unknown step status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_started() {
        assert_eq!(SagaStatus::default(), SagaStatus::Started);
        assert_eq!(StepStatus::default(), StepStatus::Pending);
    }

    #[test]
    fn test_forward_transitions() {
        assert!(SagaStatus::Started.can_transition_to(SagaStatus::Completed));
        assert!(SagaStatus::Started.can_transition_to(SagaStatus::Failed));
        assert!(SagaStatus::Failed.can_transition_to(SagaStatus::Compensating));
        assert!(SagaStatus::Compensating.can_transition_to(SagaStatus::Compensated));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!SagaStatus::Completed.can_transition_to(SagaStatus::Compensating));
        assert!(!SagaStatus::Compensated.can_transition_to(SagaStatus::Started));
        assert!(!SagaStatus::Compensating.can_transition_to(SagaStatus::Completed));
        assert!(!SagaStatus::Failed.can_transition_to(SagaStatus::Completed));
    }

    #[test]
    fn test_same_status_is_allowed() {
        assert!(SagaStatus::Compensated.can_transition_to(SagaStatus::Compensated));
    }

    #[test]
    fn test_can_compensate() {
        assert!(SagaStatus::Started.can_compensate());
        assert!(SagaStatus::Failed.can_compensate());
        assert!(!SagaStatus::Compensating.can_compensate());
        assert!(!SagaStatus::Completed.can_compensate());
        assert!(!SagaStatus::Compensated.can_compensate());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaStatus::Started.is_terminal());
        assert!(!SagaStatus::Failed.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
    }

    #[test]
    fn test_parse_round_trips_as_str() {
        for status in [
            SagaStatus::Started,
            SagaStatus::Completed,
            SagaStatus::Failed,
            SagaStatus::Compensating,
            SagaStatus::Compensated,
        ] {
            assert_eq!(status.as_str().parse::<SagaStatus>().unwrap(), status);
        }
        assert_eq!("SUCCESS".parse::<StepStatus>().unwrap(), StepStatus::Success);
        assert!("Running".parse::<SagaStatus>().is_err());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&SagaStatus::Compensating).unwrap();
        assert_eq!(json, "\"COMPENSATING\"");
        let json = serde_json::to_string(&StepStatus::Compensated).unwrap();
        assert_eq!(json, "\"COMPENSATED\"");
    }
}
