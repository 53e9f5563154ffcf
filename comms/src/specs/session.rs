use serde::{Deserialize, Serialize};

/// Identifies a session inside a coordinator runtime.
pub type SessionId = u64;

/// What a session was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Training,
    Evaluation,
}

/// The binary classification scores reported by an evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoresSpec {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// The observable status of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active {
        mode: SessionMode,
    },
    Completed {
        mode: SessionMode,
        scores: Option<ScoresSpec>,
    },
    Failed {
        reason: String,
    },
}

impl SessionStatus {
    /// Whether the session has reached a state it will never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
