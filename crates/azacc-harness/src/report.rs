use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FailureKind, HarnessError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied { resources: usize },
    ExpectedError { message: String },
    Destroyed,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based, matching the step numbers in failure messages.
    pub number: usize,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&HarnessError> for Failure {
    fn from(e: &HarnessError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub run_id: Uuid,
    pub case: String,
    pub engine: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
    pub failure: Option<Failure>,
}

impl CaseReport {
    pub fn start(case: &str, engine: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            case: case.to_string(),
            engine: engine.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            failure: None,
        }
    }

    pub fn finish(mut self, failure: Option<HarnessError>) -> Self {
        self.failure = failure.as_ref().map(Failure::from);
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
