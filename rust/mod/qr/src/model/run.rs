use serde::{Deserialize, Serialize};

/// Status of a single production step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Skipped => "SKIPPED",
        }
    }

    fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStep {
    pub name: String,
    pub status: StepStatus,
}

/// A production run bound 1:1 to a token. Owned by the production module;
/// only read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionRun {
    pub id: String,
    pub token_id: String,
    /// Ordered steps.
    pub steps: Vec<RunStep>,
}

/// The step a run is currently on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStep {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
}

impl std::fmt::Display for CurrentStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.index, self.name, self.status.as_str())
    }
}

/// "Is there a bound run, and what is its current step."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProjection {
    pub run_id: String,
    /// `None` once every step is completed or skipped.
    pub current_step: Option<CurrentStep>,
}

impl ProductionRun {
    /// Current step: the first IN_PROGRESS step, else the first PENDING one.
    pub fn projection(&self) -> RunProjection {
        let pick = self
            .steps
            .iter()
            .position(|s| s.status == StepStatus::InProgress)
            .or_else(|| self.steps.iter().position(|s| !s.status.is_done()));

        RunProjection {
            run_id: self.id.clone(),
            current_step: pick.map(|index| CurrentStep {
                index,
                name: self.steps[index].name.clone(),
                status: self.steps[index].status,
            }),
        }
    }
}
