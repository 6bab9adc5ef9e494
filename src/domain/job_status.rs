use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse job lifecycle state.
///
/// Transitions form a DAG: each processing state advances to the next one,
/// `failed` is reachable from every non-terminal state, and terminal states
/// never move again. Self-transitions on non-terminal states are allowed so
/// an interrupted job can resume the stage it was committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Extracting,
    Transcribing,
    Formatting,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Extracting => "extracting",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Formatting => "formatting",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `next` is reachable from `self` in the lifecycle DAG.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Failed {
            return true;
        }
        match (self, next) {
            (a, b) if *a == b => true,
            (JobStatus::Queued, JobStatus::Downloading) => true,
            (JobStatus::Downloading, JobStatus::Extracting) => true,
            (JobStatus::Extracting, JobStatus::Transcribing) => true,
            (JobStatus::Transcribing, JobStatus::Formatting) => true,
            (JobStatus::Formatting, JobStatus::Completed) => true,
            _ => false,
        }
    }

    /// Floor of the global progress band owned by this status.
    pub fn progress_floor(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Downloading => 0,
            JobStatus::Extracting => 25,
            JobStatus::Transcribing => 40,
            JobStatus::Formatting => 90,
            JobStatus::Completed => 100,
            JobStatus::Failed => 0,
        }
    }

    /// Ceiling of the global progress band owned by this status.
    pub fn progress_ceiling(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Downloading => 25,
            JobStatus::Extracting => 40,
            JobStatus::Transcribing => 90,
            JobStatus::Formatting => 99,
            JobStatus::Completed => 100,
            JobStatus::Failed => 100,
        }
    }

    /// Map a 0-100 within-stage fraction onto this status's global band.
    pub fn scale_progress(&self, stage_percent: u8) -> u8 {
        let floor = self.progress_floor() as u16;
        let ceiling = self.progress_ceiling() as u16;
        let fraction = stage_percent.min(100) as u16;
        (floor + (ceiling - floor) * fraction / 100) as u8
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "downloading" => Ok(JobStatus::Downloading),
            "extracting" => Ok(JobStatus::Extracting),
            "transcribing" => Ok(JobStatus::Transcribing),
            "formatting" => Ok(JobStatus::Formatting),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("invalid job status: {}", s)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finer progress label. Mirrors `JobStatus` today; kept separate because a
/// single status may cover more than one internal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Queued,
    Downloading,
    Extracting,
    Transcribing,
    Formatting,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Downloading => "downloading",
            JobStage::Extracting => "extracting",
            JobStage::Transcribing => "transcribing",
            JobStage::Formatting => "formatting",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }
}

impl From<JobStatus> for JobStage {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => JobStage::Queued,
            JobStatus::Downloading => JobStage::Downloading,
            JobStatus::Extracting => JobStage::Extracting,
            JobStatus::Transcribing => JobStage::Transcribing,
            JobStatus::Formatting => JobStage::Formatting,
            JobStatus::Completed => JobStage::Completed,
            JobStatus::Failed => JobStage::Failed,
        }
    }
}

impl FromStr for JobStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status: JobStatus = s.parse()?;
        Ok(status.into())
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
