//! Job model and state machine

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::impact::ImpactMap;
use crate::schema::FlowGraph;

pub const MSG_CREATED: &str = "Job created";
pub const MSG_ANALYZING: &str = "Analyzing files (1/4)";
pub const MSG_MERGING: &str = "Merging file graphs (2/4)";
pub const MSG_ENRICHING: &str = "Enriching semantics (3/4)";
pub const MSG_SAVING: &str = "Saving graph (4/4)";
pub const MSG_COMPLETED: &str = "Completed";
pub const MSG_FAILED: &str = "Error during analysis";
pub const MSG_CANCELLED: &str = "Cancelled";

/// Error recorded on a stored job that no live pipeline owns
pub const ERR_INTERRUPTED: &str = "Interrupted: the process running this job stopped before it finished";

pub const PROGRESS_STARTED: u8 = 2;
pub const PROGRESS_MERGE: u8 = 60;
pub const PROGRESS_ENRICH: u8 = 80;
pub const PROGRESS_SAVE: u8 = 95;
pub const PROGRESS_DONE: u8 = 100;

/// Share of the progress bar taken by per-file analysis
const FILE_PHASE_SPAN: f64 = 50.0;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Cancelled)
    }

    /// Position in the lifecycle; never decreases for a given job
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file whose analysis did not produce a usable graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Output of a successful job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub graph: FlowGraph,
    #[serde(default)]
    pub failures: Vec<FileFailure>,
    #[serde(default)]
    pub impact: ImpactMap,
}

/// One full-project analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    /// A fresh queued job with a random id
    pub fn new(project_id: impl Into<String>, owner_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            owner_id,
            created_at: Utc::now().timestamp_millis(),
            status: JobStatus::Queued,
            progress: 0,
            message: MSG_CREATED.to_string(),
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_id.as_deref() == Some(uid)
    }

    /// The status JSON handed to clients
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Client-facing job snapshot: `{id, projectId, status, progress, message, result?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub project_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobView {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Progress after finishing file `index` (1-based) of `total`
pub fn file_progress(index: usize, total: usize) -> u8 {
    let total = total.max(1) as f64;
    let value = f64::from(PROGRESS_STARTED) + (index as f64 / total) * FILE_PHASE_SPAN;
    value.round().clamp(0.0, f64::from(PROGRESS_MERGE)) as u8
}

/// Guards every mutation of a [`Job`]
pub struct JobStateMachine {
    job: Job,
}

impl JobStateMachine {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn into_job(self) -> Job {
        self.job
    }

    fn reject(&self, to: JobStatus) -> EngineError {
        EngineError::InvalidStateTransition {
            from: self.job.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Transition: QUEUED → RUNNING
    pub fn start(&mut self) -> Result<()> {
        match self.job.status {
            JobStatus::Queued => {
                self.job.status = JobStatus::Running;
                self.job.progress = PROGRESS_STARTED;
                self.job.message = MSG_ANALYZING.to_string();
                Ok(())
            }
            _ => Err(self.reject(JobStatus::Running)),
        }
    }

    /// RUNNING checkpoint. Progress never moves backwards and stays below 100.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) -> Result<()> {
        match self.job.status {
            JobStatus::Running => {
                self.job.progress = progress.clamp(self.job.progress, PROGRESS_DONE - 1);
                self.job.message = message.into();
                Ok(())
            }
            _ => Err(self.reject(JobStatus::Running)),
        }
    }

    /// Transition: RUNNING → DONE
    pub fn complete(&mut self, result: JobResult) -> Result<()> {
        match self.job.status {
            JobStatus::Running => {
                self.job.status = JobStatus::Done;
                self.job.progress = PROGRESS_DONE;
                self.job.message = MSG_COMPLETED.to_string();
                self.job.result = Some(result);
                Ok(())
            }
            _ => Err(self.reject(JobStatus::Done)),
        }
    }

    /// Transition: QUEUED | RUNNING → ERROR. Progress keeps its last value.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        match self.job.status {
            JobStatus::Queued | JobStatus::Running => {
                self.job.status = JobStatus::Error;
                self.job.message = MSG_FAILED.to_string();
                self.job.error = Some(error.into());
                Ok(())
            }
            _ => Err(self.reject(JobStatus::Error)),
        }
    }

    /// Transition: QUEUED | RUNNING → CANCELLED
    pub fn cancel(&mut self) -> Result<()> {
        match self.job.status {
            JobStatus::Queued | JobStatus::Running => {
                self.job.status = JobStatus::Cancelled;
                self.job.message = MSG_CANCELLED.to_string();
                Ok(())
            }
            _ => Err(self.reject(JobStatus::Cancelled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> JobStateMachine {
        let mut machine = JobStateMachine::new(Job::new("p1", Some("u1".into())));
        machine.start().unwrap();
        machine
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new("p1", None);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.message, MSG_CREATED);
        assert!(Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_happy_path() {
        let mut machine = running();
        assert_eq!(machine.job().progress, PROGRESS_STARTED);
        machine.advance(PROGRESS_MERGE, MSG_MERGING).unwrap();
        machine.complete(JobResult::default()).unwrap();

        let job = machine.into_job();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        assert_eq!(job.message, MSG_COMPLETED);
        assert!(job.result.is_some());
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut machine = running();
        machine.advance(60, MSG_MERGING).unwrap();
        machine.advance(30, "late").unwrap();
        assert_eq!(machine.job().progress, 60);
        machine.advance(250, "overflow").unwrap();
        assert_eq!(machine.job().progress, 99);
    }

    #[test]
    fn test_failure_keeps_progress() {
        let mut machine = running();
        machine.advance(80, MSG_ENRICHING).unwrap();
        machine.fail("boom").unwrap();
        let job = machine.job();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 80);
        assert_eq!(job.message, MSG_FAILED);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        let mut machine = running();
        machine.complete(JobResult::default()).unwrap();
        assert!(machine.start().is_err());
        assert!(machine.advance(10, "x").is_err());
        assert!(machine.fail("x").is_err());
        assert!(machine.cancel().is_err());

        let mut machine = running();
        machine.cancel().unwrap();
        let err = machine.complete(JobResult::default()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid state transition: cancelled -> done");
    }

    #[test]
    fn test_cannot_complete_from_queued() {
        let mut machine = JobStateMachine::new(Job::new("p1", None));
        assert!(machine.complete(JobResult::default()).is_err());
        assert!(machine.advance(10, "x").is_err());
    }

    #[test]
    fn test_file_progress_checkpoints() {
        assert_eq!(file_progress(1, 4), 15);
        assert_eq!(file_progress(2, 4), 27);
        assert_eq!(file_progress(4, 4), 52);
        assert_eq!(file_progress(1, 3), 19);
        assert_eq!(file_progress(0, 0), 2);
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let job = Job::new("proj", Some("owner".into()));
        let value = serde_json::to_value(job.view()).unwrap();
        assert_eq!(value["projectId"], "proj");
        assert_eq!(value["status"], "queued");
        assert!(value.get("ownerId").is_none());
        assert!(value.get("result").is_none());
    }
}
