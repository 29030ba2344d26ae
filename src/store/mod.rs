//! Persistence for jobs and merged graphs
//!
//! The orchestrator only needs the two narrow contracts below. Two adapters
//! ship with the crate: [`MemoryStore`] for tests and embedding, and
//! [`FsStore`] which keeps JSON documents under the store directory.

mod fs;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jobs::Job;
use crate::schema::FlowGraph;

pub use fs::FsStore;
pub use memory::MemoryStore;

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// A saved graph snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecord {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
    pub record: FlowGraph,
}

impl GraphRecord {
    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            project_id: self.project_id.clone(),
            created_at: self.created_at,
            node_count: self.record.nodes.len(),
            edge_count: self.record.edges.len(),
        }
    }
}

/// Listing entry for saved graphs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub project_id: String,
    pub created_at: i64,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Append-only store of merged graphs
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn save(&self, project_id: &str, graph: &FlowGraph, owner_id: Option<&str>) -> Result<()>;

    /// Most recently saved graph of the project, or an empty graph
    async fn latest(&self, project_id: &str) -> Result<FlowGraph>;

    /// Newest first, across projects
    async fn list(&self, limit: usize) -> Result<Vec<GraphSummary>>;
}

/// Durable mirror of the in-memory job table
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace by job id
    async fn upsert(&self, job: &Job) -> Result<()>;

    async fn load(&self, job_id: &str) -> Result<Option<Job>>;

    /// Like [`JobStore::load`], restricted to jobs owned by `owner_id`
    async fn load_for_owner(&self, job_id: &str, owner_id: &str) -> Result<Option<Job>> {
        Ok(self.load(job_id).await?.filter(|job| job.is_owned_by(owner_id)))
    }

    /// Jobs of a project, newest first
    async fn list_for_project(
        &self,
        project_id: &str,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Job>>;

    /// Retention sweep; returns the number of deleted jobs
    async fn delete_older_than(&self, days: u32) -> Result<usize>;
}

/// `created_at` values below this are older than `days`
pub(crate) fn retention_cutoff(days: u32) -> i64 {
    chrono::Utc::now().timestamp_millis() - i64::from(days) * DAY_MILLIS
}

/// Filter, sort newest first and truncate
pub(crate) fn select_project_jobs<I>(jobs: I, project_id: &str, owner_id: Option<&str>, limit: usize) -> Vec<Job>
where
    I: IntoIterator<Item = Job>,
{
    let mut selected: Vec<Job> = jobs
        .into_iter()
        .filter(|job| job.project_id == project_id)
        .filter(|job| owner_id.map_or(true, |owner| job.is_owned_by(owner)))
        .collect();
    selected.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    selected.truncate(limit);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(project: &str, owner: &str, created_at: i64) -> Job {
        let mut job = Job::new(project, Some(owner.into()));
        job.created_at = created_at;
        job
    }

    #[test]
    fn test_select_project_jobs() {
        let jobs = vec![
            job("p1", "a", 10),
            job("p1", "b", 30),
            job("p2", "a", 40),
            job("p1", "a", 20),
        ];
        let all = select_project_jobs(jobs.clone(), "p1", None, 50);
        let times: Vec<i64> = all.iter().map(|j| j.created_at).collect();
        assert_eq!(times, vec![30, 20, 10]);

        let mine = select_project_jobs(jobs.clone(), "p1", Some("a"), 50);
        assert_eq!(mine.len(), 2);

        let limited = select_project_jobs(jobs, "p1", None, 1);
        assert_eq!(limited[0].created_at, 30);
    }

    #[test]
    fn test_retention_cutoff() {
        let now = chrono::Utc::now().timestamp_millis();
        let cutoff = retention_cutoff(7);
        assert!(now - cutoff >= 7 * DAY_MILLIS);
        assert!(retention_cutoff(0) <= chrono::Utc::now().timestamp_millis());
    }
}
