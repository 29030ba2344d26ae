//! In-process store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{retention_cutoff, select_project_jobs, GraphRecord, GraphStore, GraphSummary, JobStore};
use crate::error::Result;
use crate::jobs::Job;
use crate::schema::FlowGraph;

/// Jobs and graphs held in memory; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<String, Job>>,
    graphs: RwLock<Vec<GraphRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.read().len()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn save(&self, project_id: &str, graph: &FlowGraph, owner_id: Option<&str>) -> Result<()> {
        self.graphs.write().push(GraphRecord {
            project_id: project_id.to_string(),
            owner_id: owner_id.map(String::from),
            created_at: Utc::now().timestamp_millis(),
            record: graph.clone(),
        });
        Ok(())
    }

    async fn latest(&self, project_id: &str) -> Result<FlowGraph> {
        Ok(self
            .graphs
            .read()
            .iter()
            .rev()
            .find(|r| r.project_id == project_id)
            .map(|r| r.record.clone())
            .unwrap_or_default())
    }

    async fn list(&self, limit: usize) -> Result<Vec<GraphSummary>> {
        Ok(self
            .graphs
            .read()
            .iter()
            .rev()
            .take(limit)
            .map(GraphRecord::summary)
            .collect())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn upsert(&self, job: &Job) -> Result<()> {
        self.jobs.write().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }

    async fn list_for_project(
        &self,
        project_id: &str,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        Ok(select_project_jobs(jobs, project_id, owner_id, limit))
    }

    async fn delete_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = retention_cutoff(days);
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| job.created_at >= cutoff);
        Ok(before - jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FlowNode, NodeKind};

    fn graph(n: usize) -> FlowGraph {
        FlowGraph {
            nodes: (0..n)
                .map(|i| FlowNode::new(format!("n{}", i), NodeKind::Statement))
                .collect(),
            edges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_latest_graph_wins() {
        let store = MemoryStore::new();
        assert!(store.latest("p1").await.unwrap().is_empty());

        store.save("p1", &graph(1), None).await.unwrap();
        store.save("p2", &graph(5), None).await.unwrap();
        store.save("p1", &graph(3), Some("u1")).await.unwrap();

        assert_eq!(store.graph_count(), 3);
        assert_eq!(store.latest("p1").await.unwrap().nodes.len(), 3);
        let listed = store.list(2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].node_count, 3);
        assert_eq!(listed[1].project_id, "p2");
    }

    #[tokio::test]
    async fn test_job_upsert_and_owner_scope() {
        let store = MemoryStore::new();
        let mut job = Job::new("p1", Some("alice".into()));
        store.upsert(&job).await.unwrap();
        job.progress = 40;
        store.upsert(&job).await.unwrap();

        assert_eq!(store.job_count(), 1);
        assert_eq!(store.load(&job.id).await.unwrap().unwrap().progress, 40);
        assert!(store.load_for_owner(&job.id, "alice").await.unwrap().is_some());
        assert!(store.load_for_owner(&job.id, "bob").await.unwrap().is_none());
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_sweep() {
        let store = MemoryStore::new();
        let mut old = Job::new("p1", None);
        old.created_at -= 10 * 24 * 60 * 60 * 1000;
        let fresh = Job::new("p1", None);
        store.upsert(&old).await.unwrap();
        store.upsert(&fresh).await.unwrap();

        assert_eq!(store.delete_older_than(7).await.unwrap(), 1);
        assert!(store.load(&old.id).await.unwrap().is_none());
        assert!(store.load(&fresh.id).await.unwrap().is_some());
    }
}
