//! JSON file store
//!
//! Layout under the store directory:
//!
//! ```text
//! <dir>/
//! ├── jobs/<job id>.json
//! └── graphs/<project id>/<seq>.json
//! ```
//!
//! Ids are escaped with `encode_filename`, so distinct ids never share a
//! file. Every write goes to a temp file that is then renamed over the target,
//! so readers never observe a partial document. Disk work runs on the
//! blocking pool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{retention_cutoff, select_project_jobs, GraphRecord, GraphStore, GraphSummary, JobStore};
use crate::error::{EngineError, Result};
use crate::jobs::Job;
use crate::schema::FlowGraph;

/// Store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    /// Serializes graph sequence allocation
    graph_lock: Arc<Mutex<()>>,
}

impl FsStore {
    /// Open (creating if needed) a store at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("jobs"))?;
        fs::create_dir_all(root.join("graphs"))?;
        debug!(root = %root.display(), "opened store");
        Ok(Self {
            root,
            graph_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir().join(format!("{}.json", encode_filename(job_id)))
    }

    fn project_graphs_dir(&self, project_id: &str) -> PathBuf {
        self.root.join("graphs").join(encode_filename(project_id))
    }

    fn load_all_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for path in json_files(&self.jobs_dir())? {
            match read_json::<Job>(&path) {
                Ok(job) => jobs.push(job),
                Err(err) => warn!(path = %path.display(), "skipping unreadable job: {}", err),
            }
        }
        Ok(jobs)
    }

    fn load_all_graphs(&self) -> Result<Vec<GraphRecord>> {
        let base = self.root.join("graphs");
        let mut records = Vec::new();
        for entry in fs::read_dir(&base)?.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            for path in json_files(&dir)? {
                match read_json::<GraphRecord>(&path) {
                    Ok(record) => records.push(record),
                    Err(err) => warn!(path = %path.display(), "skipping unreadable graph: {}", err),
                }
            }
        }
        Ok(records)
    }

    fn save_graph(&self, record: &GraphRecord) -> Result<()> {
        let _guard = self.graph_lock.lock();
        let dir = self.project_graphs_dir(&record.project_id);
        fs::create_dir_all(&dir)?;
        let seq = json_files(&dir)?.len();
        write_json_atomic(&dir.join(format!("{:08}.json", seq)), record)?;
        debug!(
            project = %record.project_id,
            seq,
            nodes = record.record.nodes.len(),
            "saved graph"
        );
        Ok(())
    }

    fn latest_graph(&self, project_id: &str) -> Result<FlowGraph> {
        let dir = self.project_graphs_dir(project_id);
        if !dir.is_dir() {
            return Ok(FlowGraph::default());
        }
        // Sequence numbers are zero-padded, so the last name is the newest.
        match json_files(&dir)?.last() {
            Some(path) => {
                let record = read_json::<GraphRecord>(path)?;
                if record.project_id != project_id {
                    warn!(path = %path.display(), "graph record belongs to {}", record.project_id);
                    return Ok(FlowGraph::default());
                }
                Ok(record.record)
            }
            None => Ok(FlowGraph::default()),
        }
    }

    fn load_job(&self, job_id: &str) -> Result<Option<Job>> {
        let path = self.job_path(job_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn prune_jobs(&self, days: u32) -> Result<usize> {
        let cutoff = retention_cutoff(days);
        let mut count = 0;

        for job in self.load_all_jobs()? {
            if job.created_at < cutoff {
                fs::remove_file(self.job_path(&job.id))?;
                count += 1;
            }
        }

        debug!(days, count, "pruned jobs");
        Ok(count)
    }

    /// Run blocking file IO on the blocking pool with a handle to this store
    async fn with_disk<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FsStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|join| EngineError::store(format!("store task failed: {}", join)))?
    }
}

#[async_trait]
impl GraphStore for FsStore {
    async fn save(&self, project_id: &str, graph: &FlowGraph, owner_id: Option<&str>) -> Result<()> {
        let record = GraphRecord {
            project_id: project_id.to_string(),
            owner_id: owner_id.map(String::from),
            created_at: Utc::now().timestamp_millis(),
            record: graph.clone(),
        };
        self.with_disk(move |store| store.save_graph(&record)).await
    }

    async fn latest(&self, project_id: &str) -> Result<FlowGraph> {
        let project_id = project_id.to_string();
        self.with_disk(move |store| store.latest_graph(&project_id)).await
    }

    async fn list(&self, limit: usize) -> Result<Vec<GraphSummary>> {
        self.with_disk(move |store| {
            let mut records = store.load_all_graphs()?;
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records.iter().take(limit).map(GraphRecord::summary).collect())
        })
        .await
    }
}

#[async_trait]
impl JobStore for FsStore {
    async fn upsert(&self, job: &Job) -> Result<()> {
        let job = job.clone();
        self.with_disk(move |store| write_json_atomic(&store.job_path(&job.id), &job))
            .await
    }

    async fn load(&self, job_id: &str) -> Result<Option<Job>> {
        let job_id = job_id.to_string();
        self.with_disk(move |store| store.load_job(&job_id)).await
    }

    async fn list_for_project(
        &self,
        project_id: &str,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let project_id = project_id.to_string();
        let owner_id = owner_id.map(String::from);
        self.with_disk(move |store| {
            Ok(select_project_jobs(
                store.load_all_jobs()?,
                &project_id,
                owner_id.as_deref(),
                limit,
            ))
        })
        .await
    }

    async fn delete_older_than(&self, days: u32) -> Result<usize> {
        self.with_disk(move |store| store.prune_jobs(days)).await
    }
}

/// Injective filename encoding: ASCII alphanumerics and `-` are kept, every
/// other byte becomes `_XX` (upper-case hex). `_` itself is escaped, so
/// `team/a` and `team_a` land in different files.
fn encode_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{:02X}", byte));
        }
    }
    out
}

/// `*.json` files of a directory, sorted by name
fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| EngineError::store(format!("{}: {}", path.display(), e)))
}

/// Atomic write: write to temp file, then rename
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&temp_path, &json)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::schema::{FlowNode, NodeKind};

    fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path().join("store")).unwrap();
        (dir, store)
    }

    fn graph(n: usize) -> FlowGraph {
        FlowGraph {
            nodes: (0..n)
                .map(|i| FlowNode::new(format!("n{}", i), NodeKind::Statement))
                .collect(),
            edges: Vec::new(),
        }
    }

    #[test]
    fn test_encode_filename() {
        assert_eq!(encode_filename("simple-1"), "simple-1");
        assert_eq!(encode_filename("with/slash"), "with_2Fslash");
        assert_eq!(encode_filename("with_under"), "with_5Funder");
        assert_eq!(encode_filename(".."), "_2E_2E");
        assert_ne!(encode_filename("team/a"), encode_filename("team_a"));
    }

    #[tokio::test]
    async fn test_similar_project_ids_keep_separate_graphs() {
        let (_dir, store) = store();
        store.save("team/a", &graph(1), None).await.unwrap();
        assert!(store.latest("team_a").await.unwrap().is_empty());

        store.save("team_a", &graph(2), None).await.unwrap();
        assert_eq!(store.latest("team/a").await.unwrap().nodes.len(), 1);
        assert_eq!(store.latest("team_a").await.unwrap().nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_ignores_foreign_record() {
        let (_dir, store) = store();
        store.save("p1", &graph(1), None).await.unwrap();
        let foreign = store.project_graphs_dir("p2");
        fs::create_dir_all(&foreign).unwrap();
        fs::copy(
            store.project_graphs_dir("p1").join("00000000.json"),
            foreign.join("00000000.json"),
        )
        .unwrap();
        assert!(store.latest("p2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_round_trip_survives_reopen() {
        let (dir, store) = store();
        let mut job = Job::new("p1", Some("alice".into()));
        job.status = JobStatus::Running;
        job.progress = 27;
        store.upsert(&job).await.unwrap();

        let reopened = FsStore::open(dir.path().join("store")).unwrap();
        let loaded = reopened.load(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(reopened.load_for_owner(&job.id, "bob").await.unwrap().is_none());
        assert!(!store.job_path(&job.id).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_graph_latest_and_list() {
        let (_dir, store) = store();
        let one = FlowGraph {
            nodes: vec![FlowNode::new("a", NodeKind::Statement)],
            edges: Vec::new(),
        };
        let two = FlowGraph {
            nodes: vec![
                FlowNode::new("a", NodeKind::Statement),
                FlowNode::new("b", NodeKind::Statement),
            ],
            edges: Vec::new(),
        };

        assert!(store.latest("p/1").await.unwrap().is_empty());
        store.save("p/1", &one, None).await.unwrap();
        store.save("p/1", &two, Some("alice")).await.unwrap();

        assert_eq!(store.latest("p/1").await.unwrap(), two);
        let summaries = store.list(10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.project_id == "p/1"));
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let (_dir, store) = store();
        let mut old = Job::new("p1", None);
        old.created_at -= 30 * 24 * 60 * 60 * 1000;
        let fresh = Job::new("p1", None);
        store.upsert(&old).await.unwrap();
        store.upsert(&fresh).await.unwrap();

        assert_eq!(store.delete_older_than(7).await.unwrap(), 1);
        let remaining = store.list_for_project("p1", None, 50).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, fresh.id);
    }
}
