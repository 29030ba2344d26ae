//! Job orchestrator
//!
//! [`JobManager`] owns the in-memory job table and is the only writer of job
//! records. Every transition goes through [`JobStateMachine`] under the table
//! lock, so readers always see a whole snapshot and terminal jobs never change.
//! After a transition the new snapshot is pushed to subscribers first and then
//! mirrored to the [`JobStore`]; a failed mirror write is logged and ignored.
//!
//! Jobs read back from the store that are still `queued` or `running` have no
//! pipeline left to finish them (every job this manager starts stays in its
//! table), so they are failed with [`ERR_INTERRUPTED`] when first seen.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::job::{
    file_progress, FileFailure, Job, JobResult, JobStateMachine, JobStatus, ERR_INTERRUPTED,
    MSG_ENRICHING, MSG_MERGING, MSG_SAVING, PROGRESS_ENRICH, PROGRESS_MERGE, PROGRESS_SAVE,
};
use super::stream::{JobStream, SubscriberRegistry, Subscription};
use crate::analysis::enrich_graph;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::extract::analyze_file;
use crate::flow::{link_imports, merge_file_graphs};
use crate::impact::{build_impact_map, MemoryTree};
use crate::indexing::FileMap;
use crate::schema::FlowGraph;
use crate::store::{GraphStore, JobStore};

struct Inner {
    jobs: RwLock<HashMap<String, Job>>,
    subscribers: Arc<SubscriberRegistry>,
    job_store: Arc<dyn JobStore>,
    graph_store: Arc<dyn GraphStore>,
    /// Orders mirror writes so the store ends on the newest snapshot
    persist_lock: tokio::sync::Mutex<()>,
    config: EngineConfig,
}

/// Creates, runs and tracks analysis jobs. Cheap to clone.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn new(job_store: Arc<dyn JobStore>, graph_store: Arc<dyn GraphStore>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                subscribers: Arc::new(SubscriberRegistry::default()),
                job_store,
                graph_store,
                persist_lock: tokio::sync::Mutex::new(()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.inner.graph_store
    }

    /// Register a queued job and persist it
    pub async fn create_job(&self, project_id: &str, owner_id: Option<String>) -> Job {
        let job = Job::new(project_id, owner_id);
        self.inner.jobs.write().insert(job.id.clone(), job.clone());
        info!(job = %job.id, project = project_id, "job created");
        self.persist(&job.id).await;
        job
    }

    /// Create a job and run it in the background. Returns the queued job
    /// without waiting for the analysis.
    pub async fn enqueue(&self, project_id: &str, files: FileMap, owner_id: Option<String>) -> Job {
        let job = self.create_job(project_id, owner_id).await;
        let manager = self.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move { manager.supervise(job_id, files).await });
        job
    }

    /// Create a job and run it to completion
    pub async fn run(&self, project_id: &str, files: FileMap, owner_id: Option<String>) -> Result<Job> {
        let job = self.create_job(project_id, owner_id).await;
        self.supervise(job.id.clone(), files).await;
        self.get_job(&job.id)
            .await?
            .ok_or(EngineError::JobNotFound(job.id))
    }

    /// Look up a job: memory first, then the store (caching a hit)
    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        if let Some(job) = self.snapshot(job_id) {
            return Ok(Some(job));
        }
        match self.inner.job_store.load(job_id).await? {
            Some(job) => self.adopt(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Like [`JobManager::get_job`], restricted to jobs owned by `owner_id`
    pub async fn get_job_for_owner(&self, job_id: &str, owner_id: &str) -> Result<Option<Job>> {
        if let Some(job) = self.snapshot(job_id) {
            return Ok(job.is_owned_by(owner_id).then_some(job));
        }
        match self.inner.job_store.load_for_owner(job_id, owner_id).await? {
            Some(job) => self.adopt(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Jobs of a project, newest first, capped at `jobs.list_limit`
    pub async fn list_jobs(&self, project_id: &str, owner_id: Option<&str>) -> Result<Vec<Job>> {
        let limit = self.inner.config.jobs.list_limit;
        let stored = self
            .inner
            .job_store
            .list_for_project(project_id, owner_id, limit)
            .await?;
        let mut by_id: HashMap<String, Job> = HashMap::with_capacity(stored.len());
        for job in stored {
            let job = if job.is_terminal() { job } else { self.adopt(job).await? };
            by_id.insert(job.id.clone(), job);
        }
        for job in self.inner.jobs.read().values() {
            if job.project_id == project_id && owner_id.map_or(true, |o| job.is_owned_by(o)) {
                by_id.insert(job.id.clone(), job.clone());
            }
        }
        let mut jobs: Vec<Job> = by_id.into_values().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Mark a queued or running job cancelled. The pipeline stops at its
    /// next checkpoint.
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        if self.get_job(job_id).await?.is_none() {
            return Err(EngineError::JobNotFound(job_id.to_string()));
        }
        let job = self.transition(job_id, |m| m.cancel()).await?;
        info!(job = %job_id, "job cancelled");
        Ok(job)
    }

    /// Raw push handle for one job
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        self.inner.subscribers.subscribe(job_id)
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.inner.subscribers.count(job_id)
    }

    /// Push-driven event stream with heartbeats
    pub async fn watch(&self, job_id: &str) -> Result<JobStream> {
        // Subscribe before reading so no transition falls between the two.
        let subscription = self.subscribe(job_id);
        let job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        Ok(JobStream::push(
            subscription,
            job.view(),
            self.inner.config.jobs.heartbeat(),
        ))
    }

    /// Polling fallback over [`JobManager::get_job`]
    pub async fn poll(&self, job_id: &str) -> Result<JobStream> {
        if self.get_job(job_id).await?.is_none() {
            return Err(EngineError::JobNotFound(job_id.to_string()));
        }
        let jobs = &self.inner.config.jobs;
        Ok(JobStream::poll(
            self.clone(),
            job_id.to_string(),
            jobs.poll_interval(),
            jobs.heartbeat(),
        ))
    }

    /// Retention sweep over the store and finished in-memory jobs
    pub async fn prune(&self, days: u32) -> Result<usize> {
        let removed = self.inner.job_store.delete_older_than(days).await?;
        let cutoff = crate::store::retention_cutoff(days);
        self.inner
            .jobs
            .write()
            .retain(|_, job| !(job.is_terminal() && job.created_at < cutoff));
        info!(days, removed, "pruned jobs");
        Ok(removed)
    }

    /// Cache a job read from the store, failing it if it is unfinished and
    /// not already tracked here
    async fn adopt(&self, job: Job) -> Result<Job> {
        let tracked = {
            let mut jobs = self.inner.jobs.write();
            match jobs.get(&job.id) {
                Some(existing) => Some(existing.clone()),
                None => {
                    jobs.insert(job.id.clone(), job.clone());
                    None
                }
            }
        };
        if let Some(existing) = tracked {
            return Ok(existing);
        }
        if job.is_terminal() {
            return Ok(job);
        }
        warn!(job = %job.id, status = %job.status, "stored job has no pipeline, marking failed");
        self.transition(&job.id, |m| m.fail(ERR_INTERRUPTED)).await
    }

    fn snapshot(&self, job_id: &str) -> Option<Job> {
        self.inner.jobs.read().get(job_id).cloned()
    }

    /// Apply one state-machine step under the table lock, notify, persist
    async fn transition<F>(&self, job_id: &str, step: F) -> Result<Job>
    where
        F: FnOnce(&mut JobStateMachine) -> Result<()>,
    {
        let updated = {
            let mut jobs = self.inner.jobs.write();
            let current = jobs
                .get(job_id)
                .cloned()
                .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
            let mut machine = JobStateMachine::new(current);
            step(&mut machine)?;
            let job = machine.into_job();
            jobs.insert(job.id.clone(), job.clone());
            self.inner.subscribers.notify(&job.view());
            job
        };
        debug!(
            job = %updated.id,
            status = %updated.status,
            progress = updated.progress,
            "job update"
        );
        self.persist(job_id).await;
        Ok(updated)
    }

    async fn persist(&self, job_id: &str) {
        let _guard = self.inner.persist_lock.lock().await;
        let Some(job) = self.snapshot(job_id) else {
            return;
        };
        if let Err(err) = self.inner.job_store.upsert(&job).await {
            warn!(job = %job_id, "failed to persist job: {}", err);
        }
    }

    fn is_cancelled(&self, job_id: &str) -> bool {
        self.snapshot(job_id)
            .is_some_and(|job| job.status == JobStatus::Cancelled)
    }

    /// Run the pipeline as its own task so that a panic anywhere still ends
    /// the job in `error`
    async fn supervise(&self, job_id: String, files: FileMap) {
        let manager = self.clone();
        let id = job_id.clone();
        let outcome = tokio::spawn(async move { manager.run_pipeline(&id, files).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(join) => panic_message(join),
        };

        if self.is_cancelled(&job_id) {
            info!(job = %job_id, "pipeline stopped after cancellation");
            return;
        }
        error!(job = %job_id, "analysis failed: {}", failure);
        if let Err(err) = self.transition(&job_id, |m| m.fail(failure)).await {
            debug!(job = %job_id, "could not record failure: {}", err);
        }
    }

    async fn run_pipeline(&self, job_id: &str, files: FileMap) -> Result<()> {
        let started = self.transition(job_id, |m| m.start()).await?;
        info!(job = %job_id, files = files.len(), "job running");

        let config = &self.inner.config;
        let total = files.len();
        let mut analyses = Vec::with_capacity(total);
        let mut graphs: Vec<(String, FlowGraph)> = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (index, (path, text)) in files.iter().enumerate() {
            let options = config.analysis.clone();
            let (p, t) = (path.clone(), text.clone());
            match tokio::task::spawn_blocking(move || analyze_file(&p, &t, &options)).await {
                Ok(analysis) => {
                    if let Some(reason) = &analysis.error {
                        warn!(job = %job_id, path = %path, "file analysis failed: {}", reason);
                        failures.push(FileFailure {
                            path: path.clone(),
                            reason: reason.clone(),
                        });
                    }
                    graphs.push((analysis.path.clone(), analysis.graph.clone()));
                    analyses.push(analysis);
                }
                Err(join) => {
                    let reason = panic_message(join);
                    warn!(job = %job_id, path = %path, "file analysis panicked: {}", reason);
                    failures.push(FileFailure {
                        path: path.clone(),
                        reason,
                    });
                    graphs.push((path.clone(), FlowGraph::default()));
                }
            }

            let done = index + 1;
            let message = format!("Analyzing file {}/{}: {}", done, total, path);
            self.transition(job_id, |m| m.advance(file_progress(done, total), message))
                .await?;
        }

        self.transition(job_id, |m| m.advance(PROGRESS_MERGE, MSG_MERGING))
            .await?;
        let extensions = config.resolve.extensions.clone();
        let tree = MemoryTree::new(files.keys());
        let (linked, impact) = blocking("merge", move || {
            let impact = build_impact_map(&analyses, &tree, &extensions);
            let merged = merge_file_graphs(&graphs);
            (link_imports(&merged, &impact), impact)
        })
        .await?;

        self.transition(job_id, |m| m.advance(PROGRESS_ENRICH, MSG_ENRICHING))
            .await?;
        let weights = config.complexity.clone();
        let enriched = blocking("enrich", move || enrich_graph(&linked, &weights)).await?;

        self.transition(job_id, |m| m.advance(PROGRESS_SAVE, MSG_SAVING))
            .await?;
        self.inner
            .graph_store
            .save(&started.project_id, &enriched, started.owner_id.as_deref())
            .await?;

        let nodes = enriched.nodes.len();
        self.transition(job_id, |m| {
            m.complete(JobResult {
                graph: enriched,
                failures,
                impact,
            })
        })
        .await?;
        info!(job = %job_id, nodes, "job completed");
        Ok(())
    }
}

/// Run CPU-bound work off the async workers; a panic becomes an error
async fn blocking<T, F>(stage: &str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join| EngineError::ExtractionFailure {
            message: format!("{} stage failed: {}", stage, panic_message(join)),
        })
}

fn panic_message(join: JoinError) -> String {
    if !join.is_panic() {
        return join.to_string();
    }
    let payload = join.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobEvent;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    fn manager_with(store: Arc<MemoryStore>) -> JobManager {
        let mut config = EngineConfig::default();
        config.jobs.poll_interval_ms = 10;
        JobManager::new(store.clone(), store, config)
    }

    fn files() -> FileMap {
        let mut files = FileMap::new();
        files.insert("src/a.ts".into(), "import { b } from './b';\nexport const a = b + 1;\n".into());
        files.insert("src/b.ts".into(), "export const b = 1;\n".into());
        files
    }

    #[tokio::test]
    async fn test_run_completes_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let job = manager.run("p1", files(), Some("alice".into())).await.unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 100);
        let result = job.result.as_ref().unwrap();
        assert!(result.failures.is_empty());
        assert_eq!(result.impact.imports_of("src/a.ts"), vec!["src/b.ts"]);
        assert!(result.graph.node("file::src/a.ts").is_some());

        assert_eq!(store.load(&job.id).await.unwrap().unwrap().status, JobStatus::Done);
        assert_eq!(store.latest("p1").await.unwrap(), result.graph);
    }

    #[tokio::test]
    async fn test_empty_project_finishes_done() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let job = manager.run("p1", FileMap::new(), None).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.result.unwrap().graph.is_empty());
    }

    #[tokio::test]
    async fn test_file_failure_is_not_fatal() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let mut files = files();
        files.insert("notes.py".into(), "print(1)".into());
        let job = manager.run("p1", files, None).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        let failures = &job.result.unwrap().failures;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "notes.py");
    }

    #[tokio::test]
    async fn test_subscriber_sees_checkpoints_in_order() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let job = manager.create_job("p1", None).await;
        let mut subscription = manager.subscribe(&job.id);
        manager.supervise(job.id.clone(), files()).await;

        let mut seen = Vec::new();
        while let Some(view) = subscription.try_recv() {
            seen.push((view.status, view.progress, view.message));
        }
        let progress: Vec<u8> = seen.iter().map(|s| s.1).collect();
        assert_eq!(progress, vec![2, 27, 52, 60, 80, 95, 100]);
        assert_eq!(seen[1].2, "Analyzing file 1/2: src/a.ts");
        assert_eq!(seen.last().map(|s| s.0), Some(JobStatus::Done));
    }

    struct FailingGraphs;

    #[async_trait]
    impl GraphStore for FailingGraphs {
        async fn save(&self, _: &str, _: &FlowGraph, _: Option<&str>) -> Result<()> {
            Err(EngineError::store("disk full"))
        }

        async fn latest(&self, _: &str) -> Result<FlowGraph> {
            Ok(FlowGraph::default())
        }

        async fn list(&self, _: usize) -> Result<Vec<crate::store::GraphSummary>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persist_failure_flips_to_error() {
        let manager = JobManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FailingGraphs),
            EngineConfig::default(),
        );
        let job = manager.run("p1", files(), None).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 95);
        assert_eq!(job.message, "Error during analysis");
        assert!(job.error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_get_job_falls_back_to_store() {
        let store = Arc::new(MemoryStore::new());
        let job = Job::new("p1", Some("alice".into()));
        store.upsert(&job).await.unwrap();

        let manager = manager_with(store);
        assert_eq!(manager.get_job(&job.id).await.unwrap().unwrap().id, job.id);
        assert!(manager.get_job_for_owner(&job.id, "bob").await.unwrap().is_none());
        assert!(manager.get_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unfinished_stored_job_is_failed_on_load() {
        let store = Arc::new(MemoryStore::new());
        let mut stale = Job::new("p1", Some("alice".into()));
        stale.status = JobStatus::Running;
        stale.progress = 27;
        store.upsert(&stale).await.unwrap();

        let manager = manager_with(store.clone());
        let watch = manager.watch(&stale.id).await.unwrap();
        let events: Vec<JobEvent> = tokio::time::timeout(Duration::from_secs(5), async move {
            let mut watch = watch;
            let mut events = Vec::new();
            while let Some(event) = watch.next().await {
                events.push(event);
            }
            events
        })
        .await
        .expect("stream should end");

        let names: Vec<&str> = events.iter().map(JobEvent::name).collect();
        assert_eq!(names, vec!["job:update", "job:complete"]);
        let view = events[1].view().unwrap();
        assert_eq!(view.status, JobStatus::Error);
        assert_eq!(view.progress, 27);
        assert_eq!(view.error.as_deref(), Some(ERR_INTERRUPTED));
        assert_eq!(store.load(&stale.id).await.unwrap().unwrap().status, JobStatus::Error);
    }

    #[tokio::test]
    async fn test_unfinished_stored_jobs_are_failed_when_listed() {
        let store = Arc::new(MemoryStore::new());
        let queued = Job::new("p1", None);
        store.upsert(&queued).await.unwrap();

        let manager = manager_with(store.clone());
        let listed = manager.list_jobs("p1", None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, JobStatus::Error);
        assert_eq!(manager.get_job(&queued.id).await.unwrap().unwrap().status, JobStatus::Error);
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let job = manager.create_job("p1", None).await;
        let cancelled = manager.cancel(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        manager.supervise(job.id.clone(), files()).await;
        let after = manager.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
        assert!(manager.cancel(&job.id).await.is_err());
        assert!(matches!(
            manager.cancel("missing").await,
            Err(EngineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let first = manager.create_job("p1", Some("alice".into())).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = manager.create_job("p1", Some("bob".into())).await;
        manager.create_job("p2", None).await;

        let all = manager.list_jobs("p1", None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert_eq!(manager.list_jobs("p1", Some("alice")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_and_poll_agree() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let job = manager.enqueue("p1", files(), None).await;

        let mut watch = manager.watch(&job.id).await.unwrap();
        let mut pushed = None;
        while let Some(event) = watch.next().await {
            if let JobEvent::Complete(view) = event {
                pushed = Some(view);
            }
        }
        drop(watch);

        let mut poll = manager.poll(&job.id).await.unwrap();
        let mut polled = None;
        while let Some(event) = poll.next().await {
            if let JobEvent::Complete(view) = event {
                polled = Some(view);
            }
        }

        let (pushed, polled) = (pushed.unwrap(), polled.unwrap());
        assert_eq!(pushed, polled);
        assert_eq!(pushed.status, JobStatus::Done);
        assert_eq!(manager.subscriber_count(&job.id), 0);
    }
}
