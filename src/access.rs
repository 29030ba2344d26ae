//! Access boundary
//!
//! Authentication and project permissions are checked here and nowhere else:
//! the analysis pipeline and the job manager never see tokens. [`JobGateway`]
//! is the entry point a transport (HTTP handler, SSE endpoint, CLI) calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::extract::FileAnalysis;
use crate::indexing::{analyze_files_parallel, FileMap};
use crate::jobs::{JobManager, JobStatus, JobStream, JobView};
use crate::schema::FlowGraph;
use crate::search::{search_project, SearchMatch};

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token, or fail with `Unauthenticated`
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Fixed token table
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, uid: impl Into<String>, email: impl Into<String>) -> Self {
        self.tokens.insert(
            token.into(),
            Identity {
                uid: uid.into(),
                email: email.into(),
            },
        );
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        if token.is_empty() {
            return Err(EngineError::Unauthenticated("missing token".into()));
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| EngineError::Unauthenticated("invalid token".into()))
    }
}

/// Project role, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Owner => "owner",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// Members other than the owner
    #[serde(default)]
    pub roles: HashMap<String, Role>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: owner_id.into(),
            roles: HashMap::new(),
        }
    }

    pub fn with_member(mut self, uid: impl Into<String>, role: Role) -> Self {
        self.roles.insert(uid.into(), role);
        self
    }

    pub fn role_of(&self, uid: &str) -> Option<Role> {
        if self.owner_id == uid {
            return Some(Role::Owner);
        }
        self.roles.get(uid).copied()
    }
}

#[async_trait]
pub trait ProjectAccess: Send + Sync {
    /// The project, if `uid` holds at least `min_role` on it
    async fn assert_access(&self, project_id: &str, uid: &str, min_role: Role) -> Result<Project>;
}

/// Shared check for table-backed implementations
pub fn check_role(project: &Project, uid: &str, min_role: Role) -> Result<()> {
    match project.role_of(uid) {
        None => Err(EngineError::Forbidden("not a project member".into())),
        Some(role) if role < min_role => Err(EngineError::Forbidden(format!(
            "insufficient role: {} < {}",
            role.as_str(),
            min_role.as_str()
        ))),
        Some(_) => Ok(()),
    }
}

/// In-memory project table
#[derive(Debug, Default)]
pub struct MemoryProjects {
    projects: RwLock<HashMap<String, Project>>,
}

impl MemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, project: Project) {
        self.projects.write().insert(project.id.clone(), project);
    }
}

#[async_trait]
impl ProjectAccess for MemoryProjects {
    async fn assert_access(&self, project_id: &str, uid: &str, min_role: Role) -> Result<Project> {
        let project = self
            .projects
            .read()
            .get(project_id)
            .cloned()
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
        check_role(&project, uid, min_role)?;
        Ok(project)
    }
}

/// How much work a start request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Per-file analyses, returned synchronously
    #[default]
    Fast,
    /// Background job over the whole project
    Full,
}

/// Reply to [`JobGateway::start_analysis`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StartResponse {
    Analyses {
        #[serde(rename = "projectId")]
        project_id: String,
        results: Vec<FileAnalysis>,
    },
    Job {
        #[serde(rename = "jobId")]
        job_id: String,
        status: JobStatus,
    },
}

/// Authenticated front door to analysis and jobs
#[derive(Clone)]
pub struct JobGateway {
    verifier: Arc<dyn TokenVerifier>,
    projects: Arc<dyn ProjectAccess>,
    jobs: JobManager,
}

impl JobGateway {
    pub fn new(verifier: Arc<dyn TokenVerifier>, projects: Arc<dyn ProjectAccess>, jobs: JobManager) -> Self {
        Self {
            verifier,
            projects,
            jobs,
        }
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Analyze a file map. Requires `editor`.
    pub async fn start_analysis(
        &self,
        token: &str,
        project_id: &str,
        files: FileMap,
        mode: AnalysisMode,
    ) -> Result<StartResponse> {
        let identity = self.verifier.verify(token).await?;
        self.projects
            .assert_access(project_id, &identity.uid, Role::Editor)
            .await?;

        match mode {
            AnalysisMode::Fast => {
                let options = self.jobs.config().analysis.clone();
                let results = tokio::task::spawn_blocking(move || {
                    analyze_files_parallel(&files, &options, None)
                })
                .await
                .map_err(|e| EngineError::ExtractionFailure {
                    message: e.to_string(),
                })?;
                debug!(project = project_id, files = results.len(), "fast analysis");
                Ok(StartResponse::Analyses {
                    project_id: project_id.to_string(),
                    results,
                })
            }
            AnalysisMode::Full => {
                let job = self
                    .jobs
                    .enqueue(project_id, files, Some(identity.uid.clone()))
                    .await;
                info!(job = %job.id, project = project_id, uid = %identity.uid, "analysis queued");
                Ok(StartResponse::Job {
                    job_id: job.id,
                    status: job.status,
                })
            }
        }
    }

    /// Status of a job owned by the caller
    pub async fn status(&self, token: &str, job_id: &str) -> Result<JobView> {
        let identity = self.verifier.verify(token).await?;
        self.jobs
            .get_job_for_owner(job_id, &identity.uid)
            .await?
            .map(|job| job.view())
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }

    /// Push stream for a job of the project. Requires `viewer`.
    pub async fn subscribe(&self, token: &str, project_id: &str, job_id: &str) -> Result<JobStream> {
        let identity = self.verifier.verify(token).await?;
        self.projects
            .assert_access(project_id, &identity.uid, Role::Viewer)
            .await?;
        let job = self
            .jobs
            .get_job_for_owner(job_id, &identity.uid)
            .await?
            .filter(|job| job.project_id == project_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        self.jobs.watch(&job.id).await
    }

    /// Case-insensitive symbol and text search over a file map. Requires `viewer`.
    pub async fn search(
        &self,
        token: &str,
        project_id: &str,
        files: FileMap,
        query: &str,
    ) -> Result<Vec<SearchMatch>> {
        let identity = self.verifier.verify(token).await?;
        self.projects
            .assert_access(project_id, &identity.uid, Role::Viewer)
            .await?;

        let options = self.jobs.config().analysis.clone();
        let needle = query.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            let analyses = analyze_files_parallel(&files, &options, None);
            search_project(&analyses, &files, &needle)
        })
        .await
        .map_err(|e| EngineError::ExtractionFailure {
            message: e.to_string(),
        })?;
        debug!(project = project_id, hits = matches.len(), "search");
        Ok(matches)
    }

    /// Latest saved graph of a project. Requires `viewer`.
    pub async fn graph(&self, token: &str, project_id: &str) -> Result<FlowGraph> {
        let identity = self.verifier.verify(token).await?;
        self.projects
            .assert_access(project_id, &identity.uid, Role::Viewer)
            .await?;
        self.jobs.graph_store().latest(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::jobs::JobEvent;
    use crate::store::MemoryStore;

    fn gateway() -> JobGateway {
        let verifier = StaticTokenVerifier::new()
            .with_token("t-owner", "alice", "alice@example.com")
            .with_token("t-viewer", "bob", "bob@example.com")
            .with_token("t-outsider", "eve", "eve@example.com");
        let projects = MemoryProjects::new();
        projects.insert(Project::new("p1", "Demo", "alice").with_member("bob", Role::Viewer));
        let store = Arc::new(MemoryStore::new());
        let jobs = JobManager::new(store.clone(), store, EngineConfig::default());
        JobGateway::new(Arc::new(verifier), Arc::new(projects), jobs)
    }

    fn files() -> FileMap {
        let mut files = FileMap::new();
        files.insert("index.js".into(), "const x = 1;\n".into());
        files
    }

    #[test]
    fn test_role_order() {
        assert!(Role::Viewer < Role::Editor);
        assert!(Role::Editor < Role::Owner);
        let project = Project::new("p", "n", "alice").with_member("bob", Role::Editor);
        assert!(check_role(&project, "alice", Role::Owner).is_ok());
        assert!(check_role(&project, "bob", Role::Editor).is_ok());
        assert!(check_role(&project, "bob", Role::Owner).is_err());
        assert!(check_role(&project, "carol", Role::Viewer).is_err());
    }

    #[tokio::test]
    async fn test_rejections_are_distinct() {
        let gateway = gateway();
        let unauth = gateway
            .start_analysis("bogus", "p1", files(), AnalysisMode::Fast)
            .await
            .unwrap_err();
        assert!(matches!(unauth, EngineError::Unauthenticated(_)));

        let forbidden = gateway
            .start_analysis("t-viewer", "p1", files(), AnalysisMode::Fast)
            .await
            .unwrap_err();
        assert!(matches!(forbidden, EngineError::Forbidden(_)));

        let missing = gateway
            .start_analysis("t-owner", "nope", files(), AnalysisMode::Fast)
            .await
            .unwrap_err();
        assert!(matches!(missing, EngineError::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn test_search_needs_membership() {
        let gateway = gateway();
        let mut files = files();
        files.insert("lib/util.js".into(), "function formatDate(d) {\n  return d;\n}\n".into());

        let hits = gateway.search("t-viewer", "p1", files.clone(), "FORMAT").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "lib/util.js");
        assert_eq!(hits[0].kind, crate::search::MatchKind::Function);

        assert!(matches!(
            gateway.search("t-outsider", "p1", files, "format").await,
            Err(EngineError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_fast_mode_returns_analyses() {
        let gateway = gateway();
        let response = gateway
            .start_analysis("t-owner", "p1", files(), AnalysisMode::Fast)
            .await
            .unwrap();
        match response {
            StartResponse::Analyses { results, .. } => assert_eq!(results[0].path, "index.js"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_mode_returns_job_id_and_streams() {
        let gateway = gateway();
        let response = gateway
            .start_analysis("t-owner", "p1", files(), AnalysisMode::Full)
            .await
            .unwrap();
        let StartResponse::Job { job_id, status } = response else {
            panic!("expected a job");
        };
        assert_eq!(status, JobStatus::Queued);

        let json = serde_json::to_value(StartResponse::Job {
            job_id: job_id.clone(),
            status,
        })
        .unwrap();
        assert_eq!(json["jobId"], job_id.as_str());

        let mut stream = gateway.subscribe("t-owner", "p1", &job_id).await.unwrap();
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(JobEvent::Complete(ref v)) if v.status == JobStatus::Done));

        let view = gateway.status("t-owner", &job_id).await.unwrap();
        assert_eq!(view.progress, 100);
        assert!(matches!(
            gateway.status("t-viewer", &job_id).await,
            Err(EngineError::JobNotFound(_))
        ));
        assert!(!gateway.graph("t-viewer", "p1").await.unwrap().is_empty());
        assert!(gateway.graph("t-outsider", "p1").await.is_err());
    }
}
