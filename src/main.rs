//! codeflow CLI entry point

use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codeflow_engine::cli::{Cli, Command, OutputFormat};
use codeflow_engine::impact::{attach_impact, build_file_tree, build_impact_map, DiskTree};
use codeflow_engine::indexing::{analyze_files_parallel, load_project};
use codeflow_engine::jobs::{JobEvent, JobManager};
use codeflow_engine::store::{FsStore, GraphStore, JobStore};
use codeflow_engine::{analyze_file, search_project, EngineConfig, EngineError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            match err.downcast_ref::<EngineError>() {
                Some(engine) => engine.exit_code(),
                None => ExitCode::FAILURE,
            }
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("codeflow_engine=debug,codeflow=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codeflow_engine=info"))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn run(cli: Cli) -> Result<String> {
    let config = EngineConfig::load(cli.config.as_deref())?;
    let format = cli.format;

    match cli.command {
        Command::Analyze { file } => {
            if !file.is_file() {
                return Err(EngineError::FileNotFound {
                    path: file.display().to_string(),
                }
                .into());
            }
            let source = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let analysis = analyze_file(&file.to_string_lossy(), &source, &config.analysis);
            Ok(format.render(&analysis)?)
        }

        Command::Project {
            dir,
            full,
            project_id,
            ext,
        } => {
            let files = load_project(&dir, &ext)?;
            if full {
                let project_id = project_id.unwrap_or_else(|| default_project_id(&dir));
                run_full(&config, &project_id, files, format).await
            } else {
                let analyses = analyze_files_parallel(&files, &config.analysis, None);
                let impact = build_impact_map(&analyses, &DiskTree::new(&dir), &config.resolve.extensions);
                let mut tree = build_file_tree(&analyses);
                attach_impact(&mut tree, &impact);
                Ok(format.render(&tree)?)
            }
        }

        Command::Impact { dir } => {
            let files = load_project(&dir, &[])?;
            let analyses = analyze_files_parallel(&files, &config.analysis, None);
            let impact = build_impact_map(&analyses, &DiskTree::new(&dir), &config.resolve.extensions);
            debug!(edges = impact.edge_count(), "impact map built");
            Ok(format.render(&impact)?)
        }

        Command::Search { dir, query, ext } => {
            let files = load_project(&dir, &ext)?;
            let analyses = analyze_files_parallel(&files, &config.analysis, None);
            let matches = search_project(&analyses, &files, &query);
            debug!(hits = matches.len(), "search finished");
            Ok(format.render(&matches)?)
        }

        Command::Jobs { project_id } => {
            let manager = open_manager(&config)?;
            let jobs = manager.list_jobs(&project_id, None).await?;
            let views: Vec<_> = jobs.iter().map(|job| job.view()).collect();
            Ok(format.render(&views)?)
        }

        Command::Status { job_id } => {
            let manager = open_manager(&config)?;
            let job = manager
                .get_job(&job_id)
                .await?
                .ok_or(EngineError::JobNotFound(job_id))?;
            Ok(format.render(&job.view())?)
        }

        Command::Graph { project_id } => {
            let store = open_store(&config)?;
            Ok(format.render(&store.latest(&project_id).await?)?)
        }

        Command::Graphs { limit } => {
            let store = open_store(&config)?;
            Ok(format.render(&store.list(limit).await?)?)
        }

        Command::Prune { days } => {
            let store = open_store(&config)?;
            let days = days.unwrap_or(config.jobs.retention_days);
            let removed = store.delete_older_than(days).await?;
            Ok(format!("Pruned {} job(s) older than {} day(s)", removed, days))
        }
    }
}

fn open_store(config: &EngineConfig) -> Result<Arc<FsStore>> {
    let dir = config.store.resolved_dir();
    let store = FsStore::open(&dir).with_context(|| format!("opening store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn open_manager(config: &EngineConfig) -> Result<JobManager> {
    let store = open_store(config)?;
    Ok(JobManager::new(store.clone(), store, config.clone()))
}

fn default_project_id(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "project".to_string())
}

/// Run a job in the background and follow it with a progress bar
async fn run_full(
    config: &EngineConfig,
    project_id: &str,
    files: codeflow_engine::indexing::FileMap,
    format: OutputFormat,
) -> Result<String> {
    let manager = open_manager(config)?;
    let job = manager.enqueue(project_id, files, None).await;
    let mut events = manager.watch(&job.id).await?;

    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
        bar.set_style(style);
    }

    let mut last = job.view();
    while let Some(event) = events.next().await {
        match event {
            JobEvent::Update(view) => {
                bar.set_position(u64::from(view.progress));
                bar.set_message(view.message.clone());
                last = view;
            }
            JobEvent::Complete(view) => {
                bar.finish_with_message(view.message.clone());
                last = view;
            }
            JobEvent::Heartbeat => bar.tick(),
        }
    }

    if let Some(error) = &last.error {
        return Err(anyhow::anyhow!("job {} failed: {}", last.id, error));
    }
    Ok(format.render(&last)?)
}
