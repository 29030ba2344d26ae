//! Parallel per-file analysis

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use super::FileMap;
use crate::config::AnalysisConfig;
use crate::extract::{analyze_file, FileAnalysis};

/// Called with `(done, total)` after each file
pub type AnalysisProgressCallback<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Analyze every file of `files`, in parallel when `options.parallel` is set.
/// Results come back in path order regardless of scheduling.
pub fn analyze_files_parallel(
    files: &FileMap,
    options: &AnalysisConfig,
    progress: Option<AnalysisProgressCallback<'_>>,
) -> Vec<FileAnalysis> {
    let total = files.len();
    let done = AtomicUsize::new(0);

    let run = |(path, text): (&String, &String)| {
        let analysis = analyze_file(path, text, options);
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(callback) = progress {
            callback(finished, total);
        }
        analysis
    };

    if options.parallel {
        let entries: Vec<(&String, &String)> = files.iter().collect();
        entries.into_par_iter().map(run).collect()
    } else {
        files.iter().map(run).collect()
    }
}
