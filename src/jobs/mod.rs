//! Asynchronous full-project analysis jobs
//!
//! A job walks `queued → running → done | error`, or is cancelled from
//! `queued`/`running`. While running it reports fixed checkpoints:
//!
//! | Stage            | Progress              | Message                        |
//! |------------------|-----------------------|--------------------------------|
//! | start            | 2                     | `Analyzing files (1/4)`        |
//! | after file i/n   | round(2 + i/n · 50)   | `Analyzing file i/n: <path>`   |
//! | merge            | 60                    | `Merging file graphs (2/4)`    |
//! | enrich           | 80                    | `Enriching semantics (3/4)`    |
//! | persist          | 95                    | `Saving graph (4/4)`           |
//! | done             | 100                   | `Completed`                    |
//!
//! Observers either hold a [`Subscription`] / [`JobStream`] fed by pushes, or
//! poll through [`JobManager::poll`]; both yield the same [`JobEvent`]s.

mod job;
mod manager;
mod stream;

pub use job::{
    file_progress, FileFailure, Job, JobResult, JobStateMachine, JobStatus, JobView,
    ERR_INTERRUPTED,
};
pub use manager::JobManager;
pub use stream::{EventGate, JobEvent, JobStream, Subscription};
