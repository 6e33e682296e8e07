//! Initialization-time failures. Per the core's error handling design, these are the
//! only failures that ever propagate as `Result` — everything else (storage exhaustion,
//! stale handles, job/handler failures) is recovered locally and surfaced through
//! plain enums instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to spawn worker thread {index}: {source}")]
    WorkerSpawn { index: usize, source: std::io::Error },

    #[error("requested worker count {requested} exceeds the maximum of {max}")]
    TooManyWorkers { requested: usize, max: usize },
}
