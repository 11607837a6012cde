//! The batch inference pipeline: uploaded data is staged as a raw table,
//! a model is run over one of its columns to produce a processed table,
//! and the results may be fetched or evaluated into a further table.
//!
//! Every stage is a synchronous remote operation, triggered by the operator.
//! Nothing is retried, and nothing is rolled back.
mod driver;
pub mod input;
mod session;
pub mod statements;

pub use driver::{Driver, Evaluation, JobOutput, ReadAs, Settings, StagedJob, MODEL};
pub use input::{InputError, InputTable};
pub use session::Session;

use batch_models::{Job, JobId};

/// Step is an operation of the pipeline which issues remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ingest,
    Infer,
    Fetch,
    Evaluate,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::Ingest => "ingest",
            Step::Infer => "infer",
            Step::Fetch => "fetch",
            Step::Evaluate => "evaluate",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Uploaded data, or the selections made over it, are invalid.
    #[error(transparent)]
    Input(#[from] InputError),
    /// A remote operation of a stage failed.
    #[error("{step} of job {job_id} failed")]
    Remote {
        step: Step,
        job_id: JobId,
        #[source]
        source: warehouse::Error,
    },
    /// A delegated user identity is required but unavailable.
    #[error("not authorized to read as the requesting user")]
    Authorization(#[source] warehouse::Error),
}

impl Error {
    fn remote(step: Step, job: &Job, source: warehouse::Error) -> Self {
        tracing::warn!(%step, job_id = %job.id, error = %source, "remote operation failed");

        Error::Remote {
            step,
            job_id: job.id.clone(),
            source,
        }
    }
}
