//! Models of batch inference jobs: their identity, the tables of their
//! lifecycle, and the tasks they run. This crate performs no I/O.
mod id;
mod names;
mod tasks;

pub use id::{
    JobId, JobIdError, JobIdGenerator, DEFAULT_JOB_ID_WIDTH, MAX_JOB_ID_WIDTH, MIN_JOB_ID_WIDTH,
};
pub use names::{quote_ident, Job, NameError, Namespace, Stage, TableRef, DEFAULT_SCHEMA};
pub use tasks::{render_prompt, Task, UnknownTask, EVALUATION_TEMPLATE};
