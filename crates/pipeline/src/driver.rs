use crate::{
    input::{resolve_column, InputTable},
    statements, Error, InputError, Step,
};
use batch_models::{Job, JobIdGenerator, Namespace, TableRef, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warehouse::{Connect, Credential, ResultSet, Volume, Warehouse};

/// Model which serves every inference of the pipeline.
pub const MODEL: &str = "databricks-meta-llama-3-3-70b-instruct";

/// Identity under which job results are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadAs {
    /// Read with the app's own privileged identity.
    App,
    /// Read as the requesting user, through a delegated access token.
    User,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Catalog and schema of staged tables.
    pub namespace: Namespace,
    /// Volume into which uploads are staged.
    pub volume: Volume,
    /// Identity under which results are fetched.
    pub read_as: ReadAs,
    pub model: String,
}

impl Settings {
    pub fn new(namespace: Namespace, volume: Volume, read_as: ReadAs) -> Self {
        Self {
            namespace,
            volume,
            read_as,
            model: MODEL.to_string(),
        }
    }
}

/// StagedJob is a Job whose input has been staged as its raw table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedJob {
    pub job: Job,
    /// Path of the staged upload within its volume.
    pub source_path: String,
    /// Columns of the raw table.
    pub columns: Vec<String>,
    pub rows: usize,
}

/// JobOutput is the handle of a job whose inference table was created.
/// It's threaded into the fetch and evaluate stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub job: Job,
    pub task: Task,
    pub column: String,
}

impl JobOutput {
    /// The table holding inference results.
    pub fn table(&self) -> &TableRef {
        &self.job.processed
    }
}

/// Evaluation is the handle of a job whose evaluation table was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub source: TableRef,
    pub table: TableRef,
}

/// Driver sequences the remote operations of each pipeline stage.
/// Stages are never retried, and a failure leaves previously created
/// tables in place.
pub struct Driver {
    connect: Arc<dyn Connect>,
    settings: Settings,
    ids: JobIdGenerator,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("settings", &self.settings)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl Driver {
    pub fn new(connect: Arc<dyn Connect>, settings: Settings, ids: JobIdGenerator) -> Self {
        Self {
            connect,
            settings,
            ids,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mint a new Job having a fresh id.
    pub fn new_job(&self) -> Job {
        Job::new(self.ids.next(), &self.settings.namespace)
    }

    /// Check that `column` of `input` may be submitted, returning its
    /// canonical name. No remote call is made.
    pub fn check_input<'i>(
        &self,
        input: &'i InputTable,
        column: &str,
    ) -> Result<&'i str, InputError> {
        check_reserved(input.columns())?;
        input.require_column(column)
    }

    /// Submit `input` for `task` over `column`, as a new job.
    /// The input is validated before any remote call is made.
    pub async fn submit(
        &self,
        input: &InputTable,
        column: &str,
        task: Task,
    ) -> Result<JobOutput, Error> {
        let column = self.check_input(input, column)?.to_string();
        let job = self.new_job();

        tracing::info!(job_id = %job.id, %task, %column, rows = input.rows().len(), "submitting job");

        let staged = self.ingest(job, input).await?;
        self.infer(&staged, &column, task).await
    }

    /// Stage `input` as the raw table of `job`.
    #[tracing::instrument(skip_all, fields(job_id = %job.id, table = %job.raw))]
    pub async fn ingest(&self, job: Job, input: &InputTable) -> Result<StagedJob, Error> {
        let body = input.to_csv()?;
        let source_path = self.settings.volume.file(&job.upload_file_name());
        let app = self.connect.app();

        app.upload(&source_path, body.into())
            .await
            .map_err(|err| Error::remote(Step::Ingest, &job, err))?;

        app.execute(&statements::stage_raw(&job.raw, &source_path))
            .await
            .map_err(|err| Error::remote(Step::Ingest, &job, err))?;

        tracing::info!(%source_path, "staged raw table");

        Ok(StagedJob {
            source_path,
            columns: input.columns().to_vec(),
            rows: input.rows().len(),
            job,
        })
    }

    /// Create the processed table of `staged`, by running `task` over `column`.
    #[tracing::instrument(skip_all, fields(job_id = %staged.job.id, table = %staged.job.processed))]
    pub async fn infer(
        &self,
        staged: &StagedJob,
        column: &str,
        task: Task,
    ) -> Result<JobOutput, Error> {
        let column = check_column(&staged.columns, column)?;
        let job = &staged.job;

        let statement = statements::infer(
            &job.processed,
            &job.raw,
            &self.settings.model,
            task.template(),
            column,
        );
        self.connect
            .app()
            .execute(&statement)
            .await
            .map_err(|err| Error::remote(Step::Infer, job, err))?;

        tracing::info!(%task, %column, "created processed table");

        Ok(JobOutput {
            job: job.clone(),
            task,
            column: column.to_string(),
        })
    }

    /// Read the inference results of `output`.
    /// When reading as the user, `delegated_token` must be present and no
    /// remote call is made without it.
    #[tracing::instrument(skip_all, fields(job_id = %output.job.id, table = %output.table(), read_as = ?self.settings.read_as))]
    pub async fn fetch(
        &self,
        output: &JobOutput,
        delegated_token: Option<&str>,
    ) -> Result<ResultSet, Error> {
        let reader = self.reader(delegated_token)?;

        let result = reader
            .query(&statements::fetch(output.table()))
            .await
            .map_err(|err| match self.settings.read_as {
                // The engine rejected the delegated user's credential.
                ReadAs::User if err.is_authorization() => Error::Authorization(err),
                _ => Error::remote(Step::Fetch, &output.job, err),
            })?;

        tracing::info!(rows = result.rows.len(), "fetched results");
        Ok(result)
    }

    /// Create the evaluated table of `output`.
    #[tracing::instrument(skip_all, fields(job_id = %output.job.id, table = %output.job.evaluated))]
    pub async fn evaluate(&self, output: &JobOutput) -> Result<Evaluation, Error> {
        let job = &output.job;
        let statement = statements::evaluate(&job.evaluated, output.table(), &self.settings.model);

        self.connect
            .app()
            .execute(&statement)
            .await
            .map_err(|err| Error::remote(Step::Evaluate, job, err))?;

        tracing::info!("created evaluated table");

        Ok(Evaluation {
            source: output.table().clone(),
            table: job.evaluated.clone(),
        })
    }

    fn reader(&self, delegated_token: Option<&str>) -> Result<Arc<dyn Warehouse>, Error> {
        match self.settings.read_as {
            ReadAs::App => Ok(self.connect.app()),
            ReadAs::User => {
                let credential =
                    Credential::delegated(delegated_token).map_err(Error::Authorization)?;
                Ok(self.connect.delegated(credential))
            }
        }
    }
}

// Reject columns which collide with those added by the pipeline.
fn check_reserved(columns: &[String]) -> Result<(), InputError> {
    let reserved = [statements::RESULT_COLUMN, statements::EVALUATION_COLUMN];
    match columns
        .iter()
        .find(|c| reserved.iter().any(|r| c.eq_ignore_ascii_case(r)))
    {
        Some(taken) => Err(InputError::ReservedColumn(taken.clone())),
        None => Ok(()),
    }
}

// Resolve `column` among `columns`, rejecting reserved columns.
fn check_column<'c>(columns: &'c [String], column: &str) -> Result<&'c str, InputError> {
    check_reserved(columns)?;
    resolve_column(columns, column)
}
