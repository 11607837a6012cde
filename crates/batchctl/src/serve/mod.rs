use crate::{jobs::JobSummary, CliContext};
use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use batch_models::{JobId, Task};
use bytes::Bytes;
use error::{ApiError, ApiErrorExt};
use pipeline::{Driver, Evaluation, InputTable, JobOutput, ReadAs};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use warehouse::{Column, DELEGATED_TOKEN_HEADER};

mod error;

/// Largest accepted CSV upload.
const MAX_UPLOAD_BYTES: usize = 64 << 20;

#[derive(Debug, clap::Args)]
pub struct Serve {
    /// Port on which to serve the API.
    #[clap(long, default_value = "8080", env = "BATCHCTL_PORT")]
    port: u16,
    /// Identity under which job results are read. With `user`, requests for
    /// results must carry the user's token in the X-Forwarded-Access-Token header.
    #[clap(long, value_enum, default_value = "app")]
    read_as: Identity,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Identity {
    App,
    User,
}

impl Serve {
    pub async fn run(&self, ctx: &mut CliContext) -> anyhow::Result<()> {
        let read_as = match self.read_as {
            Identity::App => ReadAs::App,
            Identity::User => ReadAs::User,
        };
        let driver = ctx.driver(read_as)?;

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.port))
            .await
            .context("failed to bind server port")?;
        tracing::info!(addr = %listener.local_addr()?, ?read_as, "serving job API");

        axum::serve(listener, build_router(driver))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .context("serving job API")?;

        Ok(())
    }
}

struct App {
    driver: Driver,
    // Unbounded: submitted jobs are kept for the life of the process,
    // and are forgotten on restart.
    jobs: Mutex<HashMap<JobId, Entry>>,
}

#[derive(Clone)]
struct Entry {
    output: JobOutput,
    evaluation: Option<Evaluation>,
}

impl App {
    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, Entry>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn entry(&self, id: &str) -> Result<Entry, ApiError> {
        let id: JobId = id.parse().map_err(|err: batch_models::JobIdError| {
            err.with_status(StatusCode::BAD_REQUEST)
        })?;

        self.jobs()
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("job {id}")))
    }
}

/// Build the router of the job API.
pub fn build_router(driver: Driver) -> axum::Router<()> {
    use axum::routing::{get, post};

    let app = Arc::new(App {
        driver,
        jobs: Mutex::new(HashMap::new()),
    });

    axum::Router::new()
        .route("/healthz", get(healthz))
        .route("/jobs", post(submit_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/results", get(job_results))
        .route("/jobs/:id/evaluate", post(evaluate_job))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app)
}

#[derive(Debug, serde::Deserialize)]
struct SubmitParams {
    column: String,
    task: String,
}

#[derive(Debug, serde::Serialize)]
struct Results {
    job_id: JobId,
    table: String,
    columns: Vec<Column>,
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn submit_job(
    State(app): State<Arc<App>>,
    Query(params): Query<SubmitParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<JobSummary>), ApiError> {
    let task: Task = params
        .task
        .parse()
        .map_err(|err: batch_models::UnknownTask| err.with_status(StatusCode::BAD_REQUEST))?;
    let input = InputTable::from_csv(&body).map_err(pipeline::Error::from)?;

    let output = app.driver.submit(&input, &params.column, task).await?;
    let summary = JobSummary::new(&output, None);

    app.jobs().insert(
        output.job.id.clone(),
        Entry {
            output,
            evaluation: None,
        },
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_job(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    let entry = app.entry(&id)?;
    Ok(Json(JobSummary::new(
        &entry.output,
        entry.evaluation.as_ref(),
    )))
}

async fn job_results(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Results>, ApiError> {
    let Entry { output, .. } = app.entry(&id)?;
    let token = headers
        .get(DELEGATED_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    let result = app.driver.fetch(&output, token).await?;

    Ok(Json(Results {
        job_id: output.job.id.clone(),
        table: output.table().to_string(),
        rows: result.records().collect(),
        columns: result.columns,
    }))
}

async fn evaluate_job(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    let Entry { output, .. } = app.entry(&id)?;
    let evaluation = app.driver.evaluate(&output).await?;
    let summary = JobSummary::new(&output, Some(&evaluation));

    if let Some(entry) = app.jobs().get_mut(&output.job.id) {
        entry.evaluation = Some(evaluation);
    }
    Ok(Json(summary))
}
