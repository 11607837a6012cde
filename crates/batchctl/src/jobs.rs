use crate::{output, CliContext};
use anyhow::Context;
use batch_models::{JobId, Task};
use pipeline::{Evaluation, InputTable, JobOutput, ReadAs};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct Submit {
    /// Path of the CSV file to upload. Its first row must be a header.
    #[clap(long)]
    file: PathBuf,
    /// Column of the file to run the task over.
    #[clap(long)]
    column: String,
    /// Task to run, like `summarization` or `"Sentiment Analysis"`.
    #[clap(long)]
    task: Task,
    /// Number of input rows to preview before submitting.
    #[clap(long, default_value = "5")]
    preview: usize,
}

#[derive(Debug, clap::Args)]
pub struct Fetch {
    /// Access token of the requesting user. When given, results are read
    /// as that user rather than as the app.
    #[clap(long, env = "BATCHCTL_USER_TOKEN", hide_env_values = true)]
    user_token: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct Evaluate {}

#[derive(Debug, clap::Args)]
pub struct Status {}

/// JobSummary is the printed form of a job and its tables.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub task: Task,
    pub column: String,
    pub raw_table: String,
    pub processed_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated_table: Option<String>,
}

impl JobSummary {
    pub fn new(output: &JobOutput, evaluation: Option<&Evaluation>) -> Self {
        Self {
            job_id: output.job.id.clone(),
            task: output.task,
            column: output.column.clone(),
            raw_table: output.job.raw.to_string(),
            processed_table: output.table().to_string(),
            evaluated_table: evaluation.map(|e| e.table.to_string()),
        }
    }
}

impl output::CliOutput for JobSummary {
    type TableAlt = ();
    type CellValue = String;

    fn table_headers(_alt: Self::TableAlt) -> Vec<&'static str> {
        vec![
            "Job ID",
            "Task",
            "Column",
            "Raw Table",
            "Processed Table",
            "Evaluated Table",
        ]
    }

    fn into_table_row(self, _alt: Self::TableAlt) -> Vec<Self::CellValue> {
        vec![
            self.job_id.to_string(),
            self.task.to_string(),
            self.column,
            self.raw_table,
            self.processed_table,
            self.evaluated_table.unwrap_or_default(),
        ]
    }
}

const NO_OUTPUT: &str = "no output table: run `batchctl submit` first";

impl Submit {
    pub async fn run(&self, ctx: &mut CliContext) -> anyhow::Result<()> {
        let bytes = std::fs::read(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;
        let input = InputTable::from_csv(&bytes)
            .with_context(|| format!("failed to load {}", self.file.display()))?;

        output::print_preview(
            input.columns(),
            input.preview(self.preview),
            input.rows().len(),
        )?;

        let driver = ctx.driver(ReadAs::App)?;
        let output = ctx
            .config_mut()
            .session
            .submit(&driver, &input, &self.column, self.task)
            .await
            .context("job submission failed")?
            .clone();

        ctx.write_all([JobSummary::new(&output, None)], ())
    }
}

impl Fetch {
    pub async fn run(&self, ctx: &mut CliContext) -> anyhow::Result<()> {
        if ctx.config().session.output().is_none() {
            eprintln!("{NO_OUTPUT}");
            return Ok(());
        }
        let read_as = match self.user_token {
            Some(_) => ReadAs::User,
            None => ReadAs::App,
        };
        let driver = ctx.driver(read_as)?;

        let result = ctx
            .config()
            .session
            .fetch(&driver, self.user_token.as_deref())
            .await
            .context("failed to fetch results")?;

        match result {
            Some(result) => output::print_result_set(ctx.get_output_type(), &result),
            None => {
                eprintln!("{NO_OUTPUT}");
                Ok(())
            }
        }
    }
}

impl Evaluate {
    pub async fn run(&self, ctx: &mut CliContext) -> anyhow::Result<()> {
        if ctx.config().session.output().is_none() {
            eprintln!("{NO_OUTPUT}");
            return Ok(());
        }
        let driver = ctx.driver(ReadAs::App)?;
        let session = &mut ctx.config_mut().session;

        if session
            .evaluate(&driver)
            .await
            .context("evaluation failed")?
            .is_none()
        {
            eprintln!("{NO_OUTPUT}");
            return Ok(());
        }
        print_session(ctx)
    }
}

impl Status {
    pub async fn run(&self, ctx: &mut CliContext) -> anyhow::Result<()> {
        if ctx.config().session.output().is_none() {
            eprintln!("{NO_OUTPUT}");
            return Ok(());
        }
        print_session(ctx)
    }
}

fn print_session(ctx: &mut CliContext) -> anyhow::Result<()> {
    let session = &ctx.config().session;
    let summary = session
        .output()
        .map(|output| JobSummary::new(output, session.evaluation()));

    ctx.write_all(summary, ())
}
