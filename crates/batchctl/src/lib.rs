use anyhow::Context;
use batch_models::{JobIdGenerator, Namespace, DEFAULT_JOB_ID_WIDTH, DEFAULT_SCHEMA};
use pipeline::{Driver, ReadAs};
use std::sync::Arc;
use warehouse::{Connector, Credential, Volume};

mod config;
mod jobs;
mod output;
pub mod serve;

use output::{Output, OutputType};

/// A command-line tool for running batch LLM inference jobs over uploaded
/// CSV data, on a remote SQL warehouse.
#[derive(Debug, clap::Parser)]
#[clap(author, about, version)]
pub struct Cli {
    /// Configuration profile to use.
    ///
    /// Each profile remembers the output of its most recent submission,
    /// which is the target of `fetch` and `evaluate`.
    #[clap(long, default_value = "default", env = "BATCHCTL_PROFILE")]
    profile: String,

    #[clap(subcommand)]
    cmd: Command,

    #[clap(flatten)]
    output: Output,

    #[clap(flatten)]
    pub log_args: cli_common::LogArgs,

    #[clap(flatten)]
    warehouse: WarehouseArgs,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Upload a CSV file and run a batch inference task over one of its columns.
    ///
    /// The file is staged as a new raw table, and the model's response to each
    /// row is written into a new processed table. On success, the job becomes
    /// the current job of the profile.
    Submit(jobs::Submit),
    /// Print the inference results of the current job.
    Fetch(jobs::Fetch),
    /// Ask the model to evaluate each inference result of the current job.
    Evaluate(jobs::Evaluate),
    /// Print the current job of the profile, if any.
    Status(jobs::Status),
    /// Serve the job API over HTTP.
    Serve(serve::Serve),
}

/// Arguments which locate and authorize the remote SQL warehouse.
#[derive(Debug, Clone, clap::Args)]
pub struct WarehouseArgs {
    /// Hostname of the workspace, like `example.cloud.databricks.com`.
    #[clap(long, env = "DATABRICKS_SERVER_HOSTNAME", global = true)]
    server_hostname: Option<String>,
    /// HTTP path of the SQL warehouse, like `/sql/1.0/warehouses/<id>`.
    #[clap(long, env = "DATABRICKS_SQL_ENDPOINT", global = true)]
    sql_endpoint: Option<String>,
    /// Static access token of the app identity.
    #[clap(long, env = "DATABRICKS_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
    /// OAuth client ID of the app identity. Requires --client-secret.
    #[clap(long, env = "DATABRICKS_CLIENT_ID", global = true)]
    client_id: Option<String>,
    /// OAuth client secret of the app identity.
    #[clap(
        long,
        env = "DATABRICKS_CLIENT_SECRET",
        hide_env_values = true,
        global = true
    )]
    client_secret: Option<String>,
    /// Volume into which uploaded files are staged, like `/Volumes/<catalog>/<schema>/<volume>`.
    #[clap(long, env = "DATABRICKS_VOLUME", global = true)]
    volume: Option<String>,
    /// Catalog of staged tables. If unset, the warehouse default is used.
    #[clap(long, env = "BATCHCTL_CATALOG", global = true)]
    catalog: Option<String>,
    /// Schema of staged tables.
    #[clap(long, env = "BATCHCTL_SCHEMA", default_value = DEFAULT_SCHEMA, global = true)]
    schema: String,
    /// Number of hex characters in generated job IDs.
    #[clap(long, default_value_t = DEFAULT_JOB_ID_WIDTH, global = true)]
    job_id_width: usize,
    /// Time for which a statement submission waits for completion
    /// before it's polled.
    #[clap(long, default_value = "30s", global = true)]
    wait_timeout: humantime::Duration,
    /// Interval between polls of a running statement.
    #[clap(long, default_value = "1s", global = true)]
    poll_interval: humantime::Duration,
}

impl WarehouseArgs {
    /// Build a Driver which reads results as `read_as`.
    /// Every setting is validated here, before any remote call is made.
    pub fn driver(&self, read_as: ReadAs) -> anyhow::Result<Driver> {
        let server_hostname = self
            .server_hostname
            .as_deref()
            .context("missing --server-hostname (or DATABRICKS_SERVER_HOSTNAME)")?;
        let sql_endpoint = self
            .sql_endpoint
            .as_deref()
            .context("missing --sql-endpoint (or DATABRICKS_SQL_ENDPOINT)")?;
        let volume = self
            .volume
            .as_deref()
            .context("missing --volume (or DATABRICKS_VOLUME)")?;

        let mut settings = warehouse::Settings::new(server_hostname, sql_endpoint)?;
        settings.wait_timeout = *self.wait_timeout;
        settings.poll_interval = *self.poll_interval;

        let credential = Credential::app(
            self.token.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
        )?;
        let namespace = Namespace::new(self.catalog.as_deref(), &self.schema)?;
        let volume = Volume::parse(volume)?;
        let ids = JobIdGenerator::new(self.job_id_width)?;

        let connector = Connector::new(settings, credential)?;

        Ok(Driver::new(
            Arc::new(connector),
            pipeline::Settings::new(namespace, volume, read_as),
            ids,
        ))
    }
}

#[derive(Debug)]
pub struct CliContext {
    config: config::Config,
    output: output::Output,
    warehouse: WarehouseArgs,
}

impl CliContext {
    pub fn config_mut(&mut self) -> &mut config::Config {
        &mut self.config
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }

    pub fn driver(&self, read_as: ReadAs) -> anyhow::Result<Driver> {
        self.warehouse
            .driver(read_as)
            .context("invalid warehouse configuration")
    }

    pub fn write_all<I, T>(&mut self, items: I, table_alt: T::TableAlt) -> anyhow::Result<()>
    where
        T: output::CliOutput,
        I: IntoIterator<Item = T>,
    {
        match self.get_output_type() {
            OutputType::Json => output::print_json(items),
            OutputType::Yaml => output::print_yaml(items),
            OutputType::Table => output::print_table(table_alt, items),
        }
    }

    pub fn get_output_type(&mut self) -> OutputType {
        use crossterm::tty::IsTty;

        if let Some(ty) = self.output.output {
            ty
        } else if std::io::stdout().is_tty() {
            OutputType::Table
        } else {
            OutputType::Json
        }
    }
}

impl Cli {
    pub async fn run(&self) -> anyhow::Result<()> {
        let config = config::Config::load(&self.profile)?;
        let mut context = CliContext {
            config,
            output: self.output.clone(),
            warehouse: self.warehouse.clone(),
        };

        let result = match &self.cmd {
            Command::Submit(submit) => submit.run(&mut context).await,
            Command::Fetch(fetch) => fetch.run(&mut context).await,
            Command::Evaluate(evaluate) => evaluate.run(&mut context).await,
            Command::Status(status) => status.run(&mut context).await,
            Command::Serve(serve) => serve.run(&mut context).await,
        };

        // The session is written back even if the command failed,
        // as a failed remote submission clears the current job.
        context.config().write(&self.profile)?;

        result
    }
}

fn new_table(headers: Vec<&str>) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .apply_modifier(comfy_table::modifiers::UTF8_SOLID_INNER_BORDERS);

    table.set_header(headers);
    table
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("batchctl").chain(args.iter().copied())).unwrap()
    }

    const VALID: &[(&str, &str)] = &[
        ("--server-hostname", "example.cloud.databricks.com"),
        ("--sql-endpoint", "/sql/1.0/warehouses/abc123"),
        ("--token", "secret"),
        ("--volume", "/Volumes/main/tmp/uploads"),
    ];

    // Arguments of `status` with valid warehouse settings, overridden by `extra` pairs.
    fn with<'a>(extra: &[(&'a str, &'a str)]) -> Vec<&'a str> {
        let mut args = vec!["status"];
        for (flag, value) in VALID {
            if !extra.iter().any(|(f, _)| f == flag) {
                args.extend([*flag, *value]);
            }
        }
        for (flag, value) in extra {
            args.extend([*flag, *value]);
        }
        args
    }

    #[test]
    fn test_valid_settings_build_a_driver() {
        let cli = parse(&with(&[("--schema", "staging"), ("--job-id-width", "12")]));
        let driver = cli.warehouse.driver(ReadAs::App).unwrap();

        assert_eq!(driver.settings().namespace.schema(), "staging");
        assert_eq!(driver.new_job().id.width(), 12);
        assert_eq!(driver.settings().volume.as_str(), "/Volumes/main/tmp/uploads");
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let cases = [
            (("--schema", "tmp; DROP"), "schema"),
            (("--catalog", "a.b"), "catalog"),
            (("--job-id-width", "4"), "job id width"),
            (("--client-id", "id"), "mutually exclusive"),
            (("--sql-endpoint", "/sql/1.0/nope"), "warehouses"),
            (("--volume", "/tmp/uploads"), "/Volumes/"),
        ];

        for (extra, expect) in cases {
            let cli = parse(&with(&[extra]));
            let err = cli.warehouse.driver(ReadAs::App).unwrap_err();
            let err = format!("{err:#}");
            assert!(err.contains(expect), "{extra:?}: {err}");
        }
    }

    #[test]
    fn test_missing_settings_are_named() {
        let cli = parse(&["status"]);
        let err = cli.warehouse.driver(ReadAs::App).unwrap_err();
        assert!(err.to_string().contains("--server-hostname"), "{err}");
    }

    #[test]
    fn test_submit_args() {
        let cli = parse(&[
            "submit",
            "--file",
            "data.csv",
            "--column",
            "text",
            "--task",
            "Sentiment Analysis",
        ]);
        assert!(matches!(cli.cmd, Command::Submit(_)));

        assert!(Cli::try_parse_from([
            "batchctl", "submit", "--file", "x.csv", "--column", "text", "--task", "translate",
        ])
        .is_err());
    }
}
