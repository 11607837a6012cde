use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Arguments which configure the logging of an executable.
#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// The log verbosity. Directives of the RUST_LOG environment variable,
    /// if set, take precedence.
    #[clap(
        long = "log.level",
        default_value = "warn",
        env = "LOG_LEVEL",
        value_enum,
        global = true
    )]
    pub level: LogLevel,
    /// The format of logs written to stderr. If unset, logs are formatted
    /// for humans when stderr is a terminal, and as JSON otherwise.
    #[clap(long = "log.format", env = "LOG_FORMAT", value_enum, global = true)]
    pub format: Option<LogFormat>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Newline-delimited JSON records.
    Json,
    /// Human-readable text.
    Text,
    /// Human-readable text, without ANSI colors.
    Plain,
}

impl LogArgs {
    fn resolved_format(&self) -> LogFormat {
        match self.format {
            Some(format) => format,
            None if atty::is(atty::Stream::Stderr) => LogFormat::Text,
            None => LogFormat::Json,
        }
    }
}

/// Initialize the global tracing subscriber. Logs are always written to
/// stderr, leaving stdout for the output of commands.
/// Panics if a global subscriber was already installed.
pub fn init_logging(args: &LogArgs) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(args.level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match args.resolved_format() {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .init(),
        LogFormat::Text => builder.with_ansi(true).init(),
        LogFormat::Plain => builder.with_ansi(false).init(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[derive(Debug, clap::Parser)]
    struct Args {
        #[clap(flatten)]
        log: LogArgs,
    }

    #[test]
    fn test_log_args() {
        let args = Args::parse_from(["test"]);
        assert_eq!(args.log.level, LogLevel::Warn);

        let args = Args::parse_from(["test", "--log.level", "debug", "--log.format", "json"]);
        assert_eq!(args.log.level, LogLevel::Debug);
        assert_eq!(args.log.format, Some(LogFormat::Json));
        assert_eq!(args.log.resolved_format(), LogFormat::Json);
        assert_eq!(LevelFilter::from(args.log.level), LevelFilter::DEBUG);
    }
}
