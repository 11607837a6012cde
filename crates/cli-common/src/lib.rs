//! Contains helpers and things that are used by all of our rust executables.
mod logging;

pub use logging::{init_logging, LogArgs, LogFormat, LogLevel};
