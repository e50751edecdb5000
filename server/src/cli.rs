use std::path::PathBuf;

use clap::{builder::ArgPredicate, ArgAction, Parser};

#[derive(Parser, Debug)]
#[clap(name = "rialto-server", author, version, about, long_about = None)]
pub struct Args {
    /// Override the config file's socket path.
    #[arg(long, env = "RIALTO_SOCKET_PATH")]
    pub socket_path: Option<PathBuf>,

    /// Path to the config file; defaults to the platform config dir.
    #[arg(long, env = "RIALTO_CONFIG")]
    pub config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub log_options: LogOptions,
}

const DEFAULT_LOGFILE_FILENAME: &str = "rialto-server.log";

#[derive(Debug, Parser, Clone, PartialEq)]
pub struct LogOptions {
    /// Enable logging to a file, automatically enabled if `log-file` is
    /// manually set.
    #[arg(
        long = "log-to-file",
        env = "RIALTO_LOGTOFILE",
        default_value_if("log_file", ArgPredicate::IsPresent, "true"),
        action = ArgAction::Set,
        default_value_t = false,
        default_missing_value = "true",
        num_args = 0..=1,
        require_equals = true,
    )]
    pub log_to_file: bool,

    #[arg(long = "log-file", default_value_os_t = default_logfile_path(), env = "RIALTO_LOGFILE")]
    pub log_file: PathBuf,

    /// Use colored logging for files. Example: live tailing via `tail -f`.
    #[arg(long = "log-filecolor", env = "RIALTO_LOGFILE_COLOR")]
    pub file_color_log: bool,
}

fn default_logfile_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_LOGFILE_FILENAME)
}

impl From<&LogOptions> for rialto_common::logging::LogOptions {
    fn from(value: &LogOptions) -> Self {
        Self {
            log_to_file: value.log_to_file,
            log_file: Some(value.log_file.clone()),
            file_color_log: value.file_color_log,
        }
    }
}
