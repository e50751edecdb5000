//! Logging setup: `flexi_logger` with `colored` terminal output and a panic
//! hook that logs the backtrace before chaining to the default hook.

use colored::Colorize;
use flexi_logger::{DeferredNow, FileSpec, Logger, LoggerHandle, Record, WriteMode};

/// Where, if anywhere, to additionally write log output.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub log_to_file: bool,
    pub log_file: Option<std::path::PathBuf>,
    pub file_color_log: bool,
}

fn log_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &Record<'_>,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "[{}] {} [{}:{}] {}",
        now.now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.level(),
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        record.args()
    )
}

fn color_log_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &Record<'_>,
) -> Result<(), std::io::Error> {
    let level = record.level();
    let colored_level = match level {
        log::Level::Error => level.to_string().red(),
        log::Level::Warn => level.to_string().yellow(),
        log::Level::Info => level.to_string().green(),
        log::Level::Debug => level.to_string().blue(),
        log::Level::Trace => level.to_string().normal(),
    };
    write!(
        w,
        "[{}] {} [{}:{}] {}",
        now.now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string().dimmed(),
        colored_level,
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        record.args()
    )
}

/// Set up `flexi_logger` and install a backtrace-logging panic hook. Default
/// level is overridable via `RIALTO_LOG`.
pub fn setup(opts: &LogOptions) -> LoggerHandle {
    let mut logger = Logger::try_with_env_or_str("warn")
        .expect("invalid RIALTO_LOG filter")
        .format(log_format)
        .adaptive_format_for_stderr(flexi_logger::AdaptiveFormat::Custom(
            log_format,
            color_log_format,
        ));

    if opts.log_to_file {
        let mut spec = FileSpec::default().suppress_timestamp();
        if let Some(path) = &opts.log_file {
            spec = spec.directory(path.parent().unwrap_or_else(|| std::path::Path::new(".")));
        }
        logger = logger
            .log_to_file(spec)
            .write_mode(WriteMode::BufferAndFlush)
            .duplicate_to_stderr(flexi_logger::Duplicate::All);
        if opts.file_color_log {
            logger = logger.format_for_files(color_log_format);
        } else {
            logger = logger.format_for_files(log_format);
        }
    }

    let handle = logger.start().expect("failed to start logger");

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        error!("panic: {info}\n{backtrace}");
        default_hook(info);
    }));

    handle
}
