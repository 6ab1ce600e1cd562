use crate::error::{CliError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_subscriber::{
    Layer,
    filter::LevelFilter,
    fmt::{self, time::ChronoLocal},
    prelude::*,
    registry::LookupSpan,
};

/// Timestamp format of the log file.
const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level_filter = if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(level_filter);

    let subscriber = tracing_subscriber::registry().with(stderr_layer);

    if let Some(path) = log_file {
        let file = open_log_file(&path)?;
        subscriber
            .with(file_layer(file).with_filter(LevelFilter::INFO.max(level_filter)))
            .init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Opens the log file for appending so consecutive runs share one history.
fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(CliError::Io)
}

fn file_layer<S>(file: File) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
        .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .boxed()
}
