//! Log setup for an assessment run
//!
//! Every run writes three files next to each other:
//!
//! ```text
//! <log_directory>/<target>_<YYYY_MM_DD>/<target>_assessment.log        all levels
//!                                       <target>_assessment_info.log   INFO and above
//!                                       <target>_assessment_error.log  ERROR only
//! ```
//!
//! A compact copy of INFO and above goes to stderr.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AssessmentConfig;

/// `timestamp - source - LEVEL - message`
struct AssessmentFormat;

impl<S, N> FormatEvent<S, N> for AssessmentFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{} - {} - {} - ",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            metadata.target(),
            metadata.level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// File-name friendly form of a target name: `/robot/driver` becomes `robot_driver`
pub fn target_stem(target_name: &str) -> String {
    target_name.trim_start_matches('/').replace('/', "_")
}

/// Directory that holds the logs of `config`'s target for `date`
pub fn log_directory_for(config: &AssessmentConfig, date: NaiveDate) -> PathBuf {
    let stem = target_stem(&config.target_name);
    config
        .log_directory
        .join(format!("{stem}_{}", date.format("%Y_%m_%d")))
}

/// The three open log files of one run
pub struct LogFiles {
    pub directory: PathBuf,
    all: File,
    info: File,
    error: File,
}

impl LogFiles {
    /// Create the log directory for today and open (append) its files
    pub fn open(config: &AssessmentConfig) -> Result<Self> {
        let directory = log_directory_for(config, Local::now().date_naive());
        fs::create_dir_all(&directory)
            .with_context(|| format!("failed to create {}", directory.display()))?;

        let stem = target_stem(&config.target_name);
        let open = |suffix: &str| -> Result<File> {
            let path = directory.join(format!("{stem}_assessment{suffix}.log"));
            open_append(&path)
        };

        Ok(Self {
            all: open("")?,
            info: open("_info")?,
            error: open("_error")?,
            directory,
        })
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn file_layer<S>(file: File, level: LevelFilter) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .event_format(AssessmentFormat)
        .with_filter(level)
}

/// Subscriber writing to `files` and stderr
pub fn subscriber(files: LogFiles) -> impl Subscriber + Send + Sync {
    let targets = filter::Targets::new().with_targets(vec![
        ("runtime_assessment", LevelFilter::TRACE),
        ("assessor", LevelFilter::TRACE),
    ]);

    tracing_subscriber::registry()
        .with(file_layer(files.all, LevelFilter::TRACE))
        .with(file_layer(files.info, LevelFilter::INFO))
        .with(file_layer(files.error, LevelFilter::ERROR))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false)
                .with_filter(LevelFilter::INFO),
        )
        .with(targets)
}

/// Install the global subscriber for `config`; returns the log directory
pub fn init(config: &AssessmentConfig) -> Result<PathBuf> {
    let files = LogFiles::open(config)?;
    let directory = files.directory.clone();

    subscriber(files)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(directory)
}
