// Logging setup: console output plus a plain text log file in the data directory

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{level_filter, parse_level, Configuration};

/// Log files above this size are archived when a session starts
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Tracing layer that appends formatted events to a log file
pub struct FileLayer {
    file: Mutex<File>,
    /// Most verbose level written
    max_level: Level,
}

impl FileLayer {
    pub fn new(file: File, max_level: Level) -> Self {
        Self {
            file: Mutex::new(file),
            max_level,
        }
    }
}

impl<S> Layer<S> for FileLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.level() > &self.max_level {
            return;
        }

        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let line = format!(
            "{} [{}] {}: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            metadata.level(),
            metadata.target(),
            message
        );

        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

/// Visitor to extract message field from tracing events
struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{:?}", value);
        } else if self.0.is_empty() {
            *self.0 = format!("{}: {:?}", field.name(), value);
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.0 = value.to_string();
        } else if self.0.is_empty() {
            *self.0 = format!("{}: {}", field.name(), value);
        } else {
            self.0.push_str(&format!(" {}={}", field.name(), value));
        }
    }
}

/// Name an oversized log file is moved to: `<stem>-<timestamp><ext>`
fn archive_path(path: &Path, timestamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}-{}", stem, timestamp),
    };
    path.with_file_name(name)
}

/// Open the log file for appending, archiving it first if it grew too large
pub fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.is_file() && meta.len() > MAX_LOG_SIZE {
            let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();
            std::fs::rename(path, archive_path(path, &timestamp))?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn tracing_level(level: u8) -> Level {
    match level {
        10 => Level::DEBUG,
        20 => Level::INFO,
        40 | 50 => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Initialise console and file logging from the configuration
///
/// `RUST_LOG` overrides the configured console level.
pub fn init(config: &Configuration) {
    let level = config
        .logging_level()
        .ok()
        .and_then(parse_level)
        .unwrap_or(30);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("batch_apps={}", level_filter(level))));

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    let file_layer = config.log_file().and_then(|path| match open_log_file(&path) {
        Ok(file) => Some(FileLayer::new(file, tracing_level(level)).with_filter(
            tracing_subscriber::filter::filter_fn(|meta| meta.target().starts_with("batch_apps")),
        )),
        Err(e) => {
            eprintln!("Unable to open log file {}: {}", path.display(), e);
            None
        }
    });

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    tracing::debug!("Logger created with file={}", config.can_write());
}
