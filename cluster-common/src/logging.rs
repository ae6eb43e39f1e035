//! Logger setup: colored stderr by default, or a size-rotated file.

use anyhow::{Context, Result};
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Colored stderr via env_logger's default writer.
    Stdout,
    /// Append to a log file under the figures root, rotated at startup.
    File,
}

/// Rotate the previous log to `<name>.1` once it exceeds this size.
const ROTATE_BYTES: u64 = 16 * 1024 * 1024;

/// Maps the CLI integer level to a filter: 0 = error ... 4 = trace.
pub fn level_filter(level: u32) -> LevelFilter {
    match level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initializes the process logger. Called once from the CLI entry point.
pub fn init_logging(level: u32, output: LogOutput, log_dir: &Path, file_name: &str) -> Result<()> {
    let mut builder = Builder::from_default_env();
    builder.filter(None, level_filter(level));

    if output == LogOutput::File {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
        let path = log_dir.join(file_name);
        if let Ok(meta) = std::fs::metadata(&path) {
            if meta.len() > ROTATE_BYTES {
                let rotated = log_dir.join(format!("{file_name}.1"));
                std::fs::rename(&path, rotated)
                    .with_context(|| format!("failed to rotate log {}", path.display()))?;
            }
        }
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    // A second init (e.g. in tests) is not fatal.
    let _ = builder.try_init();
    Ok(())
}
