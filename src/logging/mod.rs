//! Logging and output control
//!
//! This module provides the [`Logger`] used for all user-visible progress output and
//! [`init`], which installs the process-wide `tracing` subscriber. The subscriber is
//! the single severity switch: `--debug` lowers it to `debug`, `RUST_LOG` overrides both.

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub start_time: Option<Instant>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            start_time: Some(Instant::now()),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        tracing::info!("=== {} ===", title);
    }

    /// Information message
    pub fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    /// Success message
    pub fn success(&self, message: &str) {
        tracing::info!("✅ {}", message);
    }

    /// Step information
    pub fn step(&self, message: &str) {
        tracing::info!("▶️  {}", message);
    }

    /// Detailed information, only shown at debug level
    pub fn detail(&self, message: &str) {
        tracing::debug!("   {}", message);
    }

    /// Debug message, only for a verbose logger
    pub fn debug(&self, message: &str) {
        if self.verbose {
            tracing::debug!("🔍 {}", message);
        }
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        tracing::warn!("⚠️  {}", message);
    }

    /// Error message
    pub fn error(&self, message: &str) {
        tracing::error!("❌ {}", message);
    }

    /// Format file size in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m{:02}s", secs / 60, secs % 60)
        } else {
            format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    /// Time since the logger was created
    pub fn elapsed_time(&self) -> String {
        match self.start_time {
            Some(start_time) => self.format_duration(start_time.elapsed()),
            None => "unknown".to_string(),
        }
    }
}
