//! Structured logging for the Rewind daemon
//!
//! Console output is JSON lines by default, or text when `rewindd` runs in a
//! terminal. File output is always JSON, rotated by `tracing-appender`, and
//! by default lives under the node's data directory. `RUST_LOG`, when set,
//! replaces the configured filter entirely.
//!
//! ```ignore
//! use rewind_logging::{LogConfig, RewindSubscriberBuilder};
//!
//! let logging = LogConfig::service().resolve(&data_dir, max_age);
//! let _guard = RewindSubscriberBuilder::new().with_config(logging).init()?;
//! ```
//!
//! Keep the returned guard alive for as long as file output is wanted;
//! dropping it flushes and stops the background writer.

pub mod config;
pub mod error;

pub use config::{
    ConsoleConfig, ConsoleFormat, FileConfig, JsonFields, LogConfig, RotationStrategy,
};
pub use error::LogError;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builds and installs the global subscriber from a [`LogConfig`]
pub struct RewindSubscriberBuilder {
    config: LogConfig,
}

impl RewindSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer's guard when file output is configured.
    ///
    /// # Errors
    ///
    /// Fails if the level filter does not parse, the log directory cannot be
    /// created, or a global subscriber is already installed.
    pub fn init(self) -> Result<Option<WorkerGuard>, LogError> {
        let filter = self.env_filter()?;
        let (layers, guard) = self.build_layers()?;
        Registry::default().with(layers).with(filter).try_init()?;
        Ok(guard)
    }

    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directives = self.config.filter_directives();
        EnvFilter::try_new(&directives).map_err(|e| LogError::Filter {
            filter: directives.clone(),
            reason: e.to_string(),
        })
    }

    fn build_layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LogError> {
        let json = &self.config.json;
        let console = &self.config.console;
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if console.enabled {
            let layer: BoxedLayer = match console.format {
                ConsoleFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(json.include_spans)
                    .flatten_event(json.flatten_events)
                    .with_file(json.include_location)
                    .with_line_number(json.include_location)
                    .boxed(),
                ConsoleFormat::Text => tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true)
                    .boxed(),
                ConsoleFormat::Compact => tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(console.ansi)
                    .boxed(),
            };
            layers.push(layer);
        }

        if let Some(file_config) = &self.config.file {
            let appender = file_appender(file_config)?;
            let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(json.include_spans)
                    .flatten_event(json.flatten_events)
                    .with_file(json.include_location)
                    .with_line_number(json.include_location)
                    .with_writer(non_blocking)
                    .boxed(),
            );
        }

        Ok((layers, guard))
    }
}

impl Default for RewindSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn file_appender(file_config: &FileConfig) -> Result<RollingFileAppender, LogError> {
    let directory = file_config.directory_or_default();
    std::fs::create_dir_all(&directory)?;

    let rotation = match file_config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => Rotation::NEVER,
    };
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file_config.prefix.as_str())
        .filename_suffix("log");
    if let Some(max_files) = file_config.max_files {
        builder = builder.max_log_files(max_files);
    }
    Ok(builder.build(&directory)?)
}

/// Install [`LogConfig::testing`]; later calls are no-ops
pub fn init_testing() {
    let _ = RewindSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder_creation() {
        let builder = RewindSubscriberBuilder::new();
        assert_eq!(builder.config.default_level, "info");
        assert_eq!(builder.config.console.format, ConsoleFormat::Json);
    }

    #[test]
    fn test_builder_with_overrides() {
        let builder = RewindSubscriberBuilder::new()
            .with_level("trace")
            .with_console(false);
        assert_eq!(builder.config.default_level, "trace");
        assert!(!builder.config.console.enabled);
    }

    #[test]
    fn test_console_disabled_builds_no_layers() {
        let builder = RewindSubscriberBuilder::new().with_console(false);
        let (layers, guard) = builder.build_layers().unwrap();
        assert!(layers.is_empty());
        assert!(guard.is_none());
    }

    #[test]
    fn test_file_output_writes_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let builder = RewindSubscriberBuilder::new()
            .with_console(false)
            .with_file_output(FileConfig {
                directory: Some(temp_dir.path().join("logs")),
                prefix: "test".to_string(),
                rotation: RotationStrategy::Never,
                max_files: None,
            });

        let (layers, guard) = builder.build_layers().unwrap();
        let subscriber = Registry::default().with(layers);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(session = "s1", removed = 3, "Sweep complete");
        });
        drop(guard);

        let log_file = temp_dir.path().join("logs").join("test.log");
        let contents = std::fs::read_to_string(log_file).unwrap();
        let first = contents.lines().next().unwrap();
        let line: serde_json::Value = serde_json::from_str(first).unwrap();
        assert_eq!(line["message"], "Sweep complete");
        assert_eq!(line["session"], "s1");
        assert_eq!(line["removed"], 3);
        assert_eq!(line["level"], "INFO");
    }

    #[test]
    fn test_bad_target_level_is_reported() {
        let mut config = LogConfig::default();
        config.targets.insert("rewind_query".into(), "loud".into());
        let builder = RewindSubscriberBuilder::new().with_config(config);
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(
                builder.env_filter(),
                Err(LogError::Filter { filter, .. }) if filter == "info,rewind_query=loud"
            ));
        }
    }

    #[test]
    fn test_every_console_format_builds_one_layer() {
        for format in [ConsoleFormat::Json, ConsoleFormat::Text, ConsoleFormat::Compact] {
            let mut config = LogConfig::default();
            config.console.format = format;
            let builder = RewindSubscriberBuilder::new().with_config(config);
            let (layers, guard) = builder.build_layers().unwrap();
            assert_eq!(layers.len(), 1);
            assert!(guard.is_none());
        }
    }
}
