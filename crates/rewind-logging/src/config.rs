//! Logging settings for the replay daemon
//!
//! Read from the `[logging]` section of the node's TOML file. Log files live
//! next to the data they describe: an unset file directory resolves to
//! `{data_dir}/logs`, and an unset file count keeps logs for as long as
//! sessions are retained.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for every target without its own entry in `targets`
    pub default_level: String,
    /// Per-target levels, e.g. `rewind_query = "debug"`
    pub targets: BTreeMap<String, String>,
    pub console: ConsoleConfig,
    /// Rolling JSON log files; off unless the section is present
    pub file: Option<FileConfig>,
    /// Field layout of JSON lines, shared by console and file output
    pub json: JsonFields,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            targets: BTreeMap::new(),
            console: ConsoleConfig::default(),
            file: None,
            json: JsonFields::default(),
        }
    }
}

impl LogConfig {
    /// `rewindd` attached to a terminal: colored text, rewind crates at debug
    pub fn foreground() -> Self {
        let targets = REWIND_TARGETS
            .iter()
            .map(|target| (target.to_string(), "debug".to_string()))
            .collect();
        Self {
            targets,
            console: ConsoleConfig {
                enabled: true,
                format: ConsoleFormat::Text,
                ansi: true,
            },
            ..Default::default()
        }
    }

    /// `rewindd` under a service manager: JSON files only
    ///
    /// The file directory and count are filled in by [`resolve`](Self::resolve).
    pub fn service() -> Self {
        Self {
            console: ConsoleConfig {
                enabled: false,
                ..Default::default()
            },
            file: Some(FileConfig::default()),
            ..Default::default()
        }
    }

    /// Warnings only, compact, for test binaries
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            console: ConsoleConfig {
                enabled: true,
                format: ConsoleFormat::Compact,
                ansi: false,
            },
            ..Default::default()
        }
    }

    /// Fill unset file settings from the node's data directory and retention
    /// window
    pub fn resolve(mut self, data_dir: &Path, retention: Duration) -> Self {
        if let Some(file) = &mut self.file {
            if file.directory.is_none() {
                file.directory = Some(data_dir.join("logs"));
            }
            if file.max_files.is_none() {
                file.max_files = file.rotation.files_covering(retention);
            }
        }
        self
    }

    /// `EnvFilter` directives: the default level, then one per target
    pub fn filter_directives(&self) -> String {
        let mut directives = self.default_level.clone();
        for (target, level) in &self.targets {
            directives.push_str(&format!(",{target}={level}"));
        }
        directives
    }
}

const REWIND_TARGETS: [&str; 4] = ["rewind_node", "rewind_storage", "rewind_query", "rewindd"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
    /// Colors; ignored for JSON
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Json,
            ansi: false,
        }
    }
}

/// How console lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Full human-readable lines with targets
    Text,
    /// Shortened human-readable lines
    Compact,
}

/// Rolling JSON log files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// `{data_dir}/logs` when unset
    pub directory: Option<PathBuf>,
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Files kept after rotation; derived from the retention window when unset
    pub max_files: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: "rewindd".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: None,
        }
    }
}

impl FileConfig {
    /// Directory logs are written to, before or after resolution
    pub fn directory_or_default(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("logs"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// A single file that grows forever
    Never,
}

impl RotationStrategy {
    /// Number of rotated files spanning `window`, rounded up
    fn files_covering(self, window: Duration) -> Option<usize> {
        let period = match self {
            RotationStrategy::Daily => 86_400,
            RotationStrategy::Hourly => 3_600,
            RotationStrategy::Never => return None,
        };
        let files = window.as_secs().div_ceil(period).max(1);
        Some(usize::try_from(files).unwrap_or(usize::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    pub include_spans: bool,
    /// Source file and line
    pub include_location: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOURTEEN_DAYS: Duration = Duration::from_secs(14 * 86_400);

    #[test]
    fn test_default_is_json_console() {
        let config = LogConfig::default();
        assert_eq!(config.filter_directives(), "info");
        assert!(config.console.enabled);
        assert_eq!(config.console.format, ConsoleFormat::Json);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_foreground_raises_rewind_targets() {
        let config = LogConfig::foreground();
        assert!(config.console.ansi);
        assert_eq!(
            config.filter_directives(),
            "info,rewind_node=debug,rewind_query=debug,rewind_storage=debug,rewindd=debug"
        );
    }

    #[test]
    fn test_service_logs_follow_the_data_dir_and_retention() {
        let config = LogConfig::service().resolve(Path::new("/srv/rewind"), FOURTEEN_DAYS);
        assert!(!config.console.enabled);
        let file = config.file.unwrap();
        assert_eq!(file.directory, Some(PathBuf::from("/srv/rewind/logs")));
        assert_eq!(file.prefix, "rewindd");
        assert_eq!(file.max_files, Some(14));
    }

    #[test]
    fn test_resolve_keeps_explicit_settings() {
        let config = LogConfig {
            file: Some(FileConfig {
                directory: Some(PathBuf::from("/var/log/rewind")),
                rotation: RotationStrategy::Hourly,
                max_files: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        }
        .resolve(Path::new("/srv/rewind"), FOURTEEN_DAYS);

        let file = config.file.unwrap();
        assert_eq!(file.directory, Some(PathBuf::from("/var/log/rewind")));
        assert_eq!(file.max_files, Some(3));
    }

    #[test]
    fn test_file_count_rounds_up() {
        let hourly = RotationStrategy::Hourly;
        assert_eq!(hourly.files_covering(Duration::from_secs(90 * 60)), Some(2));
        assert_eq!(hourly.files_covering(Duration::from_secs(1)), Some(1));
        assert_eq!(RotationStrategy::Never.files_covering(FOURTEEN_DAYS), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: LogConfig = serde_json::from_str(
            r#"{"targets":{"rewind_query":"trace"},"file":{"rotation":"hourly"}}"#,
        )
        .unwrap();
        assert_eq!(config.filter_directives(), "info,rewind_query=trace");
        let file = config.file.unwrap();
        assert_eq!(file.rotation, RotationStrategy::Hourly);
        assert_eq!(file.prefix, "rewindd");
        assert_eq!(file.directory, None);
    }
}
