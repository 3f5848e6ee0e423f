//! Kiln configuration and tracing setup.
//!
//! Configuration lives in a TOML file at the workspace root:
//!
//! ```toml
//! [build]
//! program = "bazelisk"
//! extra_flags = ["--build_event_publish_all_actions"]
//! bep_dir = ".kiln/bep"
//! timeout_secs = 1800
//! output_groups = ["default"]
//!
//! [logging]
//! level = "kiln=debug"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Arc, Once, OnceLock},
    time::Duration,
};
use thiserror::Error;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    layer::SubscriberExt,
    Layer,
};

/// Environment variable naming an explicit config file.
pub const KILN_CONFIG_ENV_VAR: &str = "KILN_CONFIG_PATH";

const CONFIG_CANDIDATES: [&str; 3] = ["kiln.toml", ".kiln.toml", ".kiln/config.toml"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KilnConfig {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Build tool client, `bazel` or a wrapper such as `bazelisk`.
    #[serde(default = "BuildConfig::default_program")]
    pub program: String,

    /// Appended to every build after the build event flags.
    #[serde(default)]
    pub extra_flags: Vec<String>,

    /// Where build event files are created. Relative paths are resolved against the directory
    /// containing the config file. Defaults to the system temp dir.
    #[serde(default)]
    pub bep_dir: Option<PathBuf>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Captured bytes kept per output stream of the build process.
    #[serde(default = "BuildConfig::default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Treat event streams without Bazel's final event as interrupted builds.
    #[serde(default = "BuildConfig::default_require_last_message")]
    pub require_last_message: bool,

    /// Output groups requested when no kind handler decides otherwise.
    #[serde(default)]
    pub output_groups: Vec<String>,
}

impl BuildConfig {
    fn default_program() -> String {
        "bazel".to_owned()
    }

    fn default_max_output_bytes() -> usize {
        8 * 1024 * 1024
    }

    fn default_require_last_message() -> bool {
        true
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            extra_flags: Vec::new(),
            bep_dir: None,
            timeout_secs: None,
            max_output_bytes: Self::default_max_output_bytes(),
            require_last_message: Self::default_require_last_message(),
            output_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well. If it cannot be opened, file logging is skipped.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            "off" | "none" => "off".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
        })
    }

    /// The effective filter: `level`, with `RUST_LOG` merged in when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        match env_directives {
            Some(env_directives) => {
                let config_directives = Self::normalize_level_directives(&self.level);
                tracing_subscriber::EnvFilter::try_new(format!(
                    "{config_directives},{env_directives}"
                ))
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` quotes the offending source line; keep only the message.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

/// Redacts quoted values from a TOML/serde message. Flag values may carry credentials
/// (`--remote_header=Authorization=...`).
fn sanitize_toml_error_message(message: &str) -> String {
    static QUOTED: OnceLock<Option<regex::Regex>> = OnceLock::new();

    let re = QUOTED
        .get_or_init(|| regex::Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#).ok());
    match re {
        Some(re) => re.replace_all(message, "\"<redacted>\"").into_owned(),
        None => message.to_owned(),
    }
}

impl KilnConfig {
    /// Parse a config document. Relative paths are kept as written.
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: KilnConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; relative paths are resolved against its directory.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::load_from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.build.program.trim().is_empty() {
            return Err(ConfigError::Invalid("build.program must not be empty".into()));
        }
        if self.build.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "build.max_output_bytes must be greater than zero".into(),
            ));
        }
        if let Some(group) = self.build.output_groups.iter().find(|g| g.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "build.output_groups contains an empty name ({group:?})"
            )));
        }
        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        for path in [&mut self.build.bep_dir, &mut self.logging.file]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Locate the config file for a workspace.
///
/// Order:
/// 1) `KILN_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `kiln.toml`
/// 3) `.kiln.toml`
/// 4) `.kiln/config.toml`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    discover_with_override(workspace_root, std::env::var_os(KILN_CONFIG_ENV_VAR))
}

fn discover_with_override(workspace_root: &Path, env_value: Option<OsString>) -> Option<PathBuf> {
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    CONFIG_CANDIDATES
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a workspace root.
///
/// Without a config file this is [`KilnConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(KilnConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((KilnConfig::default(), None));
    };

    let config = KilnConfig::load_from_path(&path)?;
    tracing::debug!(target = "kiln.config", path = %path.display(), "loaded config");
    Ok((config, Some(path)))
}

static TRACING_INIT: Once = Once::new();

/// Install the global tracing subscriber.
///
/// Only the first call has an effect; later calls (and calls after another subscriber was
/// installed) are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_failed = config.file.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(std::io::sink);
        if config.stderr {
            make_writer = BoxMakeWriter::new(make_writer.and(std::io::stderr));
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(Arc::new(file)));
        }

        let layer: Box<dyn Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_failed {
            if let Some(path) = config.file.as_ref() {
                tracing::warn!(
                    target = "kiln.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
