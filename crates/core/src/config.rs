//! Configuration for a migration run.
//!
//! Read once at startup from a TOML file. There is no persisted state
//! between runs besides the destination repository itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::message::MESSAGE_PLACEHOLDER;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Full configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Where the history lives and how it is replayed.
    pub migration: MigrationSection,

    /// The single identity every migrated commit is attributed to.
    pub author: AuthorConfig,

    /// `cm` invocation settings.
    #[serde(default)]
    pub plastic: PlasticConfig,

    /// Commit message template.
    #[serde(default)]
    pub commit_format: CommitFormatConfig,
}

// ---------------------------------------------------------------------------
// Migration section
// ---------------------------------------------------------------------------

/// How file content reaches the working tree for each changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStrategy {
    /// Fetch each changed file with `cm cat` and reconcile the tree.
    #[default]
    PerFile,
    /// `cm switch` the whole workspace to the changeset.
    Switch,
}

impl std::fmt::Display for ReplayStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerFile => write!(f, "per_file"),
            Self::Switch => write!(f, "switch"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSection {
    /// History export; relative paths resolve against `work_dir`.
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Root of the working tree being migrated (the Git repository).
    pub work_dir: PathBuf,

    #[serde(default)]
    pub strategy: ReplayStrategy,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_history_file() -> PathBuf {
    PathBuf::from("PLASTIC_SCM_HISTORY.xml")
}

fn default_log_level() -> String {
    "info".into()
}

impl MigrationSection {
    /// Absolute (or work-dir-relative) location of the history export.
    pub fn history_path(&self) -> PathBuf {
        if self.history_file.is_absolute() {
            self.history_file.clone()
        } else {
            self.work_dir.join(&self.history_file)
        }
    }
}

// ---------------------------------------------------------------------------
// Author identity
// ---------------------------------------------------------------------------

/// Fixed destination identity. The changeset owner is never used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorConfig {
    pub name: String,
    pub email: String,
}

// ---------------------------------------------------------------------------
// Plastic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlasticConfig {
    /// `cm` executable name or path.
    #[serde(default = "default_cm_binary")]
    pub cm_binary: String,

    /// Per-command timeout in seconds. 0 = no timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cm_binary() -> String {
    "cm".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PlasticConfig {
    fn default() -> Self {
        Self {
            cm_binary: default_cm_binary(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PlasticConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

// ---------------------------------------------------------------------------
// Commit format
// ---------------------------------------------------------------------------

/// Template applied to every commit message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitFormatConfig {
    /// Placeholders: `{message}`, `{changeset}`, `{branch}`, `{owner}`, `{date}`.
    #[serde(default = "default_message_template")]
    pub template: String,
}

fn default_message_template() -> String {
    MESSAGE_PLACEHOLDER.into()
}

impl Default for CommitFormatConfig {
    fn default() -> Self {
        Self {
            template: default_message_template(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl MigrationConfig {
    /// Load a [`MigrationConfig`] from a TOML file without validating it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: MigrationConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migration.work_dir.as_os_str().is_empty() {
            return Err(invalid("migration.work_dir", "work directory must not be empty"));
        }
        if self.migration.history_file.as_os_str().is_empty() {
            return Err(invalid("migration.history_file", "history file must not be empty"));
        }
        if self.author.name.trim().is_empty() {
            return Err(invalid("author.name", "author name must not be empty"));
        }
        if self.author.email.trim().is_empty() {
            return Err(invalid("author.email", "author email must not be empty"));
        }
        if !self.author.email.contains('@') {
            return Err(invalid("author.email", "author email must contain '@'"));
        }
        if self.plastic.cm_binary.trim().is_empty() {
            return Err(invalid("plastic.cm_binary", "cm binary must not be empty"));
        }
        if !self.commit_format.template.contains(MESSAGE_PLACEHOLDER) {
            return Err(invalid(
                "commit_format.template",
                "template must contain the {message} placeholder",
            ));
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# plastigit configuration

[migration]
# Relative paths resolve against work_dir.
history_file = "PLASTIC_SCM_HISTORY.xml"
work_dir = "/path/to/workspace"
# per_file: cm cat every changed file; switch: cm switch the whole workspace
strategy = "per_file"
log_level = "info"

[author]
name = "Your Name"
email = "you@example.com"

[plastic]
cm_binary = "cm"
timeout_secs = 30   # 0 = no timeout

[commit_format]
# Placeholders: {message} {changeset} {branch} {owner} {date}
template = "{message}"
"#
    }
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}
