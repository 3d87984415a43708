use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::loader::BranchSortOrder;
use crate::refresh::RefresherConfig;
use crate::theme::ThemeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub git: GitConfig,
    pub refresher: RefresherSection,
    pub gui: GuiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub local_branch_sort_order: BranchSortOrder,
    /// Commits loaded per refresh; unset loads the full history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_limit: Option<usize>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            local_branch_sort_order: BranchSortOrder::Recency,
            commit_limit: Some(300),
        }
    }
}

/// Background work. An interval of 0 disables that routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefresherSection {
    pub refresh_interval_secs: u64,
    pub fetch_interval_secs: u64,
    pub watch_files: bool,
}

impl Default for RefresherSection {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 10,
            fetch_interval_secs: 60,
            watch_files: true,
        }
    }
}

impl RefresherSection {
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    pub fn fetch_interval(&self) -> Option<Duration> {
        (self.fetch_interval_secs > 0).then(|| Duration::from_secs(self.fetch_interval_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    pub inline_status_interval_ms: u64,
    pub theme: ThemeConfig,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            inline_status_interval_ms: 50,
            theme: ThemeConfig::default(),
        }
    }
}

impl GuiConfig {
    pub fn inline_status_interval(&self) -> Duration {
        Duration::from_millis(self.inline_status_interval_ms.max(1))
    }
}

impl AppConfig {
    /// `$XDG_CONFIG_HOME/gitloom/config.toml`, falling back to `~/.config`.
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("gitloom").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`AppConfig::load`], but a missing file silently yields the
    /// defaults and any other failure is logged before falling back.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(error = %err, "using default config");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn refresher_config(&self) -> RefresherConfig {
        RefresherConfig {
            sort_order: self.git.local_branch_sort_order,
            commit_limit: self.git.commit_limit,
        }
    }
}
