// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the optional settings file that Itinerant reads at
//! startup. Every key is optional, and anything left out falls back to its
//! default. Command line flags override whatever the settings file says.
//!
//! # General Layout
//!
//! ```toml
//! store_path = "~/.local/share/itinerant/itineraries.json"
//! ignore_errors = false
//! follow_links = false
//! match_rule = "content"
//!
//! [archiver]
//! program = "7z"
//! args = ["x", "-y", "{archive}", "-o{output}"]
//! patterns = ["*.zip", "*.tar", "*.tar.gz", "*.rar", "*.7z"]
//! ```

use crate::manifest::MatchRule;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Settings file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Where to keep the itinerary store. Shell expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Keep going after a path fails to synchronize.
    pub ignore_errors: bool,

    /// Follow symbolic links while scanning sources.
    pub follow_links: bool,

    /// Rule deciding when two manifests count as the same source.
    pub match_rule: MatchRule,

    /// External archive extraction program.
    pub archiver: ArchiverSettings,
}

impl Settings {
    /// Load settings file.
    ///
    /// A missing settings file yields the defaults.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists, but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(data) => data.parse(),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no settings at {:?}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                message: source.to_string(),
                path: path.into(),
            }),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on store path field.
        if let Some(store_path) = settings.store_path.take() {
            settings.store_path = Some(PathBuf::from(
                shellexpand::full(store_path.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// External archive extraction settings.
///
/// The argument list may use two placeholders: `{archive}` for the archive
/// file to unpack, and `{output}` for the directory to unpack into.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiverSettings {
    /// Program to invoke.
    pub program: String,

    /// Arguments to pass to program.
    pub args: Vec<String>,

    /// File name patterns identifying archives.
    pub patterns: Vec<String>,
}

impl Default for ArchiverSettings {
    fn default() -> Self {
        Self {
            program: "7z".into(),
            args: vec!["x".into(), "-y".into(), "{archive}".into(), "-o{output}".into()],
            patterns: ["*.zip", "*.tar", "*.tar.gz", "*.rar", "*.7z"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read settings file.
    #[error("failed to read settings {:?}: {message}", path.display())]
    Read { message: String, path: PathBuf },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
