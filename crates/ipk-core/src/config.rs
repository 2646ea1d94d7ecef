//! Packager configuration.
//!
//! Loaded from TOML. Every key is optional; missing keys take the defaults
//! below. Lookup order for the file itself:
//!
//! 1. An explicit path (from `--config`), which must exist
//! 2. `$IPK_CONFIG`
//! 3. `<config_dir>/ipk/config.toml`, if present
//!
//! `SOURCE_DATE_EPOCH` in the environment overrides `source_date_epoch`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value of the control file's `Installed-Size:` when nothing better is known.
pub const PLACEHOLDER_INSTALLED_SIZE: u64 = 1234;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid SOURCE_DATE_EPOCH: {0}")]
    Epoch(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagerConfig {
    /// Control `Architecture:` value, also the artifact name suffix.
    pub architecture: String,
    /// Fixed `Installed-Size:` in KiB. Computed from the data tree when unset.
    pub installed_size: Option<u64>,
    /// Run the script transform while staging.
    pub minify: bool,
    /// External uglify-compatible program. `None` selects the built-in minifier.
    pub minifier_command: Option<String>,
    /// Identifiers that must survive name mangling.
    pub reserved_identifiers: Vec<String>,
    /// Extensions (without the dot) treated as script sources.
    pub script_extensions: Vec<String>,
    /// Path components marking third-party trees, which are copied verbatim.
    pub vendor_dirs: Vec<String>,
    /// File and directory names never copied into the staging tree.
    pub exclude: Vec<String>,
    /// Parent directory for the staging root. System temp when unset.
    pub temp_dir: Option<PathBuf>,
    /// Fixed timestamp for archive members (reproducible builds).
    pub source_date_epoch: Option<i64>,
    /// Artifact file extension.
    pub extension: String,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            architecture: "all".to_string(),
            installed_size: None,
            minify: true,
            minifier_command: None,
            reserved_identifiers: vec!["require".to_string(), "request".to_string()],
            script_extensions: vec!["js".to_string()],
            vendor_dirs: vec!["lib".to_string(), "node_modules".to_string()],
            exclude: vec![".git".to_string(), ".svn".to_string(), ".DS_Store".to_string()],
            temp_dir: None,
            source_date_epoch: None,
            extension: "ipk".to_string(),
        }
    }
}

impl PackagerConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Resolve the config file (see module docs) and apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os("IPK_CONFIG")
                .map(PathBuf::from)
                .or_else(|| default_config_path().filter(|p| p.is_file())),
        };

        let config = match path {
            Some(p) => {
                tracing::debug!(path = %p.display(), "loading config");
                Self::from_file(&p)?
            }
            None => Self::default(),
        };

        config.with_env(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("SOURCE_DATE_EPOCH") {
            let epoch = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::Epoch(raw.clone()))?;
            self.source_date_epoch = Some(epoch);
        }
        Ok(self)
    }

    /// Whether `ext` (no leading dot) names a script source.
    pub fn is_script_extension(&self, ext: &str) -> bool {
        self.script_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// `<config_dir>/ipk/config.toml`, e.g. `~/.config/ipk/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ipk").join("config.toml"))
}
