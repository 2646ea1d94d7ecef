//! Command modules - one file per CLI command

pub mod check;
pub mod package;

use std::path::Path;

use anyhow::{Context, Result};
use ipk_core::PackagerConfig;

/// Load the config file (if any) and environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<PackagerConfig> {
    PackagerConfig::load(path).context("Failed to load configuration")
}
