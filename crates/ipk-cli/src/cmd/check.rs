//! Check command

use anyhow::{Context, Result};
use ipk_core::Packager;
use std::path::{Path, PathBuf};

/// Print the role and identity of every recognized directory.
pub async fn check(dirs: &[PathBuf], config_path: Option<&Path>) -> Result<()> {
    let packager = Packager::new(super::load_config(config_path)?);
    let resolved = packager.check(dirs).await.context("Check failed")?;

    let lw = 8;
    for entry in resolved.iter() {
        println!(
            "{:<lw$}{:<32} {}",
            entry.entry.role,
            entry.identity().unwrap_or("-"),
            entry.entry.source_dir.display()
        );
    }
    println!("{} directories OK", resolved.len());
    Ok(())
}
