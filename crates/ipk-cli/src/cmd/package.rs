//! Package command

use anyhow::{Context, Result};
use ipk_core::{Packager, PackagerConfig};
use std::path::Path;
use tracing::warn;

use crate::PackageArgs;

/// Build a package and print its path and SHA256.
pub async fn package(args: &PackageArgs, config_path: Option<&Path>) -> Result<()> {
    let config = apply_flags(super::load_config(config_path)?, args);
    let packager = Packager::new(config);

    let outcome = packager
        .package(&args.dirs, &args.output)
        .await
        .context("Packaging failed")?;

    let hash = compute_file_hash(&outcome.artifact_path)?;
    println!("{}", outcome.message);
    println!("sha256 {hash}");

    if args.keep_temp {
        println!("staging kept at {}", outcome.staging.temp_root.display());
    } else if let Err(e) = outcome.staging.cleanup() {
        warn!("could not remove staging directory: {e}");
    }
    Ok(())
}

/// Command-line flags take precedence over the config file.
fn apply_flags(mut config: PackagerConfig, args: &PackageArgs) -> PackagerConfig {
    if let Some(arch) = &args.arch {
        config.architecture.clone_from(arch);
    }
    if args.no_minify {
        config.minify = false;
    }
    if let Some(program) = &args.minifier {
        config.minifier_command = Some(program.clone());
        config.minify = true;
    }
    config
}

/// Compute SHA256 hash of a file (streaming)
fn compute_file_hash(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use std::io::Read;

    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
