//! Archive assembly: staged tree in, `.ipk` file out.
//!
//! Steps run strictly in order, each reading what the previous one wrote:
//!
//! 1. `data/` → `data.tar.gz`
//! 2. `ctrl/control`
//! 3. `ctrl/` → `control.tar.gz`
//! 4. `debian-binary`
//! 5. `ar` container: `debian-binary`, `control.tar.gz`, `data.tar.gz`
//!
//! Intermediate files stay in the staging root.

pub mod ar;
pub mod control;
pub mod tarball;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ipk_schema::PackageInfo;
use tracing::{debug, info};

use crate::config::PackagerConfig;
use crate::error::{IoResultExt, PackagerError, Result};
use crate::resolver::is_path_safe;
use crate::staging::StagingTree;

pub use ar::{AR_MAGIC, ArWriter, ArchiveMember};
pub use control::ControlInfo;
pub use tarball::{TarSummary, write_tar_gz};

pub const DEBIAN_BINARY: &str = "debian-binary";
pub const DEBIAN_BINARY_CONTENT: &[u8] = b"2.0\n";
pub const CONTROL_TARBALL: &str = "control.tar.gz";
pub const DATA_TARBALL: &str = "data.tar.gz";

/// Inputs to [`assemble`].
#[derive(Debug)]
pub struct AssembleRequest<'a> {
    pub tree: &'a StagingTree,
    pub descriptor: &'a PackageInfo,
    /// Service identities; their staged directories get the wider mode mask.
    pub service_names: HashSet<String>,
    pub dest_dir: &'a Path,
    pub config: &'a PackagerConfig,
}

/// `<id>_<version>_<arch>.<ext>`
///
/// # Errors
///
/// Returns [`PackagerError::Input`] when the name would not be a single
/// file inside the destination directory.
pub fn artifact_name(descriptor: &PackageInfo, config: &PackagerConfig) -> Result<String> {
    let name = format!(
        "{}_{}_{}.{}",
        descriptor.identity(),
        descriptor.version(),
        config.architecture,
        config.extension
    );
    if !is_path_safe(&name) {
        return Err(PackagerError::Input(format!(
            "package file name '{name}' is not a plain file name"
        )));
    }
    Ok(name)
}

/// Build the package file. Returns its absolute path.
pub async fn assemble(req: AssembleRequest<'_>) -> Result<PathBuf> {
    let name = artifact_name(req.descriptor, req.config)?;
    let tree = req.tree;
    let data_tarball = tree.temp_root.join(DATA_TARBALL);
    let control_tarball = tree.temp_root.join(CONTROL_TARBALL);
    let debian_binary = tree.temp_root.join(DEBIAN_BINARY);

    // 1. data.tar.gz
    let summary = {
        let (root, out) = (tree.data_root.clone(), data_tarball.clone());
        let services = req.service_names;
        blocking(move || write_tar_gz(&root, &out, &services)).await?
    };
    debug!(
        entries = summary.entries,
        bytes = summary.file_bytes,
        "wrote {DATA_TARBALL}"
    );

    // 2. ctrl/control
    let ctrl = tree.ctrl_root();
    tokio::fs::create_dir_all(&ctrl).await.at(&ctrl)?;
    let installed_size = req
        .config
        .installed_size
        .unwrap_or_else(|| summary.file_bytes.div_ceil(1024));
    let control = control::render(&ControlInfo {
        package: req.descriptor.identity(),
        version: req.descriptor.version(),
        architecture: Some(&req.config.architecture),
        installed_size: Some(installed_size),
    });
    let control_path = ctrl.join("control");
    tokio::fs::write(&control_path, control)
        .await
        .at(&control_path)?;

    // 3. control.tar.gz
    {
        let out = control_tarball.clone();
        blocking(move || write_tar_gz(&ctrl, &out, &HashSet::new())).await?;
    }
    debug!("wrote {CONTROL_TARBALL}");

    // 4. debian-binary
    tokio::fs::write(&debian_binary, DEBIAN_BINARY_CONTENT)
        .await
        .at(&debian_binary)?;

    // 5. ar container
    tokio::fs::create_dir_all(req.dest_dir)
        .await
        .at(req.dest_dir)?;
    let dest_dir = std::path::absolute(req.dest_dir).at(req.dest_dir)?;
    let artifact = dest_dir.join(name);
    let mtime = req
        .config
        .source_date_epoch
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    {
        let artifact = artifact.clone();
        blocking(move || {
            write_container(
                &artifact,
                mtime,
                &[
                    (DEBIAN_BINARY, debian_binary.as_path()),
                    (CONTROL_TARBALL, control_tarball.as_path()),
                    (DATA_TARBALL, data_tarball.as_path()),
                ],
            )
        })
        .await?;
    }

    info!(path = %artifact.display(), "assembled package");
    Ok(artifact)
}

/// Write the `ar` container with `members` in the given order.
pub fn write_container(out: &Path, mtime: i64, members: &[(&str, &Path)]) -> Result<()> {
    let file = File::create(out).at(out)?;
    let mut writer = ArWriter::new(BufWriter::new(file)).at(out)?;

    for (name, path) in members {
        let file = File::open(path).at(path)?;
        let size = file.metadata().at(path)?.len();
        let member = ArchiveMember::new(*name, size, mtime)?;
        writer.append(&member, BufReader::new(file))?;
    }

    writer.finish().at(out)?;
    Ok(())
}

/// Run blocking archive work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PackagerError::Format(format!("archive task failed: {e}")))?
}
