//! Package descriptor synthesis.
//!
//! A supplied `packageinfo.json` (a package-role directory) is passed
//! through exactly as written; only its `id` and `version` are read.
//! Otherwise one is derived from the app metadata plus the service ids and
//! written to `<package_root>/<id>/packageinfo.json`.

use ipk_schema::{MetadataStore, PACKAGE_INFO_FILE, PackageDescriptor, PackageInfo};
use tracing::{info, warn};

use crate::error::{IoResultExt, PackagerError, Result};
use crate::resolver::RoleMap;
use crate::staging::{StagedEntry, StagingTree};

/// Produce the package descriptor for a staged run.
///
/// The supplied descriptor is not cross-checked against the app or
/// service identities.
pub async fn synthesize(
    staged: &RoleMap<StagedEntry>,
    tree: &StagingTree,
) -> Result<PackageInfo> {
    if let Some(package) = staged.package() {
        return read_supplied(package).await;
    }

    let services: Vec<Option<String>> = staged
        .services()
        .iter()
        .map(|svc| {
            let id = svc.identity().map(str::to_string);
            if id.is_none() {
                warn!(
                    dir = %svc.loaded.entry.source_dir.display(),
                    key = svc.loaded.entry.identity_key,
                    "service has no identity, listing it as null"
                );
            }
            id
        })
        .collect();

    let descriptor = PackageDescriptor::from_app(&staged.app().loaded.metadata, services);
    if descriptor.id.is_none() {
        warn!("app metadata has no id, package descriptor has no identity");
    }

    let dir = tree.package_root.join(descriptor.identity());
    tokio::fs::create_dir_all(&dir).await.at(&dir)?;

    let path = dir.join(PACKAGE_INFO_FILE);
    let text = descriptor
        .to_pretty_json()
        .map_err(|e| PackagerError::Format(format!("package descriptor: {e}")))?;
    tokio::fs::write(&path, text).await.at(&path)?;

    info!(id = descriptor.identity(), path = %path.display(), "wrote package descriptor");
    Ok(PackageInfo::Synthesized(descriptor))
}

async fn read_supplied(package: &StagedEntry) -> Result<PackageInfo> {
    let path = package.work_dir.join(PACKAGE_INFO_FILE);
    let bytes = tokio::fs::read(&path).await.at(&path)?;
    let document = MetadataStore::from_slice(&bytes)
        .map_err(|source| PackagerError::Parse { path: path.clone(), source })?;
    let info = PackageInfo::Supplied(document);
    info!(id = info.identity(), "using supplied package descriptor");
    Ok(info)
}
