//! Staging: copy each resolved directory into its role's subtree.
//!
//! ## Layout
//!
//! ```text
//! <temp_root>/                     process-unique, e.g. /tmp/ipk-Xa9b2c
//! ├── data/                        becomes data.tar.gz
//! │   └── usr/palm/
//! │       ├── applications/<id>/
//! │       ├── services/<id>/
//! │       └── packages/<id>/
//! ├── ctrl/                        becomes control.tar.gz
//! ├── control.tar.gz
//! ├── data.tar.gz
//! └── debian-binary
//! ```
//!
//! The staging root is never removed here. Whoever called the pipeline owns
//! it once the run returns (see [`StagingTree::cleanup`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ipk_schema::Role;
use tracing::{info, warn};

use crate::config::PackagerConfig;
use crate::error::{IoResultExt, Result};
use crate::io::copy::{CopyContext, CopyOptions, FileTransform, Verbatim, copy_tree, exclude_names};
use crate::minify::{Minifier, MinifyTransform};
use crate::resolver::{LoadedEntry, RoleMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTree {
    pub temp_root: PathBuf,
    pub data_root: PathBuf,
    pub app_root: PathBuf,
    pub service_root: PathBuf,
    pub package_root: PathBuf,
}

impl StagingTree {
    /// Layout rooted at an existing directory. Nothing is created.
    pub fn at(temp_root: impl Into<PathBuf>) -> Self {
        let temp_root = temp_root.into();
        let data_root = temp_root.join("data");
        Self {
            app_root: data_root.join(Role::App.staging_subdir()),
            service_root: data_root.join(Role::Service.staging_subdir()),
            package_root: data_root.join(Role::Package.staging_subdir()),
            data_root,
            temp_root,
        }
    }

    /// Create a fresh, process-unique staging root with all role subtrees.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory or a role subtree cannot
    /// be created.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ipk-");
        let dir = match parent {
            Some(p) => {
                std::fs::create_dir_all(p).at(p)?;
                builder.tempdir_in(p).at(p)?
            }
            None => builder.tempdir()?,
        };

        let tree = Self::at(dir.keep());
        for role in Role::ALL {
            let root = tree.role_root(role);
            std::fs::create_dir_all(root).at(root)?;
        }
        Ok(tree)
    }

    pub fn role_root(&self, role: Role) -> &Path {
        match role {
            Role::App => &self.app_root,
            Role::Service => &self.service_root,
            Role::Package => &self.package_root,
        }
    }

    /// Working directory for `ctrl/` and the intermediate archive files.
    pub fn ctrl_root(&self) -> PathBuf {
        self.temp_root.join("ctrl")
    }

    /// Remove the whole staging root.
    pub fn cleanup(&self) -> Result<()> {
        std::fs::remove_dir_all(&self.temp_root).at(&self.temp_root)
    }
}

/// A loaded entry after its tree has been copied into staging.
#[derive(Debug, Clone)]
pub struct StagedEntry {
    pub loaded: LoadedEntry,
    pub work_dir: PathBuf,
}

impl StagedEntry {
    pub fn identity(&self) -> Option<&str> {
        self.loaded.identity()
    }

    pub fn role(&self) -> Role {
        self.loaded.entry.role
    }
}

/// Copies resolved directories into a [`StagingTree`].
pub struct Stager {
    tree: StagingTree,
    exclude: Vec<String>,
    transform: Box<dyn FileTransform>,
}

impl std::fmt::Debug for Stager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stager")
            .field("tree", &self.tree)
            .field("exclude", &self.exclude)
            .finish_non_exhaustive()
    }
}

impl Stager {
    pub fn new(tree: StagingTree, config: &PackagerConfig, minifier: Arc<dyn Minifier>) -> Self {
        let transform: Box<dyn FileTransform> = if config.minify {
            Box::new(MinifyTransform::new(minifier, config))
        } else {
            Box::new(Verbatim)
        };
        Self {
            tree,
            exclude: config.exclude.clone(),
            transform,
        }
    }

    pub fn tree(&self) -> &StagingTree {
        &self.tree
    }

    /// Stage every entry. Roles run in sequence (app, services, package);
    /// entries within a role are copied concurrently.
    pub async fn stage(&self, resolved: RoleMap<LoadedEntry>) -> Result<RoleMap<StagedEntry>> {
        let filter = exclude_names(&self.exclude);
        let options = CopyOptions {
            filter: &filter,
            transform: self.transform.as_ref(),
        };
        resolved
            .try_map_by_role(|entry| self.stage_entry(entry, &options))
            .await
    }

    async fn stage_entry(
        &self,
        loaded: LoadedEntry,
        options: &CopyOptions<'_>,
    ) -> Result<StagedEntry> {
        let role = loaded.entry.role;
        let identity = loaded.identity().unwrap_or_default();
        if identity.is_empty() {
            warn!(
                role = %role,
                dir = %loaded.entry.source_dir.display(),
                "no identity, staging at the role root"
            );
        }
        let work_dir = self.tree.role_root(role).join(identity);

        let ctx = CopyContext {
            src_root: loaded.entry.source_dir.clone(),
            dst_root: work_dir.clone(),
            role,
        };
        let stats = copy_tree(&ctx, options).await?;
        info!(
            role = %role,
            id = identity,
            files = stats.files,
            skipped = stats.skipped,
            "staged {}",
            loaded.entry.source_dir.display()
        );

        Ok(StagedEntry { loaded, work_dir })
    }
}
