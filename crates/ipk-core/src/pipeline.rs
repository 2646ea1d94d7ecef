//! The packaging run: resolve → stage → synthesize → assemble.
//!
//! Every stage consumes the previous stage's result by value and runs only
//! after the previous one has fully completed. The first error from any
//! stage ends the run; nothing is retried.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ipk_schema::PackageInfo;
use tracing::{debug, info};

use crate::archive::{self, AssembleRequest};
use crate::config::PackagerConfig;
use crate::descriptor::synthesize;
use crate::error::Result;
use crate::minify::{self, Minifier};
use crate::resolver::{self, LoadedEntry, RoleMap};
use crate::staging::{Stager, StagingTree};

/// A successful run.
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub artifact_path: PathBuf,
    pub message: String,
    /// The `packageinfo.json` that went into the package.
    pub descriptor: PackageInfo,
    /// Left on disk; see [`StagingTree::cleanup`].
    pub staging: StagingTree,
}

#[derive(Debug, Clone)]
pub struct Packager {
    config: PackagerConfig,
    minifier: Arc<dyn Minifier>,
}

impl Packager {
    /// Uses the minifier selected by `config`.
    pub fn new(config: PackagerConfig) -> Self {
        let minifier = minify::from_config(&config);
        Self { config, minifier }
    }

    pub fn with_minifier(mut self, minifier: Arc<dyn Minifier>) -> Self {
        self.minifier = minifier;
        self
    }

    pub fn config(&self) -> &PackagerConfig {
        &self.config
    }

    /// Resolve and load metadata only. Nothing is written.
    ///
    /// # Errors
    ///
    /// The same input and parse errors [`Packager::package`] would report
    /// before staging.
    pub async fn check(&self, dirs: &[PathBuf]) -> Result<RoleMap<LoadedEntry>> {
        resolver::resolve(dirs).await
    }

    /// Build one package from `dirs` into `dest`.
    ///
    /// The staging tree is kept on success and on failure.
    ///
    /// # Errors
    ///
    /// The first failure of any stage.
    pub async fn package(&self, dirs: &[PathBuf], dest: &Path) -> Result<PackageOutcome> {
        let resolved = resolver::resolve(dirs).await?;

        let tree = StagingTree::create(self.config.temp_dir.as_deref())?;
        debug!(root = %tree.temp_root.display(), "created staging tree");

        let stager = Stager::new(tree, &self.config, Arc::clone(&self.minifier));
        let staged = stager.stage(resolved).await?;
        let tree = stager.tree();

        let descriptor = synthesize(&staged, tree).await?;

        let service_names: HashSet<String> = staged
            .services()
            .iter()
            .filter_map(|s| s.identity().map(str::to_string))
            .collect();

        let artifact_path = archive::assemble(AssembleRequest {
            tree,
            descriptor: &descriptor,
            service_names,
            dest_dir: dest,
            config: &self.config,
        })
        .await?;

        let message = format!(
            "Created {} ({} version {})",
            artifact_path.display(),
            descriptor.identity(),
            descriptor.version()
        );
        info!("{message}");

        Ok(PackageOutcome {
            artifact_path,
            message,
            descriptor,
            staging: tree.clone(),
        })
    }
}
