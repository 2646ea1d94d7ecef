//! Core of the ipk packager.
//!
//! Turns an application directory plus any bundled service and package
//! directories into a single `.ipk` archive.
//!
//! # Pipeline
//!
//! ```text
//! dirs ──resolve──▶ RoleMap<LoadedEntry>
//!      ──stage────▶ RoleMap<StagedEntry>    (scripts minified on the way)
//!      ──synthesize▶ PackageInfo            (packageinfo.json)
//!      ──assemble──▶ <id>_<version>_<arch>.ipk
//! ```
//!
//! [`Packager`] runs all of it; each stage is also usable on its own.

pub mod archive;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod io;
pub mod minify;
pub mod pipeline;
pub mod resolver;
pub mod staging;

pub use config::{ConfigError, PackagerConfig};
pub use error::{PackagerError, Result};
pub use minify::{CommandMinifier, Minifier, WhitespaceMinifier};
pub use pipeline::{PackageOutcome, Packager};
pub use resolver::{LoadedEntry, RoleMap};
pub use staging::StagingTree;

/// Version recorded in every control file as `webOS-Packager-Version`.
pub const PACKAGER_VERSION: &str = env!("CARGO_PKG_VERSION");
