//! Shared types for the ipk packager.
//!
//! Everything here is plain data: the directory [`Role`] table, the
//! parsed [`MetadataStore`], and the [`PackageInfo`] that ends up as
//! `packageinfo.json`.

pub mod descriptor;
pub mod metadata;
pub mod role;

// Re-exports
pub use descriptor::{DEFAULT_VERSION, PackageDescriptor, PackageInfo};
pub use metadata::{MetadataError, MetadataStore};
pub use role::{METADATA_FILES, MetadataFile, Role};

/// File name of the package descriptor inside a package directory.
pub const PACKAGE_INFO_FILE: &str = "packageinfo.json";
