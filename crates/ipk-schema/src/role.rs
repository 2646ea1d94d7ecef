//! Directory roles and the metadata files that identify them.

use serde::{Deserialize, Serialize};

/// Classification of an input directory, decided by the metadata file it carries.
///
/// # Example
///
/// ```
/// use ipk_schema::Role;
///
/// assert_eq!(Role::Service.staging_subdir(), "usr/palm/services");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The application root. Exactly one per package.
    App,
    /// A service bundled alongside the application.
    Service,
    /// A pre-built package descriptor tree.
    Package,
}

impl Role {
    /// Staging order. Roles are staged one after another in this order.
    pub const ALL: [Role; 3] = [Role::App, Role::Service, Role::Package];

    /// Path of this role's subtree below the staged data root.
    pub fn staging_subdir(self) -> &'static str {
        match self {
            Self::App => "usr/palm/applications",
            Self::Service => "usr/palm/services",
            Self::Package => "usr/palm/packages",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::App => "app",
            Self::Service => "service",
            Self::Package => "package",
        };
        f.pad(name)
    }
}

/// One recognized metadata file name and what it means for its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataFile {
    /// File name probed inside each candidate directory.
    pub file_name: &'static str,
    /// Role assigned to a directory containing this file.
    pub role: Role,
    /// Metadata field holding the component's unique identifier.
    pub identity_key: &'static str,
}

/// Recognized metadata files in probe priority order.
///
/// A directory is classified by the first entry whose file exists in it;
/// later matches in the same directory are ignored. `package.json` and
/// `services.json` both map to [`Role::Service`] (legacy and current naming).
pub const METADATA_FILES: [MetadataFile; 4] = [
    MetadataFile {
        file_name: "appinfo.json",
        role: Role::App,
        identity_key: "id",
    },
    MetadataFile {
        file_name: "package.json",
        role: Role::Service,
        identity_key: "name",
    },
    MetadataFile {
        file_name: "services.json",
        role: Role::Service,
        identity_key: "id",
    },
    MetadataFile {
        file_name: crate::PACKAGE_INFO_FILE,
        role: Role::Package,
        identity_key: "id",
    },
];
