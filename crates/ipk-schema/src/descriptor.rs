//! The package descriptor (`packageinfo.json`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::MetadataStore;

/// Version used when the application metadata declares none.
pub const DEFAULT_VERSION: &str = "1.0.0";

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// Unified identity of one installable package: an app plus its services.
///
/// Field order matches the serialized layout of `packageinfo.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Identifier of the bundled application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,

    /// Package identity; also the name of its staging subdirectory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Localized display name (the app's `title`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_name: Option<String>,

    /// Packaging format revision (the app's `uiRevision`), kept as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_format_version: Option<Value>,

    /// Vendor display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Package version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Service identifiers in discovery order. `None` entries mark services
    /// whose metadata had no identifier and serialize as `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Option<String>>>,
}

impl PackageDescriptor {
    /// Derive a descriptor from application metadata and resolved service ids.
    ///
    /// The `services` key is left out entirely when `services` is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use ipk_schema::{MetadataStore, PackageDescriptor};
    ///
    /// let app = MetadataStore::from_slice(br#"{"id":"com.x.y","title":"X"}"#).unwrap();
    /// let desc = PackageDescriptor::from_app(&app, vec![Some("com.x.y.service".into())]);
    /// assert_eq!(desc.id.as_deref(), Some("com.x.y"));
    /// assert_eq!(desc.version, "1.0.0");
    /// ```
    pub fn from_app(app: &MetadataStore, services: Vec<Option<String>>) -> Self {
        let id = app.get_str("id").map(str::to_string);
        Self {
            app: id.clone(),
            id,
            loc_name: app.get_str("title").map(str::to_string),
            package_format_version: app.get("uiRevision").cloned(),
            vendor: app.get_str("vendor").map(str::to_string),
            version: app
                .get_str("version")
                .map_or_else(default_version, str::to_string),
            services: (!services.is_empty()).then_some(services),
        }
    }

    /// Serialize with 2-space indentation and a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Staging directory name: the id, or the empty string when it is absent.
    pub fn identity(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

/// The `packageinfo.json` a packaging run ends up with.
///
/// Serializes as the document itself, without a variant tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PackageInfo {
    /// Derived from the application metadata by the packager.
    Synthesized(PackageDescriptor),
    /// Read from a package directory and kept exactly as written.
    Supplied(MetadataStore),
}

impl PackageInfo {
    /// The package id, or the empty string when it is absent or not a string.
    ///
    /// # Example
    ///
    /// ```
    /// use ipk_schema::{MetadataStore, PackageInfo};
    ///
    /// let doc = MetadataStore::from_slice(br#"{"id":"com.x","loc_name":{"en":"X"}}"#).unwrap();
    /// let info = PackageInfo::Supplied(doc);
    /// assert_eq!(info.identity(), "com.x");
    /// assert_eq!(info.version(), "1.0.0");
    /// ```
    pub fn identity(&self) -> &str {
        match self {
            Self::Synthesized(desc) => desc.identity(),
            Self::Supplied(doc) => doc.get_str("id").unwrap_or_default(),
        }
    }

    /// The package version, falling back to [`DEFAULT_VERSION`] when a
    /// supplied document has no string `version`. The document itself is
    /// never changed.
    pub fn version(&self) -> &str {
        match self {
            Self::Synthesized(desc) => &desc.version,
            Self::Supplied(doc) => doc.get_str("version").unwrap_or(DEFAULT_VERSION),
        }
    }

    /// Whether the document came from a package directory.
    pub fn is_supplied(&self) -> bool {
        matches!(self, Self::Supplied(_))
    }
}
