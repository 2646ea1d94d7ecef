//! Metadata discovery: classify input directories by role and load their metadata.
//!
//! ```text
//! [dirs] --classify()--> RoleMap<DirectoryEntry> --load()--> RoleMap<LoadedEntry>
//! ```
//!
//! Classification is a read-only probe. Loading reads every metadata file
//! concurrently and fails on the first unreadable or unparsable one.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Component, Path, PathBuf};

use futures::future::try_join_all;
use ipk_schema::{METADATA_FILES, MetadataFile, MetadataStore, Role};
use tracing::{debug, info, warn};

use crate::error::{IoResultExt, PackagerError, Result};

/// Resolved inputs grouped by role.
///
/// Construction guarantees the package invariants: exactly one app, any
/// number of services (in discovery order), at most one package.
#[derive(Debug, Clone)]
pub struct RoleMap<T> {
    app: T,
    services: Vec<T>,
    package: Option<T>,
}

impl<T> RoleMap<T> {
    pub fn new(app: T, services: Vec<T>, package: Option<T>) -> Self {
        Self {
            app,
            services,
            package,
        }
    }

    pub fn app(&self) -> &T {
        &self.app
    }

    pub fn services(&self) -> &[T] {
        &self.services
    }

    pub fn package(&self) -> Option<&T> {
        self.package.as_ref()
    }

    /// Entries of one role, in discovery order.
    pub fn role(&self, role: Role) -> &[T] {
        match role {
            Role::App => std::slice::from_ref(&self.app),
            Role::Service => &self.services,
            Role::Package => self.package.as_slice(),
        }
    }

    /// All entries: app, then services, then package.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.app)
            .chain(self.services.iter())
            .chain(self.package.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.services.len() + usize::from(self.package.is_some())
    }

    /// Map every entry concurrently, across all roles at once.
    pub async fn try_map_concurrent<U, F, Fut>(self, f: F) -> Result<RoleMap<U>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<U>>,
    {
        let Self {
            app,
            services,
            package,
        } = self;
        let f = &f;
        let package = async move {
            match package {
                Some(p) => f(p).await.map(Some),
                None => Ok(None),
            }
        };

        let (app, services, package) =
            futures::try_join!(f(app), try_join_all(services.into_iter().map(f)), package)?;
        Ok(RoleMap::new(app, services, package))
    }

    /// Map entries role by role (app, services, package). Entries of the
    /// same role run concurrently; a role starts only after the previous
    /// one has fully completed.
    pub async fn try_map_by_role<U, F, Fut>(self, f: F) -> Result<RoleMap<U>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<U>>,
    {
        let app = f(self.app).await?;
        let services = try_join_all(self.services.into_iter().map(&f)).await?;
        let package = match self.package {
            Some(p) => Some(f(p).await?),
            None => None,
        };
        Ok(RoleMap::new(app, services, package))
    }
}

/// A classified input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub source_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub role: Role,
    /// Metadata field naming this component (`id` or `name`).
    pub identity_key: &'static str,
}

impl DirectoryEntry {
    fn new(dir: &Path, file: &MetadataFile) -> Self {
        Self {
            source_dir: dir.to_path_buf(),
            metadata_path: dir.join(file.file_name),
            role: file.role,
            identity_key: file.identity_key,
        }
    }
}

/// A classified directory together with its parsed metadata.
#[derive(Debug, Clone)]
pub struct LoadedEntry {
    pub entry: DirectoryEntry,
    pub metadata: MetadataStore,
}

impl LoadedEntry {
    /// The component's identity, or `None` if its metadata lacks a string value
    /// for the identity key.
    pub fn identity(&self) -> Option<&str> {
        self.metadata.get_str(self.entry.identity_key)
    }
}

/// Probe `dir` for a recognized metadata file. The first file found in
/// [`METADATA_FILES`] order decides the role.
pub fn probe(dir: &Path) -> Option<DirectoryEntry> {
    METADATA_FILES
        .iter()
        .find(|file| dir.join(file.file_name).is_file())
        .map(|file| DirectoryEntry::new(dir, file))
}

/// Classify input directories by role.
///
/// Directories without a recognized metadata file are skipped.
///
/// # Errors
///
/// Returns [`PackagerError::Input`] when `dirs` is empty, when the number
/// of application directories is not exactly one, or when more than one
/// package directory is given.
pub fn classify(dirs: &[PathBuf]) -> Result<RoleMap<DirectoryEntry>> {
    if dirs.is_empty() {
        return Err(PackagerError::Input("no input directories given".to_string()));
    }

    let mut apps = Vec::new();
    let mut services = Vec::new();
    let mut packages = Vec::new();

    for dir in dirs {
        let Some(entry) = probe(dir) else {
            warn!(dir = %dir.display(), "no metadata file found, skipping");
            continue;
        };
        debug!(
            dir = %dir.display(),
            role = %entry.role,
            file = %entry.metadata_path.display(),
            "classified directory"
        );
        match entry.role {
            Role::App => apps.push(entry),
            Role::Service => services.push(entry),
            Role::Package => packages.push(entry),
        }
    }

    if apps.len() != 1 {
        let found: Vec<_> = apps.iter().map(|e| e.source_dir.display().to_string()).collect();
        return Err(PackagerError::Input(if found.is_empty() {
            "failure finding app directory: no appinfo.json in any input".to_string()
        } else {
            format!("ambiguous app directory: {}", found.join(", "))
        }));
    }

    if packages.len() > 1 {
        let found: Vec<_> = packages
            .iter()
            .map(|e| e.source_dir.display().to_string())
            .collect();
        return Err(PackagerError::Input(format!(
            "ambiguous package directory: {}",
            found.join(", ")
        )));
    }

    let app = apps.remove(0);
    Ok(RoleMap::new(app, services, packages.pop()))
}

/// Read and parse one entry's metadata file.
pub async fn load_entry(entry: DirectoryEntry) -> Result<LoadedEntry> {
    let bytes = tokio::fs::read(&entry.metadata_path)
        .await
        .at(&entry.metadata_path)?;
    let metadata = MetadataStore::from_slice(&bytes).map_err(|source| PackagerError::Parse {
        path: entry.metadata_path.clone(),
        source,
    })?;
    Ok(LoadedEntry { entry, metadata })
}

/// Load every classified entry's metadata concurrently.
pub async fn load(classified: RoleMap<DirectoryEntry>) -> Result<RoleMap<LoadedEntry>> {
    classified.try_map_concurrent(load_entry).await
}

/// Reject two entries of one role that would stage into the same directory.
pub fn check_identities(loaded: &RoleMap<LoadedEntry>) -> Result<()> {
    let mut seen = HashSet::new();
    for svc in loaded.services() {
        let identity = svc.identity().unwrap_or_default();
        if !seen.insert(identity) {
            return Err(PackagerError::Input(format!(
                "duplicate service identity '{identity}' ({})",
                svc.entry.source_dir.display()
            )));
        }
    }
    Ok(())
}

/// Whether `name` can be joined onto a directory without leaving it.
///
/// The empty name is accepted; it stands for the directory itself.
pub fn is_path_safe(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

/// Reject identities that would place a staging directory outside its role root.
pub fn check_paths(loaded: &RoleMap<LoadedEntry>) -> Result<()> {
    for entry in loaded.iter() {
        let identity = entry.identity().unwrap_or_default();
        if !is_path_safe(identity) {
            return Err(PackagerError::Input(format!(
                "{} identity '{identity}' is not a plain file name ({})",
                entry.entry.role,
                entry.entry.metadata_path.display()
            )));
        }
    }
    Ok(())
}

/// Classify, load, and validate inputs in one step.
pub async fn resolve(dirs: &[PathBuf]) -> Result<RoleMap<LoadedEntry>> {
    let classified = classify(dirs)?;
    let loaded = load(classified).await?;
    check_identities(&loaded)?;
    check_paths(&loaded)?;

    for entry in loaded.iter() {
        match entry.identity() {
            Some(id) => info!(role = %entry.entry.role, id, "resolved"),
            None => warn!(
                role = %entry.entry.role,
                key = entry.entry.identity_key,
                dir = %entry.entry.source_dir.display(),
                "metadata has no identity"
            ),
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn component(root: &Path, name: &str, file: &str, body: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
        dir
    }

    #[test]
    fn test_probe_priority_is_first_match() {
        let root = tempdir().unwrap();
        let dir = component(root.path(), "both", "appinfo.json", "{}");
        fs::write(dir.join("services.json"), "{}").unwrap();

        let entry = probe(&dir).unwrap();
        assert_eq!(entry.role, Role::App);
        assert_eq!(entry.identity_key, "id");
    }

    #[test]
    fn test_probe_legacy_service_name() {
        let root = tempdir().unwrap();
        let dir = component(root.path(), "svc", "package.json", "{}");
        let entry = probe(&dir).unwrap();
        assert_eq!(entry.role, Role::Service);
        assert_eq!(entry.identity_key, "name");
    }

    #[test]
    fn test_classify_skips_unknown_dirs() {
        let root = tempdir().unwrap();
        let app = component(root.path(), "app", "appinfo.json", "{}");
        let other = root.path().join("assets");
        fs::create_dir_all(&other).unwrap();

        let map = classify(&[other, app.clone()]).unwrap();
        assert_eq!(map.app().source_dir, app);
        assert!(map.services().is_empty());
        assert!(map.package().is_none());
    }

    #[test]
    fn test_classify_requires_one_app() {
        let root = tempdir().unwrap();
        let svc = component(root.path(), "svc", "services.json", "{}");
        let err = classify(std::slice::from_ref(&svc)).unwrap_err();
        assert!(err.is_input());

        let a = component(root.path(), "a", "appinfo.json", "{}");
        let b = component(root.path(), "b", "appinfo.json", "{}");
        let err = classify(&[a, b, svc]).unwrap_err();
        assert!(err.to_string().contains("ambiguous app directory"));
    }

    #[test]
    fn test_classify_rejects_empty_input() {
        assert!(classify(&[]).unwrap_err().is_input());
    }

    #[test]
    fn test_classify_keeps_service_order() {
        let root = tempdir().unwrap();
        let app = component(root.path(), "app", "appinfo.json", "{}");
        let s2 = component(root.path(), "s2", "services.json", "{}");
        let s1 = component(root.path(), "s1", "services.json", "{}");

        let map = classify(&[s2.clone(), app, s1.clone()]).unwrap();
        let order: Vec<_> = map.services().iter().map(|e| e.source_dir.clone()).collect();
        assert_eq!(order, vec![s2, s1]);
    }

    #[tokio::test]
    async fn test_load_parses_all_entries() {
        let root = tempdir().unwrap();
        let app = component(root.path(), "app", "appinfo.json", r#"{"id":"com.x"}"#);
        let svc = component(root.path(), "svc", "services.json", r#"{"id":"com.x.s"}"#);

        let loaded = resolve(&[app, svc]).await.unwrap();
        assert_eq!(loaded.app().identity(), Some("com.x"));
        assert_eq!(loaded.services()[0].identity(), Some("com.x.s"));
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_load_fails_on_bad_metadata() {
        let root = tempdir().unwrap();
        let app = component(root.path(), "app", "appinfo.json", r#"{"id":"com.x"}"#);
        let svc = component(root.path(), "svc", "services.json", "not json");

        let err = resolve(&[app, svc]).await.unwrap_err();
        match err {
            PackagerError::Parse { path, .. } => assert!(path.ends_with("svc/services.json")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_service_identity_rejected() {
        let root = tempdir().unwrap();
        let app = component(root.path(), "app", "appinfo.json", r#"{"id":"com.x"}"#);
        let s1 = component(root.path(), "s1", "services.json", r#"{"id":"dup"}"#);
        let s2 = component(root.path(), "s2", "package.json", r#"{"name":"dup"}"#);

        let err = resolve(&[app, s1, s2]).await.unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn test_is_path_safe() {
        assert!(is_path_safe(""));
        assert!(is_path_safe("com.x.y"));
        assert!(is_path_safe("..hidden"));
        assert!(!is_path_safe("/abs"));
        assert!(!is_path_safe(".."));
        assert!(!is_path_safe("."));
        assert!(!is_path_safe("a/b"));
        assert!(!is_path_safe("a/."));
        assert!(!is_path_safe("../up"));
    }

    #[tokio::test]
    async fn test_absolute_app_identity_rejected() {
        let root = tempdir().unwrap();
        let escaped = root.path().join("escaped");
        let body = serde_json::json!({ "id": escaped.to_string_lossy() }).to_string();
        let app = component(root.path(), "app", "appinfo.json", &body);

        let err = resolve(&[app]).await.unwrap_err();
        assert!(err.is_input(), "{err}");
        assert!(!escaped.exists());
    }

    #[tokio::test]
    async fn test_parent_dir_identities_rejected() {
        let root = tempdir().unwrap();
        let app = component(root.path(), "app", "appinfo.json", r#"{"id":"com.x"}"#);
        let svc = component(root.path(), "svc", "services.json", r#"{"id":"../../up"}"#);
        assert!(resolve(&[app.clone(), svc]).await.unwrap_err().is_input());

        let pkg = component(root.path(), "pkg", "packageinfo.json", r#"{"id":".."}"#);
        assert!(resolve(&[app.clone(), pkg]).await.unwrap_err().is_input());

        let legacy = component(root.path(), "legacy", "package.json", r#"{"name":"a/../.."}"#);
        assert!(resolve(&[app, legacy]).await.unwrap_err().is_input());
    }

    #[tokio::test]
    async fn test_try_map_by_role_preserves_order() {
        let map = RoleMap::new(0, vec![1, 2, 3], Some(4));
        let doubled = map
            .try_map_by_role(|n| async move { Ok::<_, PackagerError>(n * 2) })
            .await
            .unwrap();
        assert_eq!(*doubled.app(), 0);
        assert_eq!(doubled.services(), &[2, 4, 6]);
        assert_eq!(doubled.package(), Some(&8));
        assert_eq!(doubled.role(Role::Package), &[8]);
    }
}
