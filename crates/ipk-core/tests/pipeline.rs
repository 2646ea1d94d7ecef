use std::fs;
use std::io::Read;
use std::path::PathBuf;

use flate2::read::GzDecoder;
use ipk_core::{Packager, PackagerConfig, PackagerError, WhitespaceMinifier};
use serde_json::json;
use tempfile::TempDir;

/// Input directories plus a scratch area for staging and output.
struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            root: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn component(&self, name: &str, file: &str, body: &str) -> PathBuf {
        let dir = self.root.path().join("in").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
        dir
    }

    fn dest(&self) -> PathBuf {
        self.root.path().join("out")
    }

    fn packager(&self) -> Packager {
        let config = PackagerConfig {
            temp_dir: Some(self.root.path().join("staging")),
            source_date_epoch: Some(1_700_000_000),
            ..PackagerConfig::default()
        };
        Packager::new(config).with_minifier(std::sync::Arc::new(WhitespaceMinifier))
    }

    fn staging_roots(&self) -> usize {
        let staging = self.root.path().join("staging");
        fs::read_dir(staging).map_or(0, Iterator::count)
    }
}

/// Split an `ar` archive into `(name, content)` pairs.
fn ar_members(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    assert_eq!(&bytes[..8], b"!<arch>\n");
    let mut members = Vec::new();
    let mut pos = 8;
    while pos < bytes.len() {
        let header = &bytes[pos..pos + 60];
        assert_eq!(&header[58..60], b"`\n");
        let name = String::from_utf8_lossy(&header[..16]).trim_end().to_string();
        let size: usize = String::from_utf8_lossy(&header[48..58]).trim().parse().unwrap();
        let start = pos + 60;
        members.push((name, bytes[start..start + size].to_vec()));
        pos = start + size + size % 2;
    }
    members
}

/// `(path, contents)` of every entry in a gzipped tar.
fn tar_entries(gz: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(GzDecoder::new(gz));
    archive
        .entries()
        .unwrap()
        .map(|e| {
            let mut e = e.unwrap();
            let name = e.path().unwrap().to_string_lossy().into_owned();
            let mut body = Vec::new();
            e.read_to_end(&mut body).unwrap();
            (name, body)
        })
        .collect()
}

#[tokio::test]
async fn test_app_and_service_package() {
    let fx = Fixture::new();
    let app = fx.component(
        "app",
        "appinfo.json",
        r#"{"id":"com.x.y","title":"X","version":"2.1.0","vendor":"Acme"}"#,
    );
    fs::write(app.join("index.html"), "<html></html>\n").unwrap();
    fs::write(app.join("app.js"), "// entry\n    start();\n").unwrap();
    let svc = fx.component("svc", "services.json", r#"{"id":"com.x.y.service"}"#);

    let outcome = fx.packager().package(&[app, svc], &fx.dest()).await.unwrap();

    let descriptor = serde_json::to_value(&outcome.descriptor).unwrap();
    assert_eq!(
        descriptor,
        json!({
            "app": "com.x.y",
            "id": "com.x.y",
            "loc_name": "X",
            "vendor": "Acme",
            "version": "2.1.0",
            "services": ["com.x.y.service"],
        })
    );
    assert_eq!(
        outcome.artifact_path,
        fx.dest().join("com.x.y_2.1.0_all.ipk")
    );
    assert!(outcome.message.contains("com.x.y_2.1.0_all.ipk"));

    let bytes = fs::read(&outcome.artifact_path).unwrap();
    let members = ar_members(&bytes);
    let names: Vec<_> = members.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["debian-binary", "control.tar.gz", "data.tar.gz"]);
    assert_eq!(members[0].1, b"2.0\n");

    let control = tar_entries(&members[1].1);
    let (_, text) = control.iter().find(|(n, _)| n == "control").unwrap();
    let text = String::from_utf8(text.clone()).unwrap();
    assert!(text.starts_with("Package: com.x.y\nVersion: 2.1.0\n"));
    assert!(text.ends_with("\n\n"));

    let data = tar_entries(&members[2].1);
    let find = |name: &str| data.iter().find(|(n, _)| n == name).map(|(_, b)| b.clone());
    assert_eq!(
        find("usr/palm/applications/com.x.y/index.html").unwrap(),
        b"<html></html>\n"
    );
    assert_eq!(
        find("usr/palm/applications/com.x.y/app.js").unwrap(),
        b"start();\n//# sourceMappingURL=app.js.map\n"
    );
    assert!(find("usr/palm/applications/com.x.y/app.js.map").is_some());
    assert!(find("usr/palm/services/com.x.y.service/services.json").is_some());
    let info = find("usr/palm/packages/com.x.y/packageinfo.json").unwrap();
    assert_eq!(serde_json::from_slice::<serde_json::Value>(&info).unwrap(), descriptor);

    // Staging is left for the caller
    assert!(outcome.staging.temp_root.is_dir());
    outcome.staging.cleanup().unwrap();
}

#[tokio::test]
async fn test_service_without_id_is_listed_as_null() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"com.x.y","version":"2.1.0"}"#);
    let svc = fx.component("svc", "services.json", r#"{"title":"nameless"}"#);

    let outcome = fx.packager().package(&[app, svc], &fx.dest()).await.unwrap();
    assert_eq!(
        serde_json::to_value(&outcome.descriptor).unwrap()["services"],
        json!([null])
    );

    let written = fs::read_to_string(
        outcome
            .staging
            .package_root
            .join("com.x.y/packageinfo.json"),
    )
    .unwrap();
    assert!(written.contains("\"services\": [\n    null\n  ]"));
}

#[tokio::test]
async fn test_services_keep_input_order() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"a"}"#);
    let s2 = fx.component("s2", "services.json", r#"{"id":"a.zeta"}"#);
    let s1 = fx.component("s1", "package.json", r#"{"name":"a.alpha"}"#);
    let plain = fx.root.path().join("in/plain");
    fs::create_dir_all(&plain).unwrap();

    let outcome = fx
        .packager()
        .package(&[s2, app, plain, s1], &fx.dest())
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&outcome.descriptor).unwrap()["services"],
        json!(["a.zeta", "a.alpha"])
    );
}

#[tokio::test]
async fn test_supplied_package_descriptor_is_used() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"com.x.y"}"#);
    let pkg = fx.component(
        "pkg",
        "packageinfo.json",
        r#"{"id":"com.x.y","version":"3.0.0","app":"com.x.y"}"#,
    );

    let outcome = fx.packager().package(&[app, pkg], &fx.dest()).await.unwrap();
    assert_eq!(outcome.descriptor.version(), "3.0.0");
    assert_eq!(
        outcome.artifact_path.file_name().unwrap(),
        "com.x.y_3.0.0_all.ipk"
    );
}

#[tokio::test]
async fn test_supplied_package_descriptor_passes_through_verbatim() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"com.x.app","version":"9.0.0"}"#);
    let body = r#"{"id":"com.x","version":"1.0.0","package_format_version":2,"loc_name":{"en":"X"}}"#;
    let pkg = fx.component("pkg", "packageinfo.json", body);

    let outcome = fx.packager().package(&[app, pkg], &fx.dest()).await.unwrap();
    assert!(outcome.descriptor.is_supplied());
    assert_eq!(
        serde_json::to_value(&outcome.descriptor).unwrap(),
        serde_json::from_str::<serde_json::Value>(body).unwrap()
    );
    assert_eq!(
        fs::read_to_string(outcome.staging.package_root.join("com.x/packageinfo.json")).unwrap(),
        body
    );
    assert_eq!(
        outcome.artifact_path.file_name().unwrap(),
        "com.x_1.0.0_all.ipk"
    );
}

#[tokio::test]
async fn test_identity_outside_staging_is_rejected() {
    let fx = Fixture::new();
    let escaped = fx.root.path().join("escaped");
    let body = json!({ "id": escaped.to_string_lossy() }).to_string();
    let app = fx.component("app", "appinfo.json", &body);

    let err = fx.packager().package(&[app], &fx.dest()).await.unwrap_err();
    assert!(err.is_input(), "{err}");
    assert_eq!(fx.staging_roots(), 0);
    assert!(!escaped.exists());
    assert!(!fx.root.path().join("escaped_1.0.0_all.ipk").exists());
}

#[tokio::test]
async fn test_parent_dir_service_identity_is_rejected() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"com.x.y"}"#);
    let svc = fx.component("svc", "services.json", r#"{"id":"../../../up"}"#);

    let err = fx.packager().package(&[app, svc], &fx.dest()).await.unwrap_err();
    assert!(err.is_input(), "{err}");
    assert_eq!(fx.staging_roots(), 0);
}

#[tokio::test]
async fn test_template_literal_survives_minification() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"tpl"}"#);
    let script = "const s = `line1\n    // not a comment\n\n    indented`;\n";
    fs::write(app.join("main.js"), script).unwrap();

    let outcome = fx.packager().package(&[app], &fx.dest()).await.unwrap();
    let staged = fs::read_to_string(outcome.staging.app_root.join("tpl/main.js")).unwrap();
    assert!(staged.starts_with(script), "{staged}");
    assert!(staged.contains("// not a comment"));
}

#[tokio::test]
async fn test_missing_app_fails_before_staging() {
    let fx = Fixture::new();
    let svc = fx.component("svc", "services.json", r#"{"id":"s"}"#);

    let err = fx.packager().package(&[svc], &fx.dest()).await.unwrap_err();
    assert!(err.is_input(), "{err}");
    assert_eq!(fx.staging_roots(), 0);
    assert!(!fx.dest().exists());
}

#[tokio::test]
async fn test_two_apps_fail_before_staging() {
    let fx = Fixture::new();
    let a = fx.component("a", "appinfo.json", r#"{"id":"a"}"#);
    let b = fx.component("b", "appinfo.json", r#"{"id":"b"}"#);

    let err = fx.packager().package(&[a, b], &fx.dest()).await.unwrap_err();
    assert!(err.is_input(), "{err}");
    assert_eq!(fx.staging_roots(), 0);
}

#[tokio::test]
async fn test_malformed_metadata_is_parse_error() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", "{ not json");

    let err = fx.packager().package(&[app], &fx.dest()).await.unwrap_err();
    match err {
        PackagerError::Parse { path, .. } => assert!(path.ends_with("appinfo.json")),
        other => panic!("expected parse error, got {other}"),
    }
}

#[tokio::test]
async fn test_check_reports_roles_without_writing() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"com.x.y"}"#);
    let svc = fx.component("svc", "services.json", r#"{"id":"com.x.y.svc"}"#);

    let resolved = fx.packager().check(&[app, svc]).await.unwrap();
    assert_eq!(resolved.app().identity(), Some("com.x.y"));
    assert_eq!(resolved.services().len(), 1);
    assert_eq!(fx.staging_roots(), 0);
}

#[tokio::test]
async fn test_non_script_files_are_byte_identical() {
    let fx = Fixture::new();
    let app = fx.component("app", "appinfo.json", r#"{"id":"bin"}"#);
    let blob: Vec<u8> = (0..=255u8).cycle().take(4097).collect();
    fs::create_dir_all(app.join("assets")).unwrap();
    fs::write(app.join("assets/blob.bin"), &blob).unwrap();

    let outcome = fx.packager().package(&[app], &fx.dest()).await.unwrap();
    let staged = outcome.staging.app_root.join("bin/assets/blob.bin");
    assert_eq!(fs::read(staged).unwrap(), blob);
}
