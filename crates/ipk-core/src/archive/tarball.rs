//! Gzip-compressed tarballs of staged trees.
//!
//! Entry names are relative to the tree root, so the archive unpacks at `/`.
//! Ownership is normalized to root (uid/gid 0). Directory modes are widened
//! while walking: every directory gains execute bits wherever it has read
//! bits, and directories named after a bundled service also gain write bits
//! the same way. The staged files themselves are not modified.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use walkdir::WalkDir;

use crate::error::{IoResultExt, PackagerError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TarSummary {
    pub entries: usize,
    /// Total size of regular files.
    pub file_bytes: u64,
}

/// Mode recorded for a directory in the archive.
pub fn directory_mode(mode: u32, name: &str, services: &HashSet<String>) -> u32 {
    let mode = mode & 0o7777;
    let read = mode & 0o444;
    let mut out = mode | (read >> 2);
    if services.contains(name) {
        out |= read >> 1;
    }
    out
}

/// Tar `root` into `out` (gzip compressed).
pub fn write_tar_gz(root: &Path, out: &Path, services: &HashSet<String>) -> Result<TarSummary> {
    let file = File::create(out).at(out)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut summary = TarSummary::default();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            match e.into_io_error() {
                Some(io) => PackagerError::io(path, io),
                None => PackagerError::Format(format!("filesystem loop under {}", root.display())),
            }
        })?;
        let path = entry.path();
        let name = archive_name(root, path);
        let meta = entry.metadata().map_err(|e| {
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
            PackagerError::io(path, io)
        })?;

        let mut header = tar::Header::new_gnu();
        header.set_metadata_in_mode(&meta, tar::HeaderMode::Complete);
        header.set_uid(0);
        header.set_gid(0);
        // Complete mode copies st_mode verbatim, file type bits included
        let mode = header.mode().at(path)? & 0o7777;
        header.set_mode(mode);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let base = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            header.set_mode(directory_mode(mode, base, services));
            builder
                .append_data(&mut header, &name, std::io::empty())
                .at(path)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(path).at(path)?;
            builder.append_link(&mut header, &name, &target).at(path)?;
        } else {
            let reader = File::open(path).at(path)?;
            builder.append_data(&mut header, &name, reader).at(path)?;
            summary.file_bytes += meta.len();
        }
        summary.entries += 1;
    }

    let encoder = builder.into_inner().at(out)?;
    let mut writer = encoder.finish().at(out)?;
    writer.flush().at(out)?;
    Ok(summary)
}

/// `./<relative path>`; the root itself is `./`.
fn archive_name(root: &Path, path: &Path) -> PathBuf {
    let rel = path.strip_prefix(root).unwrap_or(path);
    Path::new(".").join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use tempfile::tempdir;

    fn read_entries(tarball: &Path) -> Vec<(String, u32, tar::EntryType)> {
        let file = File::open(tarball).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                (name, e.header().mode().unwrap(), e.header().entry_type())
            })
            .collect()
    }

    #[test]
    fn test_directory_mode_widening() {
        let services: HashSet<String> = ["com.x.svc".to_string()].into();
        assert_eq!(directory_mode(0o40644, "dir", &services), 0o755);
        assert_eq!(directory_mode(0o700, "dir", &services), 0o700);
        assert_eq!(directory_mode(0o644, "com.x.svc", &services), 0o777);
        assert_eq!(directory_mode(0o600, "com.x.svc", &services), 0o700);
    }

    #[test]
    fn test_entries_are_relative_to_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        fs::create_dir_all(root.join("usr/palm/applications/com.x")).unwrap();
        fs::write(root.join("usr/palm/applications/com.x/index.html"), "hi").unwrap();

        let out = dir.path().join("data.tar.gz");
        let summary = write_tar_gz(&root, &out, &HashSet::new()).unwrap();
        assert_eq!(summary.file_bytes, 2);
        assert_eq!(summary.entries, 6);

        let names: Vec<_> = read_entries(&out).into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(
            names,
            vec![
                ".",
                "usr",
                "usr/palm",
                "usr/palm/applications",
                "usr/palm/applications/com.x",
                "usr/palm/applications/com.x/index.html",
            ]
        );
        assert!(names.iter().all(|n| !n.contains(dir.path().to_str().unwrap())));
    }

    #[cfg(unix)]
    #[test]
    fn test_modes_recorded_with_fixup() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        let svc = root.join("services/com.x.svc");
        fs::create_dir_all(&svc).unwrap();
        fs::write(svc.join("run.sh"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(svc.join("run.sh"), fs::Permissions::from_mode(0o644)).unwrap();
        fs::set_permissions(&svc, fs::Permissions::from_mode(0o744)).unwrap();

        let out = dir.path().join("data.tar.gz");
        let services: HashSet<String> = ["com.x.svc".to_string()].into();
        write_tar_gz(&root, &out, &services).unwrap();

        let entries = read_entries(&out);
        let find = |name: &str| entries.iter().find(|(n, _, _)| n == name).unwrap().clone();

        let (_, mode, kind) = find("services/com.x.svc");
        assert!(kind.is_dir());
        assert_eq!(mode, 0o777);

        let (_, mode, kind) = find("services/com.x.svc/run.sh");
        assert!(kind.is_file());
        assert_eq!(mode, 0o644);

        // Staged tree is left untouched
        let on_disk = fs::metadata(&svc).unwrap().permissions().mode() & 0o777;
        assert_eq!(on_disk, 0o744);
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let dir = tempdir().unwrap();
        let err = write_tar_gz(
            &dir.path().join("missing"),
            &dir.path().join("x.tar.gz"),
            &HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PackagerError::Io { .. }));
    }
}
