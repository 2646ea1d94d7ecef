//! Recursive directory copy with a per-file transform hook.
//!
//! Directories are recreated, symlinks are recreated as symlinks, and every
//! regular file goes through a [`FileTransform`]. Sockets, FIFOs and device
//! nodes are skipped with a warning. The transform receives an
//! explicit [`CopyContext`] naming the roots of this copy, so concurrent
//! copies never share state.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ipk_schema::Role;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{IoResultExt, PackagerError, Result};

/// Roots of one copy operation, passed to every transform call.
#[derive(Debug, Clone)]
pub struct CopyContext {
    pub src_root: PathBuf,
    pub dst_root: PathBuf,
    pub role: Role,
}

impl CopyContext {
    /// Path of `src` relative to the source root.
    pub fn relative<'a>(&self, src: &'a Path) -> &'a Path {
        src.strip_prefix(&self.src_root).unwrap_or(src)
    }
}

/// Produces the destination file for one source file.
#[async_trait]
pub trait FileTransform: Send + Sync {
    async fn apply(&self, ctx: &CopyContext, src: &Path, dst: &Path) -> Result<()>;
}

/// Byte-for-byte copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

#[async_trait]
impl FileTransform for Verbatim {
    async fn apply(&self, _ctx: &CopyContext, src: &Path, dst: &Path) -> Result<()> {
        tokio::fs::copy(src, dst).await.at(src)?;
        Ok(())
    }
}

/// Per-copy hooks. `filter` returning `false` skips a path (and, for a
/// directory, everything below it).
pub struct CopyOptions<'a> {
    pub filter: &'a (dyn Fn(&Path) -> bool + Send + Sync),
    pub transform: &'a dyn FileTransform,
}

impl std::fmt::Debug for CopyOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyOptions").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub dirs: usize,
    pub files: usize,
    pub links: usize,
    /// Entries that are neither directories, symlinks nor regular files.
    pub skipped: usize,
}

/// Copy `ctx.src_root` into `ctx.dst_root`.
///
/// Files are processed one at a time in name order; the first failure
/// aborts the copy and leaves whatever was already written in place.
pub async fn copy_tree(ctx: &CopyContext, options: &CopyOptions<'_>) -> Result<CopyStats> {
    let mut stats = CopyStats::default();

    let walker = WalkDir::new(&ctx.src_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (options.filter)(e.path()));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&ctx.src_root).to_path_buf();
            match e.into_io_error() {
                Some(io) => PackagerError::io(path, io),
                None => PackagerError::transform(path, "filesystem loop detected"),
            }
        })?;

        let src = entry.path();
        let dst = ctx.dst_root.join(ctx.relative(src));
        let file_type = entry.file_type();

        if file_type.is_dir() {
            tokio::fs::create_dir_all(&dst).await.at(&dst)?;
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            copy_symlink(src, &dst).await?;
            stats.links += 1;
        } else if file_type.is_file() {
            options.transform.apply(ctx, src, &dst).await?;
            stats.files += 1;
        } else {
            warn!(path = %src.display(), "skipping special file");
            stats.skipped += 1;
        }
    }

    Ok(stats)
}

#[cfg(unix)]
async fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = tokio::fs::read_link(src).await.at(src)?;
    tokio::fs::symlink(&target, dst).await.at(dst)?;
    Ok(())
}

#[cfg(not(unix))]
async fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    tokio::fs::copy(src, dst).await.at(src)?;
    Ok(())
}

/// Filter that rejects any path whose file name is in `names`.
pub fn exclude_names(names: &[String]) -> impl Fn(&Path) -> bool + Send + Sync + '_ {
    move |path: &Path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_none_or(|n| !names.iter().any(|x| x == n))
    }
}
