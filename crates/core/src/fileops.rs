// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic file operations shared by the command layer and node wrappers.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Join `path`'s basename onto `root`.
pub fn reroot(root: &Path, path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => root.join(name),
        None => root.to_path_buf(),
    }
}

/// Replace (or add) the final extension of `path`.
pub fn swap_ext(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext.trim_start_matches('.'))
}

/// Insert `postfix` between the stem and the final extension of `path`,
/// e.g. `reads.bam` + `.sorted` becomes `reads.sorted.bam`.
pub fn add_postfix(path: &Path, postfix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, postfix, ext.to_string_lossy()),
        None => format!("{}{}", stem, postfix),
    };
    path.with_file_name(name)
}

/// Move `src` to `dst`, creating `dst`'s parent directories as needed.
///
/// Same-filesystem moves are a single rename. Cross-filesystem moves fall
/// back to copy + fsync of the destination, then unlink of the source, so a
/// crash cannot leave a partial destination standing in for the source.
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(error) if error.raw_os_error() == Some(libc::EXDEV) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "cross-filesystem move, falling back to copy"
            );
            copy_file(src, dst)?;
            fs::remove_file(src)
        }
        Err(error) => Err(error),
    }
}

/// Copy `src` to `dst` and flush the copy to disk before returning.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    fs::File::open(dst)?.sync_all()
}

/// Remove a file, symlink, or directory tree, tolerating paths that do not
/// exist. Returns whether anything was removed.
pub fn try_remove(path: &Path) -> io::Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Whether two paths refer to the same inode.
pub fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    let (a, b) = (fs::metadata(a)?, fs::metadata(b)?);
    Ok(a.dev() == b.dev() && a.ino() == b.ino())
}

/// Create a symbolic link at `dst` pointing to `src`.
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Which of `paths` do not currently exist.
pub fn missing_files<'a, I>(paths: I) -> Vec<&'a Path>
where
    I: IntoIterator<Item = &'a Path>,
{
    paths.into_iter().filter(|path| !path.exists()).collect()
}

#[cfg(test)]
#[path = "fileops_tests.rs"]
mod tests;
