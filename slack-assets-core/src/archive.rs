//! Archive materializer: download a remote archive to scratch storage and unpack
//! it safely.
//!
//! - [`fetch`] performs one authenticated GET, buffers the whole body and writes
//!   it once to a uniquely named file tagged with the expected extension.
//! - [`extract`] unpacks every entry under a caller-chosen root, skipping names
//!   matched by the ignore predicate and refusing any entry that would resolve
//!   outside that root (zip-slip). One bad entry aborts the whole extraction.
//!
//! Nothing here cleans up after itself: the caller owns every path produced.

use reqwest::header::HeaderMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::{ExtractError, FetchError};
use crate::model::ExtractedFile;

/// Default ignore predicate: entry names starting with `_` (e.g. `__MACOSX/`).
pub fn ignore_underscore_prefixed(name: &str) -> bool {
    name.starts_with('_')
}

/// Unique path for a downloaded file inside `scratch_dir`.
pub fn scratch_file_path(scratch_dir: &Path, extension: &str) -> PathBuf {
    scratch_dir.join(format!("{}.{}", uuid::Uuid::new_v4(), extension))
}

/// Unique extraction root inside `scratch_dir`.
pub fn extraction_root(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join(format!("extract-{}", uuid::Uuid::new_v4()))
}

/// Download `url` with `headers` into a fresh file under `scratch_dir`.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    extension: &str,
    scratch_dir: &Path,
) -> Result<PathBuf, FetchError> {
    info!(url = %url, "Downloading archive");

    let response = client.get(url).headers(headers).send().await.map_err(|e| {
        error!(error = %e, url = %url, "Archive download request failed");
        e
    })?;

    let status = response.status();
    if !status.is_success() {
        error!(status = %status, url = %url, "Archive download returned an error status");
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await?;

    if let Err(source) = tokio::fs::create_dir_all(scratch_dir).await {
        return Err(FetchError::Write {
            path: scratch_dir.to_path_buf(),
            source,
        });
    }

    let path = scratch_file_path(scratch_dir, extension);
    if let Err(source) = tokio::fs::write(&path, &body).await {
        error!(error = %source, path = %path.display(), "Failed to write downloaded archive");
        let _ = tokio::fs::remove_file(&path).await;
        return Err(FetchError::Write { path, source });
    }

    info!(path = %path.display(), bytes = body.len(), "Archive downloaded");
    Ok(path)
}

/// Unpack `archive_path` under `destination`.
///
/// Returns one [`ExtractedFile`] per regular file written; directories are
/// created but not reported.
pub fn extract<F>(
    archive_path: &Path,
    destination: &Path,
    ignore: F,
) -> Result<Vec<ExtractedFile>, ExtractError>
where
    F: Fn(&str) -> bool,
{
    let reader = File::open(archive_path).map_err(io_error_at(archive_path))?;
    let mut archive = zip::ZipArchive::new(reader)?;

    fs::create_dir_all(destination).map_err(io_error_at(destination))?;

    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();

        if ignore(&name) {
            debug!(entry = %name, "Skipping ignored archive entry");
            continue;
        }

        let target = match resolve_within(destination, &name) {
            Some(target) => target,
            None if entry.is_dir() && is_root_alias(&name) => continue,
            None => {
                error!(entry = %name, root = %destination.display(), "Archive entry escapes extraction root");
                return Err(ExtractError::PathTraversal { entry: name });
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(io_error_at(&target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error_at(parent))?;
        }

        let mut out = File::create(&target).map_err(io_error_at(&target))?;
        io::copy(&mut entry, &mut out).map_err(io_error_at(&target))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            // Owner read stays set: the file is read back when the tree is built.
            let permissions = fs::Permissions::from_mode((mode & 0o777) | 0o400);
            fs::set_permissions(&target, permissions).map_err(io_error_at(&target))?;
        }

        extracted.push(ExtractedFile {
            local_path: target,
            remote_path: name,
        });
    }

    info!(
        archive = %archive_path.display(),
        root = %destination.display(),
        files = extracted.len(),
        "Archive extracted"
    );
    Ok(extracted)
}

/// Lexically join `entry_name` onto `root`, returning `None` unless the result
/// lies strictly inside `root`.
fn resolve_within(root: &Path, entry_name: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(entry_name).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    (depth > 0).then_some(resolved)
}

/// True when `name` resolves to the root itself without ever leaving it
/// (`./`, `a/../`).
fn is_root_alias(name: &str) -> bool {
    let mut depth = 0usize;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth == 0
}

fn io_error_at(path: &Path) -> impl FnOnce(io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}
