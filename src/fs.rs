//! File system utilities.
//!
//! Replication of files and directory trees (as copies or as symlinks back to
//! the originals), plus atomic writes for generated files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::config::SyncType;
use crate::error::{Result, SyncError};
use crate::orchestrator::TargetStatus;
use crate::paths;

/// Counts from one replication
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationStats {
    pub directories: usize,
    pub files: usize,
    pub links: usize,
    /// Destination entries that were removed to make room
    pub replaced: usize,
}

impl ReplicationStats {
    pub fn status(&self) -> TargetStatus {
        if self.replaced > 0 {
            TargetStatus::Updated
        } else if self.directories + self.files + self.links > 0 {
            TargetStatus::Created
        } else {
            TargetStatus::Unchanged
        }
    }
}

/// Write `content` to `path` via a temp file in the same directory.
///
/// The temp file is removed if anything fails before the final rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| SyncError::io(parent, e))?;
    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| SyncError::io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| SyncError::io(path, e.error))?;

    Ok(())
}

/// `<file>.bak.<timestamp>` next to `path`
pub fn backup_path(path: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("{}.bak.{}", path.display(), timestamp))
}

/// Reject a destination entry that lies inside the source, is the source,
/// or contains it.
///
/// A symlink already sitting at `dst` is not followed: it is a previous
/// replica and gets replaced, not written through.
fn ensure_disjoint(source_canon: &Path, dst: &Path) -> Result<()> {
    let parent = dst
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let nested = paths::is_nested(source_canon, parent).map_err(|e| SyncError::io(parent, e))?;
    let entry = paths::resolve_entry(dst).map_err(|e| SyncError::io(dst, e))?;

    if nested || source_canon.starts_with(&entry) {
        return Err(SyncError::StructuralViolation {
            source_root: source_canon.to_path_buf(),
            destination: dst.to_path_buf(),
        });
    }
    Ok(())
}

/// Replicate the directory tree at `src` into `dst`.
///
/// With [`SyncType::Symlink`] directories are created for real and every
/// other entry becomes a symlink to the absolute source entry. With
/// [`SyncType::Copy`] file bytes are copied and symlinks found inside the
/// source are recreated with the same link target. Links are never followed
/// while walking, so link cycles inside the source cannot recurse.
pub fn replicate_dir(
    src: &Path,
    dst: &Path,
    kind: SyncType,
    dry_run: bool,
) -> Result<ReplicationStats> {
    let src_canon = match fs::canonicalize(src) {
        Ok(p) if p.is_dir() => p,
        Ok(_) => {
            return Err(SyncError::io(
                src,
                io::Error::new(io::ErrorKind::InvalidInput, "source is not a directory"),
            ));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SyncError::SourceMissing {
                path: src.to_path_buf(),
            });
        }
        Err(e) => return Err(SyncError::io(src, e)),
    };

    ensure_disjoint(&src_canon, dst)?;

    let mut stats = ReplicationStats::default();
    if prepare_dir(dst, dry_run, &mut stats)? {
        stats.directories += 1;
    }

    for entry in WalkDir::new(&src_canon)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&src_canon).to_path_buf();
            SyncError::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(&src_canon)
            .unwrap_or(entry.path());
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if prepare_dir(&target, dry_run, &mut stats)? {
                stats.directories += 1;
            }
            continue;
        }

        match kind {
            SyncType::Symlink => {
                if link_points_to(&target, entry.path()) {
                    continue;
                }
                clear_entry(&target, dry_run, &mut stats)?;
                if !dry_run {
                    create_symlink(entry.path(), &target)?;
                }
                stats.links += 1;
            }
            SyncType::Copy if file_type.is_symlink() => {
                let link_target =
                    fs::read_link(entry.path()).map_err(|e| SyncError::io(entry.path(), e))?;
                if fs::read_link(&target).is_ok_and(|existing| existing == link_target) {
                    continue;
                }
                clear_entry(&target, dry_run, &mut stats)?;
                if !dry_run {
                    create_symlink(&link_target, &target)?;
                }
                stats.links += 1;
            }
            SyncType::Copy => {
                if same_contents(entry.path(), &target) {
                    continue;
                }
                clear_entry(&target, dry_run, &mut stats)?;
                if !dry_run {
                    fs::copy(entry.path(), &target).map_err(|e| SyncError::io(&target, e))?;
                }
                stats.files += 1;
            }
        }

        tracing::debug!(
            source = %entry.path().display(),
            destination = %target.display(),
            "Replicated entry"
        );
    }

    Ok(stats)
}

/// Replicate a single file.
///
/// A symlink that already points at the source is left alone; a regular file
/// in the way of a new symlink is backed up first.
pub fn replicate_file(
    src: &Path,
    dst: &Path,
    kind: SyncType,
    dry_run: bool,
) -> Result<TargetStatus> {
    let src_canon = fs::canonicalize(src).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SyncError::SourceMissing {
            path: src.to_path_buf(),
        },
        _ => SyncError::io(src, e),
    })?;

    ensure_disjoint(&src_canon, dst)?;

    let existed = dst.symlink_metadata().is_ok();

    match kind {
        SyncType::Symlink => {
            if link_points_to(dst, &src_canon) {
                return Ok(TargetStatus::Unchanged);
            }

            if dst.is_symlink() {
                if !dry_run {
                    fs::remove_file(dst).map_err(|e| SyncError::io(dst, e))?;
                }
            } else if existed {
                let backup = backup_path(dst);
                if !dry_run {
                    fs::rename(dst, &backup).map_err(|e| SyncError::io(dst, e))?;
                }
                tracing::warn!(
                    path = %dst.display(),
                    backup = %backup.display(),
                    "Backed up existing file before linking"
                );
            }

            if !dry_run {
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
                }
                create_symlink(&src_canon, dst)?;
            }
        }
        SyncType::Copy => {
            let content = fs::read(&src_canon).map_err(|e| SyncError::io(&src_canon, e))?;
            if !dst.is_symlink() && fs::read(dst).is_ok_and(|existing| existing == content) {
                return Ok(TargetStatus::Unchanged);
            }
            if !dry_run {
                if dst.is_symlink() {
                    fs::remove_file(dst).map_err(|e| SyncError::io(dst, e))?;
                }
                atomic_write(dst, &content)?;
            }
        }
    }

    Ok(if existed {
        TargetStatus::Updated
    } else {
        TargetStatus::Created
    })
}

/// Remove a single-file replica of `src` at `dst`.
///
/// Only entries this tool would have produced are touched: a symlink to the
/// source, or a regular file whose bytes still match it. Anything else is
/// left in place and reported as unchanged.
pub fn remove_file_replica(
    src: &Path,
    dst: &Path,
    kind: SyncType,
    dry_run: bool,
) -> Result<TargetStatus> {
    let source = paths::resolve(src).map_err(|e| SyncError::io(src, e))?;
    ensure_disjoint(&source, dst)?;

    let ours = match kind {
        SyncType::Symlink => link_points_to(dst, &source),
        SyncType::Copy => same_contents(&source, dst),
    };
    if !ours {
        if dst.symlink_metadata().is_ok() {
            tracing::debug!(path = %dst.display(), "Leaving entry that is not a replica");
        }
        return Ok(TargetStatus::Unchanged);
    }

    if !dry_run {
        fs::remove_file(dst).map_err(|e| SyncError::io(dst, e))?;
    }
    Ok(TargetStatus::Removed)
}

/// Remove the replica of the tree at `src` found under `dst`.
///
/// Entries that no longer match the source are kept, and so is every
/// directory that still has something in it afterwards. Returns the number
/// of removed entries.
pub fn remove_dir_replica(src: &Path, dst: &Path, kind: SyncType, dry_run: bool) -> Result<usize> {
    let source = paths::resolve(src).map_err(|e| SyncError::io(src, e))?;
    ensure_disjoint(&source, dst)?;

    let meta = match dst.symlink_metadata() {
        Ok(meta) => meta,
        Err(_) => return Ok(0),
    };
    if meta.file_type().is_symlink() {
        return Ok(match remove_file_replica(src, dst, SyncType::Symlink, dry_run)? {
            TargetStatus::Removed => 1,
            _ => 0,
        });
    }
    if !meta.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(dst)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dst).to_path_buf();
            SyncError::io(path, e.into())
        })?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if !dry_run {
                // Only succeeds once the directory is empty
                let _ = fs::remove_dir(path);
            }
            continue;
        }

        let relative = path.strip_prefix(dst).unwrap_or(path);
        let counterpart = source.join(relative);
        let ours = match kind {
            SyncType::Symlink => link_points_to(path, &counterpart),
            SyncType::Copy if file_type.is_symlink() => {
                let link = fs::read_link(path).ok();
                link.is_some() && link == fs::read_link(&counterpart).ok()
            }
            SyncType::Copy => same_contents(&counterpart, path),
        };

        if ours {
            if !dry_run {
                fs::remove_file(path).map_err(|e| SyncError::io(path, e))?;
            }
            removed += 1;
        }
    }

    if !dry_run {
        let _ = fs::remove_dir(dst);
    }
    Ok(removed)
}

/// Make sure `dir` is a real directory. Returns true if it had to be created.
fn prepare_dir(dir: &Path, dry_run: bool, stats: &mut ReplicationStats) -> Result<bool> {
    match dir.symlink_metadata() {
        Ok(meta) if meta.is_dir() => return Ok(false),
        Ok(_) => clear_entry(dir, dry_run, stats)?,
        Err(_) => {}
    }

    if !dry_run {
        fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;
    }
    Ok(true)
}

/// Remove whatever occupies `path` so a new entry can be created there
fn clear_entry(path: &Path, dry_run: bool, stats: &mut ReplicationStats) -> Result<()> {
    let Ok(meta) = path.symlink_metadata() else {
        return Ok(());
    };

    stats.replaced += 1;
    if dry_run {
        return Ok(());
    }

    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .map_err(|e| SyncError::io(path, e))
}

fn link_points_to(link: &Path, target: &Path) -> bool {
    fs::read_link(link).is_ok_and(|current| current == target)
}

fn same_contents(a: &Path, b: &Path) -> bool {
    if b.is_symlink() {
        return false;
    }
    match (fs::read(a), fs::read(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link).map_err(|e| SyncError::io(link, e))?;

    #[cfg(windows)]
    {
        // Relative link targets resolve against the link's directory
        let resolved = link
            .parent()
            .map(|parent| parent.join(target))
            .unwrap_or_else(|| target.to_path_buf());
        let result = if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        };
        result.map_err(|e| SyncError::io(link, e))?;
    }

    Ok(())
}
