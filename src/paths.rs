//! Path canonicalization and containment checks
//!
//! Destinations frequently do not exist yet, so resolution walks up to the
//! nearest existing ancestor, canonicalizes that, and reattaches the rest.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Canonicalize `path`, tolerating missing trailing components.
///
/// Symbolic links and `.`/`..` segments in the existing part are resolved by
/// the OS; the missing suffix is normalized lexically. Only I/O errors that
/// are not about existence (e.g. permission denied) are returned.
pub fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let components: Vec<Component<'_>> = absolute.components().collect();

    for split in (1..=components.len()).rev() {
        let existing: PathBuf = components[..split].iter().collect();
        match fs::canonicalize(&existing) {
            Ok(canonical) => return Ok(reattach(canonical, &components[split..])),
            Err(e) if is_absent(&e) => continue,
            Err(e) => return Err(e),
        }
    }

    // Nothing exists, not even the root: fall back to a lexical normalization
    Ok(reattach(PathBuf::new(), &components))
}

/// Like [`resolve`], but a symlink sitting at the last component is not
/// followed. This names the directory entry itself rather than what it
/// points at.
pub fn resolve_entry(path: &Path) -> io::Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            Ok(resolve(parent)?.join(name))
        }
        (Some(_), Some(name)) => Ok(resolve(Path::new("."))?.join(name)),
        _ => resolve(path),
    }
}

/// True iff `child` resolves to `parent` or to something beneath it.
///
/// Comparison is per path component, so `/foo/bar2` is not inside `/foo/bar`.
pub fn is_nested(parent: &Path, child: &Path) -> io::Result<bool> {
    let parent = resolve(parent)?;
    let child = resolve(child)?;
    Ok(child.starts_with(&parent))
}

fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn reattach(mut base: PathBuf, rest: &[Component<'_>]) -> PathBuf {
    for component in rest {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            other => base.push(other.as_os_str()),
        }
    }
    base
}
