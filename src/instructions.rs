//! AGENTS.md compaction
//!
//! A compacted sibling (`AGENTS.compact.md`) is generated next to the source
//! and distributed in its place.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::fs::atomic_write;

const COMPACT_AGENTS_MD_NAME: &str = "AGENTS.compact.md";

pub fn is_agents_md_path(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == "AGENTS.md")
}

pub fn compact_path(path: &Path) -> PathBuf {
    path.with_file_name(COMPACT_AGENTS_MD_NAME)
}

/// Write the compacted sibling of `source` and return its path.
///
/// The file is only rewritten when its content would change. Under
/// `dry_run` nothing is written and the source path is returned as is.
pub fn write_compact(source: &Path, dry_run: bool) -> Result<PathBuf> {
    if dry_run {
        return Ok(source.to_path_buf());
    }

    let content = fs::read_to_string(source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SyncError::SourceMissing {
            path: source.to_path_buf(),
        },
        _ => SyncError::io(source, e),
    })?;
    let compacted = compact(&content);
    let dest = compact_path(source);

    if fs::read_to_string(&dest).is_ok_and(|existing| existing == compacted) {
        return Ok(dest);
    }

    atomic_write(&dest, compacted.as_bytes())?;
    tracing::debug!(path = %dest.display(), "Wrote compacted AGENTS.md");
    Ok(dest)
}

/// An open fenced code block: which character opened it and how many
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    /// Parse a fence line: up to three spaces of indentation, then a run of
    /// at least three backticks or tildes. Returns the fence and its info
    /// string.
    fn parse(line: &str) -> Option<(Fence, &str)> {
        let rest = line.trim_start_matches(' ');
        if line.len() - rest.len() > 3 {
            return None;
        }

        let marker = rest.chars().next().filter(|c| matches!(c, '`' | '~'))?;
        let len = rest.chars().take_while(|c| *c == marker).count();
        if len < 3 {
            return None;
        }

        // Both markers are one byte wide
        let info = rest[len..].trim();
        if marker == '`' && info.contains('`') {
            return None;
        }
        Some((Fence { marker, len }, info))
    }

    /// Same marker, at least as long, and nothing after it
    fn is_closed_by(&self, line: &str) -> bool {
        matches!(
            Fence::parse(line),
            Some((close, info)) if close.marker == self.marker
                && close.len >= self.len
                && info.is_empty()
        )
    }
}

/// Collapse whitespace and blank-line runs. Fenced code blocks, fences
/// included, are copied through untouched.
pub fn compact(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut open: Option<Fence> = None;
    let mut previous_blank = false;

    for raw in input.lines() {
        if let Some(fence) = open {
            if fence.is_closed_by(raw) {
                open = None;
            }
            out.push_str(raw);
            out.push('\n');
            continue;
        }

        let line = raw.trim_end_matches([' ', '\t']);

        if let Some((fence, _)) = Fence::parse(line) {
            open = Some(fence);
            previous_blank = false;
            out.push_str(raw);
            out.push('\n');
            continue;
        }

        if line.trim().is_empty() {
            if !previous_blank {
                out.push('\n');
                previous_blank = true;
            }
            continue;
        }

        previous_blank = false;
        let (leading, rest) = split_leading_whitespace(line);
        out.push_str(leading);
        out.push_str(&collapse_inline_whitespace(rest));
        out.push('\n');
    }

    out
}

fn split_leading_whitespace(line: &str) -> (&str, &str) {
    let idx = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    line.split_at(idx)
}

fn collapse_inline_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_whitespace = false;

    for ch in line.chars() {
        if ch == ' ' || ch == '\t' {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            in_whitespace = false;
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compact_collapses_whitespace() {
        let input = "# Title   \n\n\n\nSome   text\twith  spacing.\n  - item    one\n";
        assert_eq!(
            compact(input),
            "# Title\n\nSome text with spacing.\n  - item one\n"
        );
    }

    #[test]
    fn test_compact_leaves_fenced_blocks_alone() {
        let input = "Intro  text\n```rust\nfn  main() {}\n\n\n```\nAfter   fence\n";
        let out = compact(input);
        assert!(out.contains("fn  main() {}\n\n\n```"));
        assert!(out.contains("Intro text"));
        assert!(out.ends_with("After fence\n"));
    }

    #[test]
    fn test_compact_requires_matching_fence() {
        let input = "````\n```\ninside   block\n````\noutside   block\n";
        let out = compact(input);
        assert!(out.contains("inside   block"));
        assert!(out.contains("outside block"));
    }

    #[test]
    fn test_longer_fence_closes_block() {
        let input = "```\ncode   x\n`````\nafter   text\n";
        assert_eq!(compact(input), "```\ncode   x\n`````\nafter text\n");
    }

    #[test]
    fn test_fence_with_info_string_does_not_close() {
        let input = "```\n```rust\nstill   code\n```\nafter   text\n";
        let out = compact(input);
        assert!(out.contains("still   code"));
        assert!(out.ends_with("```\nafter text\n"));
    }

    #[test]
    fn test_other_marker_does_not_close() {
        let input = "~~~\n```\nkeep   this\n~~~\nout   side\n";
        assert_eq!(compact(input), "~~~\n```\nkeep   this\n~~~\nout side\n");
    }

    #[test]
    fn test_deeply_indented_fence_is_plain_text() {
        assert_eq!(compact("    ```\nsome   text\n"), "    ```\nsome text\n");
    }

    #[test]
    fn test_fenced_lines_keep_trailing_whitespace() {
        let input = "```sh\necho hi   \n\n\n```\n";
        assert_eq!(compact(input), input);
    }

    #[test]
    fn test_fence_parsing() {
        assert_eq!(
            Fence::parse("  ````rust title"),
            Some((Fence { marker: '`', len: 4 }, "rust title"))
        );
        assert_eq!(Fence::parse("``"), None);
        assert_eq!(Fence::parse("``` a`b"), None);
        assert_eq!(
            Fence::parse("~~~ a`b"),
            Some((Fence { marker: '~', len: 3 }, "a`b"))
        );
    }

    #[test]
    fn test_tilde_fences() {
        let input = "~~~\nkeep    this\n~~~\n";
        assert_eq!(compact(input), input);
    }

    #[test]
    fn test_agents_md_detection() {
        assert!(is_agents_md_path(Path::new(".agents/AGENTS.md")));
        assert!(!is_agents_md_path(Path::new(".agents/README.md")));
        assert_eq!(
            compact_path(Path::new("/p/.agents/AGENTS.md")),
            PathBuf::from("/p/.agents/AGENTS.compact.md")
        );
    }

    #[test]
    fn test_write_compact_creates_sibling() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("AGENTS.md");
        fs::write(&source, "Some   text\n\n\n").unwrap();

        let dest = write_compact(&source, false).unwrap();

        assert_eq!(dest, temp_dir.path().join("AGENTS.compact.md"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "Some text\n\n");
    }

    #[test]
    fn test_write_compact_dry_run_keeps_source() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("AGENTS.md");
        fs::write(&source, "x").unwrap();

        assert_eq!(write_compact(&source, true).unwrap(), source);
        assert!(!temp_dir.path().join("AGENTS.compact.md").exists());
    }

    #[test]
    fn test_write_compact_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let err = write_compact(&temp_dir.path().join("AGENTS.md"), false).unwrap_err();
        assert!(matches!(err, SyncError::SourceMissing { .. }));
    }
}
