//! Gitignore management
//!
//! Keeps a marked block in the project's `.gitignore` listing the replicas
//! agentmirror writes, so they stay out of version control.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;

use crate::fs::atomic_write;
use crate::orchestrator::TargetStatus;

/// Rewrite the managed block of `<project_root>/.gitignore` with `entries`.
///
/// Lines outside the block are kept as they are. The file is only written
/// when its content changes.
pub fn update_gitignore(
    project_root: &Path,
    marker: &str,
    entries: &[String],
    dry_run: bool,
) -> Result<TargetStatus> {
    let gitignore_path = project_root.join(".gitignore");
    let start_marker = format!("# START {marker}");
    let end_marker = format!("# END {marker}");

    let existing = match fs::read_to_string(&gitignore_path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to read .gitignore: {}", gitignore_path.display())
            });
        }
    };

    let kept = remove_managed_section(
        existing.as_deref().unwrap_or(""),
        &start_marker,
        &end_marker,
    );
    let new_content = render(&kept, &start_marker, &end_marker, entries);

    let status = match &existing {
        Some(old) if *old == new_content => return Ok(TargetStatus::Unchanged),
        Some(_) => TargetStatus::Updated,
        None => TargetStatus::Created,
    };

    if !dry_run {
        atomic_write(&gitignore_path, new_content.as_bytes())
            .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;
    }
    tracing::debug!(
        path = %gitignore_path.display(),
        entries = entries.len(),
        "Updated managed gitignore block"
    );

    Ok(status)
}

fn render(kept: &str, start_marker: &str, end_marker: &str, entries: &[String]) -> String {
    let mut content = kept.trim_end().to_string();
    if !content.is_empty() {
        content.push_str("\n\n");
    }

    content.push_str(start_marker);
    content.push('\n');
    for entry in entries {
        content.push_str(entry);
        content.push('\n');
    }
    content.push_str(end_marker);
    content.push('\n');
    content
}

/// Drop the lines between (and including) the markers
fn remove_managed_section(content: &str, start_marker: &str, end_marker: &str) -> String {
    let mut result = String::new();
    let mut in_managed_section = false;

    for line in content.lines() {
        match line.trim() {
            l if l == start_marker => in_managed_section = true,
            l if l == end_marker => in_managed_section = false,
            _ if in_managed_section => {}
            _ => {
                result.push_str(line);
                result.push('\n');
            }
        }
    }

    result
}
