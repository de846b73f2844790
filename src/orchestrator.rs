//! Sync orchestration
//!
//! Drives every sync target to completion on a rayon pool and collects one
//! [`TargetReport`] per target. A failing target never stops the others.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::config::{McpMergeStrategy, SyncType};
use crate::error::{Result, SyncError};
use crate::fs as sync_fs;
use crate::instructions;
use crate::mcp::{CanonicalServerSet, ConfigMerger, McpAgent};
use crate::paths;

/// What a successful target did to its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Created,
    Updated,
    Unchanged,
    /// A replica was taken down by `clean`
    Removed,
}

impl TargetStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TargetStatus::Created => "created",
            TargetStatus::Updated => "updated",
            TargetStatus::Unchanged => "unchanged",
            TargetStatus::Removed => "removed",
        }
    }
}

/// One unit of work
#[derive(Debug, Clone, PartialEq)]
pub enum SyncTarget {
    /// Merge the canonical MCP servers into a tool's config file
    ToolConfig { agent: McpAgent, destination: PathBuf },
    /// Mirror a file or directory tree
    Replicate {
        name: String,
        source: PathBuf,
        destination: PathBuf,
        kind: SyncType,
    },
}

impl SyncTarget {
    pub fn name(&self) -> String {
        match self {
            SyncTarget::ToolConfig { agent, .. } => agent.id().to_string(),
            SyncTarget::Replicate { name, .. } => name.clone(),
        }
    }

    pub fn destination(&self) -> &Path {
        match self {
            SyncTarget::ToolConfig { destination, .. } => destination,
            SyncTarget::Replicate { destination, .. } => destination,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report what would change without touching the filesystem
    pub dry_run: bool,
    /// Distribute a compacted AGENTS.md instead of the original
    pub compress_agents_md: bool,
    pub merge_strategy: McpMergeStrategy,
}

/// Shared interrupt flag. Targets that have not started when it is set are
/// reported as cancelled; running ones finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct TargetReport {
    pub name: String,
    pub destination: PathBuf,
    pub result: Result<TargetStatus>,
}

impl TargetReport {
    pub fn is_changed(&self) -> bool {
        matches!(
            self.result,
            Ok(TargetStatus::Created | TargetStatus::Updated | TargetStatus::Removed)
        )
    }
}

#[derive(Debug)]
pub enum RunOutcome<'a> {
    Success,
    PartialFailure(Vec<&'a TargetReport>),
}

/// Results of one run, in target order
#[derive(Debug, Default)]
pub struct SyncReport {
    pub targets: Vec<TargetReport>,
    /// Targets dropped because an earlier target writes the same path
    pub skipped_duplicates: Vec<String>,
}

impl SyncReport {
    pub fn outcome(&self) -> RunOutcome<'_> {
        let failures = self.failures();
        if failures.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::PartialFailure(failures)
        }
    }

    pub fn failures(&self) -> Vec<&TargetReport> {
        self.targets.iter().filter(|t| t.result.is_err()).collect()
    }

    pub fn changed(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| t.is_changed())
    }

    pub fn count(&self, status: TargetStatus) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.result, Ok(s) if s == status))
            .count()
    }
}

pub struct SyncOrchestrator {
    servers: Arc<CanonicalServerSet>,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(servers: Arc<CanonicalServerSet>, options: SyncOptions) -> Self {
        Self { servers, options }
    }

    /// Process every target and collect the results
    pub fn run(&self, targets: &[SyncTarget], cancel: &CancellationToken) -> SyncReport {
        let (targets, skipped_duplicates) = dedupe_destinations(targets);
        let sources = self.compact_sources(&targets);

        let reports = execute(&targets, cancel, |target| self.process(target, &sources));
        SyncReport {
            targets: reports,
            skipped_duplicates,
        }
    }

    /// Take down the replicas `run` produced.
    ///
    /// Tool config files are shared with the user's own settings and are
    /// never touched here, so only replicate targets are reported.
    pub fn clean(&self, targets: &[SyncTarget], cancel: &CancellationToken) -> SyncReport {
        let replicas: Vec<SyncTarget> = targets
            .iter()
            .filter(|t| matches!(t, SyncTarget::Replicate { .. }))
            .cloned()
            .collect();
        let (replicas, skipped_duplicates) = dedupe_destinations(&replicas);

        let reports = execute(&replicas, cancel, |target| self.remove(target));
        SyncReport {
            targets: reports,
            skipped_duplicates,
        }
    }

    fn process(
        &self,
        target: &SyncTarget,
        sources: &HashMap<PathBuf, PathBuf>,
    ) -> Result<TargetStatus> {
        match target {
            SyncTarget::ToolConfig { agent, destination } => {
                ConfigMerger::new(*agent, self.options.merge_strategy)
                    .sync(destination, &self.servers, self.options.dry_run)
                    .map(|report| report.status)
            }
            SyncTarget::Replicate {
                source,
                destination,
                kind,
                ..
            } => {
                let source = sources.get(source).unwrap_or(source);
                if source.is_dir() {
                    sync_fs::replicate_dir(source, destination, *kind, self.options.dry_run)
                        .map(|stats| stats.status())
                } else {
                    sync_fs::replicate_file(source, destination, *kind, self.options.dry_run)
                }
            }
        }
    }

    fn remove(&self, target: &SyncTarget) -> Result<TargetStatus> {
        let SyncTarget::Replicate {
            source,
            destination,
            kind,
            ..
        } = target
        else {
            return Ok(TargetStatus::Unchanged);
        };

        // Replicas of AGENTS.md point at the compacted file when compaction is on
        let compact = (self.options.compress_agents_md && instructions::is_agents_md_path(source))
            .then(|| instructions::compact_path(source));
        let source = compact.as_ref().unwrap_or(source);

        let dry_run = self.options.dry_run;
        if source.is_dir() || (destination.is_dir() && !destination.is_symlink()) {
            sync_fs::remove_dir_replica(source, destination, *kind, dry_run).map(|removed| {
                if removed > 0 {
                    TargetStatus::Removed
                } else {
                    TargetStatus::Unchanged
                }
            })
        } else {
            sync_fs::remove_file_replica(source, destination, *kind, dry_run)
        }
    }

    /// Write each distinct AGENTS.md's compacted sibling once, before any
    /// worker starts, and map the original path to it.
    fn compact_sources(&self, targets: &[&SyncTarget]) -> HashMap<PathBuf, PathBuf> {
        let mut sources = HashMap::new();
        if !self.options.compress_agents_md {
            return sources;
        }

        for target in targets {
            let SyncTarget::Replicate { source, .. } = target else {
                continue;
            };
            if !instructions::is_agents_md_path(source) || sources.contains_key(source) {
                continue;
            }

            match instructions::write_compact(source, self.options.dry_run) {
                Ok(compact) => {
                    sources.insert(source.clone(), compact);
                }
                // The target reports the missing or unreadable source itself
                Err(e) => tracing::warn!(source = %source.display(), "Could not compact: {e}"),
            }
        }

        sources
    }
}

/// Run `work` over the targets on the rayon pool, one report per target in
/// input order.
fn execute<F>(targets: &[&SyncTarget], cancel: &CancellationToken, work: F) -> Vec<TargetReport>
where
    F: Fn(&SyncTarget) -> Result<TargetStatus> + Sync,
{
    targets
        .par_iter()
        .map(|target| {
            let result = if cancel.is_cancelled() {
                Err(SyncError::Cancelled)
            } else {
                work(*target)
            };

            match &result {
                Ok(status) => tracing::info!(
                    target_name = %target.name(),
                    destination = %target.destination().display(),
                    status = status.label(),
                    "Target processed"
                ),
                Err(e) => tracing::error!(
                    target_name = %target.name(),
                    destination = %target.destination().display(),
                    kind = e.kind().label(),
                    "Target failed: {e}"
                ),
            }

            TargetReport {
                name: target.name(),
                destination: target.destination().to_path_buf(),
                result,
            }
        })
        .collect()
}

fn dedupe_destinations(targets: &[SyncTarget]) -> (Vec<&SyncTarget>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(targets.len());
    let mut skipped = Vec::new();

    for target in targets {
        // The entry itself, not what a previous run linked it to
        let key = paths::resolve_entry(target.destination())
            .unwrap_or_else(|_| target.destination().to_path_buf());
        if seen.insert(key) {
            kept.push(target);
        } else {
            tracing::warn!(
                target_name = %target.name(),
                destination = %target.destination().display(),
                "Skipping target, destination already written by another target"
            );
            skipped.push(target.name());
        }
    }

    (kept, skipped)
}
