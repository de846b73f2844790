//! Configuration parsing for agentmirror
//!
//! Handles the TOML configuration file that defines which agents are
//! enabled, what each of them receives, and the canonical MCP servers.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent_ids;
use crate::mcp::{CanonicalServerSet, McpAgent, get_mcp_config_path};
use crate::orchestrator::SyncTarget;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "agentmirror.toml";

/// Default source directory name
pub const DEFAULT_SOURCE_DIR: &str = ".agents";

/// Root configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Directory containing source files (relative to config file)
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Compact AGENTS.md before distributing it
    #[serde(default)]
    pub compress_agents_md: bool,

    /// Agents to sync when no explicit filter is given
    #[serde(default)]
    pub default_agents: Vec<String>,

    /// MCP distribution settings
    #[serde(default)]
    pub mcp: McpConfig,

    /// Canonical MCP server definitions
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,

    /// Agent configurations
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,

    /// Gitignore management settings
    #[serde(default)]
    pub gitignore: GitignoreConfig,
}

fn default_source_dir() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

/// Configuration for a single AI agent
#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Whether this agent is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Targets to sync for this agent
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

/// Configuration for a single sync target
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Source path (relative to source_dir)
    pub source: String,

    /// Destination path (relative to project root)
    pub destination: String,

    /// Type of sync operation
    #[serde(rename = "type")]
    pub sync_type: SyncType,
}

/// Type of synchronization to perform
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncType {
    /// Mirror the source through symbolic links
    Symlink,
    /// Write independent copies of the source
    Copy,
}

/// Which generated paths are kept out of version control
#[derive(Debug, Deserialize)]
pub struct GitignoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Text of the `# START` / `# END` lines around the managed block
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Extra entries added alongside the target destinations
    #[serde(default)]
    pub entries: Vec<String>,
}

fn default_marker() -> String {
    "AgentMirror replicas".to_string()
}

impl Default for GitignoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            marker: default_marker(),
            entries: Vec::new(),
        }
    }
}

/// MCP distribution settings
#[derive(Debug, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub merge_strategy: McpMergeStrategy,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            merge_strategy: McpMergeStrategy::default(),
        }
    }
}

/// How canonical servers are combined with a tool's existing servers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum McpMergeStrategy {
    /// Insert or overwrite canonical servers, keep every other entry
    #[default]
    Merge,
    /// Replace the server map with exactly the canonical servers
    Overwrite,
}

/// A single canonical MCP server definition
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct McpServerConfig {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, rename = "type")]
    pub transport_type: Option<String>,

    #[serde(default)]
    pub disabled: bool,

    /// Tool-specific parameters passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Find configuration file by searching up from current directory
    pub fn find_config(start_dir: &Path) -> Result<PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(DEFAULT_SOURCE_DIR).join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(config_path);
            }

            let root_config = current.join(CONFIG_FILE_NAME);
            if root_config.exists() {
                return Ok(root_config);
            }

            if !current.pop() {
                anyhow::bail!(
                    "Could not find {} in {} or any parent directory",
                    CONFIG_FILE_NAME,
                    start_dir.display()
                );
            }
        }
    }

    /// Get the project root directory (parent of .agents or location of config)
    pub fn project_root(config_path: &Path) -> PathBuf {
        let parent = config_path.parent().unwrap_or(config_path);

        // If config is inside .agents directory, go up one more level
        if parent.file_name().is_some_and(|name| name == DEFAULT_SOURCE_DIR) {
            parent.parent().unwrap_or(parent).to_path_buf()
        } else {
            parent.to_path_buf()
        }
    }

    /// Get the source directory (where source files are located)
    pub fn source_dir(&self, config_path: &Path) -> PathBuf {
        let config_dir = config_path.parent().unwrap_or(config_path);
        config_dir.join(&self.source_dir)
    }

    /// Configured gitignore entries plus every enabled agent's target
    /// destinations, sorted and without duplicates
    pub fn all_gitignore_entries(&self) -> Vec<String> {
        let mut entries = self.gitignore.entries.clone();
        entries.extend(
            self.agents
                .values()
                .filter(|agent| agent.enabled)
                .flat_map(|agent| agent.targets.values())
                .map(|target| target.destination.clone()),
        );

        entries.sort();
        entries.dedup();
        entries
    }

    /// Build and validate the canonical server set
    pub fn canonical_servers(&self) -> crate::error::Result<CanonicalServerSet> {
        CanonicalServerSet::from_entries(
            self.mcp_servers
                .iter()
                .map(|(name, server)| (name.clone(), server.clone())),
        )
    }

    /// Enabled agents, narrowed by `filter` (CLI) or `default_agents`
    pub fn selected_agents<'a>(
        &'a self,
        filter: Option<&[String]>,
    ) -> impl Iterator<Item = (&'a String, &'a AgentConfig)> {
        let filter: Vec<String> = match filter {
            Some(f) => f.to_vec(),
            None => self.default_agents.clone(),
        };

        self.agents.iter().filter(move |(name, agent)| {
            if !agent.enabled {
                tracing::debug!(agent = %name, "Skipping disabled agent");
                return false;
            }
            filter.is_empty() || filter.iter().any(|f| agent_ids::filter_matches(name, f))
        })
    }

    /// Expand the configuration into the list of sync targets.
    ///
    /// Every target of a selected agent becomes a replication target; agents
    /// that are known tools also get one MCP config target when MCP is
    /// enabled and servers are defined. Tool targets sharing a destination
    /// (vscode and copilot) are emitted once.
    pub fn sync_targets(&self, config_path: &Path, filter: Option<&[String]>) -> Vec<SyncTarget> {
        let project_root = Self::project_root(config_path);
        let source_dir = self.source_dir(config_path);
        let mut targets = Vec::new();
        let mut tool_agents: Vec<McpAgent> = Vec::new();

        for (agent_name, agent) in self.selected_agents(filter) {
            for (target_name, target) in &agent.targets {
                targets.push(SyncTarget::Replicate {
                    name: format!("{agent_name}/{target_name}"),
                    source: source_dir.join(&target.source),
                    destination: project_root.join(&target.destination),
                    kind: target.sync_type,
                });
            }

            if let Some(tool) = McpAgent::from_id(agent_name)
                && !tool_agents.contains(&tool)
            {
                tool_agents.push(tool);
            }
        }

        let has_servers = self.mcp_servers.values().any(|s| !s.disabled);
        if self.mcp.enabled && has_servers {
            targets.extend(tool_agents.into_iter().map(|agent| SyncTarget::ToolConfig {
                agent,
                destination: get_mcp_config_path(agent, &project_root),
            }));
        }

        targets
    }
}
