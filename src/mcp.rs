//! MCP (Model Context Protocol) configuration merging
//!
//! Each supported tool keeps its MCP servers in its own file, in its own
//! syntax, sometimes nested under a wrapper key next to unrelated settings.
//! [`ConfigMerger`] reads such a file, splices the canonical servers into the
//! server map and writes it back without touching anything else.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::agent_ids;
use crate::config::{McpMergeStrategy, McpServerConfig};
use crate::error::{Result, SyncError};
use crate::fs::{atomic_write, backup_path};
use crate::orchestrator::TargetStatus;
use crate::value::Format;

const OPENCODE_SCHEMA: &str = "https://opencode.ai/config.json";

static SERVER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").unwrap());

// =============================================================================
// Canonical Server Set
// =============================================================================

/// The authoritative MCP servers, merged into every tool's config
#[derive(Debug, Clone, Default)]
pub struct CanonicalServerSet {
    servers: BTreeMap<String, McpServerConfig>,
}

impl CanonicalServerSet {
    /// Build the set, rejecting duplicate or malformed names.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, McpServerConfig)>,
    {
        let mut servers = BTreeMap::new();
        for (name, config) in entries {
            if !SERVER_NAME_RE.is_match(&name) {
                return Err(SyncError::InvalidServerName(name));
            }
            if servers.contains_key(&name) {
                return Err(SyncError::DuplicateServerName(name));
            }
            servers.insert(name, config);
        }
        Ok(Self { servers })
    }

    /// Servers that are not marked `disabled`, in name order
    pub fn enabled(&self) -> impl Iterator<Item = (&str, &McpServerConfig)> {
        self.servers
            .iter()
            .filter(|(_, config)| !config.disabled)
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

// =============================================================================
// Agent Definition
// =============================================================================

/// Where and how a tool stores its MCP servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterDescriptor {
    /// Config file path relative to the project root
    pub config_path: &'static str,
    pub format: Format,
    /// Key holding the server map; `None` when the document root is the map
    pub wrapper_key: Option<&'static str>,
}

/// How a tool expects a single server entry to look
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerShape {
    Standard,
    /// Gemini requires trust: true for non-interactive execution
    Trusted,
    Codex,
    OpenCode,
}

/// Known MCP-compatible tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpAgent {
    /// Claude Code (.mcp.json)
    ClaudeCode,
    /// Cursor (.cursor/mcp.json)
    Cursor,
    /// VS Code and GitHub Copilot (.vscode/mcp.json)
    VsCode,
    /// Gemini CLI (.gemini/settings.json)
    GeminiCli,
    /// OpenAI Codex CLI (.codex/config.toml)
    CodexCli,
    /// OpenCode (opencode.json)
    OpenCode,
    /// Goose (.goose/config.yaml)
    Goose,
    /// Continue (.continue/mcpServers/agentmirror.yaml)
    Continue,
}

impl McpAgent {
    /// Get all supported agents
    pub fn all() -> &'static [McpAgent] {
        &[
            McpAgent::ClaudeCode,
            McpAgent::Cursor,
            McpAgent::VsCode,
            McpAgent::GeminiCli,
            McpAgent::CodexCli,
            McpAgent::OpenCode,
            McpAgent::Goose,
            McpAgent::Continue,
        ]
    }

    /// Get the agent identifier string (used in config)
    pub fn id(&self) -> &'static str {
        match self {
            McpAgent::ClaudeCode => "claude",
            McpAgent::Cursor => "cursor",
            McpAgent::VsCode => "vscode",
            McpAgent::GeminiCli => "gemini",
            McpAgent::CodexCli => "codex",
            McpAgent::OpenCode => "opencode",
            McpAgent::Goose => "goose",
            McpAgent::Continue => "continue",
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            McpAgent::ClaudeCode => "Claude Code",
            McpAgent::Cursor => "Cursor",
            McpAgent::VsCode => "VS Code / GitHub Copilot",
            McpAgent::GeminiCli => "Gemini CLI",
            McpAgent::CodexCli => "OpenAI Codex CLI",
            McpAgent::OpenCode => "OpenCode",
            McpAgent::Goose => "Goose",
            McpAgent::Continue => "Continue",
        }
    }

    pub fn descriptor(&self) -> AdapterDescriptor {
        let (config_path, format, wrapper_key) = match self {
            McpAgent::ClaudeCode => (".mcp.json", Format::Json, Some("mcpServers")),
            McpAgent::Cursor => (".cursor/mcp.json", Format::Json, Some("mcpServers")),
            McpAgent::VsCode => (".vscode/mcp.json", Format::Json, Some("servers")),
            McpAgent::GeminiCli => (".gemini/settings.json", Format::Json, Some("mcpServers")),
            McpAgent::CodexCli => (".codex/config.toml", Format::Toml, Some("mcp_servers")),
            McpAgent::OpenCode => ("opencode.json", Format::Json, Some("mcp")),
            McpAgent::Goose => (".goose/config.yaml", Format::Yaml, Some("extensions")),
            McpAgent::Continue => (
                ".continue/mcpServers/agentmirror.yaml",
                Format::Yaml,
                None,
            ),
        };
        AdapterDescriptor {
            config_path,
            format,
            wrapper_key,
        }
    }

    /// Get the project-level config file path (relative to project root)
    pub fn config_path(&self) -> &'static str {
        self.descriptor().config_path
    }

    fn shape(&self) -> ServerShape {
        match self {
            McpAgent::GeminiCli => ServerShape::Trusted,
            McpAgent::CodexCli => ServerShape::Codex,
            McpAgent::OpenCode => ServerShape::OpenCode,
            _ => ServerShape::Standard,
        }
    }

    /// Render one canonical server the way this tool expects it
    pub fn render_server(&self, config: &McpServerConfig) -> Value {
        match self.shape() {
            ServerShape::Standard => server_to_json(config),
            ServerShape::Trusted => {
                let mut server_json = server_to_json(config);
                if let Some(obj) = server_json.as_object_mut() {
                    obj.insert("trust".to_string(), json!(true));
                }
                server_json
            }
            ServerShape::Codex => server_to_codex_json(config),
            ServerShape::OpenCode => server_to_opencode_json(config),
        }
    }

    /// Tool-specific root keys that must exist after a merge
    fn finalize(&self, root: &mut Map<String, Value>) {
        if *self == McpAgent::OpenCode && !root.contains_key("$schema") {
            root.insert("$schema".to_string(), json!(OPENCODE_SCHEMA));
        }
    }

    /// Parse agent from string identifier
    pub fn from_id(id: &str) -> Option<McpAgent> {
        let canonical = agent_ids::canonical_agent_id(id)?;
        McpAgent::all()
            .iter()
            .copied()
            .find(|agent| agent.id() == canonical)
    }
}

/// Get the path where MCP config would be written for an agent
pub fn get_mcp_config_path(agent: McpAgent, project_root: &Path) -> PathBuf {
    project_root.join(agent.config_path())
}

// =============================================================================
// Server Rendering
// =============================================================================

fn string_map_to_json(values: &BTreeMap<String, String>) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn append_extra(obj: &mut Map<String, Value>, config: &McpServerConfig) {
    for (key, value) in &config.extra {
        if !obj.contains_key(key) {
            obj.insert(key.clone(), value.clone());
        }
    }
}

/// Convert McpServerConfig to JSON Value
fn server_to_json(config: &McpServerConfig) -> Value {
    let mut obj = Map::new();

    if let Some(ref cmd) = config.command {
        obj.insert("command".to_string(), json!(cmd));
    }
    if !config.args.is_empty() {
        obj.insert("args".to_string(), json!(config.args));
    }
    if !config.env.is_empty() {
        obj.insert("env".to_string(), string_map_to_json(&config.env));
    }
    if let Some(ref url) = config.url {
        obj.insert("url".to_string(), json!(url));
    }
    if !config.headers.is_empty() {
        obj.insert("headers".to_string(), string_map_to_json(&config.headers));
    }
    if let Some(ref transport) = config.transport_type {
        obj.insert("type".to_string(), json!(transport));
    }

    append_extra(&mut obj, config);
    Value::Object(obj)
}

/// Codex tables use `http_headers` and have no transport `type`
fn server_to_codex_json(config: &McpServerConfig) -> Value {
    let mut server_json = server_to_json(config);
    if let Some(obj) = server_json.as_object_mut() {
        if config.transport_type.is_some() {
            obj.shift_remove("type");
        }
        if let Some(headers) = obj.shift_remove("headers") {
            obj.insert("http_headers".to_string(), headers);
        }
    }
    server_json
}

/// OpenCode: { "type": "local", "command": [...], "environment": {...}, "enabled": bool }
fn server_to_opencode_json(config: &McpServerConfig) -> Value {
    let mut obj = Map::new();

    if let Some(ref url) = config.url {
        obj.insert("type".to_string(), json!("remote"));
        obj.insert("url".to_string(), json!(url));
        if !config.headers.is_empty() {
            obj.insert("headers".to_string(), string_map_to_json(&config.headers));
        }
    } else {
        obj.insert("type".to_string(), json!("local"));

        let command_parts: Vec<&String> =
            config.command.iter().chain(config.args.iter()).collect();
        obj.insert("command".to_string(), json!(command_parts));

        if !config.env.is_empty() {
            obj.insert("environment".to_string(), string_map_to_json(&config.env));
        }
    }

    obj.insert("enabled".to_string(), json!(!config.disabled));

    append_extra(&mut obj, config);
    Value::Object(obj)
}

// =============================================================================
// Merge
// =============================================================================

/// Outcome of merging canonical servers into one document
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// The merged document, ready to serialize
    pub document: Value,
    /// Names that did not exist before
    pub added: Vec<String>,
    /// Names whose value changed
    pub updated: Vec<String>,
    /// Names dropped by the overwrite strategy
    pub removed: Vec<String>,
}

/// Build a JSON object from key/value pairs in deterministic lexicographic key order.
fn sorted_json_map_from_pairs<I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let sorted: BTreeMap<String, Value> = pairs.into_iter().collect();
    sorted.into_iter().collect()
}

/// Merge rendered server entries into an existing document.
///
/// The server map is located under `wrapper_key` (or is the root itself);
/// anything that is not a mapping at that spot counts as an empty map. Every
/// key outside the server map is carried over unchanged and in place.
pub fn merge_document(
    existing: Value,
    wrapper_key: Option<&str>,
    entries: &Map<String, Value>,
    strategy: McpMergeStrategy,
) -> MergeResult {
    let mut root = match existing {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let current: Map<String, Value> = wrapper_key
        .map_or(Some(&root), |key| root.get(key).and_then(Value::as_object))
        .cloned()
        .unwrap_or_default();

    let mut added = Vec::new();
    let mut updated = Vec::new();
    for (name, value) in entries {
        match current.get(name) {
            None => added.push(name.clone()),
            Some(old) if old != value => updated.push(name.clone()),
            Some(_) => {}
        }
    }

    let (kept, removed): (Vec<_>, Vec<_>) = current
        .into_iter()
        .filter(|(name, _)| !entries.contains_key(name))
        .partition(|_| strategy == McpMergeStrategy::Merge);
    let removed: Vec<String> = removed.into_iter().map(|(name, _)| name).collect();

    let servers = sorted_json_map_from_pairs(
        kept.into_iter()
            .chain(entries.iter().map(|(k, v)| (k.clone(), v.clone()))),
    );

    let document = match wrapper_key {
        Some(key) => {
            root.insert(key.to_string(), Value::Object(servers));
            Value::Object(root)
        }
        None => Value::Object(servers),
    };

    MergeResult {
        document,
        added,
        updated,
        removed,
    }
}

/// Per-target summary of a config merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub status: TargetStatus,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Where an unreadable existing file was saved before being replaced
    pub backup: Option<PathBuf>,
}

/// Reads, merges and writes back one tool's MCP config file
#[derive(Debug, Clone, Copy)]
pub struct ConfigMerger {
    agent: McpAgent,
    strategy: McpMergeStrategy,
}

impl ConfigMerger {
    pub fn new(agent: McpAgent, strategy: McpMergeStrategy) -> Self {
        Self { agent, strategy }
    }

    /// Merge the enabled canonical servers into the file at `path`.
    ///
    /// A missing file and a file that does not parse are both treated as an
    /// empty document. The latter is logged and backed up before it is
    /// replaced, since it was presumably written by a person.
    pub fn sync(
        &self,
        path: &Path,
        servers: &CanonicalServerSet,
        dry_run: bool,
    ) -> Result<MergeReport> {
        let descriptor = self.agent.descriptor();

        let existing = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(SyncError::io(path, e)),
        };

        let parsed = existing
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .and_then(|content| descriptor.format.parse(content))
            .filter(Value::is_object);

        let mut backup = None;
        if parsed.is_none() && existing.is_some() {
            tracing::warn!(
                path = %path.display(),
                format = descriptor.format.name(),
                "Existing config could not be parsed, treating it as empty"
            );
            if !dry_run {
                let dest = backup_path(path);
                fs::copy(path, &dest).map_err(|e| SyncError::io(&dest, e))?;
                backup = Some(dest);
            }
        }

        let entries: Map<String, Value> = servers
            .enabled()
            .map(|(name, config)| (name.to_string(), self.agent.render_server(config)))
            .collect();

        let mut merged = merge_document(
            parsed.unwrap_or_else(|| Value::Object(Map::new())),
            descriptor.wrapper_key,
            &entries,
            self.strategy,
        );
        if let Some(root) = merged.document.as_object_mut() {
            self.agent.finalize(root);
        }

        let content = descriptor
            .format
            .serialize(&merged.document)
            .map_err(|message| SyncError::Serialize {
                path: path.to_path_buf(),
                format: descriptor.format.name(),
                message,
            })?;

        let status = match existing.as_deref() {
            Some(old) if old == content.as_bytes() => TargetStatus::Unchanged,
            Some(_) => TargetStatus::Updated,
            None => TargetStatus::Created,
        };

        if status != TargetStatus::Unchanged && !dry_run {
            atomic_write(path, content.as_bytes())?;
        }

        tracing::debug!(
            agent = self.agent.id(),
            path = %path.display(),
            added = merged.added.len(),
            updated = merged.updated.len(),
            "Merged MCP servers"
        );

        Ok(MergeReport {
            status,
            added: merged.added,
            updated: merged.updated,
            removed: merged.removed,
            backup,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
