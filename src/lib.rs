//! AgentMirror - keep AI tool configurations in sync
//!
//! One canonical set of agent instructions and MCP server definitions is
//! propagated to the native config file of every coding assistant in a
//! project. Existing tool settings are merged into, never clobbered.

pub mod agent_ids;
pub mod config;
pub mod error;
pub mod fs;
pub mod gitignore;
pub mod instructions;
pub mod mcp;
pub mod orchestrator;
pub mod paths;
pub mod value;

pub use config::Config;
pub use error::{ErrorKind, SyncError};
pub use mcp::{CanonicalServerSet, ConfigMerger, McpAgent};
pub use orchestrator::{
    CancellationToken, RunOutcome, SyncOptions, SyncOrchestrator, SyncReport, SyncTarget,
    TargetStatus,
};
