//! Shared agent identifier normalization.
//!
//! Alias handling lives here so that tool lookup and `--agents` filtering
//! agree on what `claude-code` or `github-copilot` mean.

/// Normalize a user-provided agent identifier to a canonical tool ID.
pub fn canonical_agent_id(id: &str) -> Option<&'static str> {
    const ALIASES: &[(&str, &[&str])] = &[
        ("claude", &["claude", "claude-code", "claude_code"]),
        ("cursor", &["cursor"]),
        (
            "vscode",
            &[
                "vscode",
                "vs-code",
                "vs_code",
                "copilot",
                "github-copilot",
                "github_copilot",
            ],
        ),
        ("gemini", &["gemini", "gemini-cli", "gemini_cli"]),
        ("codex", &["codex", "codex-cli", "codex_cli"]),
        ("opencode", &["opencode", "open-code", "open_code"]),
        ("goose", &["goose"]),
        ("continue", &["continue", "continue-dev", "continue_dev"]),
    ];

    ALIASES
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|alias| id.eq_ignore_ascii_case(alias)))
        .map(|(canonical, _)| *canonical)
}

/// Match a configured agent name against a sync filter token.
///
/// If `filter` is a known alias/canonical ID and the configured agent is also
/// known, this performs exact canonical matching. Otherwise it falls back to
/// case-insensitive substring matching against the configured name.
pub fn filter_matches(config_agent_name: &str, filter: &str) -> bool {
    if let Some(cf) = canonical_agent_id(filter) {
        if let Some(ca) = canonical_agent_id(config_agent_name) {
            return ca == cf;
        }
        return config_agent_name.to_lowercase().contains(cf);
    }

    let filter_lower = filter.to_lowercase();
    if let Some(ca) = canonical_agent_id(config_agent_name) {
        ca.contains(&filter_lower)
    } else {
        config_agent_name.to_lowercase().contains(&filter_lower)
    }
}
