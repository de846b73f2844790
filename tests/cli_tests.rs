//! End-to-End CLI Tests for AgentMirror
//!
//! These tests run the binary and check its output and the resulting files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn agentmirror_cmd() -> Command {
    let mut cmd = Command::cargo_bin("agentmirror").unwrap();
    cmd.env("NO_COLOR", "1");
    cmd
}

fn setup_project_with_config(temp_dir: &TempDir, extra: &str) {
    let agents_dir = temp_dir.path().join(".agents");
    fs::create_dir_all(agents_dir.join("skills/review")).unwrap();

    fs::write(agents_dir.join("AGENTS.md"), "# Test Agent Instructions").unwrap();
    fs::write(agents_dir.join("skills/review/SKILL.md"), "# Review").unwrap();

    let config = format!(
        r#"
        source_dir = "."

        [mcp_servers.filesystem]
        command = "npx"
        args = ["-y", "@modelcontextprotocol/server-filesystem", "."]

        [agents.claude]
        description = "Claude Code"

        [agents.claude.targets.instructions]
        source = "AGENTS.md"
        destination = "CLAUDE.md"
        type = "symlink"

        [agents.claude.targets.skills]
        source = "skills"
        destination = ".claude/skills"
        type = "copy"

        [agents.gemini.targets.instructions]
        source = "AGENTS.md"
        destination = "GEMINI.md"
        type = "copy"

        {extra}
        "#
    );
    fs::write(agents_dir.join("agentmirror.toml"), config).unwrap();
}

// =============================================================================
// APPLY COMMAND TESTS
// =============================================================================

#[test]
#[cfg(unix)]
fn test_cli_apply_syncs_everything() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");

    agentmirror_cmd()
        .arg("apply")
        .arg("--path")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync complete"));

    let root = temp_dir.path();
    assert!(root.join("CLAUDE.md").is_symlink());
    assert_eq!(
        fs::read_to_string(root.join("GEMINI.md")).unwrap(),
        "# Test Agent Instructions"
    );
    assert!(root.join(".claude/skills/review/SKILL.md").exists());

    let mcp = fs::read_to_string(root.join(".mcp.json")).unwrap();
    assert!(mcp.contains("\"mcpServers\""));
    assert!(mcp.contains("\"filesystem\""));
    let gemini = fs::read_to_string(root.join(".gemini/settings.json")).unwrap();
    assert!(gemini.contains("\"trust\": true"));
}

#[test]
#[cfg(unix)]
fn test_cli_apply_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();
    let first = fs::read_to_string(temp_dir.path().join(".mcp.json")).unwrap();

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created: 0, Updated: 0"));
    let second = fs::read_to_string(temp_dir.path().join(".mcp.json")).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_cli_apply_preserves_existing_settings() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");
    fs::create_dir_all(temp_dir.path().join(".gemini")).unwrap();
    fs::write(
        temp_dir.path().join(".gemini/settings.json"),
        r#"{"theme": "dark", "mcpServers": {"mine": {"command": "my-server"}}}"#,
    )
    .unwrap();

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();

    let settings: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(temp_dir.path().join(".gemini/settings.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(settings["theme"], "dark");
    assert_eq!(settings["mcpServers"]["mine"]["command"], "my-server");
    assert_eq!(settings["mcpServers"]["filesystem"]["command"], "npx");
}

#[test]
fn test_cli_apply_dry_run_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");

    agentmirror_cmd()
        .args(["apply", "--dry-run", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    assert!(!temp_dir.path().join("CLAUDE.md").exists());
    assert!(!temp_dir.path().join(".mcp.json").exists());
    assert!(!temp_dir.path().join(".claude").exists());
}

#[test]
fn test_cli_apply_agent_filter() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");

    agentmirror_cmd()
        .args(["apply", "--agents", "gemini-cli", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();

    assert!(temp_dir.path().join("GEMINI.md").exists());
    assert!(temp_dir.path().join(".gemini/settings.json").exists());
    assert!(!temp_dir.path().join("CLAUDE.md").exists());
    assert!(!temp_dir.path().join(".mcp.json").exists());
}

#[test]
fn test_cli_apply_partial_failure_exits_non_zero() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(
        &temp_dir,
        r#"
        [agents.broken.targets.loop]
        source = "skills"
        destination = ".agents/skills/nested"
        type = "copy"
        "#,
    );

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken/loop"))
        .stderr(predicate::str::contains("structural violation"));

    // Unaffected targets still ran
    assert!(temp_dir.path().join("GEMINI.md").exists());
    assert!(temp_dir.path().join(".mcp.json").exists());
    assert!(!temp_dir.path().join(".agents/skills/nested").exists());
}

#[test]
fn test_cli_apply_rejects_invalid_server_name() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(
        &temp_dir,
        r#"
        [mcp_servers."bad name"]
        command = "x"
        "#,
    );

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid MCP server name"));

    // Rejected before any target ran
    assert!(!temp_dir.path().join("GEMINI.md").exists());
    assert!(!temp_dir.path().join(".mcp.json").exists());
}

#[test]
fn test_cli_apply_missing_config_fails() {
    let temp_dir = TempDir::new().unwrap();

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not find agentmirror.toml"));
}

#[test]
fn test_cli_apply_explicit_config_path() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");
    let config = temp_dir.path().join(".agents/agentmirror.toml");

    agentmirror_cmd()
        .args(["apply", "--verbose", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Using config"));

    assert!(temp_dir.path().join("GEMINI.md").exists());
}

#[test]
#[cfg(unix)]
fn test_cli_apply_switches_symlink_target_to_copy() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");
    let config_path = temp_dir.path().join(".agents/agentmirror.toml");

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();
    assert!(temp_dir.path().join("CLAUDE.md").is_symlink());

    let config = fs::read_to_string(&config_path).unwrap();
    let switched = config.replacen(
        "destination = \"CLAUDE.md\"\n        type = \"symlink\"",
        "destination = \"CLAUDE.md\"\n        type = \"copy\"",
        1,
    );
    assert_ne!(config, switched);
    fs::write(&config_path, switched).unwrap();

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated: 1"));

    let claude = temp_dir.path().join("CLAUDE.md");
    assert!(!claude.is_symlink());
    assert_eq!(fs::read_to_string(claude).unwrap(), "# Test Agent Instructions");
    assert_eq!(
        fs::read_to_string(temp_dir.path().join(".agents/AGENTS.md")).unwrap(),
        "# Test Agent Instructions"
    );
}

// =============================================================================
// GITIGNORE TESTS
// =============================================================================

#[test]
fn test_cli_apply_manages_gitignore() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");
    fs::write(temp_dir.path().join(".gitignore"), "target/\n").unwrap();

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(".gitignore updated"));

    let gitignore = fs::read_to_string(temp_dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.starts_with("target/\n"));
    assert!(gitignore.contains("# START AgentMirror replicas"));
    assert!(gitignore.contains(".claude/skills\nCLAUDE.md\nGEMINI.md\n"));
    assert!(gitignore.contains("# END AgentMirror replicas"));

    // A second run leaves the block as it is
    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(".gitignore").not());
    assert_eq!(
        fs::read_to_string(temp_dir.path().join(".gitignore")).unwrap(),
        gitignore
    );
}

#[test]
fn test_cli_apply_no_gitignore_flag() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");

    agentmirror_cmd()
        .args(["apply", "--no-gitignore", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();

    assert!(temp_dir.path().join("GEMINI.md").exists());
    assert!(!temp_dir.path().join(".gitignore").exists());
}

#[test]
fn test_cli_apply_gitignore_disabled_in_config() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "[gitignore]\n        enabled = false");

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();

    assert!(!temp_dir.path().join(".gitignore").exists());
}

// =============================================================================
// CLEAN COMMAND TESTS
// =============================================================================

#[test]
#[cfg(unix)]
fn test_cli_clean_removes_replicas() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");
    let root = temp_dir.path();

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(root)
        .assert()
        .success();

    agentmirror_cmd()
        .args(["clean", "--path"])
        .arg(root)
        .assert()
        .success()
        .stdout(predicate::str::contains("Clean complete"))
        .stdout(predicate::str::contains("Removed: 3"));

    assert!(root.join("CLAUDE.md").symlink_metadata().is_err());
    assert!(!root.join("GEMINI.md").exists());
    assert!(!root.join(".claude/skills").exists());
    // Tool config files and sources stay
    assert!(root.join(".mcp.json").exists());
    assert!(root.join(".agents/AGENTS.md").exists());
    assert!(root.join(".agents/skills/review/SKILL.md").exists());
}

#[test]
fn test_cli_clean_keeps_edited_copies() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();
    fs::write(temp_dir.path().join("GEMINI.md"), "local notes").unwrap();

    agentmirror_cmd()
        .args(["clean", "--agents", "gemini", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed: 0"));

    assert_eq!(
        fs::read_to_string(temp_dir.path().join("GEMINI.md")).unwrap(),
        "local notes"
    );
}

#[test]
fn test_cli_clean_dry_run_removes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    setup_project_with_config(&temp_dir, "");

    agentmirror_cmd()
        .args(["apply", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success();

    agentmirror_cmd()
        .args(["clean", "--dry-run", "--path"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));

    assert!(temp_dir.path().join("GEMINI.md").exists());
    assert!(temp_dir.path().join(".claude/skills/review/SKILL.md").exists());
}

// =============================================================================
// AGENTS COMMAND TESTS
// =============================================================================

#[test]
fn test_cli_agents_lists_catalog() {
    agentmirror_cmd()
        .arg("agents")
        .assert()
        .success()
        .stdout(predicate::str::contains(".codex/config.toml"))
        .stdout(predicate::str::contains(".goose/config.yaml"))
        .stdout(predicate::str::contains("opencode.json"));
}

#[test]
fn test_cli_help() {
    agentmirror_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("agents"));
}
