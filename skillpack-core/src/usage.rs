//! Recognizing when an assistant used an installed asset
//!
//! Clients report tool calls as a tool name plus a JSON argument object.
//! Each asset type shows up through one known tool; the match is a closed
//! table over the type.

use serde_json::Value;

use crate::asset::AssetType;

/// Whether a tool call invoked the asset `name` of type `asset_type`
pub fn detect_usage(asset_type: &AssetType, name: &str, tool_name: &str, args: &Value) -> bool {
    let arg = |key: &str| args.get(key).and_then(Value::as_str);
    match asset_type {
        AssetType::Skill => {
            tool_name == "Skill" && (arg("skill") == Some(name) || arg("command") == Some(name))
        }
        AssetType::Command => {
            tool_name == "SlashCommand"
                && arg("command")
                    .and_then(|command| command.strip_prefix('/'))
                    .and_then(|command| command.split_whitespace().next())
                    == Some(name)
        }
        AssetType::Agent => tool_name == "Task" && arg("subagent_type") == Some(name),
        AssetType::Mcp => tool_name
            .strip_prefix("mcp__")
            .and_then(|rest| rest.strip_prefix(name))
            .is_some_and(|rest| rest.starts_with("__")),
        AssetType::Hook
        | AssetType::Rule
        | AssetType::Plugin
        | AssetType::Unknown(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skill_usage() {
        let args = json!({"skill": "code-review"});
        assert!(detect_usage(&AssetType::Skill, "code-review", "Skill", &args));
        assert!(detect_usage(
            &AssetType::Skill,
            "code-review",
            "Skill",
            &json!({"command": "code-review"})
        ));
        assert!(!detect_usage(&AssetType::Skill, "code-review", "Task", &args));
    }

    #[test]
    fn test_command_usage() {
        let args = json!({"command": "/review src/lib.rs"});
        assert!(detect_usage(&AssetType::Command, "review", "SlashCommand", &args));
        assert!(!detect_usage(&AssetType::Command, "rev", "SlashCommand", &args));
        assert!(!detect_usage(
            &AssetType::Command,
            "review",
            "SlashCommand",
            &json!({"command": "review"})
        ));
    }

    #[test]
    fn test_agent_usage() {
        let args = json!({"subagent_type": "planner", "prompt": "plan it"});
        assert!(detect_usage(&AssetType::Agent, "planner", "Task", &args));
    }

    #[test]
    fn test_mcp_usage() {
        let args = json!({});
        assert!(detect_usage(&AssetType::Mcp, "github", "mcp__github__create_issue", &args));
        assert!(!detect_usage(&AssetType::Mcp, "git", "mcp__github__create_issue", &args));
    }

    #[test]
    fn test_other_types_never_match() {
        let args = json!({"skill": "x"});
        assert!(!detect_usage(&AssetType::Hook, "x", "Skill", &args));
        assert!(!detect_usage(&AssetType::Rule, "x", "Skill", &args));
    }
}
