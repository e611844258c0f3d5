//! Client type definitions
//!
//! Each client is a different AI coding assistant with its own configuration
//! directory layout and native file formats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported AI coding assistant clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClientId {
    /// Claude Code - Anthropic's CLI
    #[serde(rename = "claude-code")]
    ClaudeCode,

    /// Cursor - AI-powered code editor
    #[serde(rename = "cursor")]
    Cursor,

    /// Gemini CLI - Google's terminal agent
    #[serde(rename = "gemini")]
    Gemini,

    /// GitHub Copilot (VS Code agent mode and Copilot CLI)
    #[serde(rename = "copilot")]
    Copilot,
}

impl ClientId {
    pub const ALL: [ClientId; 4] = [
        ClientId::ClaudeCode,
        ClientId::Cursor,
        ClientId::Gemini,
        ClientId::Copilot,
    ];

    /// Get the client identifier as stored in the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientId::ClaudeCode => "claude-code",
            ClientId::Cursor => "cursor",
            ClientId::Gemini => "gemini",
            ClientId::Copilot => "copilot",
        }
    }

    /// Get the display name (proper casing)
    pub fn display_name(&self) -> &'static str {
        match self {
            ClientId::ClaudeCode => "Claude Code",
            ClientId::Cursor => "Cursor",
            ClientId::Gemini => "Gemini CLI",
            ClientId::Copilot => "GitHub Copilot",
        }
    }

    /// Directory under the user's home holding global configuration
    pub fn global_dir_name(&self) -> &'static str {
        match self {
            ClientId::ClaudeCode => ".claude",
            ClientId::Cursor => ".cursor",
            ClientId::Gemini => ".gemini",
            ClientId::Copilot => ".copilot",
        }
    }

    /// Directory under a repository (or a path in it) holding project configuration
    pub fn project_dir_name(&self) -> &'static str {
        match self {
            ClientId::ClaudeCode => ".claude",
            ClientId::Cursor => ".cursor",
            ClientId::Gemini => ".gemini",
            ClientId::Copilot => ".github",
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ClientId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude-code" | "claude" | "claudecode" => Ok(ClientId::ClaudeCode),
            "cursor" => Ok(ClientId::Cursor),
            "gemini" | "gemini-cli" => Ok(ClientId::Gemini),
            "copilot" | "github-copilot" => Ok(ClientId::Copilot),
            _ => Err(format!(
                "Unknown client: '{s}'. Valid options: claude-code, cursor, gemini, copilot"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_parsing() {
        assert_eq!(
            "claude".parse::<ClientId>().unwrap(),
            ClientId::ClaudeCode
        );
        assert_eq!(
            "Claude-Code".parse::<ClientId>().unwrap(),
            ClientId::ClaudeCode
        );
        assert_eq!("gemini-cli".parse::<ClientId>().unwrap(), ClientId::Gemini);
        assert_eq!("CURSOR".parse::<ClientId>().unwrap(), ClientId::Cursor);
        assert!("windsurf".parse::<ClientId>().is_err());
    }

    #[test]
    fn test_client_round_trip() {
        for client in ClientId::ALL {
            assert_eq!(client.as_str().parse::<ClientId>().unwrap(), client);
            let json = serde_json::to_string(&client).unwrap();
            assert_eq!(json, format!("\"{}\"", client.as_str()));
        }
    }

    #[test]
    fn test_copilot_project_dir_differs() {
        assert_eq!(ClientId::Copilot.global_dir_name(), ".copilot");
        assert_eq!(ClientId::Copilot.project_dir_name(), ".github");
    }
}
