//! Asset type definitions
//!
//! An asset is a named, versioned unit of assistant configuration. Its type
//! decides which handler installs it for each client.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The closed set of asset types, plus a carrier for keys we don't know.
///
/// `Unknown` keys survive a parse/serialize cycle but are never valid for
/// installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetType {
    Skill,
    Agent,
    Command,
    Hook,
    Mcp,
    Rule,
    Plugin,
    Unknown(String),
}

impl AssetType {
    /// Every installable type, in detection-priority order
    pub const ALL: [AssetType; 7] = [
        AssetType::Plugin,
        AssetType::Skill,
        AssetType::Agent,
        AssetType::Command,
        AssetType::Hook,
        AssetType::Mcp,
        AssetType::Rule,
    ];

    /// Parse a type key. `mcp-remote` is an older spelling of `mcp`.
    pub fn from_key(key: &str) -> Self {
        match key {
            "skill" => AssetType::Skill,
            "agent" => AssetType::Agent,
            "command" => AssetType::Command,
            "hook" => AssetType::Hook,
            "mcp" | "mcp-remote" => AssetType::Mcp,
            "rule" => AssetType::Rule,
            "plugin" => AssetType::Plugin,
            other => AssetType::Unknown(other.to_string()),
        }
    }

    /// The stable key written to metadata and the ledger
    pub fn key(&self) -> &str {
        match self {
            AssetType::Skill => "skill",
            AssetType::Agent => "agent",
            AssetType::Command => "command",
            AssetType::Hook => "hook",
            AssetType::Mcp => "mcp",
            AssetType::Rule => "rule",
            AssetType::Plugin => "plugin",
            AssetType::Unknown(key) => key,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            AssetType::Skill => "Skill",
            AssetType::Agent => "Agent",
            AssetType::Command => "Command",
            AssetType::Hook => "Hook",
            AssetType::Mcp => "MCP Server",
            AssetType::Rule => "Rule",
            AssetType::Plugin => "Plugin",
            AssetType::Unknown(key) => key,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, AssetType::Unknown(_))
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for AssetType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(AssetType::from_key(s))
    }
}

impl Serialize for AssetType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for AssetType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Ok(AssetType::from_key(&key))
    }
}

/// Name and type of an asset, enough to address it on disk without a bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRef {
    pub name: String,
    pub asset_type: AssetType,
}

impl AssetRef {
    pub fn new(name: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            name: name.into(),
            asset_type,
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.asset_type)
    }
}
