//! Canonical asset metadata (`metadata.toml`)
//!
//! The metadata file carries the asset identity, exactly one
//! type-specific block and an optional free-form `[custom]` table.
//!
//! ```toml
//! [asset]
//! name = "format-on-save"
//! version = "1.0.0"
//! type = "hook"
//!
//! [hook]
//! event = "post-tool-use"
//! script-file = "hook.sh"
//! ```

mod types;

pub use types::{
    HookConfig, HookEvent, HookOverride, Identity, McpConfig, McpTransport, PluginConfig,
    PromptConfig, RuleConfig, RuleOverride,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::asset::AssetType;
use crate::bundle::Bundle;
use crate::client::ClientId;
use crate::{Result, SkillpackError};

/// Default prompt file names per type
pub const DEFAULT_SKILL_FILE: &str = "SKILL.md";
pub const DEFAULT_AGENT_FILE: &str = "AGENT.md";
pub const DEFAULT_COMMAND_FILE: &str = "COMMAND.md";
pub const DEFAULT_RULE_FILE: &str = "RULE.md";
pub const DEFAULT_PLUGIN_MANIFEST: &str = ".claude-plugin/plugin.json";

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

/// Parsed `metadata.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Metadata {
    /// Identity block; older bundles call it `[artifact]`
    #[serde(alias = "artifact")]
    pub asset: Identity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<PromptConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<PromptConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<PromptConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleConfig>,

    /// Free-form data carried along untouched
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub custom: toml::Table,
}

impl Metadata {
    /// Minimal metadata for a bundle that ships without `metadata.toml`.
    ///
    /// Only types whose block has usable defaults qualify; hooks and MCP
    /// servers cannot be described without explicit configuration.
    pub fn synthesize(name: &str, version: &str, asset_type: AssetType) -> Result<Self> {
        let mut metadata = Self {
            asset: Identity {
                name: name.to_string(),
                version: version.to_string(),
                asset_type: asset_type.clone(),
                description: None,
                license: None,
                authors: Vec::new(),
                keywords: Vec::new(),
                homepage: None,
                repository: None,
                docs: None,
                readme: None,
                dependencies: Vec::new(),
            },
            skill: None,
            agent: None,
            command: None,
            hook: None,
            mcp: None,
            plugin: None,
            rule: None,
            custom: toml::Table::new(),
        };
        match asset_type {
            AssetType::Skill => metadata.skill = Some(PromptConfig::default()),
            AssetType::Agent => metadata.agent = Some(PromptConfig::default()),
            AssetType::Command => metadata.command = Some(PromptConfig::default()),
            AssetType::Rule => metadata.rule = Some(RuleConfig::default()),
            AssetType::Plugin => metadata.plugin = Some(PluginConfig::default()),
            other => {
                return Err(SkillpackError::validation(format!(
                    "{name}: {other} bundles must ship {}",
                    crate::bundle::METADATA_FILE
                )))
            }
        }
        Ok(metadata)
    }

    /// Parse metadata from TOML text. Parse failures are validation errors.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SkillpackError::validation(format!("Invalid metadata.toml: {e}")))
    }

    /// Serialize back to TOML. Always writes `[asset]`.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn name(&self) -> &str {
        &self.asset.name
    }

    pub fn version(&self) -> &str {
        &self.asset.version
    }

    pub fn asset_type(&self) -> &AssetType {
        &self.asset.asset_type
    }

    /// Keys of the type-specific blocks that are present
    fn present_blocks(&self) -> Vec<&'static str> {
        let mut blocks = Vec::new();
        if self.skill.is_some() {
            blocks.push("skill");
        }
        if self.agent.is_some() {
            blocks.push("agent");
        }
        if self.command.is_some() {
            blocks.push("command");
        }
        if self.hook.is_some() {
            blocks.push("hook");
        }
        if self.mcp.is_some() {
            blocks.push("mcp");
        }
        if self.plugin.is_some() {
            blocks.push("plugin");
        }
        if self.rule.is_some() {
            blocks.push("rule");
        }
        blocks
    }

    /// The main content file for prompt-carrying types, with defaults applied
    pub fn prompt_file(&self) -> Option<&str> {
        match self.asset.asset_type {
            AssetType::Skill => Some(
                self.skill
                    .as_ref()
                    .and_then(|c| c.prompt_file.as_deref())
                    .unwrap_or(DEFAULT_SKILL_FILE),
            ),
            AssetType::Agent => Some(
                self.agent
                    .as_ref()
                    .and_then(|c| c.prompt_file.as_deref())
                    .unwrap_or(DEFAULT_AGENT_FILE),
            ),
            AssetType::Command => Some(
                self.command
                    .as_ref()
                    .and_then(|c| c.prompt_file.as_deref())
                    .unwrap_or(DEFAULT_COMMAND_FILE),
            ),
            AssetType::Rule => Some(
                self.rule
                    .as_ref()
                    .and_then(|c| c.prompt_file.as_deref())
                    .unwrap_or(DEFAULT_RULE_FILE),
            ),
            _ => None,
        }
    }

    /// Plugin manifest path, with the default applied
    pub fn plugin_manifest(&self) -> Option<&str> {
        self.plugin.as_ref().map(|p| {
            p.manifest_file
                .as_deref()
                .unwrap_or(DEFAULT_PLUGIN_MANIFEST)
        })
    }

    /// Validate the metadata contents. Collects every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !NAME_RE.is_match(&self.asset.name) {
            errors.push(format!(
                "name '{}' must match [A-Za-z0-9_-]+",
                self.asset.name
            ));
        }

        if let Err(e) = semver::Version::parse(&self.asset.version) {
            errors.push(format!(
                "version '{}' is not a semantic version: {e}",
                self.asset.version
            ));
        }

        let asset_type = &self.asset.asset_type;
        if !asset_type.is_valid() {
            errors.push(format!("unknown asset type '{asset_type}'"));
        }

        let blocks = self.present_blocks();
        match blocks.as_slice() {
            [] => {
                if asset_type.is_valid() {
                    errors.push(format!("missing [{}] section", asset_type.key()));
                }
            }
            [only] => {
                if *only != asset_type.key() {
                    errors.push(format!(
                        "section [{only}] does not match asset type '{asset_type}'"
                    ));
                }
            }
            many => errors.push(format!(
                "exactly one type section is allowed, found [{}]",
                many.join("], [")
            )),
        }

        if let Some(hook) = &self.hook {
            validate_hook(hook, &mut errors);
        }
        if let Some(mcp) = &self.mcp {
            validate_mcp(mcp, &mut errors);
        }
        if let Some(rule) = &self.rule {
            validate_rule(rule, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SkillpackError::validation(format!(
                "{}: {}",
                self.asset.name,
                errors.join("; ")
            )))
        }
    }

    /// Check that every file the metadata references exists in the bundle
    pub fn validate_files(&self, bundle: &Bundle) -> Result<()> {
        let mut required = Vec::new();
        if let Some(prompt) = self.prompt_file() {
            required.push(prompt);
        }
        if let Some(script) = self.hook.as_ref().and_then(|h| h.script_file.as_deref()) {
            required.push(script);
        }
        if let Some(manifest) = self.plugin_manifest() {
            required.push(manifest);
        }

        let missing: Vec<&str> = required
            .into_iter()
            .filter(|path| !bundle.contains(path))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SkillpackError::validation(format!(
                "{}: bundle is missing {}",
                self.asset.name,
                missing.join(", ")
            )))
        }
    }
}

fn validate_hook(hook: &HookConfig, errors: &mut Vec<String>) {
    if HookEvent::parse(&hook.event).is_none() {
        errors.push(format!("unknown hook event '{}'", hook.event));
    }
    match (&hook.script_file, &hook.command) {
        (Some(_), Some(_)) => {
            errors.push("hook must declare either script-file or command, not both".to_string())
        }
        (None, None) => errors.push("hook must declare script-file or command".to_string()),
        (Some(_), None) if !hook.args.is_empty() => {
            errors.push("hook args are only allowed with command".to_string())
        }
        _ => {}
    }
    for client in hook.clients.keys() {
        if client.parse::<ClientId>().is_err() {
            errors.push(format!("hook override for unknown client '{client}'"));
        }
    }
}

fn validate_mcp(mcp: &McpConfig, errors: &mut Vec<String>) {
    match mcp.transport {
        McpTransport::Stdio => {
            if mcp.command.as_deref().map_or(true, str::is_empty) {
                errors.push("stdio MCP server requires command".to_string());
            }
            if mcp.args.is_empty() {
                errors.push("stdio MCP server requires args".to_string());
            }
            if mcp.url.is_some() {
                errors.push("stdio MCP server must not declare url".to_string());
            }
        }
        McpTransport::Sse | McpTransport::Http => {
            let transport = mcp.transport.as_str();
            if mcp.url.as_deref().map_or(true, str::is_empty) {
                errors.push(format!("{transport} MCP server requires url"));
            }
            if mcp.command.is_some() || !mcp.args.is_empty() {
                errors.push(format!(
                    "{transport} MCP server must not declare command or args"
                ));
            }
        }
    }
}

fn validate_rule(rule: &RuleConfig, errors: &mut Vec<String>) {
    let override_globs = rule
        .clients
        .values()
        .filter_map(|o| o.globs.as_ref())
        .flatten();
    for glob in rule.globs.iter().chain(override_globs) {
        if let Err(e) = glob::Pattern::new(glob) {
            errors.push(format!("invalid rule glob '{glob}': {e}"));
        }
    }
    for client in rule.clients.keys() {
        if client.parse::<ClientId>().is_err() {
            errors.push(format!("rule override for unknown client '{client}'"));
        }
    }
}
