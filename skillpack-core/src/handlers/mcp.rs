//! MCP server assets
//!
//! Each client keeps server definitions in a name-keyed JSON object, but the
//! file, the section key and the entry shape differ:
//!
//! | client | file | section |
//! |---|---|---|
//! | Claude Code | `{root}/.mcp.json`, global `~/.claude.json` | `mcpServers` |
//! | Cursor | `{dir}/mcp.json` | `mcpServers` |
//! | Gemini CLI | `{dir}/settings.json` | `mcpServers` |
//! | Copilot | `{root}/.vscode/mcp.json`, global `~/.copilot/mcp-config.json` | `servers` / `mcpServers` |

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::directory::extract_bundle;
use super::settings::SettingsDocument;
use super::{absolute, remove_dir_if_exists, validate_bundle, Handler, Verification};
use crate::asset::AssetRef;
use crate::bundle::Bundle;
use crate::client::ClientId;
use crate::metadata::{McpConfig, McpTransport};
use crate::scope::ScopeBase;
use crate::{Result, SkillpackError};

#[derive(Debug, Clone)]
pub struct McpHandler {
    asset: AssetRef,
    client: ClientId,
}

impl McpHandler {
    pub fn new(asset: AssetRef, client: ClientId) -> Self {
        Self { asset, client }
    }

    /// Config file and section key for this scope
    pub fn config_location(&self, base: &ScopeBase) -> (PathBuf, &'static str) {
        match (self.client, base.global) {
            (ClientId::ClaudeCode, true) => (base.root.join(".claude.json"), "mcpServers"),
            (ClientId::ClaudeCode, false) => (base.root.join(".mcp.json"), "mcpServers"),
            (ClientId::Cursor, _) => (base.join("mcp.json"), "mcpServers"),
            (ClientId::Gemini, _) => (base.join("settings.json"), "mcpServers"),
            (ClientId::Copilot, true) => (base.join("mcp-config.json"), "mcpServers"),
            (ClientId::Copilot, false) => (base.root.join(".vscode").join("mcp.json"), "servers"),
        }
    }

    /// Where bundled server files are extracted when the entry refers to them
    pub fn extract_dir(&self, base: &ScopeBase) -> PathBuf {
        base.join("mcp-servers").join(&self.asset.name)
    }

    /// Native server entry. Bundled paths in `command`/`args` point into `dir`.
    pub fn server_entry(&self, mcp: &McpConfig, bundle: &Bundle, dir: &Path) -> Result<Map<String, Value>> {
        let resolve = |value: &str| -> Result<String> {
            if bundle.contains(value) {
                Ok(absolute(&dir.join(value))?.to_string_lossy().into_owned())
            } else {
                Ok(value.to_string())
            }
        };

        let mut entry = Map::new();
        match self.client {
            ClientId::ClaudeCode | ClientId::Copilot => {
                entry.insert("type".into(), json!(mcp.transport.as_str()));
            }
            ClientId::Cursor | ClientId::Gemini => {}
        }

        match mcp.transport {
            McpTransport::Stdio => {
                let command = mcp.command.as_deref().unwrap_or_default();
                entry.insert("command".into(), json!(resolve(command)?));
                let args = mcp
                    .args
                    .iter()
                    .map(|arg| resolve(arg))
                    .collect::<Result<Vec<_>>>()?;
                entry.insert("args".into(), json!(args));
                if !mcp.env.is_empty() {
                    entry.insert("env".into(), json!(mcp.env));
                }
            }
            McpTransport::Sse | McpTransport::Http => {
                let url = mcp.url.as_deref().unwrap_or_default();
                let key = match (self.client, mcp.transport) {
                    (ClientId::Gemini, McpTransport::Http) => "httpUrl",
                    _ => "url",
                };
                entry.insert(key.into(), json!(url));
                if !mcp.headers.is_empty() {
                    entry.insert("headers".into(), json!(mcp.headers));
                }
            }
        }
        Ok(entry)
    }
}

/// Whether any part of the launch command ships inside the bundle
fn uses_bundled_files(mcp: &McpConfig, bundle: &Bundle) -> bool {
    mcp.command.iter().chain(mcp.args.iter()).any(|part| bundle.contains(part))
}

impl Handler for McpHandler {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn client(&self) -> ClientId {
        self.client
    }

    fn install(&self, bundle: &Bundle, base: &ScopeBase) -> Result<()> {
        let metadata = validate_bundle(bundle, &self.asset)?;
        let mcp = metadata
            .mcp
            .as_ref()
            .ok_or_else(|| SkillpackError::validation(format!("{}: missing [mcp]", self.asset)))?;
        let (path, section) = self.config_location(base);
        let mut doc = SettingsDocument::load(&path)?;

        let dir = self.extract_dir(base);
        if uses_bundled_files(mcp, bundle) {
            extract_bundle(bundle, &metadata, &dir)?;
        } else {
            remove_dir_if_exists(&dir)?;
        }

        let entry = self.server_entry(mcp, bundle, &dir)?;
        doc.servers_mut(section)?.upsert(&self.asset.name, entry);
        doc.save()?;
        info!(
            "Installed MCP server {} for {} in {}",
            self.asset.name,
            self.client,
            path.display()
        );
        Ok(())
    }

    fn remove(&self, base: &ScopeBase) -> Result<()> {
        let (path, section) = self.config_location(base);
        if path.exists() {
            let mut doc = SettingsDocument::load(&path)?;
            let removed = doc.servers_mut(section)?.remove_managed(&self.asset.name);
            doc.prune_section(section);
            if removed {
                doc.save()?;
                info!("Removed MCP server {} from {}", self.asset.name, path.display());
            } else {
                debug!("MCP server {} not managed in {}", self.asset.name, path.display());
            }
        }
        remove_dir_if_exists(&self.extract_dir(base))?;
        Ok(())
    }

    fn verify_installed(&self, base: &ScopeBase) -> Result<Verification> {
        let (path, section) = self.config_location(base);
        let doc = SettingsDocument::load(&path)?;
        let managed = doc
            .section(section)
            .and_then(|servers| servers.get(&self.asset.name))
            .and_then(|entry| entry.get(super::MARKER_KEY))
            .and_then(Value::as_str)
            == Some(self.asset.name.as_str());
        if managed {
            Ok(Verification::ok(format!("registered in {}", path.display())))
        } else {
            Ok(Verification::missing(format!(
                "{} has no managed entry for {}",
                path.display(),
                self.asset.name
            )))
        }
    }

    fn install_path(&self, base: &ScopeBase) -> PathBuf {
        self.config_location(base).0
    }
}
