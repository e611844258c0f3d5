//! Per-(client, asset type) installation handlers
//!
//! A handler translates one canonical asset into one client's native
//! configuration. Handlers are looked up in a [`HandlerTable`] built once at
//! startup; a pair missing from the table is an explicit error.
//!
//! ```text
//! HandlerTable::get(client, asset)
//!     │
//!     ├── DirectoryHandler   skills            → {dir}/skills/{name}/
//!     ├── SingleFileHandler  agents, commands, rules → {dir}/{subdir}/{name}.{ext}
//!     ├── InstructionsHandler rules (Gemini)   → GEMINI.md section
//!     ├── HookHandler        hooks             → settings.json / hooks.json
//!     ├── McpHandler         MCP servers       → .mcp.json / mcp.json / settings.json
//!     └── PluginHandler      plugins           → {dir}/plugins/{name}/ + registry
//! ```

pub mod directory;
pub mod hook;
pub mod instructions;
pub mod mcp;
pub mod plugin;
pub mod rule;
pub mod settings;
pub mod single_file;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::asset::{AssetRef, AssetType};
use crate::bundle::Bundle;
use crate::client::ClientId;
use crate::error::IoResultExt;
use crate::metadata::Metadata;
use crate::scope::ScopeBase;
use crate::{Result, SkillpackError};

pub use directory::DirectoryHandler;
pub use hook::HookHandler;
pub use instructions::InstructionsHandler;
pub use mcp::McpHandler;
pub use plugin::PluginHandler;
pub use settings::{SettingsDocument, MARKER_KEY};
pub use single_file::SingleFileHandler;

/// Outcome of checking whether an asset is installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub installed: bool,
    /// Human-readable explanation, useful mostly when not installed
    pub reason: String,
}

impl Verification {
    pub fn ok(reason: impl Into<String>) -> Self {
        Self {
            installed: true,
            reason: reason.into(),
        }
    }

    pub fn missing(reason: impl Into<String>) -> Self {
        Self {
            installed: false,
            reason: reason.into(),
        }
    }
}

/// Installs, removes and verifies one asset for one client
pub trait Handler: fmt::Debug {
    fn asset(&self) -> &AssetRef;

    fn client(&self) -> ClientId;

    /// Validate the bundle, then write the asset into the client's native surface
    fn install(&self, bundle: &Bundle, base: &ScopeBase) -> Result<()>;

    /// Remove everything this asset installed. Removing an absent asset is a no-op.
    fn remove(&self, base: &ScopeBase) -> Result<()>;

    fn verify_installed(&self, base: &ScopeBase) -> Result<Verification>;

    /// Primary file or directory the asset occupies
    fn install_path(&self, base: &ScopeBase) -> PathBuf;
}

type Constructor = fn(AssetRef, ClientId) -> Box<dyn Handler>;

/// Static (client, asset type) → handler table
#[derive(Clone)]
pub struct HandlerTable {
    entries: BTreeMap<(ClientId, String), Constructor>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

impl HandlerTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Every supported combination
    pub fn builtin() -> Self {
        use ClientId::*;

        let mut table = Self::empty();

        for client in [ClaudeCode, Cursor, Gemini, Copilot] {
            table.register(client, AssetType::Skill, |asset, client| {
                Box::new(DirectoryHandler::skill(asset, client))
            });
        }

        for client in [ClaudeCode, Cursor, Copilot] {
            table.register(client, AssetType::Agent, |asset, client| {
                Box::new(SingleFileHandler::agent(asset, client))
            });
        }

        for client in [ClaudeCode, Cursor, Gemini, Copilot] {
            table.register(client, AssetType::Command, |asset, client| {
                Box::new(SingleFileHandler::command(asset, client))
            });
        }

        for client in [ClaudeCode, Cursor, Gemini] {
            table.register(client, AssetType::Hook, |asset, client| {
                Box::new(HookHandler::new(asset, client))
            });
        }

        for client in [ClaudeCode, Cursor, Gemini, Copilot] {
            table.register(client, AssetType::Mcp, |asset, client| {
                Box::new(McpHandler::new(asset, client))
            });
        }

        for client in [ClaudeCode, Cursor, Copilot] {
            table.register(client, AssetType::Rule, |asset, client| {
                Box::new(SingleFileHandler::rule(asset, client))
            });
        }
        table.register(Gemini, AssetType::Rule, |asset, client| {
            Box::new(InstructionsHandler::gemini(asset, client))
        });

        table.register(ClaudeCode, AssetType::Plugin, |asset, client| {
            Box::new(PluginHandler::new(asset, client))
        });

        table
    }

    pub fn register(&mut self, client: ClientId, asset_type: AssetType, constructor: Constructor) {
        self.entries
            .insert((client, asset_type.key().to_string()), constructor);
    }

    pub fn supports(&self, client: ClientId, asset_type: &AssetType) -> bool {
        self.entries
            .contains_key(&(client, asset_type.key().to_string()))
    }

    /// Asset types a client can install
    pub fn supported_types(&self, client: ClientId) -> Vec<AssetType> {
        self.entries
            .keys()
            .filter(|(c, _)| *c == client)
            .map(|(_, key)| AssetType::from_key(key))
            .collect()
    }

    /// Build the handler for `asset` on `client`
    pub fn get(&self, client: ClientId, asset: &AssetRef) -> Result<Box<dyn Handler>> {
        let constructor = self
            .entries
            .get(&(client, asset.asset_type.key().to_string()))
            .ok_or_else(|| SkillpackError::Unsupported {
                client,
                asset_type: asset.asset_type.clone(),
            })?;
        Ok(constructor(asset.clone(), client))
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Parse and fully validate a bundle for `asset` before any filesystem change
pub fn validate_bundle(bundle: &Bundle, asset: &AssetRef) -> Result<Metadata> {
    let metadata = bundle.metadata()?;
    metadata.validate()?;
    if metadata.name() != asset.name {
        return Err(SkillpackError::validation(format!(
            "bundle declares name '{}', expected '{}'",
            metadata.name(),
            asset.name
        )));
    }
    if metadata.asset_type() != &asset.asset_type {
        return Err(SkillpackError::validation(format!(
            "{}: bundle is a {}, expected {}",
            asset.name,
            metadata.asset_type(),
            asset.asset_type
        )));
    }
    metadata.validate_files(bundle)?;
    debug!("Validated bundle for {} v{}", asset, metadata.version());
    Ok(metadata)
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(path).at_path(path)?;
    Ok(true)
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(path).at_path(path)?;
    Ok(true)
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).at_path(parent)?;
    }
    std::fs::write(path, content).at_path(path)
}

/// Absolute form of a path without resolving symlinks
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).at_path(path)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A bundle holding `metadata.toml` plus the given files
    pub fn bundle(metadata: &str, files: &[(&str, &str)]) -> Bundle {
        let mut all = vec![("metadata.toml", metadata)];
        all.extend_from_slice(files);
        Bundle::from_files(all).unwrap()
    }

    pub fn base(client: ClientId, root: &Path) -> ScopeBase {
        ScopeBase::new(client, root.join(client.project_dir_name()), root, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_shape() {
        let table = HandlerTable::builtin();
        assert!(table.supports(ClientId::ClaudeCode, &AssetType::Plugin));
        assert!(!table.supports(ClientId::Cursor, &AssetType::Plugin));
        assert!(!table.supports(ClientId::Gemini, &AssetType::Agent));
        assert!(!table.supports(ClientId::Copilot, &AssetType::Hook));
        assert_eq!(table.supported_types(ClientId::ClaudeCode).len(), 7);
    }

    #[test]
    fn test_unmapped_pair_fails() {
        let table = HandlerTable::builtin();
        let asset = AssetRef::new("x", AssetType::Hook);
        let err = table.get(ClientId::Copilot, &asset).unwrap_err();
        assert!(err.is_unsupported());

        let unknown = AssetRef::new("x", AssetType::from_key("workflow"));
        assert!(table.get(ClientId::ClaudeCode, &unknown).is_err());
    }

    #[test]
    fn test_validate_bundle_name_mismatch() {
        let bundle = test_support::bundle(
            "[asset]\nname = \"other\"\nversion = \"1.0.0\"\ntype = \"skill\"\n\n[skill]\n",
            &[("SKILL.md", "x")],
        );
        let err = validate_bundle(&bundle, &AssetRef::new("mine", AssetType::Skill)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_bundle_type_mismatch() {
        let bundle = test_support::bundle(
            "[asset]\nname = \"mine\"\nversion = \"1.0.0\"\ntype = \"skill\"\n\n[skill]\n",
            &[("SKILL.md", "x")],
        );
        let err = validate_bundle(&bundle, &AssetRef::new("mine", AssetType::Agent)).unwrap_err();
        assert!(err.to_string().contains("expected agent"));
    }
}
