//! Single-file strategy: one rendered file plus a hidden metadata sidecar
//!
//! Agents, commands and rules become a single file in the client's
//! directory. The canonical metadata is stored next to it as
//! `.{name}.meta.json` so the installed version can be checked later.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use super::rule::render_rule;
use super::{remove_file_if_exists, validate_bundle, write_file, Handler, Verification};
use crate::asset::AssetRef;
use crate::bundle::Bundle;
use crate::client::ClientId;
use crate::error::IoResultExt;
use crate::frontmatter;
use crate::metadata::Metadata;
use crate::prompt;
use crate::scope::ScopeBase;
use crate::{Result, SkillpackError};

/// Produces the installed file contents from a validated bundle
pub type Renderer = fn(&Metadata, &Bundle, ClientId) -> Result<String>;

#[derive(Debug, Clone)]
pub struct SingleFileHandler {
    asset: AssetRef,
    client: ClientId,
    subdir: &'static str,
    extension: &'static str,
    render: Renderer,
}

impl SingleFileHandler {
    pub fn new(
        asset: AssetRef,
        client: ClientId,
        subdir: &'static str,
        extension: &'static str,
        render: Renderer,
    ) -> Self {
        Self {
            asset,
            client,
            subdir,
            extension,
            render,
        }
    }

    pub fn agent(asset: AssetRef, client: ClientId) -> Self {
        let extension = match client {
            ClientId::Copilot => "agent.md",
            _ => "md",
        };
        Self::new(asset, client, "agents", extension, render_prompt)
    }

    pub fn command(asset: AssetRef, client: ClientId) -> Self {
        match client {
            ClientId::Gemini => Self::new(asset, client, "commands", "toml", render_gemini_command),
            ClientId::Copilot => Self::new(asset, client, "prompts", "prompt.md", render_prompt),
            _ => Self::new(asset, client, "commands", "md", render_prompt),
        }
    }

    pub fn rule(asset: AssetRef, client: ClientId) -> Self {
        let (subdir, extension) = match client {
            ClientId::Cursor => ("rules", "mdc"),
            ClientId::Copilot => ("instructions", "instructions.md"),
            _ => ("rules", "md"),
        };
        Self::new(asset, client, subdir, extension, render_rule)
    }

    pub fn file_path(&self, base: &ScopeBase) -> PathBuf {
        base.join(self.subdir)
            .join(format!("{}.{}", self.asset.name, self.extension))
    }

    pub fn sidecar_path(&self, base: &ScopeBase) -> PathBuf {
        base.join(self.subdir)
            .join(format!(".{}.meta.json", self.asset.name))
    }

    /// Metadata recorded at install time, if readable
    pub fn installed_metadata(&self, base: &ScopeBase) -> Result<Option<Metadata>> {
        let path = self.sidecar_path(base);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).at_path(&path)?;
        let metadata = serde_json::from_str(&text).map_err(|e| SkillpackError::CorruptFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(metadata))
    }
}

impl Handler for SingleFileHandler {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn client(&self) -> ClientId {
        self.client
    }

    fn install(&self, bundle: &Bundle, base: &ScopeBase) -> Result<()> {
        let metadata = validate_bundle(bundle, &self.asset)?;
        let content = (self.render)(&metadata, bundle, self.client)?;
        let mut sidecar = serde_json::to_string_pretty(&metadata)?;
        sidecar.push('\n');

        let path = self.file_path(base);
        write_file(&path, &content)?;
        write_file(&self.sidecar_path(base), &sidecar)?;
        info!(
            "Installed {} v{} for {} at {}",
            self.asset,
            metadata.version(),
            self.client,
            path.display()
        );
        Ok(())
    }

    fn remove(&self, base: &ScopeBase) -> Result<()> {
        let removed = remove_file_if_exists(&self.file_path(base))?;
        remove_file_if_exists(&self.sidecar_path(base))?;
        if removed {
            info!("Removed {} for {}", self.asset, self.client);
        } else {
            debug!("{} not installed for {}", self.asset, self.client);
        }
        Ok(())
    }

    fn verify_installed(&self, base: &ScopeBase) -> Result<Verification> {
        let path = self.file_path(base);
        if !path.is_file() {
            return Ok(Verification::missing(format!(
                "{} does not exist",
                path.display()
            )));
        }
        match self.installed_metadata(base) {
            Ok(Some(metadata)) if metadata.name() == self.asset.name => {
                Ok(Verification::ok(format!("version {}", metadata.version())))
            }
            Ok(Some(metadata)) => Ok(Verification::missing(format!(
                "sidecar describes '{}'",
                metadata.name()
            ))),
            Ok(None) => Ok(Verification::missing("metadata sidecar is missing")),
            Err(e) => Ok(Verification::missing(e.to_string())),
        }
    }

    fn install_path(&self, base: &ScopeBase) -> PathBuf {
        self.file_path(base)
    }
}

/// The prompt file converted to the client's placeholder syntax
pub fn render_prompt(metadata: &Metadata, bundle: &Bundle, client: ClientId) -> Result<String> {
    let text = read_prompt(metadata, bundle)?;
    Ok(prompt::from_canonical(&text, client))
}

#[derive(Serialize)]
struct GeminiCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    prompt: String,
}

/// Gemini CLI commands are TOML files with `description` and `prompt`
pub fn render_gemini_command(
    metadata: &Metadata,
    bundle: &Bundle,
    client: ClientId,
) -> Result<String> {
    let text = read_prompt(metadata, bundle)?;
    let (header, body) = frontmatter::split(&text)?;
    let description = header
        .as_ref()
        .and_then(|h| h.get("description"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| metadata.asset.description.clone());
    let command = GeminiCommand {
        description,
        prompt: prompt::from_canonical(body.trim_start_matches('\n'), client),
    };
    Ok(toml::to_string_pretty(&command)?)
}

fn read_prompt(metadata: &Metadata, bundle: &Bundle) -> Result<String> {
    let file = metadata.prompt_file().ok_or_else(|| {
        SkillpackError::validation(format!(
            "{} assets have no prompt file",
            metadata.asset_type()
        ))
    })?;
    bundle.read_to_string(file)
}
