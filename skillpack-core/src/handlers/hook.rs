//! Hook assets
//!
//! The bundle is always extracted to `{dir}/hooks/{name}/`. The client's
//! settings file then gets one marker-tagged entry under the native event
//! name, pointing at the extracted script or at the declared command.

use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::{debug, info};

use super::directory::{extract_bundle, verify_extracted};
use super::settings::{HookFormat, SettingsDocument};
use super::{absolute, remove_dir_if_exists, validate_bundle, Handler, Verification};
use crate::asset::AssetRef;
use crate::bundle::Bundle;
use crate::client::ClientId;
use crate::metadata::{HookConfig, HookEvent};
use crate::scope::ScopeBase;
use crate::{Result, SkillpackError};

/// Native event name of a canonical event, if the client has one
pub fn native_event(client: ClientId, event: HookEvent) -> Option<&'static str> {
    use HookEvent::*;
    match client {
        ClientId::ClaudeCode => Some(match event {
            SessionStart => "SessionStart",
            SessionEnd => "SessionEnd",
            PreToolUse => "PreToolUse",
            PostToolUse => "PostToolUse",
            PostToolUseFailure => "PostToolUseFailure",
            UserPromptSubmit => "UserPromptSubmit",
            Stop => "Stop",
            SubagentStart => "SubagentStart",
            SubagentStop => "SubagentStop",
            PreCompact => "PreCompact",
        }),
        ClientId::Cursor => Some(match event {
            SessionStart => "sessionStart",
            SessionEnd => "sessionEnd",
            PreToolUse => "preToolUse",
            PostToolUse => "postToolUse",
            PostToolUseFailure => "postToolUseFailure",
            UserPromptSubmit => "beforeSubmitPrompt",
            Stop => "stop",
            SubagentStart => "subagentStart",
            SubagentStop => "subagentStop",
            PreCompact => "preCompact",
        }),
        ClientId::Gemini => match event {
            SessionStart => Some("SessionStart"),
            SessionEnd => Some("SessionEnd"),
            PreToolUse => Some("BeforeTool"),
            PostToolUse => Some("AfterTool"),
            UserPromptSubmit => Some("BeforeAgent"),
            Stop => Some("AfterAgent"),
            PreCompact => Some("PreCompress"),
            PostToolUseFailure | SubagentStart | SubagentStop => None,
        },
        ClientId::Copilot => None,
    }
}

/// Settings file and list shape a client keeps hooks in
pub fn hook_file(client: ClientId) -> Option<(&'static str, HookFormat)> {
    match client {
        ClientId::ClaudeCode | ClientId::Gemini => Some(("settings.json", HookFormat::MatcherGroups)),
        ClientId::Cursor => Some(("hooks.json", HookFormat::FlatList)),
        ClientId::Copilot => None,
    }
}

/// Hook settings as seen by one client, after overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHook {
    pub event: String,
    pub matcher: Option<String>,
    pub timeout: Option<u64>,
}

/// Apply the client override and map the event to its native name
pub fn resolve(hook: &HookConfig, client: ClientId) -> Result<ResolvedHook> {
    let overrides = hook.clients.get(client.as_str());
    let event = match overrides.and_then(|o| o.event.clone()) {
        Some(event) => event,
        None => HookEvent::parse(&hook.event)
            .and_then(|event| native_event(client, event))
            .map(str::to_string)
            .ok_or_else(|| SkillpackError::UnsupportedEvent {
                client,
                event: hook.event.clone(),
            })?,
    };
    Ok(ResolvedHook {
        event,
        matcher: overrides
            .and_then(|o| o.matcher.clone())
            .or_else(|| hook.matcher.clone()),
        timeout: overrides.and_then(|o| o.timeout).or(hook.timeout),
    })
}

#[derive(Debug, Clone)]
pub struct HookHandler {
    asset: AssetRef,
    client: ClientId,
}

impl HookHandler {
    pub fn new(asset: AssetRef, client: ClientId) -> Self {
        Self { asset, client }
    }

    /// Where the bundle is extracted
    pub fn extract_dir(&self, base: &ScopeBase) -> PathBuf {
        base.join("hooks").join(&self.asset.name)
    }

    fn settings(&self, base: &ScopeBase) -> Result<(PathBuf, HookFormat)> {
        let (file, format) = hook_file(self.client).ok_or_else(|| SkillpackError::Unsupported {
            client: self.client,
            asset_type: self.asset.asset_type.clone(),
        })?;
        Ok((base.join(file), format))
    }

    /// Command line the client runs
    fn command_line(&self, hook: &HookConfig, bundle: &Bundle, dir: &std::path::Path) -> Result<String> {
        if let Some(script) = &hook.script_file {
            let path = absolute(&dir.join(script))?;
            return Ok(shell_words::quote(&path.to_string_lossy()).into_owned());
        }
        let command = hook.command.as_deref().unwrap_or_default();
        let mut words = vec![command.to_string()];
        for arg in &hook.args {
            if bundle.contains(arg) {
                words.push(absolute(&dir.join(arg))?.to_string_lossy().into_owned());
            } else {
                words.push(arg.clone());
            }
        }
        Ok(shell_words::join(words))
    }

    fn entry(&self, format: HookFormat, resolved: &ResolvedHook, command: String) -> Map<String, Value> {
        // Gemini CLI takes milliseconds, the others seconds
        let timeout = resolved.timeout.map(|secs| match self.client {
            ClientId::Gemini => secs * 1000,
            _ => secs,
        });
        let mut entry = Map::new();
        match format {
            HookFormat::MatcherGroups => {
                if let Some(matcher) = &resolved.matcher {
                    entry.insert("matcher".into(), json!(matcher));
                }
                let mut hook = Map::new();
                hook.insert("type".into(), json!("command"));
                hook.insert("command".into(), json!(command));
                if let Some(timeout) = timeout {
                    hook.insert("timeout".into(), json!(timeout));
                }
                entry.insert("hooks".into(), Value::Array(vec![Value::Object(hook)]));
            }
            HookFormat::FlatList => {
                entry.insert("command".into(), json!(command));
                if let Some(matcher) = &resolved.matcher {
                    entry.insert("matcher".into(), json!(matcher));
                }
                if let Some(timeout) = timeout {
                    entry.insert("timeout".into(), json!(timeout));
                }
            }
        }
        entry
    }

    /// Prefix of commands written before entries carried the marker
    fn legacy_prefix(&self, base: &ScopeBase) -> String {
        let dir = absolute(&self.extract_dir(base)).unwrap_or_else(|_| self.extract_dir(base));
        format!("{}/", dir.to_string_lossy())
    }
}

impl Handler for HookHandler {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn client(&self) -> ClientId {
        self.client
    }

    fn install(&self, bundle: &Bundle, base: &ScopeBase) -> Result<()> {
        let metadata = validate_bundle(bundle, &self.asset)?;
        let hook = metadata
            .hook
            .as_ref()
            .ok_or_else(|| SkillpackError::validation(format!("{}: missing [hook]", self.asset)))?;
        let resolved = resolve(hook, self.client)?;
        let (settings_path, format) = self.settings(base)?;
        let mut doc = SettingsDocument::load(&settings_path)?;

        let dir = self.extract_dir(base);
        extract_bundle(bundle, &metadata, &dir)?;
        let command = self.command_line(hook, bundle, &dir)?;

        if format == HookFormat::FlatList && doc.get("version").is_none() {
            doc.set("version", json!(1));
        }
        let entry = self.entry(format, &resolved, command);
        doc.hooks_mut(format)?
            .upsert(&resolved.event, &self.asset.name, entry)?;
        doc.save()?;

        info!(
            "Installed hook {} for {} on {}",
            self.asset.name, self.client, resolved.event
        );
        Ok(())
    }

    fn remove(&self, base: &ScopeBase) -> Result<()> {
        let (settings_path, format) = self.settings(base)?;
        if settings_path.exists() {
            let mut doc = SettingsDocument::load(&settings_path)?;
            let prefix = self.legacy_prefix(base);
            let removed = doc
                .hooks_mut(format)?
                .remove_managed(&self.asset.name, Some(&prefix));
            doc.prune_section("hooks");
            if removed > 0 {
                doc.save()?;
                info!("Removed {} hook entries for {}", removed, self.asset.name);
            } else {
                debug!("No hook entries for {} in {}", self.asset.name, settings_path.display());
            }
        }
        remove_dir_if_exists(&self.extract_dir(base))?;
        Ok(())
    }

    fn verify_installed(&self, base: &ScopeBase) -> Result<Verification> {
        let (settings_path, format) = self.settings(base)?;
        let mut doc = SettingsDocument::load(&settings_path)?;
        if doc.section("hooks").is_none() {
            return Ok(Verification::missing(format!(
                "no hooks in {}",
                settings_path.display()
            )));
        }
        let event = match doc.hooks_mut(format)?.find_managed(&self.asset.name) {
            Some((event, _)) => event.to_string(),
            None => {
                return Ok(Verification::missing(format!(
                    "no entry for {} in {}",
                    self.asset.name,
                    settings_path.display()
                )))
            }
        };
        let extracted = verify_extracted(&self.extract_dir(base), &self.asset)?;
        if !extracted.installed {
            return Ok(extracted);
        }
        Ok(Verification::ok(format!("{} on {event}", extracted.reason)))
    }

    fn install_path(&self, base: &ScopeBase) -> PathBuf {
        match hook_file(self.client) {
            Some((file, _)) => base.join(file),
            None => self.extract_dir(base),
        }
    }
}
