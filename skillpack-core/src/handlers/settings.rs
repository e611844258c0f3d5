//! Read-modify-write access to a client's JSON configuration file
//!
//! These files are edited by hand. Every key this module does not manage is
//! written back untouched and in its original order. Entries written by
//! skillpack carry [`MARKER_KEY`] with the asset name as value, which is how
//! they are found again on re-install and removal.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::IoResultExt;
use crate::{Result, SkillpackError};

/// Private field tagging entries managed by skillpack
pub const MARKER_KEY: &str = "_skillpack";

/// A parsed JSON object file
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsDocument {
    path: PathBuf,
    root: Map<String, Value>,
}

impl SettingsDocument {
    /// Load the file. A missing or blank file is an empty object.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let root = if path.exists() {
            let content = std::fs::read_to_string(&path).at_path(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&content) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => {
                        return Err(SkillpackError::CorruptFile {
                            path,
                            reason: "expected a JSON object at the top level".to_string(),
                        })
                    }
                    Err(e) => {
                        return Err(SkillpackError::CorruptFile {
                            path,
                            reason: e.to_string(),
                        })
                    }
                }
            }
        } else {
            Map::new()
        };
        Ok(Self { path, root })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Write the document back. An empty document is written as `{}`.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).at_path(parent)?;
        }
        let mut content = serde_json::to_string_pretty(&self.root)?;
        content.push('\n');
        std::fs::write(&self.path, content).at_path(&self.path)?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }

    /// Top-level scalar or nested value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.root.insert(key.to_string(), value);
    }

    /// Object-valued top-level section, created when absent
    pub fn section_mut(&mut self, key: &str) -> Result<&mut Map<String, Value>> {
        let path = self.path.clone();
        let value = self
            .root
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        value.as_object_mut().ok_or_else(|| SkillpackError::CorruptFile {
            path,
            reason: format!("'{key}' must be a JSON object"),
        })
    }

    /// Object-valued top-level section, if present
    pub fn section(&self, key: &str) -> Option<&Map<String, Value>> {
        self.root.get(key).and_then(Value::as_object)
    }

    /// Drop a section that ended up with no entries
    pub fn prune_section(&mut self, key: &str) {
        let empty = self.section(key).is_some_and(Map::is_empty);
        if empty {
            self.root.shift_remove(key);
        }
    }

    /// Event-keyed hook section
    pub fn hooks_mut(&mut self, format: HookFormat) -> Result<HookSection<'_>> {
        let path = self.path.clone();
        let events = self.section_mut("hooks")?;
        Ok(HookSection {
            path,
            events,
            format,
        })
    }

    /// Name-keyed server section such as `mcpServers`
    pub fn servers_mut(&mut self, key: &str) -> Result<ServerSection<'_>> {
        let servers = self.section_mut(key)?;
        Ok(ServerSection { servers })
    }

    /// `enabledPlugins[key] = enabled`
    pub fn set_plugin_enabled(&mut self, key: &str, enabled: bool) -> Result<()> {
        self.section_mut("enabledPlugins")?
            .insert(key.to_string(), Value::Bool(enabled));
        Ok(())
    }

    pub fn remove_enabled_plugin(&mut self, key: &str) -> bool {
        let removed = self
            .root
            .get_mut("enabledPlugins")
            .and_then(Value::as_object_mut)
            .is_some_and(|plugins| plugins.shift_remove(key).is_some());
        self.prune_section("enabledPlugins");
        removed
    }

    pub fn plugin_enabled(&self, key: &str) -> Option<bool> {
        self.section("enabledPlugins")
            .and_then(|plugins| plugins.get(key))
            .and_then(Value::as_bool)
    }
}

/// Shape of the per-event hook lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFormat {
    /// `{"Event": [{"matcher": "...", "hooks": [{"type": "command", ...}]}]}`
    MatcherGroups,
    /// `{"event": [{"command": "..."}]}`
    FlatList,
}

/// Mutable view of the `hooks` object
#[derive(Debug)]
pub struct HookSection<'a> {
    path: PathBuf,
    events: &'a mut Map<String, Value>,
    format: HookFormat,
}

impl HookSection<'_> {
    /// Insert or replace the managed entry for `name` under `event`.
    ///
    /// The entry keeps its position when it already sits under `event`;
    /// managed entries for `name` under any other event are removed.
    pub fn upsert(&mut self, event: &str, name: &str, mut entry: Map<String, Value>) -> Result<()> {
        entry.insert(MARKER_KEY.to_string(), Value::String(name.to_string()));

        let others: Vec<String> = self
            .events
            .keys()
            .filter(|key| key.as_str() != event)
            .cloned()
            .collect();
        for other in others {
            self.remove_from_event(&other, |value| is_managed_by(value, name));
        }

        let path = self.path.clone();
        let list = self
            .events
            .entry(event.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| SkillpackError::CorruptFile {
                path,
                reason: format!("hooks.{event} must be a JSON array"),
            })?;

        let mut existing = list
            .iter()
            .enumerate()
            .filter(|(_, value)| is_managed_by(value, name))
            .map(|(index, _)| index);
        match existing.next() {
            Some(first) => {
                let duplicates: Vec<usize> = existing.collect();
                for index in duplicates.into_iter().rev() {
                    list.remove(index);
                }
                list[first] = Value::Object(entry);
            }
            None => list.push(Value::Object(entry)),
        }
        Ok(())
    }

    /// Remove every entry managed for `name`.
    ///
    /// Entries without a marker whose command starts with `legacy_prefix`
    /// were written before the marker existed and are removed as well.
    /// Events left empty are dropped. Returns the number of entries removed.
    pub fn remove_managed(&mut self, name: &str, legacy_prefix: Option<&str>) -> usize {
        let format = self.format;
        let events: Vec<String> = self.events.keys().cloned().collect();
        let mut removed = 0;
        for event in events {
            removed += self.remove_from_event(&event, |value| {
                if is_managed_by(value, name) {
                    return true;
                }
                match legacy_prefix {
                    Some(prefix) if !has_marker(value) => {
                        let legacy = entry_commands(value, format)
                            .iter()
                            .any(|command| command.starts_with(prefix));
                        if legacy {
                            warn!("Removing pre-marker hook entry under '{}' for {}", event, name);
                        }
                        legacy
                    }
                    _ => false,
                }
            });
        }
        removed
    }

    /// Event and entry currently managed for `name`
    pub fn find_managed(&self, name: &str) -> Option<(&str, &Map<String, Value>)> {
        self.events.iter().find_map(|(event, list)| {
            list.as_array()?
                .iter()
                .filter_map(Value::as_object)
                .find(|entry| entry.get(MARKER_KEY).and_then(Value::as_str) == Some(name))
                .map(|entry| (event.as_str(), entry))
        })
    }

    fn remove_from_event<F>(&mut self, event: &str, mut predicate: F) -> usize
    where
        F: FnMut(&Value) -> bool,
    {
        let Some(list) = self.events.get_mut(event).and_then(Value::as_array_mut) else {
            return 0;
        };
        let before = list.len();
        list.retain(|value| !predicate(value));
        let removed = before - list.len();
        if removed > 0 && list.is_empty() {
            self.events.shift_remove(event);
        }
        removed
    }
}

/// Mutable view of a name-keyed server map
#[derive(Debug)]
pub struct ServerSection<'a> {
    servers: &'a mut Map<String, Value>,
}

impl ServerSection<'_> {
    /// Set the server entry for `name`, tagging it as managed.
    ///
    /// Returns true when a user-authored entry of the same name was replaced.
    pub fn upsert(&mut self, name: &str, mut entry: Map<String, Value>) -> bool {
        entry.insert(MARKER_KEY.to_string(), Value::String(name.to_string()));
        let replaced_user_entry = self
            .servers
            .get(name)
            .is_some_and(|existing| !is_managed_by(existing, name));
        if replaced_user_entry {
            warn!("Overwriting user-defined server entry '{}'", name);
        }
        self.servers.insert(name.to_string(), Value::Object(entry));
        replaced_user_entry
    }

    /// Remove the entry for `name` only when skillpack wrote it
    pub fn remove_managed(&mut self, name: &str) -> bool {
        let managed = self
            .servers
            .get(name)
            .is_some_and(|existing| is_managed_by(existing, name));
        if managed {
            self.servers.shift_remove(name);
        }
        managed
    }

    pub fn get_managed(&self, name: &str) -> Option<&Map<String, Value>> {
        self.servers
            .get(name)
            .filter(|value| is_managed_by(value, name))
            .and_then(Value::as_object)
    }
}

fn has_marker(value: &Value) -> bool {
    value.get(MARKER_KEY).is_some()
}

fn is_managed_by(value: &Value, name: &str) -> bool {
    value.get(MARKER_KEY).and_then(Value::as_str) == Some(name)
}

/// Command strings an entry would run
fn entry_commands(value: &Value, format: HookFormat) -> Vec<&str> {
    match format {
        HookFormat::FlatList => value
            .get("command")
            .and_then(Value::as_str)
            .into_iter()
            .collect(),
        HookFormat::MatcherGroups => value
            .get("hooks")
            .and_then(Value::as_array)
            .map(|hooks| {
                hooks
                    .iter()
                    .filter_map(|hook| hook.get("command").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn group(command: &str) -> Map<String, Value> {
        object(json!({
            "matcher": "Edit",
            "hooks": [{"type": "command", "command": command}]
        }))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let doc = SettingsDocument::load(dir.path().join("settings.json")).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SettingsDocument::load(&path),
            Err(SkillpackError::CorruptFile { .. })
        ));

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(SettingsDocument::load(&path).is_err());
    }

    #[test]
    fn test_preserves_unknown_keys_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"zeta": 1, "model": "opus", "alpha": {"x": true}}"#).unwrap();

        let mut doc = SettingsDocument::load(&path).unwrap();
        doc.hooks_mut(HookFormat::MatcherGroups)
            .unwrap()
            .upsert("PostToolUse", "fmt", group("/x/fmt.sh"))
            .unwrap();
        doc.save().unwrap();

        let reloaded = SettingsDocument::load(&path).unwrap();
        let keys: Vec<&String> = reloaded.root().keys().collect();
        assert_eq!(keys, ["zeta", "model", "alpha", "hooks"]);
        assert_eq!(reloaded.get("alpha"), Some(&json!({"x": true})));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let mut doc = SettingsDocument::load(dir.path().join("s.json")).unwrap();
        let mut hooks = doc.hooks_mut(HookFormat::MatcherGroups).unwrap();
        hooks.upsert("PostToolUse", "fmt", group("/old")).unwrap();
        hooks.upsert("PostToolUse", "lint", group("/lint")).unwrap();
        hooks.upsert("PostToolUse", "fmt", group("/new")).unwrap();

        let list = doc.root()["hooks"]["PostToolUse"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["hooks"][0]["command"], "/new");
        assert_eq!(list[0][MARKER_KEY], "fmt");
    }

    #[test]
    fn test_upsert_moves_between_events() {
        let dir = TempDir::new().unwrap();
        let mut doc = SettingsDocument::load(dir.path().join("s.json")).unwrap();
        let mut hooks = doc.hooks_mut(HookFormat::MatcherGroups).unwrap();
        hooks.upsert("PreToolUse", "fmt", group("/x")).unwrap();
        hooks.upsert("PostToolUse", "fmt", group("/x")).unwrap();

        assert!(doc.root()["hooks"].get("PreToolUse").is_none());
        assert_eq!(doc.root()["hooks"]["PostToolUse"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_keeps_user_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(
            &path,
            r#"{"hooks": {"PostToolUse": [{"matcher": "*", "hooks": [{"type": "command", "command": "mine.sh"}]}]}}"#,
        )
        .unwrap();

        let mut doc = SettingsDocument::load(&path).unwrap();
        let mut hooks = doc.hooks_mut(HookFormat::MatcherGroups).unwrap();
        hooks.upsert("PostToolUse", "fmt", group("/x")).unwrap();
        assert_eq!(hooks.remove_managed("fmt", None), 1);

        let list = doc.root()["hooks"]["PostToolUse"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["hooks"][0]["command"], "mine.sh");
    }

    #[test]
    fn test_remove_legacy_entries_by_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hooks.json");
        std::fs::write(
            &path,
            r#"{"version": 1, "hooks": {"stop": [{"command": "/home/u/.cursor/hooks/fmt/hook.sh"}, {"command": "/usr/bin/other"}]}}"#,
        )
        .unwrap();

        let mut doc = SettingsDocument::load(&path).unwrap();
        let removed = doc
            .hooks_mut(HookFormat::FlatList)
            .unwrap()
            .remove_managed("fmt", Some("/home/u/.cursor/hooks/fmt/"));
        assert_eq!(removed, 1);
        assert_eq!(doc.root()["hooks"]["stop"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_document_saves_as_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.json");
        let mut doc = SettingsDocument::load(&path).unwrap();
        doc.hooks_mut(HookFormat::FlatList)
            .unwrap()
            .upsert("stop", "fmt", object(json!({"command": "/x"})))
            .unwrap();
        doc.hooks_mut(HookFormat::FlatList)
            .unwrap()
            .remove_managed("fmt", None);
        doc.prune_section("hooks");
        doc.save().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn test_server_section_respects_ownership() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcp.json");
        std::fs::write(&path, r#"{"mcpServers": {"github": {"command": "gh"}}}"#).unwrap();

        let mut doc = SettingsDocument::load(&path).unwrap();
        let mut servers = doc.servers_mut("mcpServers").unwrap();
        assert!(!servers.remove_managed("github"));
        assert!(servers.upsert("github", object(json!({"command": "npx"}))));
        assert!(servers.get_managed("github").is_some());
        assert!(servers.remove_managed("github"));
    }

    #[test]
    fn test_enabled_plugins() {
        let dir = TempDir::new().unwrap();
        let mut doc = SettingsDocument::load(dir.path().join("s.json")).unwrap();
        doc.set_plugin_enabled("tools@acme", true).unwrap();
        assert_eq!(doc.plugin_enabled("tools@acme"), Some(true));
        assert!(doc.remove_enabled_plugin("tools@acme"));
        assert!(doc.is_empty());
    }
}
