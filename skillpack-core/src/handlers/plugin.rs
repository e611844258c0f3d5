//! Bundled Claude Code plugins
//!
//! The plugin is extracted to `{dir}/plugins/{name}/` and recorded in
//! `{dir}/plugins/installed_plugins.json`. With `auto-enable` it is also
//! switched on in `{dir}/settings.json` under `enabledPlugins`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::directory::{extract_bundle, verify_extracted};
use super::settings::SettingsDocument;
use super::{absolute, remove_dir_if_exists, validate_bundle, Handler, Verification};
use crate::asset::AssetRef;
use crate::bundle::{Bundle, METADATA_FILE};
use crate::client::ClientId;
use crate::error::IoResultExt;
use crate::metadata::Metadata;
use crate::scope::ScopeBase;
use crate::{Result, SkillpackError};

pub const REGISTRY_FILE: &str = "installed_plugins.json";
const REGISTRY_VERSION: u32 = 1;

fn registry_version() -> u32 {
    REGISTRY_VERSION
}

/// `installed_plugins.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRegistry {
    #[serde(default = "registry_version")]
    pub version: u32,

    #[serde(default)]
    pub plugins: BTreeMap<String, PluginRecord>,

    /// Keys written by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            plugins: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub install_path: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).at_path(path)?;
        serde_json::from_str(&content).map_err(|e| SkillpackError::CorruptFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        super::write_file(path, &content)
    }

    /// Add or refresh a record, keeping the first install time
    pub fn record(&mut self, key: &str, install_path: String, version: &str, now: DateTime<Utc>) {
        match self.plugins.get_mut(key) {
            Some(existing) => {
                existing.install_path = install_path;
                existing.version = version.to_string();
                existing.last_updated = now;
            }
            None => {
                self.plugins.insert(
                    key.to_string(),
                    PluginRecord {
                        install_path,
                        version: version.to_string(),
                        installed_at: now,
                        last_updated: now,
                        extra: Map::new(),
                    },
                );
            }
        }
    }

    /// Registry keys whose record points at `install_path`
    pub fn keys_installed_at(&self, install_path: &str) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|(_, record)| record.install_path == install_path)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// `name` or `name@marketplace`
pub fn plugin_key(name: &str, marketplace: Option<&str>) -> String {
    match marketplace {
        Some(marketplace) if !marketplace.is_empty() => format!("{name}@{marketplace}"),
        _ => name.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct PluginHandler {
    asset: AssetRef,
    client: ClientId,
}

impl PluginHandler {
    pub fn new(asset: AssetRef, client: ClientId) -> Self {
        Self { asset, client }
    }

    pub fn plugin_dir(&self, base: &ScopeBase) -> PathBuf {
        base.join("plugins").join(&self.asset.name)
    }

    pub fn registry_path(&self, base: &ScopeBase) -> PathBuf {
        base.join("plugins").join(REGISTRY_FILE)
    }

    fn settings_path(&self, base: &ScopeBase) -> PathBuf {
        base.join("settings.json")
    }

    /// Keys this asset wrote: registry records pointing at our extraction
    /// directory, plus the key derived from the extracted metadata.
    fn owned_keys(&self, base: &ScopeBase, registry: &PluginRegistry) -> Result<BTreeSet<String>> {
        let dir = self.plugin_dir(base);
        let install_path = absolute(&dir)?.to_string_lossy().into_owned();
        let mut keys: BTreeSet<String> = registry.keys_installed_at(&install_path).into_iter().collect();

        let metadata_path = dir.join(METADATA_FILE);
        if metadata_path.is_file() {
            let text = std::fs::read_to_string(&metadata_path).at_path(&metadata_path)?;
            match Metadata::from_toml(&text) {
                Ok(metadata) if metadata.name() == self.asset.name => {
                    let marketplace = metadata.plugin.as_ref().and_then(|p| p.marketplace.as_deref());
                    keys.insert(plugin_key(&self.asset.name, marketplace));
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable {}: {}", metadata_path.display(), e),
            }
        }
        Ok(keys)
    }
}

impl Handler for PluginHandler {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn client(&self) -> ClientId {
        self.client
    }

    fn install(&self, bundle: &Bundle, base: &ScopeBase) -> Result<()> {
        let metadata = validate_bundle(bundle, &self.asset)?;
        let config = metadata.plugin.clone().unwrap_or_default();
        let key = plugin_key(&self.asset.name, config.marketplace.as_deref());

        let registry_path = self.registry_path(base);
        let mut registry = PluginRegistry::load(&registry_path)?;
        let mut settings = if config.auto_enable {
            Some(SettingsDocument::load(self.settings_path(base))?)
        } else {
            None
        };

        let dir = self.plugin_dir(base);
        extract_bundle(bundle, &metadata, &dir)?;

        let install_path = absolute(&dir)?.to_string_lossy().into_owned();
        registry.record(&key, install_path, metadata.version(), Utc::now());
        registry.save(&registry_path)?;

        if let Some(settings) = settings.as_mut() {
            settings.set_plugin_enabled(&key, true)?;
            settings.save()?;
        }
        info!("Installed plugin {} v{}", key, metadata.version());
        Ok(())
    }

    fn remove(&self, base: &ScopeBase) -> Result<()> {
        let registry_path = self.registry_path(base);
        let mut registry = PluginRegistry::load(&registry_path)?;
        let keys = self.owned_keys(base, &registry)?;

        let before = registry.plugins.len();
        registry.plugins.retain(|key, _| !keys.contains(key));
        if registry.plugins.len() != before {
            registry.save(&registry_path)?;
        }

        let settings_path = self.settings_path(base);
        if settings_path.exists() {
            let mut settings = SettingsDocument::load(&settings_path)?;
            let mut changed = false;
            for key in &keys {
                changed |= settings.remove_enabled_plugin(key);
            }
            if changed {
                settings.save()?;
            }
        }

        if remove_dir_if_exists(&self.plugin_dir(base))? {
            info!("Removed plugin {}", self.asset.name);
        } else {
            debug!("Plugin {} not present", self.asset.name);
        }
        Ok(())
    }

    fn verify_installed(&self, base: &ScopeBase) -> Result<Verification> {
        let extracted = verify_extracted(&self.plugin_dir(base), &self.asset)?;
        if !extracted.installed {
            return Ok(extracted);
        }
        let registry = PluginRegistry::load(&self.registry_path(base))?;
        let install_path = absolute(&self.plugin_dir(base))?.to_string_lossy().into_owned();
        if registry.keys_installed_at(&install_path).is_empty() {
            return Ok(Verification::missing(format!(
                "{} is not in {REGISTRY_FILE}",
                self.asset.name
            )));
        }
        Ok(extracted)
    }

    fn install_path(&self, base: &ScopeBase) -> PathBuf {
        self.plugin_dir(base)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;
    use crate::asset::AssetType;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const META: &str = r#"
[asset]
name = "review-kit"
version = "1.1.0"
type = "plugin"

[plugin]
marketplace = "acme"
"#;

    fn handler() -> PluginHandler {
        PluginHandler::new(AssetRef::new("review-kit", AssetType::Plugin), ClientId::ClaudeCode)
    }

    fn bundle(meta: &str) -> Bundle {
        test_support::bundle(
            meta,
            &[
                (".claude-plugin/plugin.json", r#"{"name": "review-kit"}"#),
                ("commands/review.md", "Review"),
            ],
        )
    }

    #[test]
    fn test_install_registers_and_enables() {
        let temp = TempDir::new().unwrap();
        let base = test_support::base(ClientId::ClaudeCode, temp.path());
        let handler = handler();
        handler.install(&bundle(META), &base).unwrap();

        assert!(temp.path().join(".claude/plugins/review-kit/commands/review.md").exists());
        let registry = PluginRegistry::load(&handler.registry_path(&base)).unwrap();
        let record = &registry.plugins["review-kit@acme"];
        assert_eq!(record.version, "1.1.0");
        assert!(Path::new(&record.install_path).is_absolute());

        let settings = SettingsDocument::load(temp.path().join(".claude/settings.json")).unwrap();
        assert_eq!(settings.plugin_enabled("review-kit@acme"), Some(true));
        assert!(handler.verify_installed(&base).unwrap().installed);

        handler.remove(&base).unwrap();
        let registry = PluginRegistry::load(&handler.registry_path(&base)).unwrap();
        assert!(registry.plugins.is_empty());
        let settings = SettingsDocument::load(temp.path().join(".claude/settings.json")).unwrap();
        assert!(settings.is_empty());
        assert!(!handler.plugin_dir(&base).exists());
    }

    #[test]
    fn test_remove_leaves_other_marketplace_alone() {
        let temp = TempDir::new().unwrap();
        let base = test_support::base(ClientId::ClaudeCode, temp.path());
        let handler = handler();
        let settings_path = temp.path().join(".claude/settings.json");
        std::fs::create_dir_all(settings_path.parent().unwrap()).unwrap();
        std::fs::write(&settings_path, r#"{"enabledPlugins": {"review-kit@official": true}}"#).unwrap();
        let mut registry = PluginRegistry::default();
        registry.record(
            "review-kit@official",
            "/elsewhere/review-kit".to_string(),
            "3.0.0",
            Utc::now(),
        );
        registry.save(&handler.registry_path(&base)).unwrap();

        handler.install(&bundle(META), &base).unwrap();
        handler.remove(&base).unwrap();

        let registry = PluginRegistry::load(&handler.registry_path(&base)).unwrap();
        assert_eq!(registry.plugins.keys().collect::<Vec<_>>(), vec!["review-kit@official"]);
        assert_eq!(registry.plugins["review-kit@official"].install_path, "/elsewhere/review-kit");
        let settings = SettingsDocument::load(&settings_path).unwrap();
        assert_eq!(settings.plugin_enabled("review-kit@official"), Some(true));
        assert_eq!(settings.plugin_enabled("review-kit@acme"), None);
        assert!(!handler.plugin_dir(&base).exists());
    }

    #[test]
    fn test_remove_without_registry_uses_extracted_metadata() {
        let temp = TempDir::new().unwrap();
        let base = test_support::base(ClientId::ClaudeCode, temp.path());
        let handler = handler();
        handler.install(&bundle(META), &base).unwrap();
        std::fs::remove_file(handler.registry_path(&base)).unwrap();

        handler.remove(&base).unwrap();
        let settings = SettingsDocument::load(temp.path().join(".claude/settings.json")).unwrap();
        assert_eq!(settings.plugin_enabled("review-kit@acme"), None);
    }

    #[test]
    fn test_update_keeps_installed_at() {
        let first = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut registry = PluginRegistry::default();
        registry.record("kit", "/p".to_string(), "1.0.0", first);
        registry.record("kit", "/p".to_string(), "1.1.0", later);

        let record = &registry.plugins["kit"];
        assert_eq!(record.installed_at, first);
        assert_eq!(record.last_updated, later);
        assert_eq!(record.version, "1.1.0");
    }

    #[test]
    fn test_auto_enable_off() {
        let temp = TempDir::new().unwrap();
        let base = test_support::base(ClientId::ClaudeCode, temp.path());
        let meta = format!("{META}auto-enable = false\n");
        handler().install(&bundle(&meta), &base).unwrap();
        assert!(!temp.path().join(".claude/settings.json").exists());
    }

    #[test]
    fn test_registry_keeps_foreign_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(REGISTRY_FILE);
        std::fs::write(
            &path,
            r#"{"version": 1, "plugins": {}, "repositories": {"acme": "https://x"}}"#,
        )
        .unwrap();
        let registry = PluginRegistry::load(&path).unwrap();
        registry.save(&path).unwrap();
        let again = PluginRegistry::load(&path).unwrap();
        assert_eq!(again.extra["repositories"]["acme"], "https://x");
    }

    #[test]
    fn test_key_matching() {
        assert_eq!(plugin_key("kit", Some("acme")), "kit@acme");
        assert_eq!(plugin_key("kit", None), "kit");

        let mut registry = PluginRegistry::default();
        let now = Utc::now();
        registry.record("kit@acme", "/ours/kit".to_string(), "1.0.0", now);
        registry.record("kit@official", "/elsewhere/kit".to_string(), "2.0.0", now);
        assert_eq!(registry.keys_installed_at("/ours/kit"), vec!["kit@acme".to_string()]);
    }
}
