//! Installed-asset ledger (`installed.json`)
//!
//! Tracks which assets are installed, at which version, for which clients and
//! in which scope. The ledger is the only record of what this tool manages:
//! updates and removals consult it so they never touch user-authored state.
//!
//! Saving is a full rewrite of the file. There is no locking; two concurrent
//! runs race and the last writer wins.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::asset::AssetType;
use crate::client::ClientId;
use crate::error::IoResultExt;
use crate::scope::Scope;
use crate::{Result, SkillpackError};

/// Current ledger format version
pub const TRACKER_VERSION: &str = "3";

/// Unique key of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    pub name: String,
    /// Repository URL; empty for global installs
    pub repository: String,
    /// Path inside the repository; empty for the whole repository
    pub path: String,
}

impl AssetKey {
    pub fn new(name: impl Into<String>, scope: &Scope) -> Self {
        let (repository, path) = scope.to_parts();
        Self {
            name: name.into(),
            repository,
            path,
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(name, &Scope::Global)
    }

    pub fn scope(&self) -> Scope {
        Scope::from_parts(&self.repository, &self.path)
    }
}

/// One installed asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Clients the asset is installed for
    #[serde(default)]
    pub clients: BTreeSet<ClientId>,
    /// Free-form per-entry settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

impl TrackerEntry {
    pub fn new(
        key: &AssetKey,
        version: impl Into<String>,
        asset_type: AssetType,
        clients: impl IntoIterator<Item = ClientId>,
    ) -> Self {
        Self {
            name: key.name.clone(),
            version: version.into(),
            asset_type,
            repository: key.repository.clone(),
            path: key.path.clone(),
            clients: clients.into_iter().collect(),
            config: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> AssetKey {
        AssetKey {
            name: self.name.clone(),
            repository: self.repository.clone(),
            path: self.path.clone(),
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::from_parts(&self.repository, &self.path)
    }

    pub fn is_global(&self) -> bool {
        self.repository.is_empty()
    }

    fn has_key(&self, key: &AssetKey) -> bool {
        self.name == key.name && self.repository == key.repository && self.path == key.path
    }

    fn in_scope(&self, repository: &str, path: &str) -> bool {
        self.repository == repository && self.path == path
    }
}

/// The persisted ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Format version, restamped on every save
    pub version: String,
    /// Installed assets. Older files call this list `artifacts`.
    #[serde(default, alias = "artifacts")]
    pub assets: Vec<TrackerEntry>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            version: TRACKER_VERSION.to_string(),
            assets: Vec::new(),
        }
    }
}

impl Ledger {
    pub fn find(&self, key: &AssetKey) -> Option<&TrackerEntry> {
        self.assets.iter().find(|e| e.has_key(key))
    }

    /// Entries recorded for exactly this scope
    pub fn find_by_scope(&self, scope: &Scope) -> Vec<&TrackerEntry> {
        let (repository, path) = scope.to_parts();
        self.assets
            .iter()
            .filter(|e| e.in_scope(&repository, &path))
            .collect()
    }

    pub fn find_global(&self) -> Vec<&TrackerEntry> {
        self.assets.iter().filter(|e| e.is_global()).collect()
    }

    /// Entries that apply when working at `path` inside `repo_url`.
    ///
    /// Returns every global entry plus repository entries whose URL matches
    /// under `repo_matcher` and whose recorded path is empty or an ancestor
    /// of `path`.
    pub fn find_for_scope<F>(&self, repo_url: &str, path: &str, repo_matcher: F) -> Vec<&TrackerEntry>
    where
        F: Fn(&str, &str) -> bool,
    {
        self.assets
            .iter()
            .filter(|e| {
                e.is_global()
                    || (repo_matcher(&e.repository, repo_url) && path_contains(&e.path, path))
            })
            .collect()
    }

    /// Replace the entry with the same key, or append
    pub fn upsert(&mut self, entry: TrackerEntry) {
        let key = entry.key();
        match self.assets.iter_mut().find(|e| e.has_key(&key)) {
            Some(existing) => *existing = entry,
            None => self.assets.push(entry),
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove_by_key(&mut self, key: &AssetKey) -> bool {
        let before = self.assets.len();
        self.assets.retain(|e| !e.has_key(key));
        before != self.assets.len()
    }

    /// Remove every entry of a scope. Returns how many were removed.
    pub fn remove_by_scope(&mut self, scope: &Scope) -> usize {
        let (repository, path) = scope.to_parts();
        let before = self.assets.len();
        self.assets.retain(|e| !e.in_scope(&repository, &path));
        before - self.assets.len()
    }

    /// Whether installing `version` for `clients` at `key` would change anything.
    ///
    /// True if the key is absent, the recorded version differs, or any
    /// requested client is not recorded yet.
    pub fn needs_install(&self, key: &AssetKey, version: &str, clients: &[ClientId]) -> bool {
        match self.find(key) {
            None => true,
            Some(entry) if entry.version != version => true,
            Some(entry) => clients.iter().any(|c| !entry.clients.contains(c)),
        }
    }
}

/// Whether an entry recorded at `recorded` applies to `queried`.
///
/// Empty means the whole repository. Matching is per path component, so
/// `services/api` contains `services/api/v2` but not `services/api2`.
pub fn path_contains(recorded: &str, queried: &str) -> bool {
    let recorded = recorded.trim_matches('/');
    if recorded.is_empty() {
        return true;
    }
    Path::new(queried.trim_matches('/')).starts_with(Path::new(recorded))
}

/// Loads and saves the ledger file
#[derive(Debug, Clone)]
pub struct Tracker {
    path: PathBuf,
}

impl Tracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger. A missing file is an empty ledger; a corrupt one is an error.
    pub fn load(&self) -> Result<Ledger> {
        if !self.path.exists() {
            debug!("No ledger at {}, starting empty", self.path.display());
            return Ok(Ledger::default());
        }

        let content = std::fs::read_to_string(&self.path).at_path(&self.path)?;
        let ledger: Ledger =
            serde_json::from_str(&content).map_err(|e| SkillpackError::CorruptFile {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        debug!(
            "Loaded ledger v{} with {} entries",
            ledger.version,
            ledger.assets.len()
        );
        Ok(ledger)
    }

    /// Stamp the current version and rewrite the file
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).at_path(parent)?;
        }

        let mut ledger = ledger.clone();
        ledger.version = TRACKER_VERSION.to_string();

        let content = serde_json::to_string_pretty(&ledger)?;
        std::fs::write(&self.path, content + "\n").at_path(&self.path)?;
        info!(
            "Saved ledger with {} entries to {}",
            ledger.assets.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const REPO: &str = "https://github.com/acme/platform";

    fn entry(name: &str, scope: &Scope, version: &str, clients: &[ClientId]) -> TrackerEntry {
        TrackerEntry::new(
            &AssetKey::new(name, scope),
            version,
            AssetType::Skill,
            clients.iter().copied(),
        )
    }

    fn exact(a: &str, b: &str) -> bool {
        a == b
    }

    #[test]
    fn test_default_ledger() {
        let ledger = Ledger::default();
        assert_eq!(ledger.version, TRACKER_VERSION);
        assert!(ledger.assets.is_empty());
    }

    #[test]
    fn test_upsert_then_find() {
        let mut ledger = Ledger::default();
        let scope = Scope::repository(REPO);
        ledger.upsert(entry("review", &scope, "1.0.0", &[ClientId::ClaudeCode]));

        let key = AssetKey::new("review", &scope);
        assert_eq!(ledger.find(&key).unwrap().version, "1.0.0");
        assert!(ledger.find(&AssetKey::global("review")).is_none());
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut ledger = Ledger::default();
        ledger.upsert(entry("review", &Scope::Global, "1.0.0", &[ClientId::Cursor]));
        ledger.upsert(entry("review", &Scope::Global, "2.0.0", &[ClientId::Cursor]));

        assert_eq!(ledger.assets.len(), 1);
        assert_eq!(
            ledger.find(&AssetKey::global("review")).unwrap().version,
            "2.0.0"
        );
    }

    #[test]
    fn test_same_name_different_scopes_coexist() {
        let mut ledger = Ledger::default();
        ledger.upsert(entry("review", &Scope::Global, "1.0.0", &[]));
        ledger.upsert(entry("review", &Scope::repository(REPO), "1.0.0", &[]));
        ledger.upsert(entry("review", &Scope::path(REPO, "services/api"), "1.0.0", &[]));
        assert_eq!(ledger.assets.len(), 3);
        assert_eq!(ledger.find_global().len(), 1);
        assert_eq!(ledger.find_by_scope(&Scope::repository(REPO)).len(), 1);
    }

    #[test]
    fn test_needs_install_lifecycle() {
        let mut ledger = Ledger::default();
        let key = AssetKey::global("review");
        let clients = [ClientId::ClaudeCode, ClientId::Cursor];

        assert!(ledger.needs_install(&key, "1.0.0", &clients));

        ledger.upsert(entry("review", &Scope::Global, "1.0.0", &clients));
        assert!(!ledger.needs_install(&key, "1.0.0", &clients));
        assert!(!ledger.needs_install(&key, "1.0.0", &[ClientId::Cursor]));

        assert!(ledger.needs_install(&key, "1.0.0", &[ClientId::Gemini]));
        assert!(ledger.needs_install(&key, "1.1.0", &clients));
    }

    #[test]
    fn test_remove_by_key_and_scope() {
        let mut ledger = Ledger::default();
        let repo = Scope::repository(REPO);
        ledger.upsert(entry("a", &repo, "1.0.0", &[]));
        ledger.upsert(entry("b", &repo, "1.0.0", &[]));
        ledger.upsert(entry("c", &Scope::Global, "1.0.0", &[]));

        assert!(ledger.remove_by_key(&AssetKey::new("a", &repo)));
        assert!(!ledger.remove_by_key(&AssetKey::new("a", &repo)));
        assert_eq!(ledger.remove_by_scope(&repo), 1);
        assert_eq!(ledger.remove_by_scope(&repo), 0);
        assert_eq!(ledger.assets.len(), 1);
    }

    #[test]
    fn test_path_containment() {
        assert!(path_contains("services/api", "services/api"));
        assert!(path_contains("services/api", "services/api/v2"));
        assert!(!path_contains("services/api", "services/api2"));
        assert!(!path_contains("services/api", "services"));
        assert!(path_contains("", "anything/at/all"));
        assert!(path_contains("/services/api/", "services/api/v2/"));
    }

    #[test]
    fn test_find_for_scope() {
        let mut ledger = Ledger::default();
        ledger.upsert(entry("global", &Scope::Global, "1.0.0", &[]));
        ledger.upsert(entry("repo", &Scope::repository(REPO), "1.0.0", &[]));
        ledger.upsert(entry("api", &Scope::path(REPO, "services/api"), "1.0.0", &[]));
        ledger.upsert(entry("api2", &Scope::path(REPO, "services/api2"), "1.0.0", &[]));
        ledger.upsert(entry(
            "other",
            &Scope::repository("https://github.com/acme/other"),
            "1.0.0",
            &[],
        ));

        let mut names: Vec<&str> = ledger
            .find_for_scope(REPO, "services/api/v2", exact)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["api", "global", "repo"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let tracker = Tracker::new(temp.path().join("installed.json"));
        let ledger = tracker.load().unwrap();
        assert!(ledger.assets.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("installed.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Tracker::new(&path).load().unwrap_err();
        assert!(matches!(err, SkillpackError::CorruptFile { .. }));
        // The corrupt file is left alone
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_legacy_list_field() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("installed.json");
        let legacy = r#"{
  "version": "2",
  "artifacts": [
    {"name": "review", "version": "1.0.0", "type": "skill", "clients": ["claude-code"]}
  ]
}"#;
        let current = legacy.replace("artifacts", "assets");

        std::fs::write(&path, legacy).unwrap();
        let tracker = Tracker::new(&path);
        let from_legacy = tracker.load().unwrap();

        std::fs::write(&path, &current).unwrap();
        let from_current = tracker.load().unwrap();
        assert_eq!(from_legacy.assets, from_current.assets);

        tracker.save(&from_legacy).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"assets\""));
        assert!(!written.contains("\"artifacts\""));
        assert!(written.contains(&format!("\"version\": \"{TRACKER_VERSION}\"")));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let tracker = Tracker::new(temp.path().join("nested/installed.json"));
        let mut ledger = Ledger::default();
        let mut e = entry("review", &Scope::path(REPO, "web"), "1.0.0", &[ClientId::Gemini]);
        e.config.insert("pinned".to_string(), "true".to_string());
        ledger.upsert(e.clone());
        tracker.save(&ledger).unwrap();

        let loaded = tracker.load().unwrap();
        assert_eq!(loaded.assets, vec![e]);
    }
}
