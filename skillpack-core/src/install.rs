//! Installation orchestration
//!
//! [`AssetManager`] ties the pieces together for each request:
//!
//! ```text
//! ledger.needs_install ──no──▶ UpToDate
//!        │yes
//!        ▼
//! fetch bytes ─▶ decode bundle ─▶ detect type ─▶ validate
//!        │
//!        ▼
//! handler(client, type).install   (per client)
//!        │
//!        ▼
//! ledger.upsert
//! ```
//!
//! Requests run one after another. A failing asset never stops the rest;
//! every request gets its own [`AssetOutcome`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::asset::{AssetRef, AssetType};
use crate::bundle::{Bundle, METADATA_FILE};
use crate::client::ClientId;
use crate::config::Paths;
use crate::detect::DetectorTable;
use crate::handlers::{self, HandlerTable, Verification};
use crate::metadata::Metadata;
use crate::scope::{self, Scope, ScopeBase};
use crate::tracker::{AssetKey, Ledger, Tracker, TrackerEntry};
use crate::{Result, SkillpackError};

/// Source of bundle bytes, usually a registry client
pub trait BundleFetcher {
    fn fetch(&self, name: &str, version: &str) -> anyhow::Result<Vec<u8>>;
}

impl<F> BundleFetcher for F
where
    F: Fn(&str, &str) -> anyhow::Result<Vec<u8>>,
{
    fn fetch(&self, name: &str, version: &str) -> anyhow::Result<Vec<u8>> {
        self(name, version)
    }
}

/// Yes/no question asked before destructive bulk operations
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Fixed answer for runs without a terminal
#[derive(Debug, Clone, Copy)]
pub struct NonInteractive(pub bool);

impl Confirm for NonInteractive {
    fn confirm(&self, prompt: &str) -> bool {
        debug!("Non-interactive answer {} to: {}", self.0, prompt);
        self.0
    }
}

/// One asset to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub name: String,
    pub version: String,
    /// Declared type; detected from the bundle when absent
    pub asset_type: Option<AssetType>,
    pub scope: Scope,
    pub clients: Vec<ClientId>,
    /// Reinstall even when the ledger says nothing changed
    pub force: bool,
}

impl InstallRequest {
    pub fn new(name: impl Into<String>, version: impl Into<String>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            asset_type: None,
            scope,
            clients: Vec::new(),
            force: false,
        }
    }

    pub fn with_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = Some(asset_type);
        self
    }

    pub fn for_clients(mut self, clients: impl IntoIterator<Item = ClientId>) -> Self {
        self.clients = clients.into_iter().collect();
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn key(&self) -> AssetKey {
        AssetKey::new(&self.name, &self.scope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    /// The ledger already records this version for every requested client
    UpToDate,
    Installed {
        asset_type: AssetType,
        clients: Vec<ClientId>,
    },
}

/// Result of one request
#[derive(Debug)]
pub struct AssetOutcome {
    pub name: String,
    pub version: String,
    pub scope: Scope,
    pub status: Result<InstallStatus>,
    /// Clients that failed while others succeeded
    pub failed_clients: Vec<(ClientId, SkillpackError)>,
}

impl AssetOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_ok() && self.failed_clients.is_empty()
    }
}

/// Entry point for installing, removing and verifying assets
#[derive(Debug)]
pub struct AssetManager {
    paths: Paths,
    handlers: HandlerTable,
    detectors: DetectorTable,
    tracker: Tracker,
    /// Local checkouts by repository URL
    repositories: BTreeMap<String, PathBuf>,
}

impl AssetManager {
    pub fn new(paths: Paths) -> Self {
        Self::with_tables(paths, HandlerTable::builtin(), DetectorTable::builtin())
    }

    pub fn with_tables(paths: Paths, handlers: HandlerTable, detectors: DetectorTable) -> Self {
        let tracker = Tracker::new(paths.tracker_file());
        Self {
            paths,
            handlers,
            detectors,
            tracker,
            repositories: BTreeMap::new(),
        }
    }

    /// Register the local checkout of a repository
    pub fn with_repository(mut self, url: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.repositories.insert(url.into(), root.into());
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn ledger(&self) -> Result<Ledger> {
        self.tracker.load()
    }

    fn repo_root(&self, scope: &Scope) -> Option<&Path> {
        let url = scope.repository_url()?;
        self.repositories
            .iter()
            .find(|(known, _)| repo_urls_match(known, url))
            .map(|(_, root)| root.as_path())
    }

    /// Client directory for `scope`
    pub fn scope_base(&self, client: ClientId, scope: &Scope) -> Result<ScopeBase> {
        scope::resolve(client, scope, &self.paths, self.repo_root(scope))
    }

    /// Install every request in order, then save the ledger once.
    ///
    /// Errors are per request; only a ledger that cannot be read or written
    /// fails the whole call.
    pub fn install_all(
        &self,
        requests: &[InstallRequest],
        fetcher: &dyn BundleFetcher,
    ) -> Result<Vec<AssetOutcome>> {
        let mut ledger = self.tracker.load()?;
        let mut changed = false;
        let mut outcomes = Vec::with_capacity(requests.len());

        for request in requests {
            let mut failed_clients = Vec::new();
            let status = self.install_one(&mut ledger, request, fetcher, &mut failed_clients);
            match &status {
                Ok(InstallStatus::Installed { .. }) => changed = true,
                Ok(InstallStatus::UpToDate) => {}
                Err(e) => warn!("Failed to install {}: {}", request.name, e),
            }
            outcomes.push(AssetOutcome {
                name: request.name.clone(),
                version: request.version.clone(),
                scope: request.scope.clone(),
                status,
                failed_clients,
            });
        }

        if changed {
            self.tracker.save(&ledger)?;
        }
        Ok(outcomes)
    }

    fn install_one(
        &self,
        ledger: &mut Ledger,
        request: &InstallRequest,
        fetcher: &dyn BundleFetcher,
        failed_clients: &mut Vec<(ClientId, SkillpackError)>,
    ) -> Result<InstallStatus> {
        if request.clients.is_empty() {
            return Err(SkillpackError::validation(format!(
                "{}: no target clients",
                request.name
            )));
        }

        let key = request.key();
        if !request.force && !ledger.needs_install(&key, &request.version, &request.clients) {
            debug!("{} {} already up to date in {}", request.name, request.version, request.scope);
            return Ok(InstallStatus::UpToDate);
        }

        let bytes = fetcher
            .fetch(&request.name, &request.version)
            .map_err(|e| SkillpackError::Other(e.context(format!("fetching {}", request.name))))?;
        let mut bundle = Bundle::from_bytes(&bytes)?;
        let asset_type = self.resolve_type(&mut bundle, request)?;
        let asset = AssetRef::new(&request.name, asset_type.clone());
        let metadata = handlers::validate_bundle(&bundle, &asset)?;
        if metadata.version() != request.version {
            return Err(SkillpackError::validation(format!(
                "{}: bundle is version {}, requested {}",
                request.name,
                metadata.version(),
                request.version
            )));
        }

        // An upgrade applies to every client the previous version went to
        let mut targets: BTreeSet<ClientId> = request.clients.iter().copied().collect();
        let previous = ledger.find(&key).cloned();
        if let Some(entry) = &previous {
            if entry.version != request.version {
                targets.extend(entry.clients.iter().copied());
            }
        }

        let mut installed = Vec::new();
        for client in targets {
            let result = self
                .handlers
                .get(client, &asset)
                .and_then(|handler| {
                    let base = self.scope_base(client, &request.scope)?;
                    handler.install(&bundle, &base)
                });
            match result {
                Ok(()) => installed.push(client),
                Err(e) => {
                    warn!("Installing {} for {} failed: {}", asset, client, e);
                    failed_clients.push((client, e));
                }
            }
        }

        if installed.is_empty() {
            let (_, first) = failed_clients.remove(0);
            return Err(first);
        }

        // A recorded client that failed to upgrade still holds the old version.
        // Keep the entry at that version so it stays removable and is retried.
        let mut clients: BTreeSet<ClientId> = installed.iter().copied().collect();
        let mut version = request.version.clone();
        let mut entry_config = BTreeMap::new();
        if let Some(entry) = previous {
            let stranded: Vec<ClientId> = entry
                .clients
                .iter()
                .copied()
                .filter(|c| failed_clients.iter().any(|(failed, _)| failed == c))
                .collect();
            if !stranded.is_empty() {
                warn!(
                    "{} stays at v{} in the ledger: {:?} could not be upgraded to v{}",
                    asset, entry.version, stranded, request.version
                );
                version = entry.version.clone();
            }
            if entry.version == request.version || !stranded.is_empty() {
                clients.extend(entry.clients);
                entry_config = entry.config;
            }
        }
        let mut entry = TrackerEntry::new(&key, &version, asset_type.clone(), clients);
        entry.config = entry_config;
        ledger.upsert(entry);

        info!(
            "Installed {} v{} for {} client(s) in {}",
            asset,
            request.version,
            installed.len(),
            request.scope
        );
        Ok(InstallStatus::Installed {
            asset_type,
            clients: installed,
        })
    }

    /// Declared type, else the metadata's, else detected from file names.
    ///
    /// A bundle without metadata gets synthesized metadata for the detected type.
    fn resolve_type(&self, bundle: &mut Bundle, request: &InstallRequest) -> Result<AssetType> {
        if bundle.contains(METADATA_FILE) {
            let declared = bundle.metadata()?.asset_type().clone();
            return Ok(request.asset_type.clone().unwrap_or(declared));
        }
        let asset_type = match &request.asset_type {
            Some(asset_type) => asset_type.clone(),
            None => self
                .detectors
                .detect(bundle.file_names())
                .ok_or_else(|| {
                    SkillpackError::validation(format!(
                        "{}: cannot determine asset type from bundle contents",
                        request.name
                    ))
                })?,
        };
        debug!("Synthesizing metadata for {} as {}", request.name, asset_type);
        let metadata = Metadata::synthesize(&request.name, &request.version, asset_type.clone())?;
        bundle.insert(METADATA_FILE, metadata.to_toml()?)?;
        Ok(asset_type)
    }

    /// Remove an asset for `clients` (all recorded clients when empty).
    ///
    /// Unknown keys are a no-op. The ledger keeps the clients whose removal failed.
    pub fn uninstall(&self, key: &AssetKey, clients: &[ClientId]) -> Result<Vec<(ClientId, Result<()>)>> {
        let mut ledger = self.tracker.load()?;
        let Some(mut entry) = ledger.find(key).cloned() else {
            debug!("{} is not installed in {}", key.name, key.scope());
            return Ok(Vec::new());
        };

        let targets: Vec<ClientId> = if clients.is_empty() {
            entry.clients.iter().copied().collect()
        } else {
            clients.to_vec()
        };

        let results = self.remove_entry(&entry, &targets);
        for (client, result) in &results {
            if result.is_ok() {
                entry.clients.remove(client);
            }
        }

        if entry.clients.is_empty() {
            ledger.remove_by_key(key);
        } else {
            ledger.upsert(entry);
        }
        self.tracker.save(&ledger)?;
        Ok(results)
    }

    fn remove_entry(&self, entry: &TrackerEntry, clients: &[ClientId]) -> Vec<(ClientId, Result<()>)> {
        let asset = AssetRef::new(&entry.name, entry.asset_type.clone());
        let scope = entry.scope();
        clients
            .iter()
            .map(|&client| {
                let result = self.handlers.get(client, &asset).and_then(|handler| {
                    let base = self.scope_base(client, &scope)?;
                    handler.remove(&base)
                });
                if let Err(e) = &result {
                    warn!("Removing {} for {} failed: {}", asset, client, e);
                }
                (client, result)
            })
            .collect()
    }

    /// Remove everything recorded for exactly `scope` after confirmation.
    ///
    /// Returns how many assets were fully removed. Entries with a failed
    /// removal stay in the ledger and the first failure is returned.
    pub fn clear_scope(&self, scope: &Scope, confirm: &dyn Confirm) -> Result<usize> {
        let mut ledger = self.tracker.load()?;
        let entries: Vec<TrackerEntry> = ledger.find_by_scope(scope).into_iter().cloned().collect();
        if entries.is_empty() {
            debug!("Nothing installed in {}", scope);
            return Ok(0);
        }
        if !confirm.confirm(&format!("Remove {} assets installed in {}?", entries.len(), scope)) {
            info!("Clearing {} cancelled", scope);
            return Ok(0);
        }

        let mut removed = 0;
        let mut first_error = None;
        for mut entry in entries {
            let clients: Vec<ClientId> = entry.clients.iter().copied().collect();
            for (client, result) in self.remove_entry(&entry, &clients) {
                match result {
                    Ok(()) => {
                        entry.clients.remove(&client);
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            if entry.clients.is_empty() {
                ledger.remove_by_key(&entry.key());
                removed += 1;
            } else {
                ledger.upsert(entry);
            }
        }
        self.tracker.save(&ledger)?;

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Cleared {} assets from {}", removed, scope);
                Ok(removed)
            }
        }
    }

    /// Check every recorded client of an asset
    pub fn verify(&self, key: &AssetKey) -> Result<Vec<(ClientId, Verification)>> {
        let ledger = self.tracker.load()?;
        let Some(entry) = ledger.find(key) else {
            return Ok(Vec::new());
        };
        let asset = AssetRef::new(&entry.name, entry.asset_type.clone());
        let scope = entry.scope();
        entry
            .clients
            .iter()
            .map(|&client| -> Result<(ClientId, Verification)> {
                let handler = self.handlers.get(client, &asset)?;
                let base = self.scope_base(client, &scope)?;
                Ok((client, handler.verify_installed(&base)?))
            })
            .collect()
    }
}

/// Whether two repository URLs name the same repository.
///
/// Ignores scheme, credentials, a trailing `.git` or `/`, and host case, and
/// treats `git@host:owner/repo` like `https://host/owner/repo`.
pub fn repo_urls_match(a: &str, b: &str) -> bool {
    normalize_repo_url(a) == normalize_repo_url(b)
}

fn normalize_repo_url(url: &str) -> String {
    let url = url.trim();
    let (rest, scp_like) = match url.split_once("://") {
        Some((_, rest)) => (rest, false),
        None => (url, true),
    };
    let rest = match rest.split_once('@') {
        Some((user, after)) if !user.contains('/') => after,
        _ => rest,
    };

    let split = if scp_like {
        let colon = rest.find(':');
        let slash = rest.find('/');
        match (colon, slash) {
            (Some(c), Some(s)) if c < s => rest.split_once(':'),
            (Some(_), None) => rest.split_once(':'),
            _ => rest.split_once('/'),
        }
    } else {
        rest.split_once('/')
    };
    let (host, path) = split.unwrap_or((rest, ""));

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/');
    format!("{}/{}", host.to_ascii_lowercase(), path)
}
