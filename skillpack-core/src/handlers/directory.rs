//! Directory-asset strategy: the bundle extracted verbatim into its own folder
//!
//! The extracted `metadata.toml` stays on disk so the installation can be
//! verified later without fetching the bundle again.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{remove_dir_if_exists, validate_bundle, Handler, Verification};
use crate::asset::AssetRef;
use crate::bundle::{self, Bundle, METADATA_FILE};
use crate::client::ClientId;
use crate::error::IoResultExt;
use crate::metadata::Metadata;
use crate::scope::ScopeBase;
use crate::Result;

#[derive(Debug, Clone)]
pub struct DirectoryHandler {
    asset: AssetRef,
    client: ClientId,
    subdir: &'static str,
}

impl DirectoryHandler {
    pub fn new(asset: AssetRef, client: ClientId, subdir: &'static str) -> Self {
        Self {
            asset,
            client,
            subdir,
        }
    }

    /// Skills live in `skills/{name}/` for every client
    pub fn skill(asset: AssetRef, client: ClientId) -> Self {
        Self::new(asset, client, "skills")
    }

    pub fn target_dir(&self, base: &ScopeBase) -> PathBuf {
        base.join(self.subdir).join(&self.asset.name)
    }
}

impl Handler for DirectoryHandler {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn client(&self) -> ClientId {
        self.client
    }

    fn install(&self, bundle: &Bundle, base: &ScopeBase) -> Result<()> {
        let metadata = validate_bundle(bundle, &self.asset)?;
        let target = self.target_dir(base);
        extract_bundle(bundle, &metadata, &target)?;
        info!(
            "Installed {} v{} for {} at {}",
            self.asset,
            metadata.version(),
            self.client,
            target.display()
        );
        Ok(())
    }

    fn remove(&self, base: &ScopeBase) -> Result<()> {
        let target = self.target_dir(base);
        if remove_dir_if_exists(&target)? {
            info!("Removed {} from {}", self.asset, target.display());
        } else {
            debug!("{} not present at {}", self.asset, target.display());
        }
        Ok(())
    }

    fn verify_installed(&self, base: &ScopeBase) -> Result<Verification> {
        verify_extracted(&self.target_dir(base), &self.asset)
    }

    fn install_path(&self, base: &ScopeBase) -> PathBuf {
        self.target_dir(base)
    }
}

/// Replace `target` with the bundle contents.
///
/// Callers validate first; nothing here can fail on bundle contents.
pub(crate) fn extract_bundle(bundle: &Bundle, metadata: &Metadata, target: &Path) -> Result<()> {
    remove_dir_if_exists(target)?;
    bundle.extract_to(target)?;
    if let Some(script) = metadata.hook.as_ref().and_then(|h| h.script_file.as_deref()) {
        make_executable(&target.join(script))?;
    }
    debug!("Extracted {} files to {}", bundle.len(), target.display());
    Ok(())
}

/// Check an extracted directory still carries metadata for `asset`
pub(crate) fn verify_extracted(dir: &Path, asset: &AssetRef) -> Result<Verification> {
    if !dir.is_dir() {
        return Ok(Verification::missing(format!(
            "{} does not exist",
            dir.display()
        )));
    }
    let metadata_path = dir.join(METADATA_FILE);
    if !metadata_path.is_file() {
        return Ok(Verification::missing(format!(
            "{} is missing {METADATA_FILE}",
            dir.display()
        )));
    }
    let text = std::fs::read_to_string(&metadata_path).at_path(&metadata_path)?;
    let metadata = match Metadata::from_toml(&text) {
        Ok(metadata) => metadata,
        Err(e) => return Ok(Verification::missing(e.to_string())),
    };
    if metadata.name() != asset.name {
        return Ok(Verification::missing(format!(
            "{} holds '{}', not '{}'",
            dir.display(),
            metadata.name(),
            asset.name
        )));
    }
    Ok(Verification::ok(format!("version {}", metadata.version())))
}

pub(crate) fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path).at_path(path)?.permissions().mode();
        bundle::set_mode(path, mode | 0o755)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
