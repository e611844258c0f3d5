//! Path discovery
//!
//! Resolves the user home (root of every client's global configuration) and
//! the data directory holding the ledger.
//!
//! Resolution order:
//! 1. Explicit roots passed by the caller
//! 2. `SKILLPACK_HOME` for the data directory, `dirs::home_dir` for home
//! 3. The platform data directory from `directories`

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::Result;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "SKILLPACK_HOME";

/// Ledger file name inside the data directory
pub const TRACKER_FILE: &str = "installed.json";

/// Filesystem roots used by scope resolution and the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// User home directory; client global dirs live directly under it
    pub home: PathBuf,
    /// Directory holding the ledger
    pub data_dir: PathBuf,
}

impl Paths {
    /// Discover paths from the environment and platform conventions
    pub fn discover() -> Result<Self> {
        Self::discover_with_override(None)
    }

    /// Discover paths, preferring an explicit data directory when given
    pub fn discover_with_override(data_override: Option<PathBuf>) -> Result<Self> {
        trace!("Discovering skillpack paths");

        let home = dirs::home_dir().context("Could not determine home directory")?;

        let data_dir = match data_override {
            Some(path) => {
                debug!("Using data directory override: {}", path.display());
                path
            }
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(value) if !value.is_empty() => {
                    let path = PathBuf::from(value);
                    debug!("Using {} data directory: {}", DATA_DIR_ENV, path.display());
                    path
                }
                _ => Self::platform_data_dir()?,
            },
        };

        Ok(Self { home, data_dir })
    }

    /// Build paths from explicit roots (tests, embedding tools)
    pub fn with_roots(home: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Location of the installed-assets ledger
    pub fn tracker_file(&self) -> PathBuf {
        self.data_dir.join(TRACKER_FILE)
    }

    /// Global configuration directory of a client, e.g. `~/.claude`
    pub fn client_home(&self, dir_name: &str) -> PathBuf {
        self.home.join(dir_name)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn platform_data_dir() -> Result<PathBuf> {
        let dir = directories::ProjectDirs::from("dev", "skillpack", "skillpack")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .or_else(|| dirs::data_dir().map(|d| d.join("skillpack")))
            .context("Could not determine data directory")?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_with_roots() {
        let paths = Paths::with_roots("/home/dev", "/home/dev/.local/share/skillpack");
        assert_eq!(
            paths.tracker_file(),
            PathBuf::from("/home/dev/.local/share/skillpack/installed.json")
        );
        assert_eq!(paths.client_home(".claude"), PathBuf::from("/home/dev/.claude"));
    }

    #[test]
    #[serial]
    fn test_override_wins() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/from-env");
        let paths = Paths::discover_with_override(Some(PathBuf::from("/tmp/skillpack-data")))
            .unwrap();
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(paths.data_dir, PathBuf::from("/tmp/skillpack-data"));
    }

    #[test]
    #[serial]
    fn test_env_data_dir() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/from-env");
        let paths = Paths::discover().unwrap();
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(paths.tracker_file(), PathBuf::from("/tmp/from-env/installed.json"));

        std::env::set_var(DATA_DIR_ENV, "");
        let paths = Paths::discover().unwrap();
        std::env::remove_var(DATA_DIR_ENV);
        assert_ne!(paths.data_dir, PathBuf::from(""));
    }
}
