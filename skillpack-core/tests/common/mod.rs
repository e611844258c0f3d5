//! Shared helpers for integration tests

use anyhow::Result;
use skillpack_core::{Bundle, Paths};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Home, data dir and a repository checkout under one temp root
pub struct TestEnv {
    #[allow(dead_code)]
    pub root: PathBuf,
    pub paths: Paths,
    pub repo: PathBuf,
}

impl TestEnv {
    pub fn new(root: &Path) -> Self {
        let home = root.join("home");
        let repo = root.join("checkout");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(&repo).unwrap();
        Self {
            root: root.to_path_buf(),
            paths: Paths::with_roots(home, root.join("data")),
            repo,
        }
    }

    pub fn home(&self) -> &Path {
        &self.paths.home
    }
}

#[allow(dead_code)]
pub const REPO_URL: &str = "https://github.com/acme/app";

/// Encode `metadata.toml` plus files as a `.tar.gz` bundle
pub fn bundle_bytes(metadata: Option<&str>, files: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut all: Vec<(&str, &str)> = Vec::new();
    if let Some(metadata) = metadata {
        all.push(("metadata.toml", metadata));
    }
    all.extend_from_slice(files);
    Ok(Bundle::from_files(all)?.to_tar_gz()?)
}

#[allow(dead_code)]
pub fn skill_metadata(name: &str, version: &str) -> String {
    format!(
        "[asset]\nname = \"{name}\"\nversion = \"{version}\"\ntype = \"skill\"\n\n[skill]\n"
    )
}

/// In-memory registry that counts fetches
#[derive(Default)]
pub struct FakeRegistry {
    bundles: BTreeMap<(String, String), Vec<u8>>,
    pub fetches: RefCell<Vec<String>>,
}

impl FakeRegistry {
    pub fn publish(&mut self, name: &str, version: &str, bytes: Vec<u8>) {
        self.bundles
            .insert((name.to_string(), version.to_string()), bytes);
    }

    #[allow(dead_code)]
    pub fn fetch_count(&self) -> usize {
        self.fetches.borrow().len()
    }
}

impl skillpack_core::BundleFetcher for FakeRegistry {
    fn fetch(&self, name: &str, version: &str) -> anyhow::Result<Vec<u8>> {
        self.fetches.borrow_mut().push(format!("{name}@{version}"));
        self.bundles
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{name}@{version} not found"))
    }
}

#[allow(dead_code)]
pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
