//! Asset type detection from a bundle's file listing
//!
//! Used when a bundle's metadata does not declare a type (or when there is no
//! metadata at all). Detectors run in table order; the first match wins.

use tracing::debug;

use crate::asset::AssetType;
use crate::metadata::{
    DEFAULT_AGENT_FILE, DEFAULT_COMMAND_FILE, DEFAULT_PLUGIN_MANIFEST, DEFAULT_RULE_FILE,
    DEFAULT_SKILL_FILE,
};

type Matcher = fn(&[&str]) -> bool;

/// One row of the detection table
#[derive(Debug, Clone)]
pub struct Detector {
    pub asset_type: AssetType,
    matcher: Matcher,
}

impl Detector {
    pub fn new(asset_type: AssetType, matcher: Matcher) -> Self {
        Self {
            asset_type,
            matcher,
        }
    }

    pub fn matches(&self, files: &[&str]) -> bool {
        (self.matcher)(files)
    }
}

/// Ordered detector table, built once and passed by reference
#[derive(Debug, Clone)]
pub struct DetectorTable {
    detectors: Vec<Detector>,
}

impl DetectorTable {
    /// Built-in detectors. Plugins come first since a plugin may also ship
    /// skill or command files.
    pub fn builtin() -> Self {
        Self {
            detectors: vec![
                Detector::new(AssetType::Plugin, |files| {
                    has_file(files, DEFAULT_PLUGIN_MANIFEST)
                }),
                Detector::new(AssetType::Skill, |files| has_file(files, DEFAULT_SKILL_FILE)),
                Detector::new(AssetType::Agent, |files| has_file(files, DEFAULT_AGENT_FILE)),
                Detector::new(AssetType::Command, |files| {
                    has_file(files, DEFAULT_COMMAND_FILE)
                }),
                Detector::new(AssetType::Hook, |files| {
                    files.iter().any(|f| is_root_file(f) && is_hook_script(f))
                }),
                Detector::new(AssetType::Mcp, |files| {
                    has_file(files, "mcp.json") || has_file(files, "server.json")
                }),
                Detector::new(AssetType::Rule, |files| {
                    has_file(files, DEFAULT_RULE_FILE)
                        || files.iter().any(|f| is_root_file(f) && f.ends_with(".mdc"))
                }),
            ],
        }
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    /// Infer an asset type from bundle file names
    pub fn detect<'a, I>(&self, files: I) -> Option<AssetType>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let files: Vec<&str> = files.into_iter().collect();
        let detected = self
            .detectors
            .iter()
            .find(|d| d.matches(&files))
            .map(|d| d.asset_type.clone());
        debug!("Detected asset type {:?} from {} files", detected, files.len());
        detected
    }
}

impl Default for DetectorTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn has_file(files: &[&str], name: &str) -> bool {
    files.iter().any(|f| f.eq_ignore_ascii_case(name))
}

fn is_root_file(path: &str) -> bool {
    !path.contains('/')
}

fn is_hook_script(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("hook.") && [".sh", ".py", ".js", ".ts", ".rb"].iter().any(|ext| lower.ends_with(ext))
}
