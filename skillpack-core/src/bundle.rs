//! Asset bundles
//!
//! A bundle is a gzip-compressed tarball holding `metadata.toml` plus the
//! asset's content files. Bundles are decoded fully into memory; they are
//! small and every handler needs random access to them for validation
//! before anything is written.

use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path};
use tracing::{debug, warn};

use crate::error::IoResultExt;
use crate::metadata::Metadata;
use crate::{Result, SkillpackError};

/// Canonical metadata file at the bundle root
pub const METADATA_FILE: &str = "metadata.toml";

/// One file inside a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub data: Vec<u8>,
    /// Unix permission bits recorded in the archive
    pub mode: Option<u32>,
}

/// In-memory view of a bundle, keyed by normalized relative path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    files: BTreeMap<String, BundleFile>,
}

impl Bundle {
    /// Decode a `.tar.gz` bundle
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoder = GzDecoder::new(Cursor::new(bytes));
        let mut archive = tar::Archive::new(decoder);
        let mut files = BTreeMap::new();

        let entries = archive
            .entries()
            .map_err(|e| SkillpackError::validation(format!("Invalid bundle archive: {e}")))?;

        for entry in entries {
            let mut entry = entry
                .map_err(|e| SkillpackError::validation(format!("Invalid bundle entry: {e}")))?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                continue;
            }
            let raw_path = entry
                .path()
                .map_err(|e| SkillpackError::validation(format!("Invalid entry path: {e}")))?
                .to_string_lossy()
                .into_owned();
            if !entry_type.is_file() {
                warn!("Skipping non-regular bundle entry: {}", raw_path);
                continue;
            }

            let path = normalize_entry_path(&raw_path)?;
            let mode = entry.header().mode().ok();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(|e| {
                SkillpackError::validation(format!("Failed to read bundle entry {raw_path}: {e}"))
            })?;
            files.insert(path, BundleFile { data, mode });
        }

        let bundle = Self {
            files: strip_common_root(files),
        };
        debug!("Decoded bundle with {} files", bundle.files.len());
        Ok(bundle)
    }

    /// Build a bundle from an unpacked directory on disk
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut files = BTreeMap::new();
        for entry in walkdir::WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(|e| SkillpackError::Path(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| SkillpackError::Path(e.to_string()))?;
            let path = normalize_entry_path(&relative.to_string_lossy())?;
            let data = std::fs::read(entry.path()).at_path(entry.path())?;
            files.insert(
                path,
                BundleFile {
                    data,
                    mode: file_mode(entry.path()),
                },
            );
        }
        Ok(Self { files })
    }

    /// Build a bundle from in-memory `(path, contents)` pairs
    pub fn from_files<I, P, D>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: Into<Vec<u8>>,
    {
        let mut map = BTreeMap::new();
        for (path, data) in files {
            let path = normalize_entry_path(path.as_ref())?;
            map.insert(
                path,
                BundleFile {
                    data: data.into(),
                    mode: None,
                },
            );
        }
        Ok(Self { files: map })
    }

    /// Encode as `.tar.gz`
    pub fn to_tar_gz(&self) -> Result<Vec<u8>> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, file) in &self.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(file.data.len() as u64);
            header.set_mode(file.mode.unwrap_or(0o644));
            header.set_cksum();
            builder
                .append_data(&mut header, path, file.data.as_slice())
                .map_err(|e| anyhow::anyhow!("Failed to encode bundle entry {path}: {e}"))?;
        }
        let encoder = builder
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish bundle archive: {e}"))?;
        let bytes = encoder
            .finish()
            .map_err(|e| anyhow::anyhow!("Failed to compress bundle: {e}"))?;
        Ok(bytes)
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let path = normalize_entry_path(path)?;
        self.files.insert(
            path,
            BundleFile {
                data: data.into(),
                mode: None,
            },
        );
        Ok(())
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize_entry_path(path)
            .map(|p| self.files.contains_key(&p))
            .unwrap_or(false)
    }

    pub fn read(&self, path: &str) -> Option<&[u8]> {
        let path = normalize_entry_path(path).ok()?;
        self.files.get(&path).map(|f| f.data.as_slice())
    }

    /// Read a bundled file as UTF-8 text
    pub fn read_to_string(&self, path: &str) -> Result<String> {
        let data = self.read(path).ok_or_else(|| {
            SkillpackError::validation(format!("Bundle is missing required file '{path}'"))
        })?;
        String::from_utf8(data.to_vec())
            .map_err(|_| SkillpackError::validation(format!("'{path}' is not valid UTF-8")))
    }

    /// Parse the bundled `metadata.toml`
    pub fn metadata(&self) -> Result<Metadata> {
        let text = self.read_to_string(METADATA_FILE)?;
        Metadata::from_toml(&text)
    }

    /// Write every file under `dest`, creating directories as needed
    pub fn extract_to(&self, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest).at_path(dest)?;
        for (path, file) in &self.files {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).at_path(parent)?;
            }
            std::fs::write(&target, &file.data).at_path(&target)?;
            if let Some(mode) = file.mode {
                set_mode(&target, mode)?;
            }
        }
        Ok(())
    }
}

/// Normalize an archive path to a forward-slash relative path.
///
/// Absolute paths and `..` components are rejected.
fn normalize_entry_path(raw: &str) -> Result<String> {
    let unified = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SkillpackError::validation(format!(
                    "Unsafe path in bundle: {raw}"
                )));
            }
        }
    }
    if parts.is_empty() {
        return Err(SkillpackError::validation(format!(
            "Empty path in bundle: '{raw}'"
        )));
    }
    Ok(parts.join("/"))
}

/// Drop a single wrapping directory when the metadata lives inside it
fn strip_common_root(files: BTreeMap<String, BundleFile>) -> BTreeMap<String, BundleFile> {
    if files.contains_key(METADATA_FILE) {
        return files;
    }
    let Some(root) = files
        .keys()
        .next()
        .and_then(|first| first.split_once('/'))
        .map(|(root, _)| root.to_string())
    else {
        return files;
    };
    let prefix = format!("{root}/");
    if !files.contains_key(&format!("{prefix}{METADATA_FILE}"))
        || !files.keys().all(|k| k.starts_with(&prefix))
    {
        return files;
    }
    debug!("Stripping bundle root directory '{}'", root);
    files
        .into_iter()
        .map(|(k, v)| (k[prefix.len()..].to_string(), v))
        .collect()
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777)).at_path(path)
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tar_gz_round_trip() {
        let bundle = Bundle::from_files([
            ("metadata.toml", "[asset]\nname = \"x\"\n"),
            ("docs/README.md", "hello"),
        ])
        .unwrap();
        let bytes = bundle.to_tar_gz().unwrap();
        let decoded = Bundle::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.read("docs/README.md"), Some(&b"hello"[..]));
    }

    #[test]
    fn test_rejects_parent_dir_paths() {
        let result = Bundle::from_files([("../escape.sh", "rm -rf /")]);
        assert!(result.unwrap_err().is_validation());
        assert!(Bundle::from_files([("/etc/passwd", "x")]).is_err());
    }

    #[test]
    fn test_strips_wrapping_directory() {
        let mut files = BTreeMap::new();
        for path in ["my-skill/metadata.toml", "my-skill/SKILL.md"] {
            files.insert(
                path.to_string(),
                BundleFile {
                    data: vec![],
                    mode: None,
                },
            );
        }
        let stripped = strip_common_root(files);
        assert!(stripped.contains_key("metadata.toml"));
        assert!(stripped.contains_key("SKILL.md"));
    }

    #[test]
    fn test_normalizes_dot_prefix() {
        let bundle = Bundle::from_files([("./SKILL.md", "x")]).unwrap();
        assert!(bundle.contains("SKILL.md"));
        assert!(bundle.contains("./SKILL.md"));
    }

    #[test]
    fn test_from_dir_and_extract() {
        let src = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("scripts")).unwrap();
        std::fs::write(src.path().join("metadata.toml"), "x").unwrap();
        std::fs::write(src.path().join("scripts/run.sh"), "#!/bin/sh\n").unwrap();

        let bundle = Bundle::from_dir(src.path()).unwrap();
        assert!(bundle.contains("scripts/run.sh"));

        let dest = TempDir::new().unwrap();
        bundle.extract_to(dest.path()).unwrap();
        assert!(dest.path().join("scripts/run.sh").exists());
        assert!(dest.path().join("metadata.toml").exists());
    }
}
