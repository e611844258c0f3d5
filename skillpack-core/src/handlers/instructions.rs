//! Rules kept as sections of a shared instructions file
//!
//! Gemini CLI reads one `GEMINI.md` per scope instead of a rules directory.
//! Each rule owns a section fenced by HTML comments naming the asset, so it
//! can be replaced or removed without touching the rest of the file:
//!
//! ```markdown
//! <!-- skillpack:begin rust-style 1.0.0 -->
//! ...rule body...
//! <!-- skillpack:end rust-style -->
//! ```

use std::path::PathBuf;
use tracing::{debug, info};

use super::rule::canonical_rule;
use super::{validate_bundle, write_file, Handler, Verification};
use crate::asset::AssetRef;
use crate::bundle::Bundle;
use crate::client::ClientId;
use crate::error::IoResultExt;
use crate::scope::ScopeBase;
use crate::Result;

const BEGIN_PREFIX: &str = "<!-- skillpack:begin ";
const END_PREFIX: &str = "<!-- skillpack:end ";
const COMMENT_END: &str = " -->";

#[derive(Debug, Clone)]
pub struct InstructionsHandler {
    asset: AssetRef,
    client: ClientId,
    file_name: &'static str,
}

impl InstructionsHandler {
    pub fn gemini(asset: AssetRef, client: ClientId) -> Self {
        Self {
            asset,
            client,
            file_name: "GEMINI.md",
        }
    }

    /// `~/.gemini/GEMINI.md` globally, `{root}/GEMINI.md` in a repository
    pub fn file_path(&self, base: &ScopeBase) -> PathBuf {
        if base.global {
            base.join(self.file_name)
        } else {
            base.root.join(self.file_name)
        }
    }

    fn read(&self, base: &ScopeBase) -> Result<Option<String>> {
        let path = self.file_path(base);
        if !path.is_file() {
            return Ok(None);
        }
        std::fs::read_to_string(&path).at_path(&path).map(Some)
    }
}

impl Handler for InstructionsHandler {
    fn asset(&self) -> &AssetRef {
        &self.asset
    }

    fn client(&self) -> ClientId {
        self.client
    }

    fn install(&self, bundle: &Bundle, base: &ScopeBase) -> Result<()> {
        let metadata = validate_bundle(bundle, &self.asset)?;
        let rule = canonical_rule(&metadata, bundle, self.client)?;

        let mut body = String::new();
        if let Some(title) = &rule.title {
            body.push_str(&format!("## {title}\n\n"));
        }
        if !rule.globs.is_empty() {
            body.push_str(&format!("Applies to: {}\n\n", rule.globs.join(", ")));
        }
        body.push_str(rule.body.trim_end());

        let existing = self.read(base)?.unwrap_or_default();
        let updated = upsert_section(&existing, &self.asset.name, metadata.version(), &body);
        let path = self.file_path(base);
        write_file(&path, &updated)?;
        info!(
            "Installed rule {} v{} into {}",
            self.asset.name,
            metadata.version(),
            path.display()
        );
        Ok(())
    }

    fn remove(&self, base: &ScopeBase) -> Result<()> {
        let Some(existing) = self.read(base)? else {
            return Ok(());
        };
        match remove_section(&existing, &self.asset.name) {
            Some(updated) => {
                let path = self.file_path(base);
                write_file(&path, &updated)?;
                info!("Removed rule {} from {}", self.asset.name, path.display());
            }
            None => debug!("No section for {}", self.asset.name),
        }
        Ok(())
    }

    fn verify_installed(&self, base: &ScopeBase) -> Result<Verification> {
        let content = self.read(base)?.unwrap_or_default();
        match find_section(&content, &self.asset.name) {
            Some(section) => Ok(Verification::ok(match section.version {
                Some(version) => format!("version {version}"),
                None => "section present".to_string(),
            })),
            None => Ok(Verification::missing(format!(
                "no section for {} in {}",
                self.asset.name,
                self.file_path(base).display()
            ))),
        }
    }

    fn install_path(&self, base: &ScopeBase) -> PathBuf {
        self.file_path(base)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Section<'a> {
    /// Byte range of the whole section, both marker lines included
    start: usize,
    end: usize,
    version: Option<&'a str>,
}

fn find_section<'a>(content: &'a str, name: &str) -> Option<Section<'a>> {
    let end_marker = format!("{END_PREFIX}{name}{COMMENT_END}");
    let mut offset = 0;
    let mut open: Option<(usize, Option<&'a str>)> = None;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if open.is_none() {
            if let Some(version) = begin_marker_version(trimmed, name) {
                open = Some((offset, version));
            }
        } else if trimmed == end_marker {
            let (start, version) = open?;
            return Some(Section {
                start,
                end: offset + line.len(),
                version,
            });
        }
        offset += line.len();
    }
    None
}

/// `Some(version)` when `line` opens the section for `name`
fn begin_marker_version<'a>(line: &'a str, name: &str) -> Option<Option<&'a str>> {
    let inner = line.strip_prefix(BEGIN_PREFIX)?.strip_suffix(COMMENT_END)?;
    let mut parts = inner.split_whitespace();
    if parts.next()? != name {
        return None;
    }
    Some(parts.next())
}

fn render_section(name: &str, version: &str, body: &str) -> String {
    format!("{BEGIN_PREFIX}{name} {version}{COMMENT_END}\n{body}\n{END_PREFIX}{name}{COMMENT_END}\n")
}

/// Replace the section in place, or append it after a blank line
fn upsert_section(content: &str, name: &str, version: &str, body: &str) -> String {
    let section = render_section(name, version, body);
    if let Some(found) = find_section(content, name) {
        return format!("{}{}{}", &content[..found.start], section, &content[found.end..]);
    }
    let mut updated = content.to_string();
    if !updated.is_empty() {
        if !updated.ends_with('\n') {
            updated.push('\n');
        }
        if !updated.ends_with("\n\n") {
            updated.push('\n');
        }
    }
    updated.push_str(&section);
    updated
}

/// Content without the section, or `None` when there is none
fn remove_section(content: &str, name: &str) -> Option<String> {
    let found = find_section(content, name)?;
    let before = content[..found.start].trim_end_matches('\n');
    let after = content[found.end..].trim_start_matches('\n');
    let mut updated = before.to_string();
    if !before.is_empty() && !after.is_empty() {
        updated.push_str("\n\n");
    } else if !before.is_empty() {
        updated.push('\n');
    }
    updated.push_str(after);
    Some(updated)
}
