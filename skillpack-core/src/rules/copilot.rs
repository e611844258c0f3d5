//! GitHub Copilot instructions: `.github/instructions/{name}.instructions.md`

use serde_yaml_ng::Mapping;
use std::path::Path;

use super::{emit, header, side_bag, slash_path, split, take_globs, take_string};
use super::{CanonicalRule, RuleFormat};
use crate::client::ClientId;
use crate::Result;

/// `applyTo` value matching every file
const ALL_FILES: &str = "**";

#[derive(Debug, Clone, Copy, Default)]
pub struct CopilotRules;

impl RuleFormat for CopilotRules {
    fn client(&self) -> ClientId {
        ClientId::Copilot
    }

    fn file_name(&self, name: &str) -> String {
        format!("{name}.instructions.md")
    }

    fn matches_path(&self, path: &Path) -> bool {
        let path = slash_path(path);
        path.ends_with(".instructions.md") || path.ends_with("copilot-instructions.md")
    }

    fn matches_content(&self, content: &str) -> bool {
        header(content).is_some_and(|h| h.contains_key("applyTo"))
    }

    fn parse(&self, content: &str) -> Result<CanonicalRule> {
        let (mut header, body) = split(content)?;
        let title = take_string(&mut header, "name");
        let description = take_string(&mut header, "description");
        let mut globs = take_globs(&mut header, "applyTo");
        let always_apply = globs.iter().any(|glob| glob == ALL_FILES);
        if always_apply {
            globs.clear();
        }
        Ok(CanonicalRule {
            title,
            description,
            globs,
            always_apply,
            body,
            extra: side_bag(header, self.client()),
        })
    }

    fn generate(&self, rule: &CanonicalRule) -> Result<String> {
        let mut header = Mapping::new();
        if let Some(title) = &rule.title {
            header.insert("name".into(), title.as_str().into());
        }
        if let Some(description) = &rule.description {
            header.insert("description".into(), description.as_str().into());
        }
        if rule.always_apply && rule.globs.is_empty() {
            header.insert("applyTo".into(), ALL_FILES.into());
        } else if !rule.globs.is_empty() {
            header.insert("applyTo".into(), rule.globs.join(",").into());
        }
        emit(header, rule, self.client())
    }
}
