//! Claude Code rules: `.claude/rules/{name}.md`
//!
//! ```markdown
//! ---
//! description: API conventions
//! paths:
//!   - services/api/**
//! ---
//! ```
//!
//! A rule without `paths` is always loaded.

use serde_yaml_ng::{Mapping, Value};
use std::path::Path;

use super::{emit, header, side_bag, slash_path, split, take_globs, take_string};
use super::{CanonicalRule, RuleFormat};
use crate::client::ClientId;
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeRules;

impl RuleFormat for ClaudeRules {
    fn client(&self) -> ClientId {
        ClientId::ClaudeCode
    }

    fn file_name(&self, name: &str) -> String {
        format!("{name}.md")
    }

    fn matches_path(&self, path: &Path) -> bool {
        slash_path(path).contains(".claude/rules/")
            && path.extension().is_some_and(|ext| ext == "md")
    }

    fn matches_content(&self, content: &str) -> bool {
        header(content).is_some_and(|h| h.contains_key("paths"))
    }

    fn parse(&self, content: &str) -> Result<CanonicalRule> {
        let (mut header, body) = split(content)?;
        let description = take_string(&mut header, "description");
        let globs = take_globs(&mut header, "paths");
        Ok(CanonicalRule {
            title: None,
            description,
            always_apply: globs.is_empty(),
            globs,
            body,
            extra: side_bag(header, self.client()),
        })
    }

    fn generate(&self, rule: &CanonicalRule) -> Result<String> {
        let mut header = Mapping::new();
        if let Some(description) = &rule.description {
            header.insert("description".into(), description.as_str().into());
        }
        if !rule.globs.is_empty() {
            let paths = rule
                .globs
                .iter()
                .map(|glob| Value::String(glob.clone()))
                .collect();
            header.insert("paths".into(), Value::Sequence(paths));
        }
        emit(header, rule, self.client())
    }
}
