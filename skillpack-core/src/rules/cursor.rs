//! Cursor project rules: `.cursor/rules/{name}.mdc`
//!
//! `globs` is a single comma-separated string and `alwaysApply` is explicit.

use serde_yaml_ng::{Mapping, Value};
use std::path::Path;

use super::{emit, header, side_bag, slash_path, split, take_globs, take_string};
use super::{CanonicalRule, RuleFormat};
use crate::client::ClientId;
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct CursorRules;

impl RuleFormat for CursorRules {
    fn client(&self) -> ClientId {
        ClientId::Cursor
    }

    fn file_name(&self, name: &str) -> String {
        format!("{name}.mdc")
    }

    fn matches_path(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "mdc")
            || slash_path(path).contains(".cursor/rules/")
    }

    fn matches_content(&self, content: &str) -> bool {
        header(content).is_some_and(|h| h.contains_key("alwaysApply") || h.contains_key("globs"))
    }

    fn parse(&self, content: &str) -> Result<CanonicalRule> {
        let (mut header, body) = split(content)?;
        let description = take_string(&mut header, "description");
        let globs = take_globs(&mut header, "globs");
        let always_apply = match header.remove("alwaysApply") {
            Some(Value::Bool(value)) => value,
            Some(Value::String(value)) => value.eq_ignore_ascii_case("true"),
            _ => false,
        };
        Ok(CanonicalRule {
            title: None,
            description,
            globs,
            always_apply,
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
            header.insert("globs".into(), rule.globs.join(",").into());
        }
        header.insert("alwaysApply".into(), Value::Bool(rule.always_apply));
        emit(header, rule, self.client())
    }
}
