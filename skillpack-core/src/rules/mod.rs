//! Rule files in each client's native markdown dialect
//!
//! All clients express a rule as markdown with a YAML header, but they name
//! the same concepts differently. [`CanonicalRule`] is the common model;
//! each [`RuleFormat`] parses its dialect into it and generates back out.
//! Header keys a dialect does not understand are kept in a per-client side
//! bag and re-emitted only by that same client.

mod claude;
mod copilot;
mod cursor;

pub use claude::ClaudeRules;
pub use copilot::CopilotRules;
pub use cursor::CursorRules;

use serde_yaml_ng::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::client::ClientId;
use crate::frontmatter;
use crate::{Result, SkillpackError};

/// Client-neutral rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRule {
    pub title: Option<String>,
    pub description: Option<String>,
    /// File globs the rule applies to
    pub globs: Vec<String>,
    /// Applies to every request regardless of files in context
    pub always_apply: bool,
    pub body: String,
    /// Unrecognized header keys, by the client they were read from
    pub extra: BTreeMap<ClientId, Mapping>,
}

impl CanonicalRule {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            always_apply: true,
            ..Default::default()
        }
    }
}

/// One client's rule dialect
pub trait RuleFormat: Send + Sync {
    fn client(&self) -> ClientId;

    /// File name for a rule called `name`
    fn file_name(&self, name: &str) -> String;

    /// Whether `path` lies where this client keeps rules
    fn matches_path(&self, path: &Path) -> bool;

    /// Whether the header looks like this client's dialect
    fn matches_content(&self, content: &str) -> bool;

    fn parse(&self, content: &str) -> Result<CanonicalRule>;

    fn generate(&self, rule: &CanonicalRule) -> Result<String>;
}

static CLAUDE: ClaudeRules = ClaudeRules;
static CURSOR: CursorRules = CursorRules;
static COPILOT: CopilotRules = CopilotRules;

/// Every dialect, in detection order
pub fn formats() -> [&'static dyn RuleFormat; 3] {
    [&CLAUDE, &CURSOR, &COPILOT]
}

/// Dialect of `client`, if it keeps rules as standalone markdown files
pub fn format_for(client: ClientId) -> Option<&'static dyn RuleFormat> {
    formats().into_iter().find(|format| format.client() == client)
}

/// Work out which client a rule file was written for.
///
/// The location decides when it is unambiguous; otherwise the header keys do.
pub fn detect_format(path: &Path, content: &str) -> Option<&'static dyn RuleFormat> {
    let by_path: Vec<&'static dyn RuleFormat> = formats()
        .into_iter()
        .filter(|format| format.matches_path(path))
        .collect();
    if let [only] = by_path.as_slice() {
        return Some(*only);
    }
    let candidates = if by_path.is_empty() {
        formats().to_vec()
    } else {
        by_path
    };
    candidates
        .into_iter()
        .find(|format| format.matches_content(content))
}

/// Rewrite a rule from one client's dialect into another's
pub fn convert(content: &str, from: ClientId, to: ClientId) -> Result<String> {
    let source = format_for(from).ok_or_else(|| unsupported(from))?;
    let target = format_for(to).ok_or_else(|| unsupported(to))?;
    let rule = source.parse(content)?;
    target.generate(&rule)
}

fn unsupported(client: ClientId) -> SkillpackError {
    SkillpackError::Unsupported {
        client,
        asset_type: crate::asset::AssetType::Rule,
    }
}

/// Header keys present in `content`, or none without a header
pub(crate) fn header(content: &str) -> Option<Mapping> {
    frontmatter::split(content).ok().and_then(|(fm, _)| fm)
}

/// Split `content` into the header and body, with an empty header by default
pub(crate) fn split(content: &str) -> Result<(Mapping, String)> {
    let (fm, body) = frontmatter::split(content)?;
    Ok((fm.unwrap_or_default(), body.to_string()))
}

/// Take a string-valued key out of the header
pub(crate) fn take_string(header: &mut Mapping, key: &str) -> Option<String> {
    match header.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => serde_yaml_ng::to_string(&other)
            .ok()
            .map(|s| s.trim().to_string()),
    }
}

/// Take a glob list that may be written as a YAML list or a comma-separated string
pub(crate) fn take_globs(header: &mut Mapping, key: &str) -> Vec<String> {
    match header.remove(key) {
        Some(Value::String(s)) => split_globs(&s),
        Some(Value::Sequence(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn split_globs(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Append this client's side bag after the known keys
pub(crate) fn emit(
    mut header: Mapping,
    rule: &CanonicalRule,
    client: ClientId,
) -> Result<String> {
    if let Some(extra) = rule.extra.get(&client) {
        for (key, value) in extra {
            if !header.contains_key(key) {
                header.insert(key.clone(), value.clone());
            }
        }
    }
    frontmatter::join(&header, &rule.body)
}

pub(crate) fn side_bag(header: Mapping, client: ClientId) -> BTreeMap<ClientId, Mapping> {
    let mut extra = BTreeMap::new();
    if !header.is_empty() {
        extra.insert(client, header);
    }
    extra
}

/// Path as forward-slash text for directory checks
pub(crate) fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CURSOR_RULE: &str = "---\ndescription: Rust conventions\nglobs: src/**/*.rs,tests/**/*.rs\nalwaysApply: false\n---\n\nPrefer `?` over `unwrap`.\n";

    #[test]
    fn test_detect_by_path() {
        let format = detect_format(Path::new("repo/.cursor/rules/rust.mdc"), "").unwrap();
        assert_eq!(format.client(), ClientId::Cursor);

        let format = detect_format(
            Path::new("repo/.github/instructions/rust.instructions.md"),
            "",
        )
        .unwrap();
        assert_eq!(format.client(), ClientId::Copilot);

        let format = detect_format(Path::new("repo/.claude/rules/rust.md"), "").unwrap();
        assert_eq!(format.client(), ClientId::ClaudeCode);
    }

    #[test]
    fn test_detect_by_content() {
        let format = detect_format(Path::new("rust.md"), CURSOR_RULE).unwrap();
        assert_eq!(format.client(), ClientId::Cursor);

        let copilot = "---\napplyTo: \"**/*.ts\"\n---\n\nUse strict mode.\n";
        let format = detect_format(Path::new("ts.md"), copilot).unwrap();
        assert_eq!(format.client(), ClientId::Copilot);

        assert!(detect_format(Path::new("notes.md"), "# Notes\n").is_none());
    }

    #[test]
    fn test_convert_cursor_to_claude() {
        let converted = convert(CURSOR_RULE, ClientId::Cursor, ClientId::ClaudeCode).unwrap();
        let rule = ClaudeRules.parse(&converted).unwrap();
        assert_eq!(rule.description.as_deref(), Some("Rust conventions"));
        assert_eq!(rule.globs, vec!["src/**/*.rs", "tests/**/*.rs"]);
        assert_eq!(rule.body, "Prefer `?` over `unwrap`.\n");
    }

    #[test]
    fn test_convert_claude_to_copilot_and_back() {
        let claude = "---\ndescription: API style\npaths:\n- services/api/**\n---\n\nReturn typed errors.\n";
        let copilot = convert(claude, ClientId::ClaudeCode, ClientId::Copilot).unwrap();
        assert!(copilot.contains("applyTo:"));
        assert_eq!(CopilotRules.parse(&copilot).unwrap().globs, vec!["services/api/**"]);

        let back = convert(&copilot, ClientId::Copilot, ClientId::ClaudeCode).unwrap();
        assert_eq!(
            ClaudeRules.parse(&back).unwrap(),
            ClaudeRules.parse(claude).unwrap()
        );
    }

    #[test]
    fn test_gemini_has_no_rule_files() {
        assert!(format_for(ClientId::Gemini).is_none());
        assert!(convert(CURSOR_RULE, ClientId::Cursor, ClientId::Gemini)
            .unwrap_err()
            .is_unsupported());
    }

    #[test]
    fn test_split_globs() {
        assert_eq!(split_globs(" a/**, ,b/*.rs "), vec!["a/**", "b/*.rs"]);
    }
}
