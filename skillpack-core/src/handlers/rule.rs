//! Rendering canonical rule assets into a client's rule dialect

use serde_yaml_ng::Value;

use crate::bundle::Bundle;
use crate::client::ClientId;
use crate::frontmatter;
use crate::metadata::Metadata;
use crate::rules::{self, CanonicalRule};
use crate::{Result, SkillpackError};

/// Build the canonical rule for `client`, applying its overrides.
///
/// Fields from `[rule]` win over the prompt file's own header, and the
/// client override wins over both.
pub fn canonical_rule(metadata: &Metadata, bundle: &Bundle, client: ClientId) -> Result<CanonicalRule> {
    let config = metadata.rule.clone().unwrap_or_default();
    let prompt_file = metadata.prompt_file().unwrap_or(crate::metadata::DEFAULT_RULE_FILE);
    let text = bundle.read_to_string(prompt_file)?;
    let (header, body) = frontmatter::split(&text)?;
    let header = header.unwrap_or_default();
    let header_string = |key: &str| header.get(key).and_then(Value::as_str).map(str::to_string);

    let overrides = config.clients.get(client.as_str());

    let description = overrides
        .and_then(|o| o.description.clone())
        .or(config.description)
        .or_else(|| header_string("description"))
        .or_else(|| metadata.asset.description.clone());
    let globs = overrides
        .and_then(|o| o.globs.clone())
        .unwrap_or(config.globs);
    let always_apply = overrides
        .and_then(|o| o.always_apply)
        .unwrap_or(globs.is_empty());

    Ok(CanonicalRule {
        title: config.title.or_else(|| Some(metadata.name().to_string())),
        description,
        globs,
        always_apply,
        body: body.to_string(),
        extra: Default::default(),
    })
}

/// Single-file renderer for rule assets
pub fn render_rule(metadata: &Metadata, bundle: &Bundle, client: ClientId) -> Result<String> {
    let format = rules::format_for(client).ok_or_else(|| SkillpackError::Unsupported {
        client,
        asset_type: metadata.asset_type().clone(),
    })?;
    format.generate(&canonical_rule(metadata, bundle, client)?)
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;
    use crate::rules::RuleFormat;

    const META: &str = r#"
[asset]
name = "rust-style"
version = "1.0.0"
type = "rule"
description = "Rust conventions"

[rule]
globs = ["**/*.rs"]

[rule.clients.cursor]
always-apply = true
globs = []
"#;

    #[test]
    fn test_claude_rule_uses_globs() {
        let bundle = test_support::bundle(META, &[("RULE.md", "Run clippy.\n")]);
        let metadata = bundle.metadata().unwrap();
        let text = render_rule(&metadata, &bundle, ClientId::ClaudeCode).unwrap();
        let rule = rules::ClaudeRules.parse(&text).unwrap();
        assert_eq!(rule.globs, vec!["**/*.rs"]);
        assert_eq!(rule.description.as_deref(), Some("Rust conventions"));
        assert_eq!(rule.body, "Run clippy.\n");
    }

    #[test]
    fn test_client_override_applies() {
        let bundle = test_support::bundle(META, &[("RULE.md", "Run clippy.\n")]);
        let metadata = bundle.metadata().unwrap();
        let rule = canonical_rule(&metadata, &bundle, ClientId::Cursor).unwrap();
        assert!(rule.always_apply);
        assert!(rule.globs.is_empty());
    }

    #[test]
    fn test_prompt_header_description_fallback() {
        let meta = "[asset]\nname = \"r\"\nversion = \"1.0.0\"\ntype = \"rule\"\n\n[rule]\n";
        let bundle = test_support::bundle(
            meta,
            &[("RULE.md", "---\ndescription: From header\n---\n\nBody\n")],
        );
        let metadata = bundle.metadata().unwrap();
        let rule = canonical_rule(&metadata, &bundle, ClientId::Copilot).unwrap();
        assert_eq!(rule.description.as_deref(), Some("From header"));
        assert_eq!(rule.title.as_deref(), Some("r"));
        assert_eq!(rule.body, "Body\n");
    }

    #[test]
    fn test_gemini_has_no_rule_file() {
        let bundle = test_support::bundle(META, &[("RULE.md", "x")]);
        let metadata = bundle.metadata().unwrap();
        assert!(render_rule(&metadata, &bundle, ClientId::Gemini).is_err());
    }
}
