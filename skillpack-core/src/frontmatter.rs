//! Markdown files with a YAML frontmatter header

use serde_yaml_ng::Mapping;

use crate::{Result, SkillpackError};

const FENCE: &str = "---";

/// Split `text` into its frontmatter mapping and body.
///
/// One newline between the closing fence and the body is treated as a
/// separator and dropped, matching what [`join`] writes.
pub fn split(text: &str) -> Result<(Option<Mapping>, &str)> {
    let Some(rest) = strip_fence_line(text) else {
        return Ok((None, text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            let mapping = if yaml.trim().is_empty() {
                Mapping::new()
            } else {
                serde_yaml_ng::from_str(yaml).map_err(|e| {
                    SkillpackError::validation(format!("Invalid frontmatter: {e}"))
                })?
            };
            return Ok((Some(mapping), body));
        }
        offset += line.len();
    }

    // Opening fence without a closing one: plain markdown
    Ok((None, text))
}

/// Render frontmatter and body. An empty mapping renders the body alone.
pub fn join(frontmatter: &Mapping, body: &str) -> Result<String> {
    if frontmatter.is_empty() {
        return Ok(body.to_string());
    }
    let yaml = serde_yaml_ng::to_string(frontmatter)?;
    Ok(format!("{FENCE}\n{yaml}{FENCE}\n\n{body}"))
}

fn strip_fence_line(text: &str) -> Option<&str> {
    text.strip_prefix("---\r\n")
        .or_else(|| text.strip_prefix("---\n"))
}
