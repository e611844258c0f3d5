//! Prompt syntax conversion between clients
//!
//! Prompts are authored in Claude Code syntax. Other clients spell the same
//! few placeholders differently; conversion is a fixed set of token
//! substitutions, not a template language.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::client::ClientId;

const CLAUDE_ARGS: &str = "$ARGUMENTS";
const GEMINI_ARGS: &str = "{{args}}";
const COPILOT_ARGS: &str = "${input:args}";

/// `` !`git status` `` in Claude Code
static CLAUDE_SHELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!`([^`\n]+)`").expect("valid regex"));

/// `!{git status}` in Gemini CLI
static GEMINI_SHELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\{([^}\n]+)\}").expect("valid regex"));

/// Convert prompt text written for `from` into the syntax of `to`
pub fn convert(text: &str, from: ClientId, to: ClientId) -> String {
    if from == to {
        return text.to_string();
    }
    from_canonical(&to_canonical(text, from), to)
}

/// Rewrite client syntax into Claude Code syntax
pub fn to_canonical(text: &str, from: ClientId) -> String {
    match from {
        ClientId::ClaudeCode | ClientId::Cursor => text.to_string(),
        ClientId::Gemini => {
            let text = text.replace(GEMINI_ARGS, CLAUDE_ARGS);
            GEMINI_SHELL.replace_all(&text, "!`$1`").into_owned()
        }
        ClientId::Copilot => text.replace(COPILOT_ARGS, CLAUDE_ARGS),
    }
}

/// Rewrite Claude Code syntax into client syntax
pub fn from_canonical(text: &str, to: ClientId) -> String {
    match to {
        ClientId::ClaudeCode | ClientId::Cursor => text.to_string(),
        ClientId::Gemini => {
            let text = text.replace(CLAUDE_ARGS, GEMINI_ARGS);
            CLAUDE_SHELL.replace_all(&text, "!{$1}").into_owned()
        }
        ClientId::Copilot => text.replace(CLAUDE_ARGS, COPILOT_ARGS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_to_gemini() {
        let text = "Review $ARGUMENTS.\nStatus: !`git status --short`";
        assert_eq!(
            from_canonical(text, ClientId::Gemini),
            "Review {{args}}.\nStatus: !{git status --short}"
        );
    }

    #[test]
    fn test_gemini_to_claude() {
        let text = "Fix {{args}} using !{cargo check}";
        assert_eq!(
            to_canonical(text, ClientId::Gemini),
            "Fix $ARGUMENTS using !`cargo check`"
        );
    }

    #[test]
    fn test_gemini_to_copilot() {
        assert_eq!(
            convert("Explain {{args}}", ClientId::Gemini, ClientId::Copilot),
            "Explain ${input:args}"
        );
    }

    #[test]
    fn test_cursor_is_identity() {
        let text = "Do $ARGUMENTS with !`ls`";
        assert_eq!(convert(text, ClientId::ClaudeCode, ClientId::Cursor), text);
    }
}
