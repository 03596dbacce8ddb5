use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Failure while expanding placeholders in a config file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// Placeholder refers to an unset variable and has no default
    #[error("environment variable not found: `{0}` (line {1})")]
    Missing(String, usize),
    /// Placeholder is scoped to something other than `env.`
    #[error("only variables scoped with 'env.' are supported: `{0}` (line {1})")]
    UnsupportedScope(String, usize),
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `{{ env.VAR }}` or `{{ env.VAR | default("fallback") }}`
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// API keys normally live in the environment rather than in the file, so
/// `api_key = "{{ env.OPENAI_API_KEY }}"` is the expected pattern. Comment
/// lines are left untouched so a commented-out provider never forces its
/// variable to exist.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut lines = Vec::new();

    for (number, line) in input.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
            continue;
        }
        lines.push(expand_line(line, number + 1)?);
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }
    Ok(output)
}

fn expand_line(line: &str, number: usize) -> Result<String, ExpandError> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |captures: &Captures<'_>| {
        let key = &captures[1];
        let default = captures.get(2).map(|m| m.as_str());

        let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
            failure.get_or_insert(ExpandError::UnsupportedScope(key.to_owned(), number));
            return String::new();
        };

        match (std::env::var(var_name), default) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_owned(),
            (Err(_), None) => {
                failure.get_or_insert(ExpandError::Missing(var_name.to_owned(), number));
                String::new()
            }
        }
    });

    match failure {
        Some(error) => Err(error),
        None => Ok(expanded.into_owned()),
    }
}
