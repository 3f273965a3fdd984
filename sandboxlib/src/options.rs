use crate::types::JobOptions;
use std::collections::HashSet;

const HEADER_MARKER: char = '#';

/// Option names understood when no allow-list is configured.
pub const DEFAULT_ALLOWED_OPTIONS: &[&str] = &["REPO_A", "REPO_B", "COMMIT_A", "COMMIT_B"];

/// Extracts `#KEY value` directives from the leading comment header of a script.
///
/// The marker is stripped before the line is tokenised, so `#KEY value` and
/// `# KEY value` are the same directive. Parsing is best-effort: directives that
/// don't have exactly two tokens, or whose key is not allow-listed, are skipped. The first line not starting with `#` (an
/// empty line included) ends the header.
#[derive(Clone, Debug)]
pub struct OptionsParser {
    allowed: HashSet<String>,
}

impl Default for OptionsParser {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_OPTIONS.iter().copied())
    }
}

impl OptionsParser {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parse(&self, script: &[u8]) -> JobOptions {
        let mut options = JobOptions::new();
        let text = String::from_utf8_lossy(script);

        for line in text.lines() {
            let directive = match line.trim().strip_prefix(HEADER_MARKER) {
                Some(directive) => directive,
                None => break,
            };

            let mut tokens = directive.split_whitespace();
            if let (Some(key), Some(value), None) = (tokens.next(), tokens.next(), tokens.next()) {
                if self.allowed.contains(key) {
                    options.insert(key.to_string(), value.to_string());
                }
            }
        }

        options
    }
}
