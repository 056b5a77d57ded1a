//! Bash command segmentation (spec.md §4.1 step 3–4): split on `| || && ; |&`,
//! quote/escape aware, with redirect targets dropped from the token stream.

use crate::tokenize::Token;
use crate::tokenize::scan;

const SEGMENT_OPERATORS: &[&str] = &["|", "||", "&&", ";", "|&"];

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Words only; redirect targets and operators are excluded.
    pub words: Vec<String>,
    /// `words` joined with single spaces — used for glob matching.
    pub normalized: String,
}

impl Segment {
    pub fn is_cd(&self) -> bool {
        self.words.first().map(String::as_str) == Some("cd")
    }

    pub fn cd_target(&self) -> Option<&str> {
        if self.is_cd() {
            self.words.get(1).map(String::as_str)
        } else {
            None
        }
    }
}

/// Split `command` into ordered segments. Redirect targets are dropped from
/// the per-segment word stream but do not act as segment separators.
pub fn split_segments(command: &str) -> Vec<Segment> {
    let tokens = scan(command);
    let mut segments = Vec::new();
    let mut words = Vec::new();

    for token in tokens {
        match token {
            Token::Word(w) => words.push(w),
            Token::Redirect { .. } => { /* dropped from the command stream */ }
            Token::Operator(op) if SEGMENT_OPERATORS.contains(&op.as_str()) => {
                segments.push(finish_segment(std::mem::take(&mut words)));
            }
            Token::Operator(_) => words.push(String::new()),
        }
    }
    segments.push(finish_segment(words));
    segments.into_iter().filter(|s| !s.words.is_empty()).collect()
}

fn finish_segment(words: Vec<String>) -> Segment {
    let normalized = words.join(" ");
    Segment { words, normalized }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn splits_on_and_and_drops_redirect_targets() {
        let segments = split_segments("git status && rm -rf / > /dev/null");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].normalized, "git status");
        assert_eq!(segments[1].normalized, "rm -rf /");
    }

    #[test]
    fn recognizes_cd_segment() {
        let segments = split_segments("cd /tmp && ls");
        assert!(segments[0].is_cd());
        assert_eq!(segments[0].cd_target(), Some("/tmp"));
        assert!(!segments[1].is_cd());
    }

    #[test]
    fn pipe_and_semicolon_split() {
        let segments = split_segments("cat foo | wc -l; echo done");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].normalized, "cat foo");
        assert_eq!(segments[1].normalized, "wc -l");
        assert_eq!(segments[2].normalized, "echo done");
    }
}
