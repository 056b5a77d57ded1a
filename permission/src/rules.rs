//! Rule matching: prefix-on-token-stream or glob-on-normalized-string.

use codelia_protocol::PermissionRule;
use wildmatch::WildMatch;

use crate::segment::Segment;

/// Does `rule` match this bash segment? Either its `command` is a prefix of
/// the segment's token stream, or its `command_glob` matches the segment's
/// normalized text.
pub fn rule_matches_segment(rule: &PermissionRule, segment: &Segment) -> bool {
    if rule.tool != "bash" {
        return false;
    }
    if let Some(prefix) = &rule.command {
        let prefix_words: Vec<&str> = prefix.split_whitespace().collect();
        if !prefix_words.is_empty()
            && segment.words.len() >= prefix_words.len()
            && segment.words[..prefix_words.len()]
                .iter()
                .map(String::as_str)
                .eq(prefix_words.iter().copied())
        {
            return true;
        }
    }
    if let Some(glob) = &rule.command_glob {
        if WildMatch::new(glob).matches(&segment.normalized) {
            return true;
        }
    }
    false
}

/// Does `rule`'s `command_glob` match the whole normalized command string?
pub fn rule_matches_whole_command(rule: &PermissionRule, normalized_command: &str) -> bool {
    if rule.tool != "bash" {
        return false;
    }
    rule.command_glob
        .as_deref()
        .map(|glob| WildMatch::new(glob).matches(normalized_command))
        .unwrap_or(false)
}

/// Non-bash tool rule match: exact tool name, plus a `skill_load` special
/// case inspecting `raw_args.name`/`raw_args.path`'s leaf directory.
pub fn rule_matches_tool(rule: &PermissionRule, tool: &str, raw_args: &serde_json::Value) -> bool {
    if rule.tool != tool {
        return false;
    }
    if tool == "skill_load" {
        let Some(pattern) = &rule.skill_name else {
            return false;
        };
        return skill_name_from_args(raw_args).as_deref() == Some(pattern.as_str());
    }
    true
}

/// `^[a-z0-9]+(-[a-z0-9]+)*$` normalized skill name, from `name` or the leaf
/// directory of `path`.
pub fn skill_name_from_args(raw_args: &serde_json::Value) -> Option<String> {
    let candidate = raw_args
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| {
            raw_args.get("path").and_then(|v| v.as_str()).map(|p| {
                p.trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or(p)
                    .to_string()
            })
        })?;
    if is_normalized_skill_name(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

fn is_normalized_skill_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut segments = name.split('-');
    segments.all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::segment::split_segments;

    #[test]
    fn prefix_matches_segment() {
        let rule = PermissionRule::bash_prefix("git status");
        let segments = split_segments("git status -s");
        assert!(rule_matches_segment(&rule, &segments[0]));
    }

    #[test]
    fn prefix_does_not_match_different_command() {
        let rule = PermissionRule::bash_prefix("git status");
        let segments = split_segments("git log");
        assert!(!rule_matches_segment(&rule, &segments[0]));
    }

    #[test]
    fn glob_matches_segment() {
        let rule = PermissionRule {
            tool: "bash".to_string(),
            command: None,
            command_glob: Some("rm *".to_string()),
            skill_name: None,
        };
        let segments = split_segments("rm -rf /tmp/x");
        assert!(rule_matches_segment(&rule, &segments[0]));
    }

    #[test]
    fn skill_name_validation() {
        assert!(is_normalized_skill_name("code-review"));
        assert!(is_normalized_skill_name("deploy"));
        assert!(!is_normalized_skill_name("Code-Review"));
        assert!(!is_normalized_skill_name("-deploy"));
        assert!(!is_normalized_skill_name(""));
    }

    #[test]
    fn skill_name_from_path_leaf() {
        let args = serde_json::json!({ "path": "/skills/code-review/" });
        assert_eq!(skill_name_from_args(&args), Some("code-review".to_string()));
    }
}
