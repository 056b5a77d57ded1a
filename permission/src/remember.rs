//! Remember-rule synthesis (spec.md §4.1 "Remember-rule synthesis").

use codelia_protocol::PermissionRule;

use crate::segment::Segment;

const WRAPPER_TOKENS: &[&str] = &[
    "env", "command", "builtin", "nohup", "time", "sudo", "nice", "ionice", "chrt", "timeout", "stdbuf",
];

const TWO_TOKEN_PRIMARIES: &[&str] = &[
    "git", "jj", "bun", "bunx", "npx", "npm", "pnpm", "yarn", "cargo", "go", "docker", "kubectl", "gh",
];

/// primary -> sub-exec second tokens that extend the rule to three tokens.
fn sub_exec_second_tokens(primary: &str) -> Option<&'static [&'static str]> {
    match primary {
        "npx" | "bunx" => Some(&["*"]),
        "bun" => Some(&["x"]),
        "npm" => Some(&["exec"]),
        "pnpm" => Some(&["dlx", "exec"]),
        "yarn" => Some(&["dlx"]),
        _ => None,
    }
}

/// Build the remember-rule for a non-`cd` bash segment, per spec.md §4.1.
/// `cd` segments are never remembered (returns `None`).
pub fn remember_bash_segment(segment: &Segment) -> Option<PermissionRule> {
    if segment.is_cd() {
        return None;
    }
    let mut tokens: Vec<&str> = segment.words.iter().map(String::as_str).collect();

    // Strip leading ENV=value assignments.
    while let Some(first) = tokens.first() {
        if is_env_assignment(first) {
            tokens.remove(0);
        } else {
            break;
        }
    }
    // Drop wrapper tokens.
    while let Some(first) = tokens.first() {
        if WRAPPER_TOKENS.contains(first) {
            tokens.remove(0);
        } else {
            break;
        }
    }

    let primary = *tokens.first()?;
    let mut rule_tokens = vec![primary.to_string()];

    if let Some(second) = tokens.get(1) {
        let is_two_token_primary = TWO_TOKEN_PRIMARIES.contains(&primary) && is_valid_second_token(second);
        if is_two_token_primary {
            rule_tokens.push((*second).to_string());
            if let Some(allowed_thirds) = sub_exec_second_tokens(primary) {
                if allowed_thirds.contains(&"*") || allowed_thirds.contains(second) {
                    if let Some(third) = tokens.get(2) {
                        rule_tokens.push((*third).to_string());
                    }
                }
            }
        }
    }

    Some(PermissionRule::bash_prefix(rule_tokens.join(" ")))
}

/// Non-bash remember-rule synthesis: `skill_load` remembers by skill name,
/// everything else remembers by tool name alone.
pub fn remember_tool(tool: &str, raw_args: &serde_json::Value) -> PermissionRule {
    if tool == "skill_load" {
        if let Some(name) = crate::rules::skill_name_from_args(raw_args) {
            return PermissionRule {
                tool: "skill_load".to_string(),
                command: None,
                command_glob: None,
                skill_name: Some(name),
            };
        }
    }
    PermissionRule::for_tool(tool)
}

/// Dedup rules, preserving first-seen order.
pub fn dedup_rules(rules: Vec<PermissionRule>) -> Vec<PermissionRule> {
    let mut seen = std::collections::HashSet::new();
    rules.into_iter().filter(|r| seen.insert(r.clone())).collect()
}

fn is_env_assignment(token: &str) -> bool {
    let Some(eq) = token.find('=') else {
        return false;
    };
    let (name, _) = token.split_at(eq);
    !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_second_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'))
}
