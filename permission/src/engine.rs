//! `PermissionEngine::evaluate` — the decision trees from spec.md §4.1.

use codelia_protocol::RuleSet;

use crate::decision::Decision;
use crate::decision::Evaluation;
use crate::error::PermissionError;
use crate::guard::BashPathGuard;
use crate::guard::CdCheck;
use crate::remember::dedup_rules;
use crate::remember::remember_bash_segment;
use crate::remember::remember_tool;
use crate::rules::rule_matches_segment;
use crate::rules::rule_matches_tool;
use crate::rules::rule_matches_whole_command;
use crate::segment::split_segments;
use crate::tokenize::normalize_whitespace;

pub struct PermissionEngine<'a> {
    pub rules: &'a RuleSet,
    pub guard: Option<&'a BashPathGuard>,
}

impl<'a> PermissionEngine<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules, guard: None }
    }

    pub fn with_guard(rules: &'a RuleSet, guard: &'a BashPathGuard) -> Self {
        Self { rules, guard: Some(guard) }
    }

    /// Pure, deterministic, side-effect-free evaluation (spec.md §4.1).
    /// Malformed `raw_args` degrade to `Confirm`, never `Deny` (spec.md §7).
    pub fn evaluate(&self, tool: &str, raw_args: &serde_json::Value) -> Evaluation {
        if tool == "bash" {
            match self.evaluate_bash(raw_args) {
                Ok(evaluation) => evaluation,
                Err(_) => Evaluation {
                    decision: Decision::confirm("bash call missing a command string"),
                    remember: None,
                },
            }
        } else {
            self.evaluate_tool(tool, raw_args)
        }
    }

    fn evaluate_tool(&self, tool: &str, raw_args: &serde_json::Value) -> Evaluation {
        if self.rules.deny.iter().any(|r| rule_matches_tool(r, tool, raw_args)) {
            return Evaluation {
                decision: Decision::deny(format!("blocked by deny rule ({tool})")),
                remember: None,
            };
        }
        if self.rules.allow.iter().any(|r| rule_matches_tool(r, tool, raw_args)) {
            return Evaluation { decision: Decision::Allow, remember: None };
        }
        Evaluation {
            decision: Decision::confirm(format!("{tool} requires confirmation")),
            remember: Some(remember_tool(tool, raw_args)),
        }
    }

    fn evaluate_bash(&self, raw_args: &serde_json::Value) -> Result<Evaluation, PermissionError> {
        let command = raw_args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or(PermissionError::MissingCommand)?;
        let normalized_command = normalize_whitespace(command);

        if self
            .rules
            .deny
            .iter()
            .any(|r| rule_matches_whole_command(r, &normalized_command))
        {
            return Ok(Evaluation {
                decision: Decision::deny("blocked by deny rule (bash)"),
                remember: None,
            });
        }

        let segments = split_segments(&normalized_command);
        let has_cd = segments.iter().any(|s| s.is_cd());
        if !has_cd
            && self
                .rules
                .allow
                .iter()
                .any(|r| rule_matches_whole_command(r, &normalized_command))
        {
            return Ok(Evaluation { decision: Decision::Allow, remember: None });
        }

        let mut remembered = Vec::new();
        for segment in &segments {
            if self.rules.deny.iter().any(|r| rule_matches_segment(r, segment)) {
                return Ok(Evaluation {
                    decision: Decision::deny(format!("blocked by deny rule ({})", segment.normalized)),
                    remember: None,
                });
            }
            if segment.is_cd() {
                let Some(guard) = self.guard else {
                    return Ok(Evaluation {
                        decision: Decision::confirm(format!("segment requires confirmation ({})", segment.normalized)),
                        remember: None,
                    });
                };
                let target = segment.cd_target().unwrap_or_default();
                if guard.check_cd_target(target) == CdCheck::NeedsConfirm {
                    return Ok(Evaluation {
                        decision: Decision::confirm(format!("cd target requires confirmation ({target})")),
                        remember: None,
                    });
                }
                continue;
            }
            if self.rules.allow.iter().any(|r| rule_matches_segment(r, segment)) {
                continue;
            }
            if let Some(rule) = remember_bash_segment(segment) {
                remembered.push(rule);
            }
            return Ok(Evaluation {
                decision: Decision::confirm(format!("segment requires confirmation ({})", segment.normalized)),
                remember: remembered.pop(),
            });
        }

        Ok(Evaluation { decision: Decision::Allow, remember: None })
    }
}

/// Build the full set of remember-rules a caller would persist if a
/// multi-segment bash command were fully approved (used by callers that want
/// to remember every segment at once rather than one at a time).
pub fn remember_all_segments(command: &str) -> Vec<codelia_protocol::PermissionRule> {
    let normalized = normalize_whitespace(command);
    let rules = split_segments(&normalized)
        .iter()
        .filter_map(remember_bash_segment)
        .collect();
    dedup_rules(rules)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use codelia_protocol::PermissionRule;
    use serde_json::json;

    fn ruleset(allow: Vec<PermissionRule>, deny: Vec<PermissionRule>) -> RuleSet {
        RuleSet { allow, deny }
    }

    #[test]
    fn allow_rule_permits_matching_segment() {
        let rules = ruleset(vec![PermissionRule::bash_prefix("git status")], vec![]);
        let engine = PermissionEngine::new(&rules);
        let eval = engine.evaluate("bash", &json!({ "command": "git status" }));
        assert_eq!(eval.decision, Decision::Allow);
    }

    #[test]
    fn deny_rule_blocks_even_with_allow() {
        let rules = ruleset(
            vec![PermissionRule {
                tool: "bash".to_string(),
                command: None,
                command_glob: Some("rm *".to_string()),
                skill_name: None,
            }],
            vec![PermissionRule {
                tool: "bash".to_string(),
                command: None,
                command_glob: Some("rm -rf *".to_string()),
                skill_name: None,
            }],
        );
        let engine = PermissionEngine::new(&rules);
        let eval = engine.evaluate("bash", &json!({ "command": "rm -rf /" }));
        assert!(matches!(eval.decision, Decision::Deny { .. }));
    }

    #[test]
    fn unmatched_segment_confirms_with_remember_rule() {
        let rules = ruleset(vec![], vec![]);
        let engine = PermissionEngine::new(&rules);
        let eval = engine.evaluate("bash", &json!({ "command": "npx tsc --noEmit" }));
        assert!(matches!(eval.decision, Decision::Confirm { .. }));
        assert_eq!(eval.remember.unwrap().command.as_deref(), Some("npx tsc"));
    }

    #[test]
    fn malformed_bash_args_confirm_not_deny() {
        let rules = ruleset(vec![], vec![]);
        let engine = PermissionEngine::new(&rules);
        let eval = engine.evaluate("bash", &json!({}));
        assert!(matches!(eval.decision, Decision::Confirm { .. }));
    }

    #[test]
    fn non_bash_tool_decision_tree() {
        let rules = ruleset(vec![PermissionRule::for_tool("read_file")], vec![]);
        let engine = PermissionEngine::new(&rules);
        assert_eq!(
            engine.evaluate("read_file", &json!({})).decision,
            Decision::Allow
        );
        assert!(matches!(
            engine.evaluate("write_file", &json!({})).decision,
            Decision::Confirm { .. }
        ));
    }

    #[test]
    fn cd_outside_root_needs_confirm_without_guard() {
        let rules = ruleset(vec![], vec![]);
        let engine = PermissionEngine::new(&rules);
        let eval = engine.evaluate("bash", &json!({ "command": "cd /tmp && ls" }));
        assert!(matches!(eval.decision, Decision::Confirm { .. }));
    }

    #[test]
    fn cd_inside_root_with_guard_allows() {
        let rules = ruleset(vec![PermissionRule::bash_prefix("ls")], vec![]);
        let guard = BashPathGuard::new("/workspace/project", "/workspace/project");
        let engine = PermissionEngine::with_guard(&rules, &guard);
        let eval = engine.evaluate("bash", &json!({ "command": "cd src && ls" }));
        assert_eq!(eval.decision, Decision::Allow);
    }

    #[test]
    fn successive_cd_segments_resolve_against_the_previous_cds_landing_spot() {
        let rules = ruleset(vec![], vec![]);
        let guard = BashPathGuard::new("/workspace/project", "/workspace/project");
        let engine = PermissionEngine::with_guard(&rules, &guard);
        // `cd src` lands back inside root; `cd ..` from there returns to
        // root_dir itself, still contained. Only the third `cd ..` (which
        // would leave root_dir) should need confirmation.
        let eval = engine.evaluate("bash", &json!({ "command": "cd src && cd .." }));
        assert_eq!(eval.decision, Decision::Allow);

        let eval = engine.evaluate("bash", &json!({ "command": "cd .." }));
        assert!(matches!(eval.decision, Decision::Confirm { .. }));
    }

    #[test]
    fn remember_all_segments_dedups_across_pipeline() {
        let rules = remember_all_segments("git status && git status");
        assert_eq!(rules.len(), 1);
    }
}
