//! `PermissionRule` data shape (spec.md §3, §4.1). Matching is implemented
//! in `codelia-permission`; this crate only carries the data.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRule {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_name: Option<String>,
}

impl PermissionRule {
    pub fn for_tool(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            command: None,
            command_glob: None,
            skill_name: None,
        }
    }

    pub fn bash_prefix(command: impl Into<String>) -> Self {
        Self {
            tool: "bash".to_string(),
            command: Some(command.into()),
            command_glob: None,
            skill_name: None,
        }
    }
}

/// The ruleset partitioned into allow/deny, per spec.md §3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub allow: Vec<PermissionRule>,
    #[serde(default)]
    pub deny: Vec<PermissionRule>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}
