#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::Target;

/// One rule of a `RestoreSession`'s ordered rule list. First match on `hosts` wins;
/// an empty `hosts` is a wildcard and MUST be the last rule (invariant 6, §8).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RestoreRule {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_host: Option<String>,
    #[serde(default)]
    pub snapshots: Vec<String>,
    #[garde(length(min = 1))]
    pub paths: Vec<String>,
}

impl RestoreRule {
    /// True for the implicit catch-all rule.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Validates that only the final rule (if any) is a wildcard.
fn validate_rules(rules: &[RestoreRule], _ctx: &()) -> garde::Result {
    if let Some(pos) = rules.iter().position(RestoreRule::is_wildcard) {
        if pos != rules.len() - 1 {
            return Err(garde::Error::new(
                "a wildcard rule (empty hosts) must be the last rule; rules after it are unreachable",
            ));
        }
    }
    Ok(())
}

/// Symmetric counterpart to `BackupSession`: restores a target from stored snapshots.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "stash.appscode.com",
    version = "v1alpha1",
    kind = "RestoreSession",
    plural = "restoresessions",
    namespaced,
    status = "RestoreSessionStatus",
    shortname = "restore",
    printcolumn = r#"{"name":"Repository", "type":"string", "jsonPath":".spec.repository"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RestoreSessionSpec {
    #[garde(dive)]
    pub target: Target,
    pub repository: String,
    #[garde(custom(validate_rules))]
    pub rules: Vec<RestoreRule>,
}

/// Phases of the Restore Controller state machine, mirroring `SessionPhase` (§4.H).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum RestorePhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl RestorePhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Per-host restore outcome.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RestoreHostStats {
    pub hostname: String,
    #[serde(default)]
    pub phase: RestorePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated target status.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RestoreTargetStatus {
    #[serde(default)]
    pub stats: Vec<RestoreHostStats>,
}

/// Status subresource of [`RestoreSession`].
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RestoreSessionStatus {
    #[serde(default)]
    pub phase: RestorePhase,
    #[serde(default)]
    pub target_status: RestoreTargetStatus,
}

/// Selects the first matching rule for a given hostname. `None` hostname (restoring without
/// a known host identity yet) only ever matches a wildcard rule.
#[must_use]
pub fn select_rule<'a>(rules: &'a [RestoreRule], hostname: &str) -> Option<&'a RestoreRule> {
    rules
        .iter()
        .find(|rule| rule.is_wildcard() || rule.hosts.iter().any(|h| h == hostname))
}

#[cfg(test)]
mod test {
    use super::*;

    fn rule(hosts: &[&str], paths: &[&str]) -> RestoreRule {
        RestoreRule {
            hosts: hosts.iter().map(|s| (*s).to_owned()).collect(),
            source_host: None,
            snapshots: vec![],
            paths: paths.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![rule(&["h1"], &["/a"]), rule(&[], &["/b"])];
        assert_eq!(validate_rules(&rules, &()), Ok(()));
        let picked = select_rule(&rules, "h2").unwrap();
        assert_eq!(picked.paths, vec!["/b".to_owned()]);
    }

    #[test]
    fn wildcard_must_be_last() {
        let rules = vec![rule(&[], &["/b"]), rule(&["h1"], &["/a"])];
        assert!(validate_rules(&rules, &()).is_err());
    }
}
