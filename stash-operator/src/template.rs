//! The Blueprint Resolver's template substitution (§4.C). Placeholders use the
//! `${name}`/`${name:=default}` grammar of the original Go implementation
//! (`original_source`'s `os.Expand`-style templating), which is not
//! expressible with `tera`'s `{{ }}` delimiters, so this walks the JSON tree
//! itself with a `regex`-driven substitution — the same crate `stash-api`
//! already depends on for CRD field validation.

use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

use stash_operator_api::error::{Result, StashError};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:=([^}]*))?\}").unwrap_or_else(|e| {
            unreachable!("placeholder regex is a fixed literal: {e}")
        })
    })
}

/// Substitutes every `${name}`/`${name:=default}` occurrence in every string
/// leaf of `value`. A required placeholder (no `:=default`) with no matching
/// entry in `vars` is a `StashError::Config` (`ErrUnresolvedTemplate`).
pub(crate) fn resolve(value: &serde_json::Value, vars: &HashMap<&str, String>) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::String(s) => Ok(serde_json::Value::String(resolve_str(s, vars)?)),
        serde_json::Value::Array(items) => {
            let resolved: Result<Vec<_>> = items.iter().map(|v| resolve(v, vars)).collect();
            Ok(serde_json::Value::Array(resolved?))
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve(v, vars)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_str(input: &str, vars: &HashMap<&str, String>) -> Result<String> {
    let mut unresolved = None;
    let substituted = placeholder_re().replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        if let Some(value) = vars.get(name) {
            return value.clone();
        }
        if let Some(default) = caps.get(3) {
            return default.as_str().to_owned();
        }
        unresolved = Some(name.to_owned());
        String::new()
    });
    match unresolved {
        Some(name) => Err(StashError::config(format!(
            "unresolved template variable ${{{name}}}"
        ))),
        None => Ok(substituted.into_owned()),
    }
}

/// The fixed set of inputs the resolver feeds from the triggering workload (§4.C).
pub(crate) struct TemplateInputs<'a> {
    pub target_api_version: &'a str,
    pub target_kind: &'a str,
    pub target_name: &'a str,
    pub target_namespace: &'a str,
    pub target_app_version: &'a str,
}

impl<'a> TemplateInputs<'a> {
    pub(crate) fn as_map(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("TARGET_API_VERSION", self.target_api_version.to_owned()),
            ("TARGET_KIND", self.target_kind.to_owned()),
            ("TARGET_NAME", self.target_name.to_owned()),
            ("TARGET_NAMESPACE", self.target_namespace.to_owned()),
            ("TARGET_APP_VERSION", self.target_app_version.to_owned()),
        ])
    }
}

/// Deterministic name for blueprint-resolved `Repository`/`BackupConfiguration`
/// objects: `<lowercased-kind>-<workload-name>`.
#[must_use]
pub(crate) fn resolved_name(lowercased_kind: &str, workload_name: &str) -> String {
    format!("{lowercased_kind}-{workload_name}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn required_placeholder_resolves_from_vars() {
        let vars = HashMap::from([("BUCKET", "my-bucket".to_owned())]);
        let value = serde_json::json!({"bucket": "${BUCKET}"});
        let resolved = resolve(&value, &vars).unwrap();
        assert_eq!(resolved["bucket"], "my-bucket");
    }

    #[test]
    fn default_is_used_when_var_missing() {
        let vars = HashMap::new();
        let value = serde_json::json!("${PREFIX:=backups}");
        let resolved = resolve(&value, &vars).unwrap();
        assert_eq!(resolved, serde_json::json!("backups"));
    }

    #[test]
    fn missing_required_var_is_config_error() {
        let vars = HashMap::new();
        let value = serde_json::json!("${MISSING}");
        assert!(resolve(&value, &vars).is_err());
    }

    #[test]
    fn resolved_name_is_deterministic() {
        assert_eq!(resolved_name("deployment", "web"), "deployment-web");
    }
}
