#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::backup_configuration::BackupConfigurationSpec;
use super::repository::RepositorySpec;

/// A parameterized template from which `Repository`+`BackupConfiguration` are
/// materialized by the Blueprint Resolver (§4.C). Embedded specs carry
/// `${VAR}`/`${VAR:=default}` placeholders in their string fields, so they are
/// stored here as opaque JSON rather than the strongly typed specs: a
/// placeholder like `${BUCKET}` is not valid UTF-8 for, say, a `garde::url`
/// check, and must survive templating before being parsed into a concrete
/// [`RepositorySpec`]/[`BackupConfigurationSpec`].
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "stash.appscode.com",
    version = "v1alpha1",
    kind = "BackupBlueprint",
    plural = "backupblueprints",
    shortname = "bb",
    printcolumn = r#"{"name":"Task", "type":"string", "jsonPath":".spec.backupConfigurationTemplate.target.ref.kind"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BackupBlueprintSpec {
    #[garde(skip)]
    pub repository_template: serde_json::Value,
    #[garde(skip)]
    pub backup_configuration_template: serde_json::Value,
}

/// A [`BackupBlueprint`] resolved into a concrete, template-free pair.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResolvedBlueprint {
    pub repository: RepositorySpec,
    pub backup_configuration: BackupConfigurationSpec,
}
