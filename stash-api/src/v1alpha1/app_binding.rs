#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A pointer at a client secret plus connection parameters for a stateful
/// application the operator cannot mutate directly but can back up through an
/// addon function (§4.D "AppBinding" row).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct ClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ObjectMeta>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

/// External resource describing a stateful application the operator can back up
/// via an addon function, named but not elaborated by the core spec (§1, §4.D).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "stash.appscode.com",
    version = "v1alpha1",
    kind = "AppBinding",
    plural = "appbindings",
    namespaced,
    shortname = "app"
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct AppBindingSpec {
    #[garde(skip)]
    #[serde(default)]
    pub client_config: ClientConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub type_: Option<String>,
}
