#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use k8s_openapi::api::core::v1::VolumeSource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Object-storage backend a [`Repository`] points at. Exactly one variant is populated,
/// enforced by the untagged encoding plus the `Repository::validate_backend` check below.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    S3 {
        #[garde(skip)]
        endpoint: String,
        #[garde(pattern(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$"))]
        #[schemars(regex(pattern = r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$"))]
        bucket: String,
        #[garde(skip)]
        prefix: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        #[garde(skip)]
        region: Option<String>,
    },
    Gcs {
        #[garde(skip)]
        bucket: String,
        #[garde(skip)]
        prefix: String,
    },
    Azure {
        #[garde(skip)]
        container: String,
        #[garde(skip)]
        prefix: String,
    },
    Swift {
        #[garde(skip)]
        container: String,
        #[garde(skip)]
        prefix: String,
    },
    B2 {
        #[garde(skip)]
        bucket: String,
        #[garde(skip)]
        prefix: String,
    },
    Rest {
        #[garde(url)]
        url: String,
    },
    Local {
        #[garde(skip)]
        volume_source: VolumeSource,
        #[garde(skip)]
        path: String,
    },
}

impl Backend {
    /// Short provider tag used in log lines and repository URLs handed to the engine driver.
    #[must_use]
    pub fn provider(&self) -> &'static str {
        match *self {
            Self::S3 { .. } => "s3",
            Self::Gcs { .. } => "gcs",
            Self::Azure { .. } => "azure",
            Self::Swift { .. } => "swift",
            Self::B2 { .. } => "b2",
            Self::Rest { .. } => "rest",
            Self::Local { .. } => "local",
        }
    }
}

/// Persistent handle to a remote (or local) deduplicated dataset.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "stash.appscode.com",
    version = "v1alpha1",
    kind = "Repository",
    plural = "repositories",
    namespaced,
    status = "RepositoryStatus",
    shortname = "repo",
    printcolumn = r#"{"name":"Backend", "type":"string", "jsonPath":".spec.backend"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RepositorySpec {
    #[garde(dive)]
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub storage_secret_name: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub wipe_out: bool,
}

/// Status subresource of [`Repository`].
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, Validate)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct RepositoryStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub integrity: Option<bool>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub snapshot_count: Option<i64>,
    #[serde(default)]
    pub last_backup_time: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn s3_backend_round_trips() {
        let backend = Backend::S3 {
            endpoint: "s3.amazonaws.com".to_owned(),
            bucket: "my-bucket".to_owned(),
            prefix: "stash".to_owned(),
            region: None,
        };
        let json = serde_json::to_string(&backend).unwrap();
        let back: Backend = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider(), "s3");
    }

    #[test]
    fn bad_bucket_name_fails_validation() {
        let backend = Backend::S3 {
            endpoint: "s3.amazonaws.com".to_owned(),
            bucket: "NOT_VALID!!".to_owned(),
            prefix: String::new(),
            region: None,
        };
        assert!(Validate::validate(&backend, &()).is_err());
    }

    #[test]
    fn local_backend_round_trips() {
        let backend = Backend::Local {
            volume_source: VolumeSource::default(),
            path: "/safe-data/repo".to_owned(),
        };
        assert_eq!(backend.provider(), "local");
    }
}
