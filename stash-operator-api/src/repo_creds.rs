//! Shared glue for resolving a `Repository` name into the pieces the Engine
//! Driver needs: its dialed repo-URL string and its encryption password, read
//! out of the repository's storage secret (§4.B, §6). Shared between the
//! operator's Session/Restore Controllers and the sidecar's own backup/restore
//! execution, since both invoke the same Engine Driver directly.

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use stash_api::v1alpha1::repository::{Backend, Repository};

use crate::blob::PASSWORD;
use crate::error::{Result, StashError};

/// Maps a [`Backend`] onto the repository URL string the Engine Driver passes
/// to its subprocess's `-r`/`--repo` flag, following restic's own URL grammar
/// (`s3:`, `gs:`, `azure:`, `swift:`, `b2:`, `rest:`, or a bare filesystem path).
#[must_use]
pub fn repo_url(backend: &Backend) -> String {
    match backend {
        Backend::S3 {
            endpoint,
            bucket,
            prefix,
            ..
        } => format!("s3:https://{endpoint}/{bucket}/{prefix}"),
        Backend::Gcs { bucket, prefix } => format!("gs:{bucket}:/{prefix}"),
        Backend::Azure { container, prefix } => format!("azure:{container}:/{prefix}"),
        Backend::Swift { container, prefix } => format!("swift:{container}:/{prefix}"),
        Backend::B2 { bucket, prefix } => format!("b2:{bucket}:/{prefix}"),
        Backend::Rest { url } => format!("rest:{url}"),
        Backend::Local { path, .. } => path.clone(),
    }
}

/// Looks up `repository_name` and its storage secret, returning the repo URL
/// string and decryption password.
pub async fn load(client: &Client, namespace: &str, repository_name: &str) -> Result<(String, String)> {
    let repo_api: Api<Repository> = Api::namespaced(client.clone(), namespace);
    let repo = repo_api.get(repository_name).await.map_err(StashError::from)?;
    let password = secret_password(client, namespace, repo.spec.storage_secret_name.as_deref()).await?;
    Ok((repo_url(&repo.spec.backend), password))
}

/// Looks up `repository_name`'s `Backend` alone, for callers (Workload
/// Mutator wiring) that need the backend shape rather than the engine URL.
pub async fn backend(client: &Client, namespace: &str, repository_name: &str) -> Result<Backend> {
    let repo_api: Api<Repository> = Api::namespaced(client.clone(), namespace);
    let repo = repo_api.get(repository_name).await.map_err(StashError::from)?;
    Ok(repo.spec.backend)
}

async fn secret_password(client: &Client, namespace: &str, secret_name: Option<&str>) -> Result<String> {
    let name = secret_name.ok_or_else(|| StashError::config("repository has no storageSecretName"))?;
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = api.get(name).await.map_err(StashError::from)?;
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(PASSWORD))
        .map(|v| String::from_utf8_lossy(&v.0).into_owned())
        .ok_or_else(|| StashError::config("repository secret is missing the password key"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn s3_url_matches_restic_grammar() {
        let backend = Backend::S3 {
            endpoint: "s3.amazonaws.com".to_owned(),
            bucket: "my-bucket".to_owned(),
            prefix: "stash".to_owned(),
            region: None,
        };
        assert_eq!(repo_url(&backend), "s3:https://s3.amazonaws.com/my-bucket/stash");
    }

    #[test]
    fn local_url_is_the_bare_path() {
        let backend = Backend::Local {
            volume_source: k8s_openapi::api::core::v1::VolumeSource::default(),
            path: "/safe-data/repo".to_owned(),
        };
        assert_eq!(repo_url(&backend), "/safe-data/repo");
    }
}
