//! Builds and applies the `CronJob` that periodically creates a `BackupSession`
//! for one invoker (`BackupConfiguration` or `BackupBatch`). Grounded in the
//! teacher's `Patch::Apply`-against-a-freshly-built-object style for resources
//! the operator fully owns (§4.F).

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use stash_operator_api::error::{Result, StashError};

use crate::consts::{
    LABEL_DELETE_JOB_ON_COMPLETION, LABEL_INVOKER_KIND, LABEL_INVOKER_NAME, OPERATOR_IMAGE,
};

const INVOKER_API_VERSION: &str = "stash.appscode.com/v1alpha1";

/// Name of the `CronJob` ensured for one invoker. Deterministic so repeated
/// reconciles of the same invoker converge on the same object.
#[must_use]
pub(crate) fn cronjob_name(invoker_kind: &str, invoker_name: &str) -> String {
    format!("stash-trigger-{invoker_kind}-{invoker_name}")
}

/// Ensures (via server-side apply) the `CronJob` that invokes
/// `stash-operator create-backup-session` on `schedule`. `paused` maps
/// directly onto `CronJobSpec::suspend` (Open Question resolution, §9: a
/// paused invoker suspends its trigger rather than being torn down, so
/// un-pausing resumes on the existing schedule without skew).
pub(crate) async fn ensure(
    client: &Client,
    field_manager: &str,
    namespace: &str,
    invoker_kind: &str,
    invoker_name: &str,
    invoker_uid: &str,
    schedule: &str,
    paused: bool,
) -> Result<()> {
    let name = cronjob_name(invoker_kind, invoker_name);
    let api: Api<CronJob> = Api::namespaced(client.clone(), namespace);

    let container = Container {
        name: "trigger".to_owned(),
        image: Some(OPERATOR_IMAGE.to_owned()),
        args: Some(vec![
            "create-backup-session".to_owned(),
            format!("--invokername={invoker_name}"),
            format!("--invokertype={invoker_kind}"),
            format!("--namespace={namespace}"),
        ]),
        ..Container::default()
    };

    let mut labels = std::collections::BTreeMap::new();
    labels.insert(LABEL_INVOKER_KIND.to_owned(), invoker_kind.to_owned());
    labels.insert(LABEL_INVOKER_NAME.to_owned(), invoker_name.to_owned());
    labels.insert(LABEL_DELETE_JOB_ON_COMPLETION.to_owned(), "true".to_owned());

    let owner_reference = OwnerReference {
        api_version: INVOKER_API_VERSION.to_owned(),
        kind: invoker_kind.to_owned(),
        name: invoker_name.to_owned(),
        uid: invoker_uid.to_owned(),
        controller: Some(true),
        block_owner_deletion: Some(true),
        ..OwnerReference::default()
    };

    let cronjob = CronJob {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_owned()),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference]),
            ..ObjectMeta::default()
        },
        spec: Some(CronJobSpec {
            schedule: schedule.to_owned(),
            suspend: Some(paused),
            concurrency_policy: Some("Forbid".to_owned()),
            successful_jobs_history_limit: Some(1),
            failed_jobs_history_limit: Some(1),
            job_template: JobTemplateSpec {
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            containers: vec![container],
                            restart_policy: Some("OnFailure".to_owned()),
                            service_account_name: Some("stash-operator".to_owned()),
                            ..PodSpec::default()
                        }),
                        ..PodTemplateSpec::default()
                    },
                    ..JobSpec::default()
                }),
                ..JobTemplateSpec::default()
            },
            ..CronJobSpec::default()
        }),
        ..CronJob::default()
    };

    api.patch(
        &name,
        &PatchParams::apply(field_manager).force(),
        &Patch::Apply(&cronjob),
    )
    .await
    .map_err(StashError::from)?;
    Ok(())
}

/// Deletes the invoker's `CronJob`, ignoring `NotFound`.
pub(crate) async fn delete(client: &Client, namespace: &str, invoker_kind: &str, invoker_name: &str) -> Result<()> {
    let name = cronjob_name(invoker_kind, invoker_name);
    let api: Api<CronJob> = Api::namespaced(client.clone(), namespace);
    match api.delete(&name, &kube::api::DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(e) => Err(StashError::from(e)),
    }
}
