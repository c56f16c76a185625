use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        batch::v1::{Job, JobSpec},
        core::v1::{
            Container, EnvVar, PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference},
};

use super::{ACTION_LABEL, JobAction, RESOURCE_UID_LABEL, result::TERMINATION_MESSAGE_PATH};
use crate::crd::SecretKeySelector;

static CREDENTIALS_VOLUME: &str = "google-cloud-key";
static CREDENTIALS_MOUNT_PATH: &str = "/var/secrets/google";

/// Everything a notification job needs to create or delete one notification.
#[derive(Clone, Debug)]
pub struct NotificationArgs {
    /// UID of the owning Scheduler
    pub uid: String,
    pub namespace: String,
    pub owner: OwnerReference,
    pub image: String,
    pub action: JobAction,
    pub project_id: String,
    pub bucket: String,
    /// Set when creating
    pub topic_id: Option<String>,
    /// Set when deleting
    pub notification_id: Option<String>,
    pub secret: SecretKeySelector,
    pub backoff_limit: i32,
}

/// At most one job exists per (owner, action), so the name only depends on those.
pub fn notification_job_name(uid: &str, action: JobAction) -> String {
    format!("scheduler-{}-{}", action, uid.to_lowercase())
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..EnvVar::default()
    }
}

pub fn make_notification_job(args: &NotificationArgs) -> Job {
    let labels = BTreeMap::from([
        (RESOURCE_UID_LABEL.to_string(), args.uid.clone()),
        (ACTION_LABEL.to_string(), args.action.to_string()),
    ]);
    let mut env_vars = vec![
        env("ACTION", args.action.as_str()),
        env("PROJECT_ID", args.project_id.clone()),
        env("BUCKET", args.bucket.clone()),
        env(
            "GOOGLE_APPLICATION_CREDENTIALS",
            format!("{}/{}", CREDENTIALS_MOUNT_PATH, args.secret.key),
        ),
    ];
    if let Some(topic_id) = &args.topic_id {
        env_vars.push(env("TOPIC_ID", topic_id.clone()));
    }
    if let Some(notification_id) = &args.notification_id {
        env_vars.push(env("NOTIFICATION_ID", notification_id.clone()));
    }

    Job {
        metadata: ObjectMeta {
            name: Some(notification_job_name(&args.uid, args.action)),
            namespace: Some(args.namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![args.owner.clone()]),
            ..ObjectMeta::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(args.backoff_limit),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: "job".to_string(),
                        image: Some(args.image.clone()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        env: Some(env_vars),
                        termination_message_path: Some(TERMINATION_MESSAGE_PATH.to_string()),
                        volume_mounts: Some(vec![VolumeMount {
                            name: CREDENTIALS_VOLUME.to_string(),
                            mount_path: CREDENTIALS_MOUNT_PATH.to_string(),
                            read_only: Some(true),
                            ..VolumeMount::default()
                        }]),
                        ..Container::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: CREDENTIALS_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(args.secret.name.clone()),
                            ..SecretVolumeSource::default()
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..JobSpec::default()
        }),
        ..Job::default()
    }
}
