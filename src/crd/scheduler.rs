use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use super::{CloudEventOverrides, Condition, Destination, SecretKeySelector};
use crate::conditions::{ConditionManager, Conditions};

pub const SCHEDULER_CONDITION_TOPIC_READY: &str = "TopicReady";
pub const SCHEDULER_CONDITION_PULL_SUBSCRIPTION_READY: &str = "PullSubscriptionReady";
pub const SCHEDULER_CONDITION_NOTIFICATION_READY: &str = "NotificationReady";

/// Conditions that must all be True for a Scheduler to be Ready
const SCHEDULER_DEPENDENT_CONDITIONS: &[&str] = &[
    SCHEDULER_CONDITION_TOPIC_READY,
    SCHEDULER_CONDITION_PULL_SUBSCRIPTION_READY,
    SCHEDULER_CONDITION_NOTIFICATION_READY,
];

#[skip_serializing_none]
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "events.cloud.run",
    version = "v1alpha1",
    kind = "Scheduler",
    derive = "Default",
    namespaced,
    doc = "Scheduler wires a scheduled notification on an external bucket to a sink through Pub/Sub",
    printcolumn = r#"{"name":"Ready","jsonPath":".status.conditions[?(@.type==\"Ready\")].status","type":"string"}"#,
    printcolumn = r#"{"name":"Topic","jsonPath":".status.topicId","type":"string"}"#,
    printcolumn = r#"{"name":"Notification","jsonPath":".status.notificationId","type":"string"}"#,
    status = "SchedulerStatus"
)]
pub struct SchedulerSpec {
    /// Bucket the notification is bound to
    pub bucket: String,
    /// Project to operate in; discovered by the topic controller when unset
    pub project: Option<String>,
    /// Credential used by the topic, pull subscription and notification job
    pub secret: Option<SecretKeySelector>,
    pub sink: Destination,
    pub ce_overrides: Option<CloudEventOverrides>,
}

impl SchedulerSpec {
    pub fn secret_or_default(&self) -> SecretKeySelector {
        self.secret.clone().unwrap_or_default()
    }
}

/// `None` fields serialize as `null` so that a merge patch of the status clears them.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub topic_id: Option<String>,
    pub project_id: Option<String>,
    pub notification_id: Option<String>,
    pub sink_uri: Option<String>,
}

impl Conditions for SchedulerStatus {
    fn conditions(&self) -> &Vec<Condition> {
        &self.conditions
    }
    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl SchedulerStatus {
    fn manage(&mut self) -> ConditionManager<'_, Self> {
        ConditionManager::new(self, SCHEDULER_DEPENDENT_CONDITIONS)
    }

    pub fn initialize_conditions(&mut self) {
        self.manage().initialize_conditions();
    }

    /// Start of a pass: every condition goes back to `Unknown` until re-validated.
    /// Identifiers are left alone.
    pub fn reset_conditions(&mut self) {
        self.manage().reset_conditions();
    }

    pub fn is_ready(&self) -> bool {
        SCHEDULER_DEPENDENT_CONDITIONS
            .iter()
            .all(|type_| self.is_condition_true(type_))
    }

    pub fn mark_topic_ready(&mut self) {
        self.manage().mark_true(SCHEDULER_CONDITION_TOPIC_READY);
    }

    pub fn mark_topic_not_ready(&mut self, reason: &str, message: &str) {
        self.manage()
            .mark_false(SCHEDULER_CONDITION_TOPIC_READY, reason, message);
    }

    pub fn mark_pull_subscription_ready(&mut self) {
        self.manage()
            .mark_true(SCHEDULER_CONDITION_PULL_SUBSCRIPTION_READY);
    }

    pub fn mark_pull_subscription_not_ready(&mut self, reason: &str, message: &str) {
        self.manage()
            .mark_false(SCHEDULER_CONDITION_PULL_SUBSCRIPTION_READY, reason, message);
    }

    pub fn mark_notification_ready(&mut self) {
        self.manage()
            .mark_true(SCHEDULER_CONDITION_NOTIFICATION_READY);
    }

    pub fn mark_notification_not_ready(&mut self, reason: &str, message: &str) {
        self.manage()
            .mark_false(SCHEDULER_CONDITION_NOTIFICATION_READY, reason, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn group_version_kind() {
        assert_eq!(Scheduler::group(&()), "events.cloud.run");
        assert_eq!(Scheduler::version(&()), "v1alpha1");
        assert_eq!(Scheduler::kind(&()), "Scheduler");
    }

    #[test]
    fn missing_secret_defaults() {
        let spec = SchedulerSpec::default();
        let secret = spec.secret_or_default();
        assert_eq!(secret.name, "google-cloud-key");
        assert_eq!(secret.key, "key.json");
    }

    #[test]
    fn ready_requires_all_three() {
        let mut status = SchedulerStatus::default();
        status.initialize_conditions();
        assert_eq!(status.conditions.len(), 4);
        status.mark_topic_ready();
        status.mark_pull_subscription_ready();
        assert!(!status.is_ready());
        status.mark_notification_ready();
        assert!(status.is_ready());
        status.mark_pull_subscription_not_ready("PullSubscriptionNotReady", "gone");
        assert!(!status.is_ready());
    }

    #[test]
    fn reset_keeps_identifiers() {
        let mut status = SchedulerStatus {
            topic_id: Some("scheduler-uid".into()),
            notification_id: Some("135".into()),
            ..SchedulerStatus::default()
        };
        status.initialize_conditions();
        status.mark_topic_ready();
        status.reset_conditions();
        assert_eq!(
            status.get_condition(SCHEDULER_CONDITION_TOPIC_READY).unwrap().status,
            "Unknown"
        );
        assert_eq!(status.topic_id.as_deref(), Some("scheduler-uid"));
        assert_eq!(status.notification_id.as_deref(), Some("135"));
    }

    #[test]
    fn empty_status_fields_serialize_as_null() {
        let status = SchedulerStatus::default();
        let value = serde_json::to_value(&status).unwrap();
        assert!(value["notificationId"].is_null());
        assert!(value.as_object().unwrap().contains_key("notificationId"));
    }
}
