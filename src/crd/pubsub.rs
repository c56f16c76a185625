use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use super::{CloudEventOverrides, Condition, Destination, SecretKeySelector};
use crate::conditions::{CONDITION_READY, Conditions};

/// What the topic controller does with the backing Pub/Sub topic.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum PropagationPolicy {
    /// Create the topic if missing and delete it with the Topic object
    #[default]
    CreateDelete,
    /// Create the topic if missing and leave it behind on deletion
    CreateNoDelete,
    /// Only use an existing topic
    NoCreateNoDelete,
}

#[skip_serializing_none]
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "pubsub.cloud.run",
    version = "v1alpha1",
    kind = "Topic",
    derive = "Default",
    namespaced,
    status = "TopicStatus"
)]
pub struct TopicSpec {
    pub secret: Option<SecretKeySelector>,
    pub project: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub propagation_policy: PropagationPolicy,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub project_id: Option<String>,
    pub topic_id: Option<String>,
    pub address: Option<String>,
}

impl Conditions for TopicStatus {
    fn conditions(&self) -> &Vec<Condition> {
        &self.conditions
    }
    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl Topic {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.is_condition_true(CONDITION_READY))
    }
}

#[skip_serializing_none]
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "pubsub.cloud.run",
    version = "v1alpha1",
    kind = "PullSubscription",
    derive = "Default",
    namespaced,
    shortname = "ps",
    status = "PullSubscriptionStatus"
)]
pub struct PullSubscriptionSpec {
    pub secret: Option<SecretKeySelector>,
    pub project: Option<String>,
    pub topic: String,
    pub sink: Destination,
    pub ce_overrides: Option<CloudEventOverrides>,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullSubscriptionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub sink_uri: Option<String>,
    pub project_id: Option<String>,
    pub subscription_id: Option<String>,
}

impl Conditions for PullSubscriptionStatus {
    fn conditions(&self) -> &Vec<Condition> {
        &self.conditions
    }
    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl PullSubscription {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.is_condition_true(CONDITION_READY))
    }
}
