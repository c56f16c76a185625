use crate::crd::Condition;

pub static CONDITION_TRUE: &str = "True";
pub static CONDITION_FALSE: &str = "False";
pub static CONDITION_UNKNOWN: &str = "Unknown";

/// Overall readiness, derived from the dependent conditions of a set.
pub static CONDITION_READY: &str = "Ready";

// A trait for types that expose a Kubernetes-style `conditions` field
pub trait Conditions {
    // Accessors for the underlying conditions vector
    fn conditions(&self) -> &Vec<Condition>;
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.type_ == type_)
    }

    fn is_condition_true(&self, type_: &str) -> bool {
        self.get_condition(type_)
            .is_some_and(|c| c.status == CONDITION_TRUE)
    }

    // Create a condition stamped with the current time
    fn make_condition(
        &self,
        type_: &str,
        status: &str,
        reason: Option<&str>,
        message: Option<&str>,
    ) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.map(str::to_string),
            message: message.map(str::to_string),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    // Insert or update a condition in-place, preserving last_transition_time if status is unchanged
    fn upsert_condition(&mut self, new_cond: Condition) {
        let target = self.conditions_mut();
        if let Some(pos) = target.iter().position(|c| c.type_ == new_cond.type_) {
            if target[pos].status != new_cond.status {
                target[pos] = new_cond;
            } else {
                target[pos].reason = new_cond.reason;
                target[pos].message = new_cond.message;
            }
        } else {
            target.push(new_cond);
        }
    }

    // Take over the transition time of every condition whose status matches `previous`
    fn restore_transition_times(&mut self, previous: &[Condition]) {
        for cond in self.conditions_mut().iter_mut() {
            if let Some(old) = previous
                .iter()
                .find(|c| c.type_ == cond.type_ && c.status == cond.status)
            {
                cond.last_transition_time = old.last_transition_time.clone();
            }
        }
    }
}

/// Manages one object's conditions against a fixed list of dependent condition types.
///
/// The `Ready` condition is never set directly: every mark rewrites it from the
/// dependents, and [`ConditionManager::is_happy`] reads the dependents themselves.
pub struct ConditionManager<'a, T: Conditions> {
    target: &'a mut T,
    dependents: &'static [&'static str],
}

impl<'a, T: Conditions> ConditionManager<'a, T> {
    pub fn new(target: &'a mut T, dependents: &'static [&'static str]) -> Self {
        Self { target, dependents }
    }

    /// Sets every condition that has not been observed yet to `Unknown`.
    pub fn initialize_conditions(&mut self) {
        for type_ in self.dependents.iter().copied().chain([CONDITION_READY]) {
            if self.target.get_condition(type_).is_none() {
                let cond = self
                    .target
                    .make_condition(type_, CONDITION_UNKNOWN, None, None);
                self.target.upsert_condition(cond);
            }
        }
    }

    /// Sets every dependent and `Ready` back to `Unknown`, dropping reasons.
    pub fn reset_conditions(&mut self) {
        for type_ in self.dependents.iter().copied().chain([CONDITION_READY]) {
            let cond = self
                .target
                .make_condition(type_, CONDITION_UNKNOWN, None, None);
            self.target.upsert_condition(cond);
        }
    }

    pub fn mark_true(&mut self, type_: &str) {
        self.set(type_, CONDITION_TRUE, None, None);
    }

    pub fn mark_false(&mut self, type_: &str, reason: &str, message: &str) {
        self.set(type_, CONDITION_FALSE, Some(reason), Some(message));
    }

    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.target.get_condition(type_)
    }

    pub fn is_happy(&self) -> bool {
        self.dependents
            .iter()
            .all(|type_| self.target.is_condition_true(type_))
    }

    fn set(&mut self, type_: &str, status: &str, reason: Option<&str>, message: Option<&str>) {
        let cond = self.target.make_condition(type_, status, reason, message);
        self.target.upsert_condition(cond);
        self.refresh_ready();
    }

    fn refresh_ready(&mut self) {
        let dependents: Vec<&Condition> = self
            .dependents
            .iter()
            .filter_map(|type_| self.target.get_condition(type_))
            .collect();
        let ready = if self.is_happy() {
            self.target
                .make_condition(CONDITION_READY, CONDITION_TRUE, None, None)
        } else {
            // The first False dependent explains overall readiness, else the first non-True one
            let culprit = dependents
                .iter()
                .find(|c| c.status == CONDITION_FALSE)
                .or_else(|| dependents.iter().find(|c| c.status != CONDITION_TRUE))
                .map(|c| (c.status.clone(), c.reason.clone(), c.message.clone()));
            let (status, reason, message) =
                culprit.unwrap_or((CONDITION_UNKNOWN.to_string(), None, None));
            self.target.make_condition(
                CONDITION_READY,
                &status,
                reason.as_deref(),
                message.as_deref(),
            )
        };
        self.target.upsert_condition(ready);
    }
}
