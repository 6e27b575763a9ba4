use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

use crd_api::consts::CONDITION_SYNCHRONIZING;

/// Build the single `Synchronizing` condition the core reports on every CR.
/// `status` follows the usual three-value Kubernetes condition convention:
/// `"True"` while a cycle is running, `"False"` when idle or blocked,
/// `"Unknown"` is never produced by this core.
pub fn synchronizing(status: bool, reason: &str, message: impl Into<String>) -> Condition {
    Condition {
        type_: CONDITION_SYNCHRONIZING.to_owned(),
        status: if status { "True" } else { "False" }.to_owned(),
        reason: reason.to_owned(),
        message: message.into(),
        observed_generation: None,
        last_transition_time: Time(chrono::Utc::now()),
    }
}

/// Replace the named condition in `conditions` if its `status`/`reason` did
/// not change `last_transition_time`, or insert it. Mirrors
/// `meta.SetStatusCondition` from the Go `apimachinery` package: a
/// transition timestamp only moves forward when the condition's meaning
/// actually changed, so the reconciler does not spuriously reset it every
/// reconcile.
pub fn set(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new.type_) {
        if existing.status == new.status {
            existing.reason = new.reason;
            existing.message = new.message;
        } else {
            *existing = new;
        }
    } else {
        conditions.push(new);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_preserves_transition_time_when_status_unchanged() {
        let mut conditions = vec![synchronizing(true, "Sync", "running")];
        let original_time = conditions[0].last_transition_time.0;
        std::thread::sleep(std::time::Duration::from_millis(5));
        set(&mut conditions, synchronizing(true, "Sync", "still running"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time.0, original_time);
        assert_eq!(conditions[0].message, "still running");
    }

    #[test]
    fn set_bumps_transition_time_on_status_change() {
        let mut conditions = vec![synchronizing(true, "Sync", "running")];
        let original_time = conditions[0].last_transition_time.0;
        std::thread::sleep(std::time::Duration::from_millis(5));
        set(&mut conditions, synchronizing(false, "Error", "no mover found"));
        assert!(conditions[0].last_transition_time.0 > original_time);
    }
}
