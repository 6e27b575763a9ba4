use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

/// Build a [`Recorder`] that reports events against `subject` (a
/// `ReplicationSource`/`ReplicationDestination`/PVC), attributed to this
/// controller.
pub fn recorder_for<K>(client: Client, subject: &K) -> Recorder
where
    K: Resource<DynamicType = ()>,
{
    let reporter = Reporter::from(crate::consts::FIELD_MANAGER.to_owned());
    Recorder::new(client, reporter, subject.object_ref(&()))
}

/// Emit a `Normal` event, logging (but not propagating) any failure to
/// publish it: a missed event must never fail a reconcile.
pub async fn normal(recorder: &Recorder, reason: &str, note: impl Into<String>) {
    publish(recorder, EventType::Normal, reason, note).await;
}

/// Emit a `Warning` event. Same failure handling as [`normal`].
pub async fn warning(recorder: &Recorder, reason: &str, note: impl Into<String>) {
    publish(recorder, EventType::Warning, reason, note).await;
}

async fn publish(recorder: &Recorder, type_: EventType, reason: &str, note: impl Into<String>) {
    let event = Event {
        type_,
        reason: reason.to_owned(),
        note: Some(note.into()),
        action: reason.to_owned(),
        secondary: None,
    };
    if let Err(err) = recorder.publish(&event).await {
        tracing::warn!(error = %err, reason, "failed to publish event");
    }
}
