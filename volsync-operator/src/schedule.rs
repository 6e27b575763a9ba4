use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

/// `spec.trigger.schedule` did not parse as a cron expression.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid cron schedule {0:?}: {1}")]
pub struct InvalidSchedule(String, String);

/// The next time `cronspec` fires strictly after `after`.
///
/// `cronspec` is deliberately *not* validated at the CRD/admission layer
/// (see `crd_api::v1alpha1::TriggerSpec`), so any reconcile may discover an
/// unparseable schedule here; the caller turns that into a `Synchronizing`
/// condition rather than a panic.
pub fn next_after(
    cronspec: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, InvalidSchedule> {
    let parsed = Schedule::from_str(cronspec)
        .map_err(|err| InvalidSchedule(cronspec.to_owned(), err.to_string()))?;
    Ok(parsed.after(&after).next())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hourly_schedule_advances_one_hour() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let next = next_after("0 0 * * * *", now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
    }

    #[test]
    fn invalid_schedule_is_reported_not_panicked() {
        let now = Utc::now();
        assert!(next_after("not a cron spec", now).is_err());
    }
}
