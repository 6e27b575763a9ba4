use chrono::{DateTime, Utc};

/// The format used to embed a point in time into a snapshot name.
///
/// Snapshot names derived from the same base name must never collide, so
/// the format only needs second resolution as long as callers enforce a
/// minimum 1s gap between two names for the same base (see
/// [`would_collide`]).
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Render `now` using the 14-digit `YYYYMMDDHHMMSS` UTC format.
#[must_use]
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Build a snapshot name by suffixing `base` with the current timestamp.
#[must_use]
pub fn snapshot_name(base: &str, now: DateTime<Utc>) -> String {
    format!("{base}-{}", format_timestamp(now))
}

/// Whether a snapshot named at `previous` would collide with one named at
/// `now`, i.e. both render to the same second.
#[must_use]
pub fn would_collide(previous: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    format_timestamp(previous) == format_timestamp(now)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn snapshot_name_embeds_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 13, 7, 9).unwrap();
        assert_eq!(snapshot_name("mypvc", now), "mypvc-20240305130709");
    }

    #[test]
    fn same_second_collides() {
        let a = Utc.with_ymd_and_hms(2024, 3, 5, 13, 7, 9).unwrap();
        let b = a + chrono::Duration::milliseconds(500);
        assert!(would_collide(a, b));
    }

    #[test]
    fn next_second_does_not_collide() {
        let a = Utc.with_ymd_and_hms(2024, 3, 5, 13, 7, 9).unwrap();
        let b = a + chrono::Duration::seconds(1);
        assert!(!would_collide(a, b));
    }
}
