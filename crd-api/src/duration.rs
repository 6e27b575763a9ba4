use std::fmt;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A [`Duration`] that (de)serializes the way `metav1.Duration` does on the
/// Go side of the Kubernetes ecosystem: a compact unit-suffixed string such
/// as `"1h2m3s"` rather than a number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[schemars(transparent)]
pub struct DurationString(#[schemars(with = "String")] Duration);

impl DurationString {
    /// Wrap a [`Duration`].
    #[must_use]
    pub fn new(d: Duration) -> Self {
        Self(d)
    }

    /// Unwrap into a [`Duration`].
    #[must_use]
    pub fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for DurationString {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl From<DurationString> for Duration {
    fn from(d: DurationString) -> Self {
        d.0
    }
}

impl fmt::Display for DurationString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0;
        let mut secs = total.as_secs();
        let hours = secs / 3600;
        secs %= 3600;
        let mins = secs / 60;
        secs %= 60;
        let nanos = total.subsec_nanos();

        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || mins > 0 {
            write!(f, "{mins}m")?;
        }
        if nanos == 0 {
            write!(f, "{secs}s")
        } else {
            write!(f, "{secs}.{nanos:09}s")
        }
    }
}

/// Parse error for [`DurationString::from_str_relaxed`] and the `Deserialize`
/// impl.
#[derive(Debug, thiserror::Error)]
#[error("invalid duration string {0:?}")]
pub struct ParseDurationError(String);

impl std::str::FromStr for DurationString {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut total = Duration::ZERO;
        let mut rest = s;
        let mut saw_any = false;
        while !rest.is_empty() {
            let split = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .ok_or_else(|| ParseDurationError(s.to_owned()))?;
            let (num, tail) = rest.split_at(split);
            let (unit, tail) = tail.split_at(1);
            let value: f64 = num.parse().map_err(|_| ParseDurationError(s.to_owned()))?;
            let secs = match unit {
                "h" => value * 3600.0,
                "m" => value * 60.0,
                "s" => value,
                _ => return Err(ParseDurationError(s.to_owned())),
            };
            total += Duration::from_secs_f64(secs);
            rest = tail;
            saw_any = true;
        }
        if !saw_any {
            return Err(ParseDurationError(s.to_owned()));
        }
        Ok(Self(total))
    }
}

impl Serialize for DurationString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DurationString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;
        impl Visitor<'_> for V {
            type Value = DurationString;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string like \"1h2m3s\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(V)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips() {
        for secs in [0, 1, 59, 60, 61, 3600, 3661, 7325] {
            let d = DurationString::new(Duration::from_secs(secs));
            let s = d.to_string();
            let parsed: DurationString = s.parse().unwrap();
            assert_eq!(parsed.into_inner(), Duration::from_secs(secs), "{s}");
        }
    }

    #[test]
    fn parses_plain_seconds() {
        let d: DurationString = "90s".parse().unwrap();
        assert_eq!(d.into_inner(), Duration::from_secs(90));
    }
}
