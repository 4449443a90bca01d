use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// JSON numeric value representing the number of seconds from
/// 1970-01-01T00:00:00Z UTC until the specified UTC date/time, ignoring leap
/// seconds.
///
/// Fractional seconds are accepted on input and truncated, as many JWT
/// libraries only accept integers.
///
/// See: <https://datatracker.ietf.org/doc/html/rfc7519#section-2>
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NumericDate(i64);

#[derive(thiserror::Error, Debug)]
#[error("invalid numeric date")]
pub struct InvalidNumericDate;

impl NumericDate {
    pub const fn from_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    pub fn as_seconds(self) -> i64 {
        self.0
    }

    pub fn try_from_seconds_f64(seconds: f64) -> Result<Self, InvalidNumericDate> {
        if seconds.is_finite() && seconds.abs() < i64::MAX as f64 {
            Ok(Self(seconds.floor() as i64))
        } else {
            Err(InvalidNumericDate)
        }
    }

    /// Converts this numeric date into a UTC date-time.
    pub fn to_date_time(self) -> Result<DateTime<Utc>, InvalidNumericDate> {
        Utc.timestamp_opt(self.0, 0)
            .single()
            .ok_or(InvalidNumericDate)
    }
}

impl From<DateTime<Utc>> for NumericDate {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp())
    }
}

impl TryFrom<NumericDate> for DateTime<Utc> {
    type Error = InvalidNumericDate;

    fn try_from(value: NumericDate) -> Result<Self, Self::Error> {
        value.to_date_time()
    }
}

impl<'de> Deserialize<'de> for NumericDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Self::try_from_seconds_f64(seconds).map_err(serde::de::Error::custom)
    }
}
