use core::fmt;

use chrono::{DateTime, Duration, Utc};

/// Claims validation error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidClaims {
    /// Validity period starts in the future.
    #[error("premature claim")]
    Premature {
        now: DateTime<Utc>,
        valid_from: DateTime<Utc>,
    },

    /// Validity period ends in the past.
    #[error("expired claim")]
    Expired {
        now: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    },

    /// Uncommon validation error.
    #[error("{0}")]
    Other(String),
}

impl InvalidClaims {
    pub fn other(e: impl fmt::Display) -> Self {
        Self::Other(e.to_string())
    }
}

pub type ClaimsValidity = Result<(), InvalidClaims>;

/// Environment that provides date and time.
///
/// Used to check the validity period of given claims.
pub trait DateTimeProvider {
    /// Returns the current date and time.
    fn date_time(&self) -> DateTime<Utc>;
}

impl<T: DateTimeProvider> DateTimeProvider for &T {
    fn date_time(&self) -> DateTime<Utc> {
        T::date_time(*self)
    }
}

/// Default clock skew tolerated when checking validity periods.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::seconds(60);

/// Validation environment.
///
/// Provides the evaluation instant and the clock skew tolerated between the
/// issuer, the holder and the verifier clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationEnvironment {
    /// Date-time.
    ///
    /// If `None`, the current date time is used.
    pub date_time: Option<DateTime<Utc>>,

    /// Tolerated clock skew.
    pub clock_skew: Duration,
}

impl Default for ValidationEnvironment {
    fn default() -> Self {
        Self {
            date_time: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

impl ValidationEnvironment {
    pub fn new(date_time: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(date_time),
            ..Default::default()
        }
    }

    pub fn with_date_time(mut self, date_time: DateTime<Utc>) -> Self {
        self.date_time = Some(date_time);
        self
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Checks that the current date falls in the `[valid_from, valid_until)`
    /// period, widened on both sides by the clock skew.
    pub fn check_validity_period(
        &self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> ClaimsValidity {
        let now = self.date_time();

        if let Some(valid_from) = valid_from {
            if valid_from > now + self.clock_skew {
                return Err(InvalidClaims::Premature { now, valid_from });
            }
        }

        if let Some(valid_until) = valid_until {
            if valid_until <= now - self.clock_skew {
                return Err(InvalidClaims::Expired { now, valid_until });
            }
        }

        Ok(())
    }
}

impl DateTimeProvider for ValidationEnvironment {
    fn date_time(&self) -> DateTime<Utc> {
        self.date_time.unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn validity_period_with_skew() {
        let env = ValidationEnvironment::new(at(1_000)).with_clock_skew(Duration::seconds(10));

        assert_eq!(env.check_validity_period(Some(at(1_005)), None), Ok(()));
        assert_eq!(env.check_validity_period(None, Some(at(995))), Ok(()));
        assert_eq!(
            env.check_validity_period(Some(at(1_011)), None),
            Err(InvalidClaims::Premature {
                now: at(1_000),
                valid_from: at(1_011)
            })
        );
        assert_eq!(
            env.check_validity_period(None, Some(at(990))),
            Err(InvalidClaims::Expired {
                now: at(1_000),
                valid_until: at(990)
            })
        );
    }
}
