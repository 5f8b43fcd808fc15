use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TimeError {
    #[error("duration must be a finite, non-negative number of seconds, got {0}")]
    InvalidSeconds(f64),
}

/// Length of a piece of media, in whole seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaDuration(u64);

impl MediaDuration {
    pub const ZERO: Self = Self(0);

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Extractors report fractional seconds; the fraction is dropped.
    pub fn from_secs_f64(secs: f64) -> Result<Self, TimeError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(TimeError::InvalidSeconds(secs));
        }
        Ok(Self(secs as u64))
    }

    pub const fn secs(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// `MM:SS` below one hour, `HH:MM:SS` from one hour on.
impl fmt::Display for MediaDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let secs = self.0 % 60;

        if hours > 0 {
            write!(f, "{:02}:{:02}:{:02}", hours, minutes, secs)
        } else {
            write!(f, "{:02}:{:02}", minutes, secs)
        }
    }
}

/// Render a point in time as `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Convert a filesystem time into the server's local time zone
pub fn local_time(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}

/// Seconds since the unix epoch, with sub-second precision
pub fn unix_seconds(time: SystemTime) -> f64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(before_epoch) => -before_epoch.duration().as_secs_f64(),
    }
}
