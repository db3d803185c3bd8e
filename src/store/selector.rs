//! Version selectors: pick a version by time or by relative index

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::MonitorError;

/// Addresses one version in a history
///
/// Indices are zero-based from the oldest record; negative indices count
/// from the newest (`-1` is the most recent). The meaning of a negative
/// index shifts whenever a record is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    ByTime(DateTime<Utc>),
    ByIndex(i64),
}

impl Selector {
    pub fn latest() -> Self {
        Selector::ByIndex(-1)
    }
}

impl FromStr for Selector {
    type Err = MonitorError;

    /// Accepts a signed integer, an RFC 3339 timestamp, or an HTTP date
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Ok(index) = s.parse::<i64>() {
            return Ok(Selector::ByIndex(index));
        }

        DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_rfc2822(s))
            .map(|at| Selector::ByTime(at.with_timezone(&Utc)))
            .map_err(|_| MonitorError::InvalidSelector(s.to_string()))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::ByTime(at) => write!(f, "{}", at.to_rfc3339()),
            Selector::ByIndex(index) => write!(f, "{}", index),
        }
    }
}
