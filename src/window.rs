use chrono::{DateTime, Duration, Utc};

use crate::error::{DashboardError, Result};

/// Trailing lookback window `[now - days, now]`.
///
/// `now` is captured once per run, so events that land while pages are
/// still being fetched fall outside the window and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    days: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    pub fn trailing(days: u32, now: DateTime<Utc>) -> Result<Self> {
        if days == 0 {
            return Err(DashboardError::Config(
                "lookback window must be at least one day".to_string(),
            ));
        }

        Ok(Self {
            days,
            start: now - Duration::days(i64::from(days)),
            end: now,
        })
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}
