//! Session calendar and rebalance schedule.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};

use crate::domain::error::{ParseError, SamselectError};
use crate::ports::calendar_port::CalendarPort;

/// Length of one holding bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPeriod {
    Sessions(usize),
    Weeks(usize),
    Months(usize),
}

impl Default for HoldPeriod {
    fn default() -> Self {
        HoldPeriod::Months(1)
    }
}

impl fmt::Display for HoldPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldPeriod::Sessions(n) => write!(f, "{}D", n),
            HoldPeriod::Weeks(n) => write!(f, "{}W", n),
            HoldPeriod::Months(n) => write!(f, "{}M", n),
        }
    }
}

impl FromStr for HoldPeriod {
    type Err = ParseError;

    /// `5D`, `1W`, `3M`; a missing count means one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_uppercase();
        let unit = trimmed.chars().last().ok_or_else(|| ParseError {
            message: "empty hold period".to_string(),
            position: 0,
        })?;
        let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
        let count = if digits.is_empty() {
            1
        } else {
            digits.parse::<usize>().map_err(|_| ParseError {
                message: format!("invalid hold period count '{}'", digits),
                position: 0,
            })?
        };
        if count == 0 {
            return Err(ParseError {
                message: "hold period count must be positive".to_string(),
                position: 0,
            });
        }
        match unit {
            'D' => Ok(HoldPeriod::Sessions(count)),
            'W' => Ok(HoldPeriod::Weeks(count)),
            'M' => Ok(HoldPeriod::Months(count)),
            other => Err(ParseError {
                message: format!("expected hold period unit (D, W, M), found '{}'", other),
                position: digits.len(),
            }),
        }
    }
}

/// Union of the sessions of every market in `[start, end]`, ordered.
pub fn build_session_calendar(
    port: &dyn CalendarPort,
    markets: &[&str],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<NaiveDate>, SamselectError> {
    let mut sessions = BTreeSet::new();
    for market in markets {
        sessions.extend(port.sessions(market, start, end)?);
    }
    Ok(sessions.into_iter().collect())
}

fn bucket_of(period: HoldPeriod, index: usize, date: NaiveDate, first: NaiveDate) -> i64 {
    match period {
        HoldPeriod::Sessions(n) => (index / n) as i64,
        HoldPeriod::Weeks(n) => {
            let monday = first - Duration::days(first.weekday().num_days_from_monday() as i64);
            (date - monday).num_days().div_euclid(7 * n as i64)
        }
        HoldPeriod::Months(n) => {
            let months = (date.year() - first.year()) as i64 * 12 + date.month() as i64
                - first.month() as i64;
            months.div_euclid(n as i64)
        }
    }
}

/// Rebalance on the last session of every completed holding bucket, shifted
/// by `offset` sessions and clamped to the calendar. The final bucket is
/// open-ended and does not rebalance.
pub fn rebalance_schedule(sessions: &[NaiveDate], period: HoldPeriod, offset: i64) -> Vec<NaiveDate> {
    let sessions: Vec<NaiveDate> = sessions
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let Some(&first) = sessions.first() else {
        return Vec::new();
    };
    let last_index = sessions.len() as i64 - 1;

    let mut schedule: Vec<NaiveDate> = Vec::new();
    for i in 1..sessions.len() {
        let prev = bucket_of(period, i - 1, sessions[i - 1], first);
        let curr = bucket_of(period, i, sessions[i], first);
        if prev == curr {
            continue;
        }
        let assigned = (i as i64 - 1 + offset).clamp(0, last_index) as usize;
        let date = sessions[assigned];
        if schedule.last().is_none_or(|d| *d < date) {
            schedule.push(date);
        }
    }
    schedule
}
