//! Leaderboard period windows.
//!
//! All windows are computed in UTC: a day starts at midnight, a week on
//! Monday, a month on its first day.

use crate::entities::LeaderboardPeriod;
use time::{Date, Duration, PrimitiveDateTime};

/// A half-open `[from, until)` window of one leaderboard period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub period: LeaderboardPeriod,
    pub start: Date,
    pub from: PrimitiveDateTime,
    pub until: PrimitiveDateTime,
}

impl PeriodWindow {
    /// The window of `period` that contains `at`.
    pub fn containing(period: LeaderboardPeriod, at: PrimitiveDateTime) -> Self {
        let date = at.date();
        let (start, end) = match period {
            LeaderboardPeriod::Daily => (date, date + Duration::days(1)),
            LeaderboardPeriod::Weekly => {
                let start =
                    date - Duration::days(i64::from(date.weekday().number_days_from_monday()));
                (start, start + Duration::days(7))
            }
            LeaderboardPeriod::Monthly => {
                let start = first_of_month(date);
                (start, first_of_month(start + Duration::days(32)))
            }
        };
        Self {
            period,
            start,
            from: start.midnight(),
            until: end.midnight(),
        }
    }
}

fn first_of_month(date: Date) -> Date {
    date - Duration::days(i64::from(date.day()) - 1)
}
