//! crates/scheduler_core/src/recurrence.rs
//!
//! The recurrence calculator: turns a five-field cron expression, a reference
//! instant and a user timezone into the next execution instant in UTC.
//!
//! Field matching happens on the user's local wall clock. Each matching wall
//! time is then placed on the UTC timeline:
//!
//! - a wall time that occurs twice (clocks going back) fires once, at its
//!   earlier occurrence;
//! - a wall time skipped by clocks going forward fires at the same distance
//!   past the jump, e.g. 02:30 on a 02:00 -> 03:00 night runs at 03:30.
//!
//! The result is always strictly after the reference instant.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecurrenceError {
    #[error("cron expression '{0}' must have 5 fields: minute hour day-of-month month day-of-week")]
    FieldCount(String),
    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("cron expression '{0}' has no upcoming run")]
    NoUpcomingRun(String),
}

/// A parsed five-field cron expression.
///
/// When both day-of-month and day-of-week are restricted, a day matches if
/// either field matches, so the expression is held as two schedules and the
/// earliest occurrence wins.
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    schedules: Vec<cron::Schedule>,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self, RecurrenceError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = fields[..] else {
            return Err(RecurrenceError::FieldCount(expression.to_string()));
        };

        let weekdays = weekday_list(day_of_week)?;
        let sources = if day_of_month.starts_with('*') || day_of_week.starts_with('*') {
            vec![format!("0 {minute} {hour} {day_of_month} {month} {weekdays}")]
        } else {
            vec![
                format!("0 {minute} {hour} {day_of_month} {month} *"),
                format!("0 {minute} {hour} * {month} {weekdays}"),
            ]
        };

        let schedules = sources
            .iter()
            .map(|source| {
                cron::Schedule::from_str(source).map_err(|e| RecurrenceError::InvalidExpression {
                    expression: expression.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: expression.to_string(),
            schedules,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The first matching instant strictly after `reference`, evaluated in `tz`.
    pub fn next_after(&self, reference: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        // The schedules iterate over naive wall-clock times, carried as UTC so
        // the `cron` crate sees no offset changes.
        let wall_clock = Utc.from_utc_datetime(&reference.with_timezone(&tz).naive_local());
        self.schedules
            .iter()
            .filter_map(|schedule| {
                schedule
                    .after(&wall_clock)
                    .filter_map(|candidate| resolve_local(tz, candidate.naive_utc()))
                    .find(|candidate| *candidate > reference)
            })
            .min()
    }
}

/// Places a local wall-clock time on the UTC timeline.
fn resolve_local(tz: Tz, wall: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(instant) => Some(instant.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Read the wall time with the offset in force before the gap.
            let before = tz.from_local_datetime(&(wall - Duration::days(1))).earliest()?;
            let offset = before.offset().fix().local_minus_utc();
            Some(Utc.from_utc_datetime(&(wall - Duration::seconds(i64::from(offset)))))
        }
    }
}

impl FromStr for CronExpression {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Resolves an IANA timezone identifier.
pub fn parse_timezone(timezone_id: &str) -> Result<Tz, RecurrenceError> {
    timezone_id
        .trim()
        .parse::<Tz>()
        .map_err(|_| RecurrenceError::UnknownTimezone(timezone_id.to_string()))
}

/// Computes the next execution instant of `expression` after `reference`,
/// matching fields against the wall clock of `timezone_id`.
pub fn next_run(
    expression: &str,
    reference: DateTime<Utc>,
    timezone_id: &str,
) -> Result<DateTime<Utc>, RecurrenceError> {
    let tz = parse_timezone(timezone_id)?;
    CronExpression::parse(expression)?
        .next_after(reference, tz)
        .ok_or_else(|| RecurrenceError::NoUpcomingRun(expression.to_string()))
}

/// Length in hours of a daily window from `start_hour` to `end_hour`.
///
/// An end hour at or before the start wraps past midnight, so equal hours
/// describe a full 24 hour window.
pub fn window_duration_hours(start_hour: u32, end_hour: u32) -> u32 {
    let (start, end) = (start_hour % 24, end_hour % 24);
    if end > start {
        end - start
    } else {
        (24 - start) + end
    }
}

/// Rewrites a standard day-of-week field (0-7, Sunday as 0 or 7, names) into
/// the explicit name list understood by the `cron` crate, whose own numbering
/// starts at Sunday = 1.
fn weekday_list(field: &str) -> Result<String, RecurrenceError> {
    let invalid = || RecurrenceError::InvalidField {
        field: "day-of-week",
        value: field.to_string(),
    };

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step = step.parse::<usize>().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((from, to)) = range.split_once('-') {
            (weekday_number(from).ok_or_else(invalid)?, weekday_number(to).ok_or_else(invalid)?)
        } else {
            let day = weekday_number(range).ok_or_else(invalid)?;
            (day, if step.is_some() { 6 } else { day })
        };
        if start > end {
            return Err(invalid());
        }

        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days[day % 7] = true;
        }
    }

    if days.iter().all(|selected| *selected) {
        return Ok("*".to_string());
    }
    let names: Vec<&str> = WEEKDAYS
        .iter()
        .zip(days.iter())
        .filter(|(_, selected)| **selected)
        .map(|(name, _)| *name)
        .collect();
    Ok(names.join(","))
}

fn weekday_number(token: &str) -> Option<usize> {
    if let Ok(n) = token.parse::<usize>() {
        return (n <= 7).then_some(n);
    }
    let prefix = token.get(..3)?.to_ascii_uppercase();
    WEEKDAYS.iter().position(|name| *name == prefix)
}
