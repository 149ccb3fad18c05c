//! Five-field cron triggers (minute, hour, day, month, day of week)
//!
//! Fields are translated into a `cron::Schedule` expression with a zero
//! seconds field. All fields are ANDed together. Day of week counts from
//! Monday (`0`) to Sunday (`6`) and also accepts `mon`..`sun`. Months accept
//! `jan`..`dec`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const WEEKDAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Cron fields as written by the caller; `None` means every value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CronSpec {
    pub minute: Option<String>,
    pub hour: Option<String>,
    pub day: Option<String>,
    pub month: Option<String>,
    pub day_of_week: Option<String>,
}

impl CronSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minute(mut self, expr: &str) -> Self {
        self.minute = Some(expr.to_string());
        self
    }

    pub fn hour(mut self, expr: &str) -> Self {
        self.hour = Some(expr.to_string());
        self
    }

    pub fn day(mut self, expr: &str) -> Self {
        self.day = Some(expr.to_string());
        self
    }

    pub fn month(mut self, expr: &str) -> Self {
        self.month = Some(expr.to_string());
        self
    }

    pub fn day_of_week(mut self, expr: &str) -> Self {
        self.day_of_week = Some(expr.to_string());
        self
    }
}

/// Parsed cron trigger
#[derive(Debug, Clone)]
pub struct CronSchedule {
    spec: CronSpec,
    schedule: ::cron::Schedule,
}

impl CronSchedule {
    pub fn parse(spec: &CronSpec) -> Result<Self, String> {
        let expression = to_expression(spec)?;
        let schedule = ::cron::Schedule::from_str(&expression)
            .map_err(|e| format!("invalid cron expression '{}': {}", expression, e))?;
        Ok(Self {
            spec: spec.clone(),
            schedule,
        })
    }

    pub fn spec(&self) -> &CronSpec {
        &self.spec
    }

    /// First firing strictly after `after`, evaluated as wall-clock time in `tz`
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&tz))
            .next()
            .map(|at| at.with_timezone(&Utc))
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("minute", &self.spec.minute),
            ("hour", &self.spec.hour),
            ("day", &self.spec.day),
            ("month", &self.spec.month),
            ("day_of_week", &self.spec.day_of_week),
        ];
        let rendered: Vec<String> = fields
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| format!("{}='{}'", name, v)))
            .collect();
        write!(f, "cron[{}]", rendered.join(", "))
    }
}

/// `sec min hour day month weekday` with seconds pinned to zero
fn to_expression(spec: &CronSpec) -> Result<String, String> {
    let field = |name: &str, expr: &Option<String>| -> Result<String, String> {
        let expr = match expr.as_deref().map(str::trim) {
            None | Some("") => "*",
            Some(expr) => expr,
        };
        if expr.split(',').any(zero_step) {
            return Err(format!("{}: step must be positive in '{}'", name, expr));
        }
        // Month names go through in upper case
        Ok(expr.to_uppercase())
    };

    Ok(format!(
        "0 {} {} {} {} {}",
        field("minute", &spec.minute)?,
        field("hour", &spec.hour)?,
        field("day", &spec.day)?,
        field("month", &spec.month)?,
        weekday_field(spec.day_of_week.as_deref())?,
    ))
}

fn zero_step(part: &str) -> bool {
    part.split_once('/')
        .is_some_and(|(_, step)| step.trim().parse::<u32>() == Ok(0))
}

/// Rewrites a Monday-based weekday field as an explicit list of day names
fn weekday_field(expr: Option<&str>) -> Result<String, String> {
    let expr = match expr.map(str::trim) {
        None | Some("") | Some("*") => return Ok("*".to_string()),
        Some(expr) => expr,
    };

    let mut days = BTreeSet::new();
    for part in expr.split(',') {
        let part = part.trim();
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: usize = step
                    .trim()
                    .parse()
                    .map_err(|_| format!("day_of_week: invalid step in '{}'", part))?;
                if step == 0 {
                    return Err(format!("day_of_week: step must be positive in '{}'", part));
                }
                (range.trim(), step)
            }
            None => (part, 1),
        };

        let (low, high) = if range == "*" {
            (0, 6)
        } else if let Some((a, b)) = range.split_once('-') {
            (weekday(a)?, weekday(b)?)
        } else {
            let day = weekday(range)?;
            (day, if part.contains('/') { 6 } else { day })
        };
        if low > high {
            return Err(format!("day_of_week: range '{}' is reversed", range));
        }
        days.extend((low..=high).step_by(step));
    }

    let names: Vec<&str> = days.into_iter().map(|day| WEEKDAY_NAMES[day]).collect();
    Ok(names.join(",").to_uppercase())
}

fn weekday(raw: &str) -> Result<usize, String> {
    let raw = raw.trim().to_lowercase();
    if let Some(index) = WEEKDAY_NAMES.iter().position(|name| *name == raw) {
        return Ok(index);
    }
    match raw.parse::<usize>() {
        Ok(day) if day <= 6 => Ok(day),
        _ => Err(format!("day_of_week: invalid value '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test_case(None, "*" ; "unset")]
    #[test_case(Some("0"), "MON" ; "monday is zero")]
    #[test_case(Some("6"), "SUN" ; "sunday is six")]
    #[test_case(Some("0-4"), "MON,TUE,WED,THU,FRI" ; "working week")]
    #[test_case(Some("sat,sun"), "SAT,SUN" ; "names")]
    #[test_case(Some("*/2"), "MON,WED,FRI,SUN" ; "stepped wildcard")]
    #[test_case(Some("fri/1"), "FRI,SAT,SUN" ; "stepped start")]
    fn test_weekday_translation(expr: Option<&str>, expected: &str) {
        assert_eq!(weekday_field(expr).unwrap(), expected);
    }

    #[test_case("7" ; "past sunday")]
    #[test_case("*/0" ; "zero step")]
    #[test_case("fri-mon" ; "reversed")]
    #[test_case("someday" ; "garbage")]
    fn test_invalid_weekdays(expr: &str) {
        assert!(weekday_field(Some(expr)).is_err());
    }

    #[test]
    fn test_expression_pins_seconds_to_zero() {
        let spec = CronSpec::new().minute("*/15").hour("3").day_of_week("0");
        assert_eq!(to_expression(&spec).unwrap(), "0 */15 3 * * MON");
    }

    #[test_case(CronSpec::new().minute("60") ; "minute above range")]
    #[test_case(CronSpec::new().minute("*/0") ; "zero step")]
    #[test_case(CronSpec::new().hour("abc") ; "garbage hour")]
    fn test_invalid_specs(spec: CronSpec) {
        assert!(CronSchedule::parse(&spec).is_err());
    }

    #[test]
    fn test_next_after_daily_hour() {
        let schedule = CronSchedule::parse(&CronSpec::new().minute("0").hour("3")).unwrap();

        let next = schedule.next_after(utc("2026-03-10T02:15:00Z"), Tz::UTC).unwrap();
        assert_eq!(next, utc("2026-03-10T03:00:00Z"));

        // Exactly on a firing moves to the next day
        let next = schedule.next_after(next, Tz::UTC).unwrap();
        assert_eq!(next, utc("2026-03-11T03:00:00Z"));
    }

    #[test]
    fn test_next_after_respects_weekday() {
        // 2026-03-10 is a Tuesday
        let schedule =
            CronSchedule::parse(&CronSpec::new().minute("30").hour("9").day_of_week("4"))
                .unwrap();
        let next = schedule.next_after(utc("2026-03-10T12:00:00Z"), Tz::UTC).unwrap();
        assert_eq!(next, utc("2026-03-13T09:30:00Z"));
    }

    #[test]
    fn test_next_after_in_named_timezone() {
        let schedule = CronSchedule::parse(&CronSpec::new().minute("0").hour("8")).unwrap();
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // 08:00 CET is 07:00 UTC in winter
        let next = schedule.next_after(utc("2026-01-15T00:00:00Z"), tz).unwrap();
        assert_eq!(next, utc("2026-01-15T07:00:00Z"));
    }

    #[test]
    fn test_month_names() {
        let schedule =
            CronSchedule::parse(&CronSpec::new().minute("0").hour("0").day("1").month("feb-mar"))
                .unwrap();
        let next = schedule.next_after(utc("2026-01-15T00:00:00Z"), Tz::UTC).unwrap();
        assert_eq!(next, utc("2026-02-01T00:00:00Z"));
    }

    #[test]
    fn test_schedule_that_never_fires() {
        let schedule = CronSchedule::parse(&CronSpec::new().day("31").month("2")).unwrap();
        assert!(schedule.next_after(utc("2026-01-01T00:00:00Z"), Tz::UTC).is_none());
    }

    #[test]
    fn test_display_lists_only_set_fields() {
        let schedule = CronSchedule::parse(&CronSpec::new().minute("*/5")).unwrap();
        assert_eq!(schedule.to_string(), "cron[minute='*/5']");
    }
}
