use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SchedulerError};
use crate::types::Schedule;

/// Normalize a standard 5-field `min hour dom month dow` expression into the
/// 6-field `sec min hour dom month dow` form the `cron` crate parses, by
/// prepending a literal `0` seconds field.
fn normalize_cron(expression: &str) -> String {
    format!("0 {}", expression.trim())
}

impl Schedule {
    /// The only fallible construction path. Rejects malformed cron
    /// expressions and non-positive intervals before a `Job` is ever
    /// persisted; `compute_next_run` assumes its input already passed here.
    pub fn parse_and_validate(
        kind: &str,
        expression: &str,
    ) -> Result<Schedule> {
        match kind {
            "cron" => {
                cron::Schedule::from_str(&normalize_cron(expression))
                    .map_err(|e| SchedulerError::InvalidSchedule(format!("invalid cron expression: {e}")))?;
                Ok(Schedule::Cron {
                    expression: expression.trim().to_string(),
                })
            }
            "interval" => {
                let secs: i64 = expression
                    .trim()
                    .parse()
                    .map_err(|_| SchedulerError::InvalidSchedule(format!("invalid interval seconds: {expression}")))?;
                if secs <= 0 {
                    return Err(SchedulerError::InvalidSchedule(
                        "interval seconds must be positive".to_string(),
                    ));
                }
                Ok(Schedule::Interval { every_secs: secs })
            }
            "once" => {
                let at = DateTime::parse_from_rfc3339(expression.trim())
                    .map_err(|e| SchedulerError::InvalidSchedule(format!("invalid once timestamp: {e}")))?
                    .with_timezone(&Utc);
                Ok(Schedule::Once { at })
            }
            other => Err(SchedulerError::InvalidSchedule(format!(
                "unknown schedule kind: {other}"
            ))),
        }
    }
}

/// Compute the next fire instant strictly after `from`. Infallible given an
/// already-validated `Schedule` — malformed expressions are rejected at
/// [`Schedule::parse_and_validate`], not here.
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { at } => {
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }
        Schedule::Interval { every_secs } => Some(from + Duration::seconds(*every_secs)),
        Schedule::Cron { expression } => {
            let normalized = normalize_cron(expression);
            match cron::Schedule::from_str(&normalized) {
                Ok(parsed) => parsed.after(&from).next(),
                Err(_) => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_advances_by_period() {
        let schedule = Schedule::parse_and_validate("interval", "60").unwrap();
        let from = Utc::now();
        let next = compute_next_run(&schedule, from).unwrap();
        assert_eq!(next, from + Duration::seconds(60));
    }

    #[test]
    fn interval_rejects_non_positive() {
        assert!(Schedule::parse_and_validate("interval", "0").is_err());
        assert!(Schedule::parse_and_validate("interval", "-5").is_err());
    }

    #[test]
    fn once_fires_only_if_in_future() {
        let future = Utc::now() + Duration::hours(1);
        let schedule = Schedule::Once { at: future };
        assert_eq!(compute_next_run(&schedule, Utc::now()), Some(future));

        let past = Utc::now() - Duration::hours(1);
        let schedule = Schedule::Once { at: past };
        assert_eq!(compute_next_run(&schedule, Utc::now()), None);
    }

    #[test]
    fn cron_rejects_malformed_expression() {
        assert!(Schedule::parse_and_validate("cron", "not a cron").is_err());
    }

    #[test]
    fn cron_computes_next_minute() {
        let schedule = Schedule::parse_and_validate("cron", "* * * * *").unwrap();
        let from = Utc::now();
        let next = compute_next_run(&schedule, from).unwrap();
        assert!(next > from);
        assert!(next - from <= Duration::minutes(1) + Duration::seconds(1));
    }

    #[test]
    fn cron_is_deterministic() {
        let schedule = Schedule::parse_and_validate("cron", "0 9 * * *").unwrap();
        let from = Utc::now();
        let a = compute_next_run(&schedule, from);
        let b = compute_next_run(&schedule, from);
        assert_eq!(a, b);
    }

    #[test]
    fn cron_daily_instant_is_strictly_future() {
        // Regression guard for DST-transition-style boundaries: whatever the
        // wall-clock offset, the computed fire time must be strictly after `from`.
        let schedule = Schedule::parse_and_validate("cron", "30 2 * * *").unwrap();
        let from = Utc::now();
        let next = compute_next_run(&schedule, from).unwrap();
        assert!(next > from);
    }
}
