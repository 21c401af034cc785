//! Plan schedule evaluation.
//!
//! The orchestrator calls [`next_run`] when a plan needs recomputation
//! (`next_run` is NULL) and persists the result; execution claims jobs
//! once [`is_due`] holds for the owning plan. `now` is always passed in
//! by the caller so the math stays deterministic under test.

use crate::error::{AppError, Result};
use crate::models::plan::ScheduleKind;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Fixed delay before a one-time plan's single run.
const ONE_TIME_DELAY_MINUTES: i64 = 5;

/// Compute when a plan should run next.
///
/// Returns `Ok(None)` for plans that are never self-scheduled: Triggered
/// plans, and OneTime plans that already ran. A malformed or missing
/// cron expression on a Repeating plan is a [`AppError::ScheduleParse`]
/// error; the caller decides whether that skips the plan (orchestrator)
/// or rejects the request (API validation).
pub fn next_run(
    kind: &ScheduleKind,
    cron_expr: Option<&str>,
    created_at: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    match kind {
        ScheduleKind::Repeating => {
            let expr = cron_expr.ok_or_else(|| {
                AppError::ScheduleParse("repeating plan has no cron expression".to_string())
            })?;
            let schedule = parse_cron(expr)?;
            Ok(schedule.after(&now).next())
        }
        ScheduleKind::OneTime => {
            if last_run.is_some() {
                Ok(None)
            } else {
                Ok(Some(created_at + Duration::minutes(ONE_TIME_DELAY_MINUTES)))
            }
        }
        ScheduleKind::Triggered => Ok(None),
    }
}

/// Parse a cron expression, accepting the standard 5-field form.
///
/// The cron crate wants a seconds field; 5-field expressions get `0 `
/// prepended so they fire at second zero.
pub fn parse_cron(cron_expr: &str) -> Result<Schedule> {
    let normalized = if cron_expr.split_whitespace().count() == 5 {
        format!("0 {}", cron_expr)
    } else {
        cron_expr.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| {
        AppError::ScheduleParse(format!("invalid cron expression '{}': {}", cron_expr, e))
    })
}

/// Whether a plan's work may be claimed.
///
/// Active plans are due once their evaluated time has passed; a NULL
/// `next_run` also counts as due since it forces recomputation on the
/// next orchestrator tick.
pub fn is_due(is_active: bool, next_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if !is_active {
        return false;
    }
    match next_run {
        None => true,
        Some(ts) => ts <= now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_repeating_daily_midnight() {
        let next = next_run(
            &ScheduleKind::Repeating,
            Some("0 0 * * *"),
            at(2023, 12, 1, 0, 0, 0),
            None,
            at(2024, 1, 1, 10, 0, 0),
        )
        .unwrap();
        assert_eq!(next, Some(at(2024, 1, 2, 0, 0, 0)));
    }

    #[test]
    fn test_repeating_is_strictly_after_now() {
        // Sitting exactly on an occurrence must move to the next one.
        let next = next_run(
            &ScheduleKind::Repeating,
            Some("0 0 * * *"),
            at(2023, 12, 1, 0, 0, 0),
            None,
            at(2024, 1, 2, 0, 0, 0),
        )
        .unwrap();
        assert_eq!(next, Some(at(2024, 1, 3, 0, 0, 0)));
    }

    #[test]
    fn test_six_field_expression_passes_through() {
        let next = next_run(
            &ScheduleKind::Repeating,
            Some("0 30 4 * * *"),
            at(2023, 12, 1, 0, 0, 0),
            Some(at(2024, 1, 1, 4, 30, 0)),
            at(2024, 1, 1, 10, 0, 0),
        )
        .unwrap();
        assert_eq!(next, Some(at(2024, 1, 2, 4, 30, 0)));
    }

    #[test]
    fn test_one_time_waits_five_minutes_after_creation() {
        let next = next_run(
            &ScheduleKind::OneTime,
            None,
            at(2024, 1, 1, 0, 0, 0),
            None,
            at(2024, 1, 1, 0, 1, 0),
        )
        .unwrap();
        assert_eq!(next, Some(at(2024, 1, 1, 0, 5, 0)));
    }

    #[test]
    fn test_one_time_never_reschedules_after_running() {
        let next = next_run(
            &ScheduleKind::OneTime,
            None,
            at(2024, 1, 1, 0, 0, 0),
            Some(at(2024, 1, 1, 0, 6, 0)),
            at(2024, 2, 1, 0, 0, 0),
        )
        .unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_triggered_plans_never_self_schedule() {
        let next = next_run(
            &ScheduleKind::Triggered,
            Some("0 0 * * *"),
            at(2024, 1, 1, 0, 0, 0),
            None,
            at(2024, 6, 1, 0, 0, 0),
        )
        .unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_malformed_cron_is_a_parse_error() {
        let err = next_run(
            &ScheduleKind::Repeating,
            Some("not a cron"),
            at(2024, 1, 1, 0, 0, 0),
            None,
            at(2024, 1, 1, 10, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ScheduleParse(_)));
    }

    #[test]
    fn test_repeating_without_expression_is_a_parse_error() {
        let err = next_run(
            &ScheduleKind::Repeating,
            None,
            at(2024, 1, 1, 0, 0, 0),
            None,
            at(2024, 1, 1, 10, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ScheduleParse(_)));
    }

    #[test]
    fn test_is_due() {
        let now = at(2024, 1, 1, 12, 0, 0);
        assert!(is_due(true, None, now));
        assert!(is_due(true, Some(at(2024, 1, 1, 11, 0, 0)), now));
        assert!(is_due(true, Some(now), now));
        assert!(!is_due(true, Some(at(2024, 1, 1, 13, 0, 0)), now));
        assert!(!is_due(false, None, now));
        assert!(!is_due(false, Some(at(2024, 1, 1, 11, 0, 0)), now));
    }
}
