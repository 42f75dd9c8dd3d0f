use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, Utc};
use serde::Serialize;

use super::domain::{CareClient, DocumentSchedule};

/// Source of "now" for the executor and service layers.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date used for due/alert windowing.
    fn today(&self) -> NaiveDate;
}

/// Wall clock; "today" follows the agency's local calendar.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Frozen clock for tests and for CLI runs evaluated against a given date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn on(date: NaiveDate) -> Self {
        let midday = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        Self {
            now: midday.and_utc(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleConfigError {
    #[error("cycle_months must be greater than zero")]
    NonPositiveCycle,
    #[error("date arithmetic overflowed from {0}")]
    DateOverflow(NaiveDate),
}

/// Add calendar months, clamping to the last valid day of the target month
/// (Jan 31 + 1 month is Feb 28, or Feb 29 in leap years).
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

/// Whole days from `today` until `due`; negative once `due` has passed.
pub fn days_until(due: NaiveDate, today: NaiveDate) -> i64 {
    due.signed_duration_since(today).num_days()
}

pub fn days_before(date: NaiveDate, days: u32) -> Option<NaiveDate> {
    date.checked_sub_signed(Duration::days(i64::from(days)))
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    add_months(first, 1)?.pred_opt()
}

/// Year and month immediately before the month containing `date`.
pub fn previous_month(date: NaiveDate) -> (i32, u32) {
    if date.month() == 1 {
        (date.year() - 1, 12)
    } else {
        (date.year(), date.month() - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleDates {
    pub next_due_date: NaiveDate,
    pub alert_date: NaiveDate,
}

/// Derive the due and alert dates for one renewal cycle starting at `base_date`.
pub fn compute_next_dates(
    cycle_months: u32,
    alert_days_before: u32,
    base_date: NaiveDate,
) -> Result<ScheduleDates, ScheduleConfigError> {
    if cycle_months == 0 {
        return Err(ScheduleConfigError::NonPositiveCycle);
    }

    let next_due_date =
        add_months(base_date, cycle_months).ok_or(ScheduleConfigError::DateOverflow(base_date))?;
    let alert_date = days_before(next_due_date, alert_days_before)
        .ok_or(ScheduleConfigError::DateOverflow(next_due_date))?;

    Ok(ScheduleDates {
        next_due_date,
        alert_date,
    })
}

/// Baseline a cycle is measured from: the last generation when there is one;
/// otherwise the contract start, falling back to the row's creation date.
/// A missing row is treated as created `today`.
pub fn baseline_date(
    schedule: Option<&DocumentSchedule>,
    client: &CareClient,
    today: NaiveDate,
) -> NaiveDate {
    if let Some(generated) = schedule.and_then(|row| row.last_generated_at) {
        return generated.date_naive();
    }

    client
        .contract_start
        .or_else(|| schedule.map(|row| row.created_at.date_naive()))
        .unwrap_or(today)
}

/// Where `today` falls relative to a due/alert pair. Overdue is strictly past
/// the due date; the alert date itself already counts as due-soon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DueWindow {
    Current,
    DueSoon,
    Overdue,
}

pub fn classify(due: NaiveDate, alert: NaiveDate, today: NaiveDate) -> DueWindow {
    if today > due {
        DueWindow::Overdue
    } else if today >= alert {
        DueWindow::DueSoon
    } else {
        DueWindow::Current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn add_months_clamps_to_month_end() {
        assert_eq!(add_months(date(2025, 1, 31), 1), Some(date(2025, 2, 28)));
        assert_eq!(add_months(date(2024, 1, 31), 1), Some(date(2024, 2, 29)));
        assert_eq!(add_months(date(2025, 8, 31), 1), Some(date(2025, 9, 30)));
        assert_eq!(add_months(date(2025, 11, 15), 3), Some(date(2026, 2, 15)));
    }

    #[test]
    fn compute_next_dates_matches_calendar_arithmetic() {
        let base = date(2025, 1, 10);
        let dates = compute_next_dates(6, 14, base).expect("valid cycle");
        assert_eq!(dates.next_due_date, date(2025, 7, 10));
        assert_eq!(dates.alert_date, date(2025, 6, 26));
    }

    #[test]
    fn derivation_holds_across_cycle_and_alert_ranges() {
        let bases = [date(2025, 1, 31), date(2024, 1, 31), date(2025, 5, 15)];
        for base in bases {
            for cycle in 1..=24u32 {
                for alert in [0u32, 1, 14, 30, 60] {
                    let dates = compute_next_dates(cycle, alert, base).expect("valid");
                    let due = add_months(base, cycle).expect("in range");
                    assert_eq!(dates.next_due_date, due);
                    assert_eq!(dates.alert_date + Duration::days(i64::from(alert)), due);
                    assert!(dates.next_due_date.day() <= base.day());
                }
            }
        }
    }

    #[test]
    fn zero_cycle_is_a_configuration_error() {
        assert_eq!(
            compute_next_dates(0, 14, date(2025, 1, 1)),
            Err(ScheduleConfigError::NonPositiveCycle)
        );
    }

    #[test]
    fn classify_uses_inclusive_alert_and_strict_overdue() {
        let due = date(2025, 7, 10);
        let alert = date(2025, 6, 26);
        assert_eq!(classify(due, alert, date(2025, 6, 25)), DueWindow::Current);
        assert_eq!(classify(due, alert, alert), DueWindow::DueSoon);
        assert_eq!(classify(due, alert, due), DueWindow::DueSoon);
        assert_eq!(classify(due, alert, date(2025, 7, 11)), DueWindow::Overdue);
    }

    #[test]
    fn days_until_is_negative_when_past() {
        assert_eq!(days_until(date(2025, 7, 10), date(2025, 6, 30)), 10);
        assert_eq!(days_until(date(2025, 7, 10), date(2025, 7, 11)), -1);
    }

    #[test]
    fn previous_month_wraps_year() {
        assert_eq!(previous_month(date(2025, 1, 5)), (2024, 12));
        assert_eq!(previous_month(date(2025, 6, 5)), (2025, 5));
        assert_eq!(last_day_of_month(2024, 2), Some(date(2024, 2, 29)));
    }
}
