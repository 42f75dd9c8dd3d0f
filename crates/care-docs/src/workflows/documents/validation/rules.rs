use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

use super::super::calendar::{baseline_date, classify, compute_next_dates, DueWindow};
use super::super::domain::{
    BillingRecord, CareClient, DocType, DocumentSchedule, Helper, ScheduleStatus,
};
use super::{CheckName, CheckStatus, ValidationCheck};

/// Helper names are matched ignoring whitespace so "Tanaka Hanako" and
/// "Tanaka  Hanako" resolve to the same worker.
fn normalize_name(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

pub(crate) fn plan_before_contract(
    client: &CareClient,
    schedules: &[&DocumentSchedule],
    today: NaiveDate,
) -> ValidationCheck {
    let check = CheckName::PlanBeforeContract;
    let Some(contract_start) = client.contract_start else {
        return ValidationCheck::new(
            check,
            CheckStatus::Warn,
            "contract start date is not recorded",
        );
    };

    let authored_on = schedules
        .iter()
        .find(|row| row.doc_type == DocType::CarePlan)
        .and_then(|row| row.authored_on());

    match authored_on {
        Some(authored) if authored > contract_start => ValidationCheck::new(
            check,
            CheckStatus::Fail,
            format!("care plan authored {authored} after contract start {contract_start}"),
        ),
        Some(authored) => ValidationCheck::new(
            check,
            CheckStatus::Pass,
            format!("care plan authored {authored}, on or before contract start {contract_start}"),
        ),
        None if today < contract_start => ValidationCheck::new(
            check,
            CheckStatus::Warn,
            format!("care plan not yet created; contract starts {contract_start}"),
        ),
        None => ValidationCheck::new(
            check,
            CheckStatus::Fail,
            format!("contract started {contract_start} without a care plan"),
        ),
    }
}

pub(crate) fn helper_employment(
    billing: &[&BillingRecord],
    helpers: &[Helper],
) -> ValidationCheck {
    let check = CheckName::HelperEmployment;
    if billing.is_empty() {
        return ValidationCheck::new(check, CheckStatus::Pass, "no billing activity to verify");
    }

    let roster: HashMap<String, &Helper> = helpers
        .iter()
        .map(|helper| (normalize_name(&helper.name), helper))
        .collect();

    let mut violations = Vec::new();
    let mut unverifiable = BTreeSet::new();
    for record in billing {
        match roster.get(&normalize_name(&record.helper_name)) {
            Some(Helper {
                hire_date: Some(hired),
                ..
            }) => {
                if *hired > record.service_date {
                    violations.push(format!(
                        "{} billed on {} before hire date {}",
                        record.helper_name, record.service_date, hired
                    ));
                }
            }
            Some(_) | None => {
                unverifiable.insert(record.helper_name.trim().to_string());
            }
        }
    }

    if !violations.is_empty() {
        return ValidationCheck::new(check, CheckStatus::Fail, violations.join("; "));
    }

    if !unverifiable.is_empty() {
        let names: Vec<String> = unverifiable.into_iter().collect();
        return ValidationCheck::new(
            check,
            CheckStatus::Warn,
            format!("hire date unknown for {}", names.join(", ")),
        );
    }

    ValidationCheck::new(
        check,
        CheckStatus::Pass,
        format!("{} billed visit(s) within employment periods", billing.len()),
    )
}

pub(crate) fn service_consistency(
    client: &CareClient,
    billing: &[&BillingRecord],
) -> ValidationCheck {
    let check = CheckName::ServiceConsistency;
    let configured: BTreeSet<&str> = client
        .service_types
        .iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty())
        .collect();

    if configured.is_empty() {
        if billing.is_empty() {
            return ValidationCheck::new(
                check,
                CheckStatus::Pass,
                "no services configured or billed",
            );
        }
        return ValidationCheck::new(
            check,
            CheckStatus::Warn,
            format!(
                "no service types configured but {} billed visit(s) found",
                billing.len()
            ),
        );
    }

    let unexpected: BTreeSet<&str> = billing
        .iter()
        .map(|record| record.service_code.trim())
        .filter(|code| !configured.contains(code))
        .collect();

    if unexpected.is_empty() {
        ValidationCheck::new(check, CheckStatus::Pass, "billed services match configuration")
    } else {
        let codes: Vec<&str> = unexpected.into_iter().collect();
        ValidationCheck::new(
            check,
            CheckStatus::Warn,
            format!("billed service codes not configured: {}", codes.join(", ")),
        )
    }
}

pub(crate) fn care_level_match(client: &CareClient) -> ValidationCheck {
    let check = CheckName::CareLevelMatch;
    match client.care_level.as_deref().map(str::trim) {
        Some(level) if !level.is_empty() => {
            ValidationCheck::new(check, CheckStatus::Pass, format!("care level {level}"))
        }
        _ => ValidationCheck::new(check, CheckStatus::Warn, "care level is not set"),
    }
}

pub(crate) fn document_freshness(
    client: &CareClient,
    schedules: &[&DocumentSchedule],
    today: NaiveDate,
) -> ValidationCheck {
    let check = CheckName::DocumentFreshness;
    let problems: Vec<String> = DocType::ordered()
        .into_iter()
        .filter_map(|doc_type| {
            let row = schedules.iter().find(|row| row.doc_type == doc_type);
            match row {
                None => Some(format!("{} never generated", doc_type.label())),
                Some(row) if !row.has_been_generated() => {
                    Some(format!("{} never generated", doc_type.label()))
                }
                Some(row) => stale_document(client, row, today),
            }
        })
        .collect();

    if problems.is_empty() {
        ValidationCheck::new(check, CheckStatus::Pass, "all documents current")
    } else {
        ValidationCheck::new(check, CheckStatus::Fail, problems.join("; "))
    }
}

/// Overdue when the row's own cycle has lapsed as of `today` or the stored
/// status already says so.
fn stale_document(
    client: &CareClient,
    row: &DocumentSchedule,
    today: NaiveDate,
) -> Option<String> {
    let label = row.doc_type.label();
    let base = baseline_date(Some(row), client, today);
    let dates = match compute_next_dates(row.cycle_months, row.alert_days_before, base) {
        Ok(dates) => dates,
        Err(error) => return Some(format!("{label} cycle cannot be evaluated: {error}")),
    };

    if classify(dates.next_due_date, dates.alert_date, today) == DueWindow::Overdue {
        Some(format!("{label} overdue since {}", dates.next_due_date))
    } else if row.status == ScheduleStatus::Overdue {
        Some(format!("{label} overdue"))
    } else {
        None
    }
}
