use crate::infra::{InMemoryScheduleRepository, PlaceholderDocumentGenerator, Snapshot};
use care_docs::config::SchedulingConfig;
use care_docs::error::AppError;
use care_docs::workflows::documents::{
    client_validation_status, BatchReport, BillingCsvImporter, BillingRecord, CareClient,
    CheckPassReport, CheckStatus, ClientId, ComplianceService, DocType, DocumentSchedule,
    FixedClock, GoalKind, GoalPeriod, GoalPeriodId, Helper, RenderFormat, ScheduleStatus,
    ValidationResult,
};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

type DemoService = ComplianceService<InMemoryScheduleRepository, PlaceholderDocumentGenerator>;

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// JSON export with clients, schedules, goal periods and monitoring items
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct ValidateArgs {
    /// JSON export with clients, helpers, schedules and billing records
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Billing CSV (client_id, helper_name, service_date, service_code) merged into the snapshot
    #[arg(long)]
    pub(crate) billing_csv: Option<PathBuf>,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Override the demo date (defaults to today).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

fn build_service(repository: InMemoryScheduleRepository, today: NaiveDate) -> DemoService {
    ComplianceService::new(
        Arc::new(repository),
        Arc::new(PlaceholderDocumentGenerator::default()),
        Arc::new(FixedClock::on(today)),
        SchedulingConfig::default(),
    )
}

pub(crate) fn run_check_report(args: CheckArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let snapshot = Snapshot::from_path(&args.snapshot)?;
    let service = build_service(InMemoryScheduleRepository::from_snapshot(snapshot), today);

    let report = service.run_check(None)?;
    render_check_report(&report);
    Ok(())
}

pub(crate) fn run_validation_report(args: ValidateArgs) -> Result<(), AppError> {
    let ValidateArgs {
        snapshot,
        billing_csv,
        today,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let repository = InMemoryScheduleRepository::from_snapshot(Snapshot::from_path(&snapshot)?);
    if let Some(path) = billing_csv {
        let records = BillingCsvImporter::from_path(&path)?;
        println!("Imported {} billing records from {}", records.len(), path.display());
        repository.add_billing(records);
    }

    let service = build_service(repository, today);
    let results = service.validate_all()?;
    render_validation_report(today, &results);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let service = build_service(
        InMemoryScheduleRepository::from_snapshot(sample_snapshot(today)),
        today,
    );

    println!("Care document compliance demo ({today})");

    let reviews = service.reconcile_monitoring(None)?;
    println!("\nMonitoring reviews derived from goal periods: {}", reviews.len());
    for item in &reviews {
        println!(
            "  - {} for {} due {} ({})",
            item.monitoring_type.label(),
            item.care_client_id,
            item.due_date,
            item.status.label()
        );
    }

    let mut progress = |message: &str| println!("    {message}");
    let bulk = service.bulk_execute(RenderFormat::Pdf, &mut progress)?;
    render_check_report(&bulk.check);
    render_batch("Document regeneration", &bulk.documents);
    render_batch("Monitoring reviews", &bulk.monitoring);

    let after = service.run_check(None)?;
    println!(
        "\nRe-check after execution: {} overdue, {} due soon",
        after.actions.len(),
        after.alerts.len()
    );

    let results = service.validate_all()?;
    render_validation_report(today, &results);
    Ok(())
}

fn render_check_report(report: &CheckPassReport) {
    println!("\nSchedule check for {}", report.today);
    println!(
        "- {} overdue | {} due soon | {} monitoring overdue | {} monitoring upcoming",
        report.actions.len(),
        report.alerts.len(),
        report.monitoring_actions.len(),
        report.monitoring_alerts.len()
    );
    println!(
        "- {} schedules created | {} status updates | {} failed status syncs",
        report.created_schedules, report.status_updates, report.sync_failures
    );

    for action in report.actions.iter().chain(&report.alerts) {
        println!(
            "  [{}] {} - {} due {} ({} days)",
            action.action_type.label(),
            action.client_name,
            action.doc_type.label(),
            action.due_date,
            action.days_until_due
        );
    }
    for action in report
        .monitoring_actions
        .iter()
        .chain(&report.monitoring_alerts)
    {
        println!(
            "  [{}] {} - {} due {} ({} days)",
            action.action_type.label(),
            action.client_name,
            action.monitoring_type.label(),
            action.due_date,
            action.days_until_due
        );
    }
    for alert in &report.contract_alerts {
        println!(
            "  [contract:{:?}] {} starts {} ({} days)",
            alert.kind, alert.client_name, alert.contract_start, alert.days_until_start
        );
    }
    for issue in &report.config_issues {
        println!(
            "  [config] {} {}: {}",
            issue.client_id,
            issue.doc_type.key(),
            issue.reason
        );
    }
}

fn render_batch(title: &str, report: &BatchReport) {
    println!(
        "\n{title}: {} succeeded | {} failed | {} skipped",
        report.succeeded, report.failed, report.skipped
    );
    for item in &report.items {
        match (&item.document_id, &item.error) {
            (Some(document_id), _) => println!(
                "  - {} {} -> {document_id}",
                item.client_id,
                item.target.label()
            ),
            (None, Some(error)) => println!(
                "  - {} {} failed: {error}",
                item.client_id,
                item.target.label()
            ),
            (None, None) => {}
        }
    }
}

fn render_validation_report(today: NaiveDate, results: &[ValidationResult]) {
    println!("\nPre-audit validation ({today})");
    for result in results {
        let status = client_validation_status(result);
        println!("- {}: {}", result.care_client_id, status.label());
        for check in result
            .checks
            .iter()
            .filter(|check| check.status != CheckStatus::Pass)
        {
            println!(
                "    {:?} {} ({:?}): {}",
                check.status,
                check.check.label(),
                check.severity,
                check.message
            );
        }
    }
}

fn sample_client(id: &str, name: &str, contract_start: NaiveDate) -> CareClient {
    CareClient {
        id: ClientId(id.to_string()),
        name: name.to_string(),
        contract_start: Some(contract_start),
        care_level: Some("care_2".to_string()),
        service_types: vec!["physical".to_string(), "household".to_string()],
        deleted: false,
    }
}

fn issued(client: &CareClient, doc_type: DocType, on: NaiveDate) -> DocumentSchedule {
    let at = on.and_hms_opt(10, 0, 0).unwrap_or_default().and_utc();
    DocumentSchedule {
        status: ScheduleStatus::Active,
        last_generated_at: Some(at),
        plan_created_on: Some(on),
        last_document_id: Some(format!("legacy-{}-{}", client.id, doc_type.key())),
        ..DocumentSchedule::pending(&client.id, doc_type, 6, 14, at)
    }
}

/// Three clients: one with an expired care plan, one starting soon, and one
/// billed for a helper before the helper's hire date.
fn sample_snapshot(today: NaiveDate) -> Snapshot {
    let sato = sample_client("c-001", "Sato Hanako", today - Duration::days(400));
    let suzuki = sample_client("c-002", "Suzuki Ichiro", today + Duration::days(10));
    let mut takahashi = sample_client("c-003", "Takahashi Jiro", today - Duration::days(90));
    takahashi.care_level = None;

    let schedules = vec![
        issued(&sato, DocType::CarePlan, today - Duration::days(200)),
        issued(&sato, DocType::Tejunsho, today - Duration::days(30)),
        issued(&sato, DocType::Monitoring, today - Duration::days(30)),
        issued(&takahashi, DocType::CarePlan, today - Duration::days(95)),
        issued(&takahashi, DocType::Tejunsho, today - Duration::days(95)),
    ];

    let goal_periods = vec![
        GoalPeriod {
            id: GoalPeriodId("goal-c-001-long".to_string()),
            care_client_id: sato.id.clone(),
            kind: GoalKind::LongTerm,
            goal_index: 0,
            start_date: today - Duration::days(170),
            end_date: today + Duration::days(10),
            goal_text: "Live independently with weekly bathing support".to_string(),
            is_active: true,
            supersedes_id: None,
        },
        GoalPeriod {
            id: GoalPeriodId("goal-c-001-short-0".to_string()),
            care_client_id: sato.id.clone(),
            kind: GoalKind::ShortTerm,
            goal_index: 0,
            start_date: today - Duration::days(80),
            end_date: today - Duration::days(2),
            goal_text: "Walk to the corner shop with a cane".to_string(),
            is_active: true,
            supersedes_id: None,
        },
    ];

    let helpers = vec![
        Helper {
            id: "h-01".to_string(),
            name: "Tanaka".to_string(),
            hire_date: Some(today - Duration::days(20)),
        },
        Helper {
            id: "h-02".to_string(),
            name: "Yamada".to_string(),
            hire_date: Some(today - Duration::days(900)),
        },
    ];

    let billing_records = vec![
        BillingRecord {
            client_id: sato.id.clone(),
            helper_name: "Yamada".to_string(),
            service_date: today - Duration::days(3),
            service_code: "physical".to_string(),
        },
        BillingRecord {
            client_id: takahashi.id.clone(),
            helper_name: "Tanaka".to_string(),
            service_date: today - Duration::days(25),
            service_code: "household".to_string(),
        },
    ];

    Snapshot {
        clients: vec![sato, suzuki, takahashi],
        helpers,
        billing_records,
        schedules,
        goal_periods,
        monitoring_items: Vec::new(),
    }
}
