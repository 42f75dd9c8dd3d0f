use care_docs::error::AppError;
use care_docs::workflows::documents::{
    BillingRecord, CareClient, ClientId, DocumentGenerator, DocumentSchedule, GeneratedDocument,
    GenerationContext, GenerationError, GenerationTarget, GoalPeriod, GoalPeriodId, Helper,
    MonitoringItemId, MonitoringScheduleItem, RenderFormat, RepositoryError,
    ScheduleRepository, ValidationResult,
};
use chrono::{Datelike, NaiveDate};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Point-in-time export of the agency records the engine reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Snapshot {
    pub(crate) clients: Vec<CareClient>,
    pub(crate) helpers: Vec<Helper>,
    pub(crate) billing_records: Vec<BillingRecord>,
    pub(crate) schedules: Vec<DocumentSchedule>,
    pub(crate) goal_periods: Vec<GoalPeriod>,
    pub(crate) monitoring_items: Vec<MonitoringScheduleItem>,
}

impl Snapshot {
    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Default)]
struct Store {
    clients: Vec<CareClient>,
    helpers: Vec<Helper>,
    billing: Vec<BillingRecord>,
    schedules: BTreeMap<String, DocumentSchedule>,
    goals: BTreeMap<String, GoalPeriod>,
    monitoring: BTreeMap<String, MonitoringScheduleItem>,
    validations: BTreeMap<ClientId, ValidationResult>,
}

/// Process-local repository with compare-and-swap saves.
#[derive(Default, Clone)]
pub(crate) struct InMemoryScheduleRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryScheduleRepository {
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let repository = Self::default();
        {
            let mut store = repository.lock();
            store.clients = snapshot.clients;
            store.helpers = snapshot.helpers;
            store.billing = snapshot.billing_records;
            // Imported rows count as stored, so a version-0 write cannot
            // replace them.
            store.schedules = snapshot
                .schedules
                .into_iter()
                .map(|row| {
                    let row = DocumentSchedule {
                        version: row.version.max(1),
                        ..row
                    };
                    (row.id.0.clone(), row)
                })
                .collect();
            store.goals = snapshot
                .goal_periods
                .into_iter()
                .map(|goal| (goal.id.0.clone(), goal))
                .collect();
            store.monitoring = snapshot
                .monitoring_items
                .into_iter()
                .map(|item| {
                    let item = MonitoringScheduleItem {
                        version: item.version.max(1),
                        ..item
                    };
                    (item.id.0.clone(), item)
                })
                .collect();
        }
        repository
    }

    pub(crate) fn add_billing(&self, records: Vec<BillingRecord>) {
        self.lock().billing.extend(records);
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().expect("repository mutex poisoned")
    }
}

fn in_scope(client: Option<&ClientId>, owner: &ClientId) -> bool {
    client.map_or(true, |id| id == owner)
}

impl ScheduleRepository for InMemoryScheduleRepository {
    fn load_clients(&self) -> Result<Vec<CareClient>, RepositoryError> {
        Ok(self.lock().clients.clone())
    }

    fn load_helpers(&self) -> Result<Vec<Helper>, RepositoryError> {
        Ok(self.lock().helpers.clone())
    }

    fn load_billing_records_for_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<BillingRecord>, RepositoryError> {
        Ok(self
            .lock()
            .billing
            .iter()
            .filter(|record| {
                record.service_date.year() == year && record.service_date.month() == month
            })
            .cloned()
            .collect())
    }

    fn load_schedules(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<DocumentSchedule>, RepositoryError> {
        Ok(self
            .lock()
            .schedules
            .values()
            .filter(|row| in_scope(client, &row.care_client_id))
            .cloned()
            .collect())
    }

    fn save_schedule(
        &self,
        schedule: DocumentSchedule,
    ) -> Result<DocumentSchedule, RepositoryError> {
        let mut store = self.lock();
        match store.schedules.get(&schedule.id.0) {
            Some(stored) if stored.version != schedule.version => {
                return Err(RepositoryError::Conflict)
            }
            None if schedule.version != 0 => return Err(RepositoryError::NotFound),
            _ => {}
        }
        let saved = DocumentSchedule {
            version: schedule.version + 1,
            ..schedule
        };
        store.schedules.insert(saved.id.0.clone(), saved.clone());
        Ok(saved)
    }

    fn load_goal_periods(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<GoalPeriod>, RepositoryError> {
        Ok(self
            .lock()
            .goals
            .values()
            .filter(|goal| in_scope(client, &goal.care_client_id))
            .cloned()
            .collect())
    }

    fn save_goal_period(&self, goal: GoalPeriod) -> Result<GoalPeriod, RepositoryError> {
        self.lock().goals.insert(goal.id.0.clone(), goal.clone());
        Ok(goal)
    }

    fn delete_goal_period(&self, id: &GoalPeriodId) -> Result<(), RepositoryError> {
        self.lock()
            .goals
            .remove(&id.0)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn load_monitoring_schedules(
        &self,
        client: Option<&ClientId>,
    ) -> Result<Vec<MonitoringScheduleItem>, RepositoryError> {
        Ok(self
            .lock()
            .monitoring
            .values()
            .filter(|item| in_scope(client, &item.care_client_id))
            .cloned()
            .collect())
    }

    fn save_monitoring_schedule(
        &self,
        item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError> {
        let mut store = self.lock();
        match store.monitoring.get(&item.id.0) {
            Some(stored) if stored.version != item.version => {
                return Err(RepositoryError::Conflict)
            }
            None if item.version != 0 => return Err(RepositoryError::NotFound),
            _ => {}
        }
        let saved = MonitoringScheduleItem {
            version: item.version + 1,
            ..item
        };
        store.monitoring.insert(saved.id.0.clone(), saved.clone());
        Ok(saved)
    }

    fn insert_monitoring_schedule(
        &self,
        item: MonitoringScheduleItem,
    ) -> Result<MonitoringScheduleItem, RepositoryError> {
        let mut store = self.lock();
        if store.monitoring.contains_key(&item.id.0) {
            return Err(RepositoryError::Conflict);
        }
        let saved = MonitoringScheduleItem { version: 1, ..item };
        store.monitoring.insert(saved.id.0.clone(), saved.clone());
        Ok(saved)
    }

    fn delete_monitoring_schedule(&self, id: &MonitoringItemId) -> Result<(), RepositoryError> {
        self.lock()
            .monitoring
            .remove(&id.0)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn load_validations(&self) -> Result<Vec<ValidationResult>, RepositoryError> {
        Ok(self.lock().validations.values().cloned().collect())
    }

    fn save_validation(&self, result: ValidationResult) -> Result<(), RepositoryError> {
        self.lock()
            .validations
            .insert(result.care_client_id.clone(), result);
        Ok(())
    }
}

/// Stand-in renderer used until a real document backend is wired in. Issues
/// sequential ids and reports each stage through the progress callback.
#[derive(Default)]
pub(crate) struct PlaceholderDocumentGenerator {
    sequence: AtomicU64,
}

impl DocumentGenerator for PlaceholderDocumentGenerator {
    fn generate(
        &self,
        target: GenerationTarget,
        client: &CareClient,
        context: &GenerationContext,
        progress: &mut dyn FnMut(&str),
    ) -> Result<GeneratedDocument, GenerationError> {
        progress("assembling content");
        let number = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let document_id = format!("doc-{number:05}");
        progress("rendering");
        let extension = match context.render {
            RenderFormat::Html => "html",
            RenderFormat::Pdf => "pdf",
            RenderFormat::Excel => "xlsx",
        };
        Ok(GeneratedDocument {
            file_url: format!(
                "memory://{}/{}/{document_id}.{extension}",
                client.id,
                target.label().to_ascii_lowercase().replace(' ', "-")
            ),
            document_id,
            plan_revision: None,
        })
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
