use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::domain::{ClientId, DocType, GoalPeriod, MonitoringItemId};
use super::execution::ExecutionError;
use super::repository::{DocumentGenerator, RenderFormat, RepositoryError, ScheduleRepository};
use super::service::{ComplianceService, ComplianceServiceError, EmergencyRequest};

/// Optional `?render=` query accepted by the execution endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    #[serde(default)]
    pub render: Option<RenderFormat>,
}

/// Router builder exposing the schedule, validation and monitoring endpoints.
pub fn compliance_router<R, G>(service: Arc<ComplianceService<R, G>>) -> Router
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    Router::new()
        .route("/api/v1/schedule/check", post(check_all_handler::<R, G>))
        .route("/api/v1/schedule/execute", post(bulk_execute_handler::<R, G>))
        .route(
            "/api/v1/clients/:client_id/schedule/check",
            post(check_client_handler::<R, G>),
        )
        .route(
            "/api/v1/clients/:client_id/schedule/:doc_type/execute",
            post(execute_document_handler::<R, G>),
        )
        .route(
            "/api/v1/clients/:client_id/validate",
            post(validate_handler::<R, G>),
        )
        .route(
            "/api/v1/clients/:client_id/goals",
            put(replace_goals_handler::<R, G>).delete(reset_goals_handler::<R, G>),
        )
        .route(
            "/api/v1/clients/:client_id/monitoring/reconcile",
            post(reconcile_handler::<R, G>),
        )
        .route(
            "/api/v1/clients/:client_id/monitoring/emergency",
            post(emergency_handler::<R, G>),
        )
        .route(
            "/api/v1/monitoring/:item_id/execute",
            post(execute_monitoring_handler::<R, G>),
        )
        .with_state(service)
}

pub(crate) async fn check_all_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    match service.run_check(None) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn check_client_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path(client_id): Path<String>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    match service.run_check(Some(&ClientId(client_id))) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn bulk_execute_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Query(query): Query<RenderQuery>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    let render = query.render.unwrap_or_default();
    match service.bulk_execute(render, &mut log_progress) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn execute_document_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path((client_id, doc_type)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    let Some(doc_type) = DocType::from_key(&doc_type) else {
        let payload = json!({
            "error": format!("unknown document type `{doc_type}`"),
        });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    };

    let client_id = ClientId(client_id);
    let render = query.render.unwrap_or_default();
    match service.execute_document(&client_id, doc_type, render, &mut log_progress) {
        Ok(execution) => (StatusCode::OK, axum::Json(execution)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn validate_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path(client_id): Path<String>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    match service.validate_client(&ClientId(client_id)) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn replace_goals_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path(client_id): Path<String>,
    axum::Json(goals): axum::Json<Vec<GoalPeriod>>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    match service.replace_goals(&ClientId(client_id), goals) {
        Ok(replacement) => (StatusCode::OK, axum::Json(replacement)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reset_goals_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path(client_id): Path<String>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    match service.reset_goals(&ClientId(client_id)) {
        Ok(removed) => {
            let payload = json!({ "removed_goals": removed });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reconcile_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path(client_id): Path<String>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    match service.reconcile_monitoring(Some(&ClientId(client_id))) {
        Ok(created) => {
            let payload = json!({ "created": created });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn emergency_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path(client_id): Path<String>,
    axum::Json(request): axum::Json<EmergencyRequest>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    match service.record_emergency(&ClientId(client_id), request) {
        Ok(item) => (StatusCode::CREATED, axum::Json(item)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn execute_monitoring_handler<R, G>(
    State(service): State<Arc<ComplianceService<R, G>>>,
    Path(item_id): Path<String>,
    Query(query): Query<RenderQuery>,
) -> Response
where
    R: ScheduleRepository + 'static,
    G: DocumentGenerator + 'static,
{
    let item_id = MonitoringItemId(item_id);
    let render = query.render.unwrap_or_default();
    match service.execute_monitoring(&item_id, render, &mut log_progress) {
        Ok(execution) => (StatusCode::OK, axum::Json(execution)).into_response(),
        Err(error) => error_response(error),
    }
}

fn log_progress(message: &str) {
    debug!(progress = message, "generation progress");
}

/// Map a service failure onto a status code and `{"error": ...}` body.
pub(crate) fn error_response(error: ComplianceServiceError) -> Response {
    let status = error_status(&error);
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) fn error_status(error: &ComplianceServiceError) -> StatusCode {
    use ComplianceServiceError as E;
    use ExecutionError as X;

    match error {
        E::ClientNotFound(_)
        | E::Repository(RepositoryError::NotFound)
        | E::Execution(X::ClientNotFound(_))
        | E::Execution(X::ItemNotFound(_))
        | E::Execution(X::Persistence(RepositoryError::NotFound)) => StatusCode::NOT_FOUND,
        E::Repository(RepositoryError::Conflict)
        | E::Execution(X::InFlight(_))
        | E::Execution(X::AlreadyCompleted(_))
        | E::Execution(X::Persistence(RepositoryError::Conflict)) => StatusCode::CONFLICT,
        E::InvalidGoals(_) => StatusCode::UNPROCESSABLE_ENTITY,
        E::Execution(X::NotExecutable(_)) => StatusCode::BAD_REQUEST,
        E::Execution(X::Generation(_)) => StatusCode::BAD_GATEWAY,
        E::Repository(RepositoryError::Unavailable(_))
        | E::Execution(X::Persistence(RepositoryError::Unavailable(_)))
        | E::Execution(X::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
