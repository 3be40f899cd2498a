use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use procurement_api::{
    kernel_error, ApprovalDocument, DeleteResult, DraftValidation, MigrateResult, ProcurementApi,
    UpsertResult, API_CONTRACT_VERSION,
};
use procurement_core::{
    Approval, Contract, KernelError, PlanItem, Purchase, PurchaseRequest, RecordId,
};
use procurement_ingest::{BatchReport, IngestManifest, StatusPassReport};
use procurement_store_sqlite::{
    IngestRun, Page, PageRequest, RecordFilter, SchemaStatus, StoredEntity, TableCounts,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const DEFAULT_RUNS_LIMIT: u32 = 20;

#[derive(Debug, Clone)]
struct ServiceState {
    api: ProcurementApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    dry_run: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
    cfo: Option<String>,
    search: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RunsQuery {
    limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    counts: TableCounts,
}

#[derive(Debug, Parser)]
#[command(name = "procurement-service")]
#[command(about = "Local HTTP service for the procurement workflow kernel")]
struct Args {
    #[arg(long, default_value = "./procurement.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, service_contract_version: SERVICE_CONTRACT_VERSION, error: message.into() }
    }

    /// Unknown ids map to 404; everything else the caller sent is a 400.
    fn from_api(err: &anyhow::Error) -> Self {
        let status = match kernel_error(err) {
            Some(KernelError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, format!("{err:#}"))
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

type Reply<T> = Result<Json<ServiceEnvelope<T>>, ServiceError>;

fn reply<T: Serialize>(result: Result<T>) -> Reply<T> {
    result.map(|data| Json(envelope(data))).map_err(|err| ServiceError::from_api(&err))
}

fn parse_id(raw: &str) -> Result<RecordId, ServiceError> {
    RecordId::parse(raw).map_err(|err| ServiceError::new(StatusCode::BAD_REQUEST, err.to_string()))
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/db/schema-version", get(db_schema_version))
        .route("/v1/db/migrate", post(db_migrate))
        .route(
            "/v1/requests",
            get(list_records::<PurchaseRequest>).put(upsert_record::<PurchaseRequest>),
        )
        .route(
            "/v1/requests/:id",
            get(get_record::<PurchaseRequest>).delete(delete_record::<PurchaseRequest>),
        )
        .route("/v1/requests/:id/approvals", get(list_approvals::<PurchaseRequest>))
        .route("/v1/purchases", get(list_records::<Purchase>).put(upsert_record::<Purchase>))
        .route(
            "/v1/purchases/:id",
            get(get_record::<Purchase>).delete(delete_record::<Purchase>),
        )
        .route("/v1/purchases/:id/approvals", get(list_approvals::<Purchase>))
        .route("/v1/contracts", get(list_records::<Contract>).put(upsert_record::<Contract>))
        .route(
            "/v1/contracts/:id",
            get(get_record::<Contract>).delete(delete_record::<Contract>),
        )
        .route("/v1/plan-items", get(list_records::<PlanItem>).put(upsert_record::<PlanItem>))
        .route(
            "/v1/plan-items/:id",
            get(get_record::<PlanItem>).delete(delete_record::<PlanItem>),
        )
        .route("/v1/ingest", post(ingest))
        .route("/v1/ingest/runs", get(ingest_runs))
        .route("/v1/statuses/recompute", post(recompute_statuses))
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let state = ServiceState { api: ProcurementApi::new(args.db) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!("procurement-service listening on {}", args.bind);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health(State(state): State<ServiceState>) -> Reply<HealthResponse> {
    reply(state.api.table_counts().map(|counts| HealthResponse { status: "ok", counts }))
}

async fn db_schema_version(State(state): State<ServiceState>) -> Reply<SchemaStatus> {
    reply(state.api.schema_status())
}

async fn db_migrate(
    State(state): State<ServiceState>,
    Json(request): Json<MigrateRequest>,
) -> Reply<MigrateResult> {
    reply(state.api.migrate(request.dry_run))
}

async fn list_records<E>(
    State(state): State<ServiceState>,
    Query(query): Query<ListQuery>,
) -> Reply<Page<E>>
where
    E: StoredEntity + Serialize + Send + 'static,
{
    let filter = RecordFilter { status: query.status, cfo: query.cfo, search: query.search };
    reply(state.api.list::<E>(&filter, PageRequest::new(query.page, query.page_size)))
}

async fn get_record<E>(State(state): State<ServiceState>, Path(id): Path<String>) -> Reply<E>
where
    E: StoredEntity + Serialize + Send + 'static,
{
    let id = parse_id(&id)?;
    reply(state.api.get::<E>(id))
}

async fn upsert_record<E>(
    State(state): State<ServiceState>,
    Json(draft): Json<E::Draft>,
) -> Reply<UpsertResult<E>>
where
    E: StoredEntity + Serialize + Send + 'static,
    E::Draft: DeserializeOwned + DraftValidation + Send + 'static,
{
    reply(state.api.upsert::<E>(draft))
}

async fn delete_record<E>(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Reply<DeleteResult>
where
    E: StoredEntity + Send + 'static,
{
    let id = parse_id(&id)?;
    reply(state.api.delete::<E>(id))
}

async fn list_approvals<E>(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Reply<Vec<Approval>>
where
    E: ApprovalDocument + Send + 'static,
{
    let id = parse_id(&id)?;
    reply(state.api.approvals::<E>(id))
}

async fn ingest(
    State(state): State<ServiceState>,
    Json(manifest): Json<IngestManifest>,
) -> Reply<BatchReport> {
    let api = state.api.clone();
    let joined = tokio::task::spawn_blocking(move || api.ingest(&manifest)).await;
    match joined {
        Ok(result) => reply(result),
        Err(err) => Err(ServiceError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ingest task failed: {err}"),
        )),
    }
}

async fn recompute_statuses(State(state): State<ServiceState>) -> Reply<StatusPassReport> {
    let api = state.api.clone();
    let joined = tokio::task::spawn_blocking(move || api.recompute_statuses()).await;
    match joined {
        Ok(result) => reply(result),
        Err(err) => Err(ServiceError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("status pass task failed: {err}"),
        )),
    }
}

async fn ingest_runs(
    State(state): State<ServiceState>,
    Query(query): Query<RunsQuery>,
) -> Reply<Vec<IngestRun>> {
    reply(state.api.ingest_runs(query.limit.unwrap_or(DEFAULT_RUNS_LIMIT)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use http::Request;
    use procurement_ingest::fixtures::{text_rows, write_xlsx};
    use serde_json::Value;
    use tower::ServiceExt;

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("procurement-service-{}.sqlite3", ulid::Ulid::new()))
    }

    fn router(db_path: PathBuf) -> Router {
        app(ServiceState { api: ProcurementApi::new(db_path) })
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().uri(uri).method(method);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build request: {err}"));

        let response = match router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        };
        let status = response.status();
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => (status, value),
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    fn text_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
        value
            .pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_else(|| panic!("missing string at {pointer} in {value}"))
    }

    // Test IDs: TSVC-001
    #[tokio::test]
    async fn health_endpoint_reports_ok_with_counts() {
        let db_path = unique_temp_db_path();
        let (status, value) = send(&router(db_path.clone()), "GET", "/v1/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text_at(&value, "/service_contract_version"), SERVICE_CONTRACT_VERSION);
        assert_eq!(text_at(&value, "/api_contract_version"), API_CONTRACT_VERSION);
        assert_eq!(text_at(&value, "/data/status"), "ok");
        assert_eq!(value.pointer("/data/counts/contracts").and_then(Value::as_i64), Some(0));

        let _ = std::fs::remove_file(&db_path);
    }

    // Test IDs: TSVC-002
    #[tokio::test]
    async fn request_upsert_get_list_and_delete_round_trip() {
        let db_path = unique_temp_db_path();
        let router = router(db_path.clone());

        let draft = serde_json::json!({ "request_number": 1024, "title": "Ноутбуки" });
        let (status, created) = send(&router, "PUT", "/v1/requests", Some(draft.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text_at(&created, "/data/outcome"), "created");
        let id = text_at(&created, "/data/record/id").to_string();

        let (_, repeated) = send(&router, "PUT", "/v1/requests", Some(draft)).await;
        assert_eq!(text_at(&repeated, "/data/outcome"), "unchanged");

        let (status, page) =
            send(&router, "GET", "/v1/requests?status=project&page_size=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page.pointer("/data/total").and_then(Value::as_i64), Some(1));
        assert_eq!(page.pointer("/data/page_size").and_then(Value::as_i64), Some(5));

        let (status, fetched) = send(&router, "GET", &format!("/v1/requests/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text_at(&fetched, "/data/status"), "PROJECT");

        let (status, approvals) =
            send(&router, "GET", &format!("/v1/requests/{id}/approvals"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approvals.pointer("/data").and_then(Value::as_array).map(Vec::len), Some(0));

        let (status, _) = send(&router, "DELETE", &format!("/v1/requests/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, missing) = send(&router, "GET", &format!("/v1/requests/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(text_at(&missing, "/error").contains("not found"));

        let (status, _) = send(&router, "GET", "/v1/requests/not-a-ulid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let _ = std::fs::remove_file(&db_path);
    }

    // Test IDs: TSVC-003
    #[tokio::test]
    async fn blank_purchase_keys_are_rejected() {
        let db_path = unique_temp_db_path();
        let router = router(db_path.clone());

        let (status, value) = send(
            &router,
            "PUT",
            "/v1/purchases",
            Some(serde_json::json!({ "inner_id": " ", "name": "Закупка" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(text_at(&value, "/error").contains("inner_id"));

        let _ = std::fs::remove_file(&db_path);
    }

    // Test IDs: TSVC-004
    #[tokio::test]
    async fn ingest_route_imports_approvals_and_recomputes() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("temp dir: {err}"));
        let report_path = dir.path().join("approvals.xlsx");
        write_xlsx(
            &report_path,
            "Отчет",
            &text_rows(&[
                &["Номер заявки", "Этап", "Исполнитель", "Дата назначения", "Дата выполнения"],
                &["1024", "Утверждение заявки", "Иванова А.", "02.03.2024 09:00", ""],
            ]),
        )
        .unwrap_or_else(|err| panic!("failed to write fixture: {err}"));
        let router = router(dir.path().join("procurement.sqlite3"));

        let (_, created) = send(
            &router,
            "PUT",
            "/v1/requests",
            Some(serde_json::json!({ "request_number": 1024 })),
        )
        .await;
        let id = text_at(&created, "/data/record/id").to_string();

        let manifest = serde_json::json!({
            "sources": [{ "kind": "request_approvals", "path": report_path }]
        });
        let (status, report) = send(&router, "POST", "/v1/ingest", Some(manifest)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.pointer("/data/failed_files").and_then(Value::as_i64), Some(0));
        assert_eq!(
            report.pointer("/data/statuses/requests/changed").and_then(Value::as_i64),
            Some(1)
        );

        let (_, fetched) = send(&router, "GET", &format!("/v1/requests/{id}"), None).await;
        assert_eq!(text_at(&fetched, "/data/status"), "ON_APPROVAL");
        let (_, approvals) =
            send(&router, "GET", &format!("/v1/requests/{id}/approvals"), None).await;
        assert_eq!(text_at(&approvals, "/data/0/assignee"), "Иванова А.");

        let (status, pass) = send(&router, "POST", "/v1/statuses/recompute", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pass.pointer("/data/requests/unchanged").and_then(Value::as_i64), Some(1));

        let (_, runs) = send(&router, "GET", "/v1/ingest/runs?limit=5", None).await;
        assert_eq!(runs.pointer("/data").and_then(Value::as_array).map(Vec::len), Some(1));
        assert_eq!(text_at(&runs, "/data/0/outcome"), "completed");
    }
}
