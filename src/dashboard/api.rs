use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::batch::{BatchReport, PendingChange, PendingChanges, StatusWriter, save_all};
use super::compare::{Comparison, compare};
use super::contracts::{ContractFilter, ContractView, PipelineSummary, summarize};
use super::db::DbHandle;
use super::docusign::{DocuSignClient, Envelope, EnvelopeQuery};
use super::documents::{Completeness, REQUIRED_DOCUMENT_TYPES, completeness};
use super::export::{DOCX_CONTENT_TYPE, export_docx};
use super::models::*;
use super::notion::NotionClient;
use super::oauth::{PendingAuthorizations, TokenManager, generate_pkce, random_state};
use super::salesforce::SalesforceClient;
use super::templates::generate_tasks_for_stage;
use crate::config::DashboardConfig;
use crate::errors::DashboardError;

/// Header carrying the caller's email, set by the fronting auth proxy.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub config: DashboardConfig,
    pub salesforce: Option<SalesforceClient>,
    pub docusign: Option<DocuSignClient>,
    pub notion: Option<NotionClient>,
    pub salesforce_tokens: TokenManager,
    pub docusign_tokens: TokenManager,
    pub pending_auth: PendingAuthorizations,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the state, constructing each vendor client whose settings are
    /// present.
    pub fn new(db: DbHandle, config: DashboardConfig) -> anyhow::Result<Self> {
        let salesforce = SalesforceClient::from_config(&config.salesforce);
        let docusign = DocuSignClient::from_config(&config.docusign)?;
        let notion = NotionClient::from_config(&config.notion);
        tracing::info!(
            salesforce = salesforce.is_some(),
            docusign = docusign.is_some(),
            notion = notion.is_some(),
            "Vendor integrations configured"
        );
        Ok(Self {
            db,
            config,
            salesforce,
            docusign,
            notion,
            salesforce_tokens: TokenManager::new(Provider::Salesforce),
            docusign_tokens: TokenManager::new(Provider::DocuSign),
            pending_auth: PendingAuthorizations::new(),
        })
    }

    fn salesforce(&self) -> Result<&SalesforceClient, DashboardError> {
        self.salesforce
            .as_ref()
            .ok_or(DashboardError::NotConfigured("Salesforce"))
    }

    fn docusign(&self) -> Result<&DocuSignClient, DashboardError> {
        self.docusign
            .as_ref()
            .ok_or(DashboardError::NotConfigured("DocuSign"))
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub contract_id: String,
    pub status: String,
}

#[derive(Deserialize)]
pub struct BatchStatusRequest {
    pub changes: Vec<PendingChange>,
}

#[derive(Deserialize)]
pub struct CompareRequest {
    pub original: String,
    pub revised: String,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub original: String,
    pub revised: String,
    pub title: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub contract_id: Option<String>,
}

#[derive(Deserialize)]
pub struct GenerateTasksRequest {
    pub stage: String,
    #[serde(default)]
    pub close_date: Option<NaiveDate>,
    #[serde(default)]
    pub stage_entry_date: Option<NaiveDate>,
    #[serde(default)]
    pub contract_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Serialize)]
pub struct StatusChange {
    pub contract: ContractView,
    pub changed: bool,
    pub generated_tasks: Vec<Task>,
}

#[derive(Serialize)]
pub struct SyncResult {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
}

#[derive(Serialize)]
pub struct CurrentUser {
    pub email: Option<String>,
    pub role: Role,
    pub can_edit: bool,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Reauth { message: String, redirect: String },
    Forbidden(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg})),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({"error": msg})),
            ApiError::Reauth { message, redirect } => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({
                    "error": message,
                    "reauth_required": true,
                    "redirect": redirect,
                }),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, serde_json::json!({"error": msg})),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, serde_json::json!({"error": msg})),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": msg}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        let message = err.to_string();
        match err {
            DashboardError::ContractNotFound { .. } | DashboardError::TaskNotFound { .. } => {
                ApiError::NotFound(message)
            }
            DashboardError::ContractExists { .. } => ApiError::Conflict(message),
            DashboardError::InvalidStatus { .. }
            | DashboardError::BadRequest(_)
            | DashboardError::NotConfigured(_) => ApiError::BadRequest(message),
            DashboardError::ReauthRequired { authorize_url, .. } => ApiError::Reauth {
                message,
                redirect: authorize_url,
            },
            DashboardError::Forbidden(_) => ApiError::Forbidden(message),
            DashboardError::Upstream { .. } => ApiError::BadGateway(message),
            DashboardError::Database(ref e) => {
                tracing::error!(error = ?e, "Database error");
                ApiError::Internal(message)
            }
            DashboardError::Other(ref e) => {
                tracing::error!(error = ?e, "Request failed");
                ApiError::Internal(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "Request failed");
        ApiError::Internal(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/contracts", get(list_contracts).post(create_contract))
        .route("/api/contracts/summary", get(contract_summary))
        .route("/api/contracts/update-status", post(update_status))
        .route("/api/contracts/batch-status", post(batch_status))
        .route("/api/contracts/compare", post(compare_documents))
        .route("/api/contracts/compare/export", post(export_comparison))
        .route("/api/contracts/{id}", get(get_contract).delete(delete_contract))
        .route(
            "/api/contracts/{id}/documents",
            get(list_documents).post(add_document),
        )
        .route(
            "/api/contracts/{id}/documents/completeness",
            get(document_completeness),
        )
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/generate", post(generate_tasks_preview))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/salesforce/authorize", get(salesforce_authorize))
        .route("/api/salesforce/callback", get(salesforce_callback))
        .route("/api/salesforce/contracts", get(salesforce_contracts))
        .route("/api/salesforce/sync", post(salesforce_sync))
        .route("/api/docusign/envelopes", get(docusign_envelopes))
        .route("/api/docusign/envelopes/{id}", get(docusign_envelope))
        .route("/api/roles", get(list_roles))
        .route("/api/roles/{email}", put(set_role))
        .route("/api/me", get(current_user))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

fn caller_email(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

async fn caller_role(state: &AppState, headers: &HeaderMap) -> Result<Role, ApiError> {
    let Some(email) = caller_email(headers) else {
        return Ok(Role::Viewer);
    };
    let role = state.db.call(move |db| db.get_role(&email)).await?;
    Ok(role.unwrap_or(Role::Viewer))
}

/// Reject callers that may not write when role enforcement is on.
async fn require_editor(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if !state.config.access.enforce_roles {
        return Ok(());
    }
    if caller_role(state, headers).await?.can_edit() {
        Ok(())
    } else {
        Err(DashboardError::Forbidden("editor or admin role required".into()).into())
    }
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if !state.config.access.enforce_roles {
        return Ok(());
    }
    match caller_role(state, headers).await? {
        Role::Admin => Ok(()),
        _ => Err(DashboardError::Forbidden("admin role required".into()).into()),
    }
}

async fn load_contract(state: &AppState, id: String) -> Result<Contract, DashboardError> {
    let lookup = id.clone();
    state
        .db
        .call(move |db| db.get_contract(&lookup))
        .await
        .map_err(DashboardError::Database)?
        .ok_or(DashboardError::ContractNotFound { id })
}

/// Write one contract status: validate, push to Notion, update the store,
/// and spawn the new stage's tasks when the stage actually changed.
///
/// Notion is written first; if it fails the store is left untouched.
pub async fn apply_status_change(
    state: &AppState,
    contract_id: &str,
    status: &str,
) -> Result<StatusChange, DashboardError> {
    let stage = PipelineStage::from_str(status).map_err(|_| DashboardError::InvalidStatus {
        value: status.to_string(),
    })?;
    let contract = load_contract(state, contract_id.to_string()).await?;

    if contract.status != stage {
        if let (Some(notion), Some(page_id)) = (&state.notion, contract.notion_page_id.as_deref()) {
            notion.update_status(page_id, stage.as_str()).await?;
        }
    }

    let id = contract_id.to_string();
    let (contract, changed) = state
        .db
        .call(move |db| db.update_contract_status(&id, stage))
        .await
        .map_err(DashboardError::Database)?
        .ok_or_else(|| DashboardError::ContractNotFound {
            id: contract_id.to_string(),
        })?;

    let generated_tasks = if changed {
        let tasks =
            generate_tasks_for_stage(Some(&contract.id), stage.as_str(), contract.close_date, today());
        state
            .db
            .call(move |db| db.insert_generated_tasks(&tasks))
            .await
            .map_err(DashboardError::Database)?
    } else {
        Vec::new()
    };

    tracing::info!(
        contract_id,
        status = stage.as_str(),
        changed,
        generated = generated_tasks.len(),
        "Contract status written"
    );

    Ok(StatusChange {
        contract: ContractView::new(contract, today()),
        changed,
        generated_tasks,
    })
}

/// Batch writer backed by the same path as single status writes.
struct StoreStatusWriter<'a> {
    state: &'a AppState,
}

#[async_trait]
impl StatusWriter for StoreStatusWriter<'_> {
    async fn write_status(&self, contract_id: &str, status: &str) -> Result<(), DashboardError> {
        apply_status_change(self.state, contract_id, status)
            .await
            .map(|_| ())
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_contracts(
    State(state): State<SharedState>,
    params: Result<Query<ContractFilter>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(filter) = params?;
    let contracts = state.db.call(move |db| db.list_contracts()).await?;
    let today = today();
    let views: Vec<ContractView> = contracts
        .into_iter()
        .filter(|c| filter.matches(c))
        .map(|c| ContractView::new(c, today))
        .collect();
    Ok(Json(views))
}

async fn contract_summary(
    State(state): State<SharedState>,
) -> Result<Json<PipelineSummary>, ApiError> {
    let contracts = state.db.call(move |db| db.list_contracts()).await?;
    let today = today();
    let views: Vec<ContractView> = contracts
        .into_iter()
        .map(|c| ContractView::new(c, today))
        .collect();
    Ok(Json(summarize(&views)))
}

async fn create_contract(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<NewContract>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_editor(&state, &headers).await?;
    let Json(req) = payload?;
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Contract name is required".into()));
    }
    let requested_id = req.id.clone();
    let contract = state
        .db
        .call(move |db| {
            if let Some(id) = &req.id {
                if db.get_contract(id)?.is_some() {
                    return Ok(None);
                }
            }
            db.create_contract(&req).map(Some)
        })
        .await?
        .ok_or_else(|| DashboardError::ContractExists {
            id: requested_id.unwrap_or_default(),
        })?;
    tracing::info!(contract_id = %contract.id, "Contract created");
    Ok((StatusCode::CREATED, Json(ContractView::new(contract, today()))))
}

async fn get_contract(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ContractView>, ApiError> {
    let contract = load_contract(&state, id).await?;
    Ok(Json(ContractView::new(contract, today())))
}

async fn delete_contract(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_editor(&state, &headers).await?;
    let lookup = id.clone();
    let deleted = state.db.call(move |db| db.delete_contract(&lookup)).await?;
    if deleted {
        tracing::info!(contract_id = %id, "Contract deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(DashboardError::ContractNotFound { id }.into())
    }
}

async fn update_status(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<StatusChange>, ApiError> {
    require_editor(&state, &headers).await?;
    let Json(req) = payload?;
    let change = apply_status_change(&state, &req.contract_id, &req.status).await?;
    Ok(Json(change))
}

async fn batch_status(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<BatchStatusRequest>, JsonRejection>,
) -> Result<Json<BatchReport>, ApiError> {
    require_editor(&state, &headers).await?;
    let Json(req) = payload?;
    let mut pending: PendingChanges = req.changes.into_iter().collect();
    let writer = StoreStatusWriter { state: &state };
    let report = save_all(&mut pending, &writer).await;
    Ok(Json(report))
}

async fn compare_documents(
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Json<Comparison>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(compare(&req.original, &req.revised)))
}

async fn export_comparison(
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let title = req.title.unwrap_or_else(|| "Document Comparison".to_string());
    let file_name = req
        .file_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "comparison.docx".to_string())
        .replace('"', "");
    let bytes = tokio::task::spawn_blocking(move || {
        let result = compare(&req.original, &req.revised);
        export_docx(&title, &result.segments, &result.stats)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Export task failed: {}", e)))??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}

async fn list_documents(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let contract = load_contract(&state, id).await?;
    let documents = state
        .db
        .call(move |db| db.list_documents(&contract.id))
        .await?;
    Ok(Json(documents))
}

async fn add_document(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<NewDocument>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_editor(&state, &headers).await?;
    let Json(req) = payload?;
    if req.file_name.trim().is_empty() {
        return Err(ApiError::BadRequest("file_name is required".into()));
    }
    let contract = load_contract(&state, id).await?;
    let document = state
        .db
        .call(move |db| db.add_document(&contract.id, &req))
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn document_completeness(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Completeness>, ApiError> {
    let contract = load_contract(&state, id).await?;
    let documents = state
        .db
        .call(move |db| db.list_documents(&contract.id))
        .await?;
    Ok(Json(completeness(&documents, &REQUIRED_DOCUMENT_TYPES)))
}

async fn list_tasks(
    State(state): State<SharedState>,
    params: Result<Query<TaskQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = params?;
    let tasks = state.db.call(move |db| db.list_tasks(&query)).await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_editor(&state, &headers).await?;
    let Json(req) = payload?;
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Task title is required".into()));
    }
    if let Some(contract_id) = req.contract_id.clone() {
        load_contract(&state, contract_id).await?;
    }
    let task = NewTask {
        title: req.title,
        description: req.description.unwrap_or_default(),
        status: TaskStatus::Pending,
        priority: req.priority.unwrap_or(Priority::Medium),
        due_date: req.due_date,
        contract_id: req.contract_id,
        stage: None,
        template_id: None,
        is_auto_generated: false,
    };
    let task = state.db.call(move |db| db.create_task(&task)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<TaskUpdate>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    require_editor(&state, &headers).await?;
    let Path(id) = path?;
    let Json(req) = payload?;
    let task = state
        .db
        .call(move |db| db.update_task(id, &req))
        .await?
        .ok_or(DashboardError::TaskNotFound { id })?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    require_editor(&state, &headers).await?;
    let Path(id) = path?;
    let deleted = state.db.call(move |db| db.delete_task(id)).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(DashboardError::TaskNotFound { id }.into())
    }
}

async fn generate_tasks_preview(
    payload: Result<Json<GenerateTasksRequest>, JsonRejection>,
) -> Result<Json<Vec<NewTask>>, ApiError> {
    let Json(req) = payload?;
    let entered = req.stage_entry_date.unwrap_or_else(today);
    Ok(Json(generate_tasks_for_stage(
        req.contract_id.as_deref(),
        &req.stage,
        req.close_date,
        entered,
    )))
}

async fn salesforce_authorize(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let client = state.salesforce()?;
    let pkce = generate_pkce();
    let oauth_state = random_state();
    let url = client.authorize_url(&oauth_state, &pkce.challenge)?;
    state.pending_auth.insert(oauth_state, pkce.verifier);
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

async fn salesforce_callback(
    State(state): State<SharedState>,
    params: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = params?;
    if let Some(error) = query.error {
        return Err(ApiError::BadRequest(format!(
            "Salesforce authorization failed: {} {}",
            error,
            query.error_description.unwrap_or_default()
        )));
    }
    let client = state.salesforce()?;
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("Missing code or state".into()));
    };
    let verifier = state
        .pending_auth
        .take(&oauth_state)
        .ok_or_else(|| ApiError::BadRequest("Unknown or expired authorization state".into()))?;

    let grant = client.exchange_code(&code, &verifier).await?;
    state.salesforce_tokens.store_grant(&state.db, grant).await?;
    tracing::info!("Salesforce connected");
    Ok((StatusCode::FOUND, [(header::LOCATION, "/".to_string())]).into_response())
}

async fn salesforce_contracts(
    State(state): State<SharedState>,
) -> Result<Json<Vec<CrmContract>>, ApiError> {
    let client = state.salesforce()?;
    let contracts = client
        .fetch_contracts(&state.db, &state.salesforce_tokens)
        .await?;
    Ok(Json(contracts))
}

async fn salesforce_sync(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<SyncResult>, ApiError> {
    require_editor(&state, &headers).await?;
    let client = state.salesforce()?;
    let contracts = client
        .fetch_contracts(&state.db, &state.salesforce_tokens)
        .await?;
    let fetched = contracts.len();
    let created = state
        .db
        .call(move |db| {
            let mut created = 0;
            for crm in &contracts {
                let (_, is_new) = db.upsert_crm_contract(crm)?;
                if is_new {
                    created += 1;
                }
            }
            Ok(created)
        })
        .await?;
    let result = SyncResult {
        fetched,
        created,
        updated: fetched - created,
    };
    tracing::info!(
        fetched = result.fetched,
        created = result.created,
        updated = result.updated,
        "Salesforce sync finished"
    );
    Ok(Json(result))
}

async fn docusign_envelopes(
    State(state): State<SharedState>,
    params: Result<Query<EnvelopeQuery>, QueryRejection>,
) -> Result<Json<Vec<Envelope>>, ApiError> {
    let Query(query) = params?;
    let client = state.docusign()?;
    let envelopes = client
        .list_envelopes(&state.db, &state.docusign_tokens, &query)
        .await?;
    Ok(Json(envelopes))
}

async fn docusign_envelope(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope>, ApiError> {
    let client = state.docusign()?;
    let envelope = client
        .get_envelope(&state.db, &state.docusign_tokens, &id)
        .await?;
    Ok(Json(envelope))
}

async fn list_roles(State(state): State<SharedState>) -> Result<Json<Vec<UserRole>>, ApiError> {
    let roles = state.db.call(move |db| db.list_roles()).await?;
    Ok(Json(roles))
}

async fn set_role(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(email): Path<String>,
    payload: Result<Json<SetRoleRequest>, JsonRejection>,
) -> Result<Json<UserRole>, ApiError> {
    require_admin(&state, &headers).await?;
    let Json(req) = payload?;
    if !email.contains('@') {
        return Err(ApiError::BadRequest(format!("Invalid email: {}", email)));
    }
    let role = state
        .db
        .call(move |db| db.set_role(&email, req.role))
        .await?;
    Ok(Json(role))
}

async fn current_user(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<CurrentUser>, ApiError> {
    let role = caller_role(&state, &headers).await?;
    Ok(Json(CurrentUser {
        email: caller_email(&headers),
        role,
        can_edit: role.can_edit(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────
