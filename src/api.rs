// REST API with Axum
//
// All routes live under /api. The authenticated doctor is identified by the
// X-Doctor-Id header (token validation happens upstream). Every handler
// locks the shared connection, builds a FinanceService and runs one
// operation.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::entities::{
    Doctor, Hospital, NewIncomeRecord, NewProgressEntry, NewSurgeryRecord, Plan, RecordId,
    Subscription, SubscriptionStatus, SurgeryRecord,
};
use crate::error::{LedgerError, LedgerResult};
use crate::finance::HospitalOverview;
use crate::plan_limits::PlanLimits;
use crate::service::{DashboardStats, FinanceService};

pub const DOCTOR_ID_HEADER: &str = "x-doctor-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub limits: PlanLimits,
}

impl AppState {
    pub fn new(conn: Connection, limits: PlanLimits) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            limits,
        }
    }

    fn with_service<T>(
        &self,
        f: impl FnOnce(&FinanceService) -> LedgerResult<T>,
    ) -> Result<T, ApiError> {
        let conn = self
            .db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))?;
        let service = FinanceService::new(&conn, self.limits);
        f(&service).map_err(ApiError::from)
    }
}

// ============================================================================
// Responses & errors
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upgrade_required: Option<bool>,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Ledger(LedgerError),
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, upgrade_required) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
            ApiError::Ledger(err) => match err {
                LedgerError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string(), None),
                LedgerError::QuotaExceeded {
                    message,
                    upgrade_required,
                } => (StatusCode::FORBIDDEN, message, Some(upgrade_required)),
                LedgerError::InvalidInput(_) | LedgerError::Csv(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string(), None)
                }
                other => {
                    tracing::error!(error = %other, "request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                        None,
                    )
                }
            },
        };

        let body = ErrorBody {
            success: false,
            error,
            upgrade_required,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Doctor identity
// ============================================================================

/// The authenticated doctor, from the X-Doctor-Id header
pub struct DoctorId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for DoctorId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(DOCTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing X-Doctor-Id header".to_string()))?;

        Ok(DoctorId(id.to_string()))
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    name: String,
    email: String,
}

#[derive(Deserialize)]
pub struct SubscriptionRequest {
    plan: Plan,
    #[serde(default)]
    status: Option<SubscriptionStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddHospitalRequest {
    name: String,
    #[serde(default)]
    wht_enabled: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHospitalRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    wht_enabled: Option<bool>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// POST /api/doctors - Register a doctor on the free plan
async fn register_doctor(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Doctor>>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("name is required".to_string()).into());
    }
    let doctor = state.with_service(|s| s.register_doctor(&req.name, &req.email))?;
    Ok((StatusCode::CREATED, ApiResponse::ok(doctor)))
}

/// POST /api/doctor/subscription - Payment confirmed or cancelled
async fn set_subscription(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Json(req): Json<SubscriptionRequest>,
) -> ApiResult<Doctor> {
    let subscription = Subscription {
        plan: req.plan,
        status: req.status.unwrap_or(SubscriptionStatus::Active),
    };
    let doctor = state.with_service(|s| s.set_subscription(&doctor_id, subscription))?;
    Ok(ApiResponse::ok(doctor))
}

/// GET /api/doctor/dashboard-stats
async fn dashboard_stats(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
) -> ApiResult<DashboardStats> {
    let stats = state.with_service(|s| s.dashboard_stats(&doctor_id))?;
    Ok(ApiResponse::ok(stats))
}

/// GET /api/finance - One summary per hospital
async fn finance_overview(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
) -> ApiResult<Vec<HospitalOverview>> {
    let rows = state.with_service(|s| s.finance_overview(&doctor_id))?;
    Ok(ApiResponse::ok(rows))
}

/// POST /api/finance/add-hospital
async fn add_hospital(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Json(req): Json<AddHospitalRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Hospital>>), ApiError> {
    let hospital = state.with_service(|s| s.add_hospital(&doctor_id, &req.name, req.wht_enabled))?;
    Ok((StatusCode::CREATED, ApiResponse::ok(hospital)))
}

/// GET /api/finance/:id - Hospital ledger, newest record first
async fn get_hospital(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Path(hospital_id): Path<String>,
) -> ApiResult<Hospital> {
    let hospital = state.with_service(|s| s.hospital(&doctor_id, &hospital_id))?;
    Ok(ApiResponse::ok(hospital))
}

/// PUT /api/finance/:id - Rename or toggle WHT
async fn update_hospital(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Path(hospital_id): Path<String>,
    Json(req): Json<UpdateHospitalRequest>,
) -> ApiResult<Hospital> {
    let hospital = state.with_service(|s| {
        s.update_hospital(&doctor_id, &hospital_id, req.name.as_deref(), req.wht_enabled)
    })?;
    Ok(ApiResponse::ok(hospital))
}

/// DELETE /api/finance/:id
async fn delete_hospital(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Path(hospital_id): Path<String>,
) -> ApiResult<String> {
    state.with_service(|s| s.delete_hospital(&doctor_id, &hospital_id))?;
    Ok(ApiResponse::ok(hospital_id))
}

/// POST /api/finance/:id/add-record
async fn add_record(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Path(hospital_id): Path<String>,
    Json(record): Json<NewIncomeRecord>,
) -> ApiResult<Hospital> {
    let hospital = state.with_service(|s| s.add_record(&doctor_id, &hospital_id, record))?;
    Ok(ApiResponse::ok(hospital))
}

/// DELETE /api/finance/:id/record/:record_id
async fn delete_record(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Path((hospital_id, record_id)): Path<(String, String)>,
) -> ApiResult<Hospital> {
    let record_id = RecordId::from(record_id);
    let hospital = state.with_service(|s| s.delete_record(&doctor_id, &hospital_id, &record_id))?;
    Ok(ApiResponse::ok(hospital))
}

/// GET /api/surgery-records
async fn list_surgery_records(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
) -> ApiResult<Vec<SurgeryRecord>> {
    let records = state.with_service(|s| s.surgery_records(&doctor_id))?;
    Ok(ApiResponse::ok(records))
}

/// POST /api/surgery-records/create
async fn create_surgery_record(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Json(details): Json<NewSurgeryRecord>,
) -> Result<(StatusCode, Json<ApiResponse<SurgeryRecord>>), ApiError> {
    if details.patient_name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("patientName is required".to_string()).into());
    }
    let record = state.with_service(|s| s.create_surgery_record(&doctor_id, details))?;
    Ok((StatusCode::CREATED, ApiResponse::ok(record)))
}

/// GET /api/surgery-records/:id
async fn get_surgery_record(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Path(record_id): Path<String>,
) -> ApiResult<SurgeryRecord> {
    let record = state.with_service(|s| s.surgery_record(&doctor_id, &record_id))?;
    Ok(ApiResponse::ok(record))
}

/// POST /api/surgery-records/:id/entry
async fn add_entry(
    State(state): State<AppState>,
    DoctorId(doctor_id): DoctorId,
    Path(record_id): Path<String>,
    Json(entry): Json<NewProgressEntry>,
) -> ApiResult<SurgeryRecord> {
    let record = state.with_service(|s| s.add_entry(&doctor_id, &record_id, entry))?;
    Ok(ApiResponse::ok(record))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/doctors", post(register_doctor))
        .route("/doctor/subscription", post(set_subscription))
        .route("/doctor/dashboard-stats", get(dashboard_stats))
        .route("/finance", get(finance_overview))
        .route("/finance/add-hospital", post(add_hospital))
        .route(
            "/finance/:id",
            get(get_hospital).put(update_hospital).delete(delete_hospital),
        )
        .route("/finance/:id/add-record", post(add_record))
        .route("/finance/:id/record/:record_id", delete(delete_record))
        .route("/surgery-records", get(list_surgery_records))
        .route("/surgery-records/create", post(create_surgery_record))
        .route("/surgery-records/:id", get(get_surgery_record))
        .route("/surgery-records/:id/entry", post(add_entry))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
