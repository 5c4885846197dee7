use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::audit::ImageVerifier;
use super::domain::{ClaimDraft, ClaimStatus, RecordId, User, UserId, UserRole};
use super::repository::{ClaimScope, ClaimStore, FieldSettingsStore, StoreError};
use super::schema::{FieldDefinition, FieldSet, RemovalConfirmation, SchemaViolation};
use super::service::{ClaimService, ClaimServiceError};

/// Submitting account as forwarded by the session layer in front of this router.
#[derive(Debug, Clone, Deserialize)]
pub struct Claimant {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Claimant {
    fn into_user(self) -> User {
        User {
            id: UserId(self.id),
            username: self.username,
            password: String::new(),
            display_name: self.display_name,
            role: UserRole::User,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitClaimRequest {
    pub claimant: Claimant,
    #[serde(flatten)]
    pub draft: ClaimDraft,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: ClaimStatus,
}

#[derive(Debug, Deserialize)]
pub struct BatchAuditRequest {
    pub ids: Vec<RecordId>,
}

/// Whole-form replacement; dropping system fields needs `confirm_removal`.
#[derive(Debug, Deserialize)]
pub struct SaveFieldsRequest {
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub confirm_removal: bool,
}

impl SaveFieldsRequest {
    fn confirmation(&self) -> RemovalConfirmation {
        if self.confirm_removal {
            RemovalConfirmation::Confirmed
        } else {
            RemovalConfirmation::Unconfirmed
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub owner: Claimant,
    pub csv: String,
}

/// Router builder exposing claim intake, review, and audit endpoints.
pub fn claim_router<S, V>(service: Arc<ClaimService<S, V>>) -> Router
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/claims",
            post(submit_handler::<S, V>).get(list_handler::<S, V>),
        )
        .route("/api/v1/claims/audit", post(batch_audit_handler::<S, V>))
        .route("/api/v1/claims/import", post(import_handler::<S, V>))
        .route(
            "/api/v1/claims/:claim_id",
            get(get_handler::<S, V>).put(edit_handler::<S, V>),
        )
        .route(
            "/api/v1/claims/:claim_id/review",
            post(review_handler::<S, V>),
        )
        .route("/api/v1/claims/:claim_id/audit", post(audit_handler::<S, V>))
        .route(
            "/api/v1/claim-fields",
            get(fields_handler::<S, V>).put(save_fields_handler::<S, V>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    axum::Json(request): axum::Json<SubmitClaimRequest>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    let user = request.claimant.into_user();
    match service.submit(&user, request.draft).await {
        Ok(claim) => (StatusCode::CREATED, axum::Json(claim.summary_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    let scope = match query.owner {
        Some(owner) => ClaimScope::Owner(UserId(owner)),
        None => ClaimScope::All,
    };
    match service.list(scope).await {
        Ok(claims) => {
            let views: Vec<_> = claims.iter().map(|claim| claim.summary_view()).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    Path(claim_id): Path<String>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    match service.get(&RecordId(claim_id)).await {
        Ok(claim) => (StatusCode::OK, axum::Json(claim)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn edit_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    Path(claim_id): Path<String>,
    axum::Json(draft): axum::Json<ClaimDraft>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    match service.edit(&RecordId(claim_id), draft).await {
        Ok(claim) => (StatusCode::OK, axum::Json(claim.summary_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn review_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    Path(claim_id): Path<String>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    match service.review(&RecordId(claim_id), request.status).await {
        Ok(claim) => (StatusCode::OK, axum::Json(claim.summary_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn audit_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    Path(claim_id): Path<String>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    match service.audit_with_verdict(&RecordId(claim_id)).await {
        Ok((claim, verdict)) => {
            let payload = json!({
                "claim": claim.summary_view(),
                "audit": claim.audit,
                "verdict": verdict.summary(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn batch_audit_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    axum::Json(request): axum::Json<BatchAuditRequest>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    let report = service.audit_batch(request.ids).await;
    (StatusCode::OK, axum::Json(report)).into_response()
}

pub(crate) async fn import_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    axum::Json(request): axum::Json<ImportRequest>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    let owner = request.owner.into_user();
    match service
        .import_csv(&owner, Cursor::new(request.csv.into_bytes()))
        .await
    {
        Ok(imported) => {
            (StatusCode::CREATED, axum::Json(json!({ "imported": imported }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn fields_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    (StatusCode::OK, axum::Json(service.fields())).into_response()
}

pub(crate) async fn save_fields_handler<S, V>(
    State(service): State<Arc<ClaimService<S, V>>>,
    axum::Json(request): axum::Json<SaveFieldsRequest>,
) -> Response
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    let confirmation = request.confirmation();
    let fields = match FieldSet::new(request.fields) {
        Ok(fields) => fields,
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };
    match service.save_fields(fields, confirmation).await {
        Ok(saved) => (StatusCode::OK, axum::Json(saved)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: ClaimServiceError) -> Response {
    let (status, payload) = match &err {
        ClaimServiceError::Schema(SchemaViolation::Missing(missing)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": err.to_string(),
                "missing_fields": missing.labels,
            }),
        ),
        ClaimServiceError::Schema(SchemaViolation::Invalid(_))
        | ClaimServiceError::FieldConfig(_)
        | ClaimServiceError::NoEvidence(_)
        | ClaimServiceError::Import(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": err.to_string() }),
        ),
        ClaimServiceError::Duplicate(duplicate) => (
            StatusCode::CONFLICT,
            json!({
                "error": err.to_string(),
                "order_id": duplicate.order_id,
                "item_reason": duplicate.item_reason,
            }),
        ),
        ClaimServiceError::Store(StoreError::Conflict) => (
            StatusCode::CONFLICT,
            json!({ "error": "claim already exists" }),
        ),
        ClaimServiceError::ClaimNotFound(_) | ClaimServiceError::Store(StoreError::NotFound) => (
            StatusCode::NOT_FOUND,
            json!({ "error": err.to_string() }),
        ),
        ClaimServiceError::Store(StoreError::Unavailable(_))
        | ClaimServiceError::NumberUnavailable(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": err.to_string() }),
        ),
    };
    (status, axum::Json(payload)).into_response()
}
