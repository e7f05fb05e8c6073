use crate::analysis::{self, MeetingSubmission, PipelineOutcome, TranscriptAnalyzer};
use crate::cache::{DashboardCache, DatasetKey};
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::ingest::{self, FathomRecording, IngestOutcome};
use crate::meta_ads::{InsightsSnapshot, MetaAdsService};
use crate::metrics::Severity;
use crate::models::{
    ActivityEntry, AdAccount, AdAccountMapping, Author, ClientAdsRecord, ClientSetupRecord,
    DatePreset, EmailDomainMapping, Meeting, Note,
};
use crate::reconcile::{self, ClientRecord, ReconcileOutput};
use crate::sheets::SheetService;
use crate::store::DashboardStorage;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Dataset cache shared across requests.
    pub cache: Arc<DashboardCache>,
}

impl AppState {
    fn storage(&self) -> DashboardStorage {
        DashboardStorage::new(self.db.clone())
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "client-success-api",
            "version": "0.1.0"
        })),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    /// Meta reporting window; unknown values fall back to last_7d.
    pub date_preset: Option<String>,
    /// When true, drops cached datasets before loading.
    #[serde(default)]
    pub refresh: bool,
}

/// Full dashboard payload: reconciled roster plus the rows only the setup
/// sheet knows about.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub clients: Vec<ClientRecord>,
    pub setup_only: Vec<ClientSetupRecord>,
    pub date_preset: DatePreset,
    /// Per-client Meta fetch failures from this snapshot.
    pub meta_errors: std::collections::HashMap<String, String>,
}

/// GET /api/v1/dashboard
///
/// The main read path: fetches both sheets and the Meta snapshot (each
/// cache-backed), reconciles, and returns the scored roster.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<DashboardResponse>, AppError> {
    let preset = DatePreset::parse_or_default(params.date_preset.as_deref().unwrap_or_default());
    tracing::info!(
        "GET /dashboard - preset: {}, refresh: {}",
        preset.as_str(),
        params.refresh
    );

    if params.refresh {
        state.cache.invalidate_sheets().await;
        state.cache.invalidate_meta().await;
    }

    let (ads, setups) = load_sheets(&state).await?;
    let insights = load_insights(&state, preset).await?;
    let output = reconcile::reconcile(&ads, &setups, Some(&insights));

    Ok(Json(DashboardResponse {
        clients: output.clients,
        setup_only: output.setup_only,
        date_preset: insights.date_preset,
        meta_errors: insights.errors,
    }))
}

/// GET /api/v1/clients/:name
///
/// One reconciled record, looked up by exact ads-sheet client name.
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<ClientRecord>, AppError> {
    let preset = DatePreset::parse_or_default(params.date_preset.as_deref().unwrap_or_default());
    let (ads, setups) = load_sheets(&state).await?;
    let insights = load_insights(&state, preset).await?;
    let output = reconcile::reconcile(&ads, &setups, Some(&insights));

    output
        .clients
        .into_iter()
        .find(|record| record.ads.client == name)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Client {} not found", name)))
}

/// Clients carrying at least one high-severity issue, for the risk overview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskOverviewResponse {
    pub at_risk: Vec<ClientRecord>,
    pub important_notes: Vec<Note>,
}

/// GET /api/v1/risk-overview
pub async fn get_risk_overview(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<RiskOverviewResponse>, AppError> {
    let preset = DatePreset::parse_or_default(params.date_preset.as_deref().unwrap_or_default());
    let (ads, setups) = load_sheets(&state).await?;
    let insights = load_insights(&state, preset).await?;
    let ReconcileOutput { clients, .. } = reconcile::reconcile(&ads, &setups, Some(&insights));

    let mut at_risk: Vec<ClientRecord> = clients
        .into_iter()
        .filter(|record| {
            record
                .issues
                .iter()
                .any(|flag| flag.severity == Severity::High)
        })
        .collect();
    // Worst health first
    at_risk.sort_by_key(|record| record.health_score);
    let important_notes = state.storage().list_important_notes().await?;

    Ok(Json(RiskOverviewResponse {
        at_risk,
        important_notes,
    }))
}

/// POST /api/v1/refresh
///
/// Drops every cached dataset so the next dashboard load hits the upstreams.
pub async fn force_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.cache.invalidate_sheets().await;
    state.cache.invalidate_meta().await;
    tracing::info!("All cached datasets invalidated");
    Ok(Json(json!({ "refreshed": true })))
}

// ============ Meta ads ============

/// GET /api/v1/meta/accounts
pub async fn list_meta_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AdAccount>>, AppError> {
    let accounts = MetaAdsService::new(&state.config).list_ad_accounts().await?;
    Ok(Json(accounts))
}

/// GET /api/v1/meta/insights
pub async fn get_meta_insights(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<InsightsSnapshot>, AppError> {
    let preset = DatePreset::parse_or_default(params.date_preset.as_deref().unwrap_or_default());
    if params.refresh {
        state.cache.invalidate_meta().await;
    }
    let snapshot = load_insights(&state, preset).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRequest {
    pub client_name: String,
    pub meta_ad_account_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// GET /api/v1/mappings
pub async fn list_mappings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AdAccountMapping>>, AppError> {
    let mappings = state.storage().list_mappings().await?;
    Ok(Json(mappings))
}

/// POST /api/v1/mappings
///
/// Upserts one client-to-account mapping, then invalidates cached Meta data
/// so the next snapshot reflects it.
pub async fn upsert_mapping(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MappingRequest>,
) -> Result<(StatusCode, Json<AdAccountMapping>), AppError> {
    if req.client_name.trim().is_empty() || req.meta_ad_account_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "clientName and metaAdAccountId are required".to_string(),
        ));
    }

    let storage = state.storage();
    let mapping = storage
        .upsert_mapping(req.client_name.trim(), req.meta_ad_account_id.trim())
        .await?;
    state.cache.invalidate_meta().await;

    if let Err(e) = storage
        .log_activity(
            req.user_email.as_deref(),
            &mapping.client_name,
            "mapping_updated",
            &format!("Mapped to ad account {}", mapping.meta_ad_account_id),
        )
        .await
    {
        tracing::warn!("Activity log write failed: {}", e);
    }

    Ok((StatusCode::CREATED, Json(mapping)))
}

/// DELETE /api/v1/mappings/:client_name
pub async fn delete_mapping(
    State(state): State<Arc<AppState>>,
    Path(client_name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.storage().delete_mapping(&client_name).await?;
    state.cache.invalidate_meta().await;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Notes ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    pub note_text: String,
    #[serde(default)]
    pub is_important: bool,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub author: Author,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteRequest {
    pub note_text: String,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// GET /api/v1/clients/:name/notes
pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Note>>, AppError> {
    let notes = state.storage().list_notes(&name).await?;
    Ok(Json(notes))
}

/// GET /api/v1/notes/important
pub async fn list_important_notes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Note>>, AppError> {
    let notes = state.storage().list_important_notes().await?;
    Ok(Json(notes))
}

/// POST /api/v1/clients/:name/notes
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<Note>), AppError> {
    if req.note_text.trim().is_empty() {
        return Err(AppError::BadRequest("noteText must not be empty".to_string()));
    }

    let storage = state.storage();
    let note = storage
        .add_note(
            &name,
            req.note_text.trim(),
            &req.author,
            req.is_important,
            req.source.as_deref().unwrap_or("manual"),
        )
        .await?;

    if let Err(e) = storage
        .log_activity(
            req.author.user_email.as_deref(),
            &name,
            "note_added",
            if req.is_important {
                "Important note added"
            } else {
                "Note added"
            },
        )
        .await
    {
        tracing::warn!("Activity log write failed: {}", e);
    }

    Ok((StatusCode::CREATED, Json(note)))
}

/// PUT /api/v1/notes/:id
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<Note>, AppError> {
    if req.note_text.trim().is_empty() {
        return Err(AppError::BadRequest("noteText must not be empty".to_string()));
    }
    let note = state
        .storage()
        .update_note(id, req.note_text.trim(), req.user_email.as_deref())
        .await?;
    Ok(Json(note))
}

/// DELETE /api/v1/notes/:id
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.storage().delete_note(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Meetings ============

#[derive(Debug, Deserialize)]
pub struct MeetingListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    /// Inclusive date range; both bounds required for range filtering.
    #[serde(default)]
    pub from: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub to: Option<chrono::NaiveDate>,
}

/// GET /api/v1/clients/:name/meetings
pub async fn list_meetings(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Meeting>>, AppError> {
    let meetings = state.storage().list_meetings(&name).await?;
    Ok(Json(meetings))
}

/// GET /api/v1/meetings
///
/// All meetings newest-first, optionally restricted to an inclusive date
/// range with `from` and `to`.
pub async fn list_all_meetings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MeetingListQuery>,
) -> Result<Json<Vec<Meeting>>, AppError> {
    let storage = state.storage();
    let meetings = match (params.from, params.to) {
        (Some(from), Some(to)) => {
            if from > to {
                return Err(AppError::BadRequest("from must not be after to".to_string()));
            }
            storage.list_meetings_between(from, to).await?
        }
        _ => {
            let limit = params.limit.unwrap_or(200).clamp(1, 1000);
            storage.list_all_meetings(limit).await?
        }
    };
    Ok(Json(meetings))
}

/// POST /api/v1/meetings
///
/// Runs the full transcript pipeline: analyze, persist, fan out notes.
/// Returns 201 even when analysis degraded to the fallback payload; the
/// `analysisFailed` field says which happened.
pub async fn create_meeting(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<MeetingSubmission>,
) -> Result<(StatusCode, Json<PipelineOutcome>), AppError> {
    if submission.client_name.trim().is_empty() {
        return Err(AppError::BadRequest("clientName is required".to_string()));
    }
    if submission.transcript.trim().is_empty() {
        return Err(AppError::BadRequest("transcript must not be empty".to_string()));
    }

    let analyzer = TranscriptAnalyzer::new(&state.config);
    let storage = state.storage();
    let outcome = analysis::process_and_save(&analyzer, &storage, &submission).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// DELETE /api/v1/meetings/:id
pub async fn delete_meeting(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.storage().delete_meeting(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Fathom ingestion ============

fn provided_webhook_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get("x-webhook-secret").and_then(|v| v.to_str().ok()) {
        return Some(value);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("Bearer ").trim())
}

/// POST /api/v1/ingest/fathom
///
/// Webhook receiver for finished notetaker recordings. Always answers 200
/// with an outcome body when the delivery itself was valid; the outcome says
/// whether the recording was processed, skipped, or left unmatched, so the
/// sender never retries work that already happened.
pub async fn ingest_fathom(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(recording): Json<FathomRecording>,
) -> Result<Json<IngestOutcome>, AppError> {
    if let Some(secret) = &state.config.fathom_webhook_secret {
        if provided_webhook_secret(&headers) != Some(secret.as_str()) {
            return Err(AppError::Unauthorized("Invalid webhook secret".to_string()));
        }
    }
    if recording.recording_id.trim().is_empty() {
        return Err(AppError::BadRequest("recording_id is required".to_string()));
    }

    let analyzer = TranscriptAnalyzer::new(&state.config);
    let storage = state.storage();
    let outcome = ingest::ingest_recording(&analyzer, &storage, &recording).await?;
    tracing::info!(
        "Fathom recording {} ingested with status {:?}",
        outcome.recording_id,
        outcome.status
    );
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMappingRequest {
    pub domain: String,
    pub client_name: String,
}

/// GET /api/v1/domains
pub async fn list_domains(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<EmailDomainMapping>>, AppError> {
    let mappings = state.storage().list_domain_mappings().await?;
    Ok(Json(mappings))
}

/// POST /api/v1/domains
pub async fn upsert_domain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DomainMappingRequest>,
) -> Result<(StatusCode, Json<EmailDomainMapping>), AppError> {
    if req.domain.trim().is_empty() || req.client_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "domain and clientName are required".to_string(),
        ));
    }
    let mapping = state
        .storage()
        .upsert_domain_mapping(&req.domain.trim().to_lowercase(), req.client_name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(mapping)))
}

/// DELETE /api/v1/domains/:domain
pub async fn delete_domain(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .storage()
        .delete_domain_mapping(&domain.to_lowercase())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Activity log ============

/// GET /api/v1/clients/:name/activity
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<MeetingListQuery>,
) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let entries = state.storage().list_activity(&name, limit).await?;
    Ok(Json(entries))
}

/// GET /api/v1/activity
pub async fn list_recent_activity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MeetingListQuery>,
) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let entries = state.storage().list_recent_activity(limit).await?;
    Ok(Json(entries))
}

// ============ Dataset loading ============

/// Loads both sheets, cache-first. The two datasets live in one staleness
/// domain and are fetched together on a miss.
async fn load_sheets(
    state: &AppState,
) -> Result<(Vec<ClientAdsRecord>, Vec<ClientSetupRecord>), AppError> {
    let cached_ads: Option<Vec<ClientAdsRecord>> = state.cache.get(DatasetKey::AdsSheet).await;
    let cached_setups: Option<Vec<ClientSetupRecord>> =
        state.cache.get(DatasetKey::SetupSheet).await;

    if let (Some(ads), Some(setups)) = (cached_ads, cached_setups) {
        return Ok((ads, setups));
    }

    let service = SheetService::new(&state.config);
    let ads = service
        .fetch_ads_sheet()
        .await
        .context("Failed to load the ads performance sheet")?;
    let setups = service
        .fetch_setup_sheet()
        .await
        .context("Failed to load the setup timing sheet")?;
    state.cache.insert(DatasetKey::AdsSheet, &ads).await;
    state.cache.insert(DatasetKey::SetupSheet, &setups).await;
    Ok((ads, setups))
}

/// Loads the Meta snapshot, cache-first. A cached snapshot taken under a
/// different reporting window is treated as a miss.
async fn load_insights(
    state: &AppState,
    preset: DatePreset,
) -> Result<InsightsSnapshot, AppError> {
    if let Some(snapshot) = state
        .cache
        .get::<InsightsSnapshot>(DatasetKey::MetaInsights)
        .await
    {
        if snapshot.date_preset == preset {
            return Ok(snapshot);
        }
    }

    let mappings = state.storage().list_mappings().await?;
    let snapshot = MetaAdsService::new(&state.config)
        .fetch_all_insights(&mappings, preset)
        .await;
    state.cache.insert(DatasetKey::MetaInsights, &snapshot).await;
    Ok(snapshot)
}
