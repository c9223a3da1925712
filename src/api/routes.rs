//! API route handlers.
//!
//! All endpoints speak JSON with camelCase keys — the wire contract the
//! web front end consumes. State is shared via `Arc<ApiState>`. Ledger
//! errors convert directly into HTTP responses, one status and one short
//! message per kind.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::error::WagerError;
use crate::gateway::AuthGateway;
use crate::ledger::notifier::PoolNotifier;
use crate::ledger::store::Store;
use crate::ledger::WagerLedger;
use crate::types::{Outcome, PoolSnapshot};
use crate::verdict::{CaseBundle, VerdictGenerator, VerdictOpinion};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub ledger: WagerLedger,
    pub store: Store,
    pub notifier: PoolNotifier,
    pub auth: Arc<dyn AuthGateway>,
    /// `None` disables the verdict endpoint (no API key configured).
    pub verdict: Option<Arc<dyn VerdictGenerator>>,
    /// Credits granted on a user's first authenticated contact.
    pub starting_balance: i64,
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerRequest {
    pub case_id: i64,
    /// `true` = GUILTY, `false` = NOT_GUILTY.
    pub prediction: bool,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerResponse {
    pub success: bool,
    /// Price of the side the caller took, base-100 convention.
    pub price: f64,
    pub pool: PoolStateResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStateResponse {
    pub case_id: i64,
    pub pool_guilty: i64,
    pub pool_not_guilty: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub guilty_percent: f64,
    pub not_guilty_percent: f64,
}

impl From<PoolSnapshot> for PoolStateResponse {
    fn from(pool: PoolSnapshot) -> Self {
        Self {
            case_id: pool.case_id,
            pool_guilty: pool.pool_guilty,
            pool_not_guilty: pool.pool_not_guilty,
            updated_at: pool.updated_at,
            guilty_percent: pool.implied_percent(Outcome::Guilty),
            not_guilty_percent: pool.implied_percent(Outcome::NotGuilty),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictRequest {
    pub case_id: i64,
    pub preprompt: String,
}

#[derive(Debug, Serialize)]
pub struct VerdictResponse {
    pub data: VerdictData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictData {
    pub verdict: Outcome,
    pub p_guilty: f64,
    pub p_not_guilty: f64,
    pub why: String,
}

impl From<VerdictOpinion> for VerdictData {
    fn from(opinion: VerdictOpinion) -> Self {
        Self {
            verdict: opinion.verdict,
            p_guilty: opinion.p_guilty,
            p_not_guilty: opinion.p_not_guilty,
            why: opinion.why,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for WagerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WagerError::Validation(_) => StatusCode::BAD_REQUEST,
            WagerError::AuthRequired => StatusCode::UNAUTHORIZED,
            WagerError::InsufficientBalance { .. }
            | WagerError::DuplicateVote
            | WagerError::MarketClosed => StatusCode::CONFLICT,
            WagerError::TransientConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody { error: self.kind(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Auth helper
// ---------------------------------------------------------------------------

/// Resolve the caller's identity and make sure their account row exists
/// (the first authenticated contact grants the starting balance).
async fn current_user(state: &ApiState, headers: &HeaderMap) -> Result<String, WagerError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let user_id = state
        .auth
        .resolve_current_user(bearer)
        .await
        .ok_or(WagerError::AuthRequired)?;

    state.store.ensure_user(&user_id, state.starting_balance).await?;
    Ok(user_id)
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /api/wagers
pub async fn place_wager(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<WagerRequest>,
) -> Result<Json<WagerResponse>, WagerError> {
    let user_id = current_user(&state, &headers).await?;

    let receipt = state
        .ledger
        .place_wager(&user_id, request.case_id, request.prediction, request.amount)
        .await?;

    Ok(Json(WagerResponse {
        success: true,
        price: receipt.price,
        pool: receipt.pool.into(),
    }))
}

/// GET /api/pools/:case_id
pub async fn get_pool(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
) -> Result<Json<PoolStateResponse>, WagerError> {
    let pool = state.ledger.pool_state(case_id).await?;
    Ok(Json(pool.into()))
}

/// GET /api/pools/:case_id/stream
///
/// Server-sent pool updates, one event per committed wager on the case.
/// Best-effort: a subscriber that lags re-reads `GET /api/pools/:case_id`.
pub async fn stream_pool(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifier.subscribe(case_id).await;

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    let payload = PoolStateResponse::from(snapshot);
                    match Event::default().event("pool").json_data(&payload) {
                        Ok(event) => return Some((Ok(event), rx)),
                        Err(err) => {
                            warn!(error = %err, "Failed to encode pool event");
                            continue;
                        }
                    }
                }
                // Missed events are recovered by pulling current state.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/me
pub async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, WagerError> {
    let user_id = current_user(&state, &headers).await?;
    let balance = state
        .store
        .balance(&user_id)
        .await?
        .unwrap_or(state.starting_balance);
    Ok(Json(MeResponse { user_id, balance }))
}

/// POST /api/verdict
pub async fn post_verdict(
    State(state): State<AppState>,
    Json(request): Json<VerdictRequest>,
) -> Result<Json<VerdictResponse>, (StatusCode, Json<ErrorBody>)> {
    let Some(generator) = state.verdict.clone() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "verdict_unavailable",
                message: "verdict generator is not configured".into(),
            }),
        ));
    };

    if request.preprompt.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "validation_error",
                message: "preprompt must not be empty".into(),
            }),
        ));
    }

    let case = state
        .store
        .case(request.case_id)
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody { error: e.kind(), message: e.to_string() }),
            )
        })?
        .ok_or((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "validation_error",
                message: format!("unknown case id: {}", request.case_id),
            }),
        ))?;

    let bundle = CaseBundle { case, preprompt: request.preprompt };
    let opinion = generator.generate(&bundle).await.map_err(|e| {
        warn!(case_id = request.case_id, error = %e, "Verdict generation failed");
        (
            StatusCode::BAD_GATEWAY,
            Json(ErrorBody { error: "upstream_error", message: e.to_string() }),
        )
    })?;

    Ok(Json(VerdictResponse { data: opinion.into() }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
