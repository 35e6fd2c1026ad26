/// Leaderboard API Handlers
///
/// HTTP endpoints for the roster leaderboard and single-user lookups
use actix_web::{get, http::StatusCode, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::services::assembler::{assemble, SortOrder};
use crate::services::orchestrator::RefreshOrchestrator;

/// Query parameters for GET /api/v1/leaderboard
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// "roster" (default), "solved" or "streak"
    pub sort: Option<String>,
}

pub struct LeaderboardState {
    pub orchestrator: Arc<RefreshOrchestrator>,
}

/// Run one request cycle and return the assembled leaderboard.
///
/// GET /api/v1/leaderboard
#[get("/api/v1/leaderboard")]
pub async fn get_leaderboard(
    state: web::Data<LeaderboardState>,
    query: web::Query<LeaderboardQuery>,
) -> Result<HttpResponse> {
    let sort = match query.sort.as_deref() {
        Some(raw) => raw.parse::<SortOrder>()?,
        None => SortOrder::default(),
    };

    let outcome = state.orchestrator.run_cycle().await;
    let status = StatusCode::from_u16(outcome.status.http_status())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    // The background run outlives this request
    drop(outcome.background);

    let response = assemble(outcome.result, state.orchestrator.roster(), sort);
    info!(
        status = status.as_u16(),
        users = response.users.len(),
        errors = response.errors.len(),
        from_cache = response.from_cache,
        refreshing = response.refreshing.len(),
        "Leaderboard served"
    );

    Ok(HttpResponse::build(status).json(response))
}

/// Cached record for one roster user, regardless of age.
///
/// GET /api/v1/leaderboard/{username}
#[get("/api/v1/leaderboard/{username}")]
pub async fn get_user(
    state: web::Data<LeaderboardState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let username = path.into_inner();
    let orchestrator = &state.orchestrator;

    if !orchestrator.roster().iter().any(|u| *u == username) {
        return Err(AppError::NotFound(format!(
            "{} is not on the leaderboard roster",
            username
        )));
    }

    let mut found = orchestrator
        .cache()
        .get(std::slice::from_ref(&username))
        .await?;

    match found.remove(&username) {
        Some(entry) => {
            debug!(
                username = %username,
                age_secs = (Utc::now() - entry.last_fetch).num_seconds(),
                "Serving cached user record"
            );
            Ok(HttpResponse::Ok().json(entry.record))
        }
        None => Err(AppError::NotFound(format!(
            "No cached record for {} yet",
            username
        ))),
    }
}
