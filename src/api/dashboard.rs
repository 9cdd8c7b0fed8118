//! Dashboard and statistics endpoints, for any athlete or for the caller.

use axum::extract::State;
use std::sync::Arc;

use super::auth::AuthSession;
use super::error::ApiError;
use super::extract::{Json, Path};
use crate::analytics::{compute_stats, load_dashboard, AthleteDashboard, AthleteStats};
use crate::db::{Athlete, SessionWithTags};
use crate::AppState;

async fn dashboard_for(state: &AppState, athlete_id: i64) -> Result<AthleteDashboard, ApiError> {
    load_dashboard(&state.db, athlete_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Athlete not found"))
}

async fn stats_for(state: &AppState, athlete_id: i64) -> Result<AthleteStats, ApiError> {
    if Athlete::get(&state.db, athlete_id).await?.is_none() {
        return Err(ApiError::not_found("Athlete not found"));
    }

    let history = SessionWithTags::load_for_athlete(&state.db, athlete_id).await?;
    Ok(compute_stats(&history))
}

pub async fn get_athlete_dashboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AthleteDashboard>, ApiError> {
    Ok(Json(dashboard_for(&state, id).await?))
}

pub async fn get_athlete_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AthleteStats>, ApiError> {
    Ok(Json(stats_for(&state, id).await?))
}

pub async fn get_my_dashboard(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
) -> Result<Json<AthleteDashboard>, ApiError> {
    Ok(Json(dashboard_for(&state, auth.athlete_id()?).await?))
}

pub async fn get_my_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
) -> Result<Json<AthleteStats>, ApiError> {
    Ok(Json(stats_for(&state, auth.athlete_id()?).await?))
}
