use axum::{extract::State, http::StatusCode};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{Json, Path};
use super::validation::validate_athlete_name;
use crate::db::{Athlete, CreateAthleteRequest};
use crate::AppState;

pub async fn list_athletes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Athlete>>, ApiError> {
    let athletes = Athlete::list(&state.db).await?;
    Ok(Json(athletes))
}

/// Create an athlete profile that no account owns
pub async fn create_athlete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAthleteRequest>,
) -> Result<(StatusCode, Json<Athlete>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_athlete_name(&req.name));
    errors.finish()?;

    let athlete = Athlete::create(&state.db, req.name.trim(), None).await?;
    tracing::info!(athlete_id = athlete.id, "Created athlete");

    Ok((StatusCode::CREATED, Json(athlete)))
}

pub async fn get_athlete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Athlete>, ApiError> {
    let athlete = Athlete::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Athlete not found"))?;
    Ok(Json(athlete))
}
