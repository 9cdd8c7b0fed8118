use axum::{extract::State, http::StatusCode};
use std::sync::Arc;

use super::auth::AuthSession;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{Json, Path, Query};
use super::validation::{normalize_text, validate_tag_name, validate_text};
use crate::db::{
    CreateTagRequest, NewTag, Tag, TagKind, TagListQuery, TagUsageResponse, UpdateTagRequest,
};
use crate::AppState;

/// Look up a tag the caller may modify: their own, never a global one
async fn owned_tag(state: &AppState, id: i64, athlete_id: i64) -> Result<Tag, ApiError> {
    let tag = Tag::get_visible(&state.db, id, athlete_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag not found"))?;

    if tag.is_global() {
        return Err(ApiError::forbidden("Global tags cannot be modified"));
    }
    Ok(tag)
}

/// Global tags plus the caller's own, optionally filtered by category
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Query(query): Query<TagListQuery>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    let tags = Tag::list_visible(&state.db, auth.athlete_id()?, query.category).await?;
    Ok(Json(tags))
}

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Json(req): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let athlete_id = auth.athlete_id()?;

    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_tag_name(&req.name));
    errors.check("description", validate_text(&req.description));
    errors.finish()?;

    let Some(category) = req.category else {
        return Err(ApiError::validation_field("category", "Category is required"));
    };
    let kind = TagKind::from_parts(category, req.outcome)?;
    let description = normalize_text(req.description);

    let tag = Tag::create(
        &state.db,
        NewTag {
            name: req.name.trim(),
            description: description.as_deref(),
            kind,
            athlete_id: Some(athlete_id),
        },
    )
    .await?;

    tracing::info!(tag_id = tag.id, athlete_id, category = %category, "Created tag");
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update_tag(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTagRequest>,
) -> Result<Json<Tag>, ApiError> {
    let athlete_id = auth.athlete_id()?;
    let existing = owned_tag(&state, id, athlete_id).await?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        errors.check("name", validate_tag_name(name));
    }
    errors.check("description", validate_text(&req.description));
    errors.finish()?;

    let kind = req.merged_kind(existing.kind)?;
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(existing.name.as_str())
        .to_string();
    let description = match req.description {
        Some(text) => normalize_text(Some(text)),
        None => existing.description.clone(),
    };

    Tag::update(&state.db, id, &name, description.as_deref(), kind).await?;

    let updated = Tag {
        name,
        description,
        kind,
        ..existing
    };
    Ok(Json(updated))
}

/// Delete a tag together with every application of it
pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let athlete_id = auth.athlete_id()?;
    owned_tag(&state, id, athlete_id).await?;

    let usage = Tag::usage_count(&state.db, id).await?;
    Tag::delete(&state.db, id).await?;

    tracing::info!(tag_id = id, athlete_id, removed_applications = usage, "Deleted tag");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_tag_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(id): Path<i64>,
) -> Result<Json<TagUsageResponse>, ApiError> {
    let athlete_id = auth.athlete_id()?;
    let tag = Tag::get_visible(&state.db, id, athlete_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag not found"))?;

    let usage_count = Tag::usage_count_for_athlete(&state.db, tag.id, athlete_id).await?;
    Ok(Json(TagUsageResponse {
        tag_id: tag.id,
        usage_count,
    }))
}
