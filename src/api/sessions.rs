//! Training sessions of the caller and the tags applied to them.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::auth::AuthSession;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{Json, Path, Query};
use super::validation::{normalize_text, validate_text, validate_timestamp, validate_video_filename};
use crate::db::{
    CreateSessionTagRequest, Session, SessionListQuery, SessionListResponse, SessionTag,
    SessionTagWithTag, SessionWithTags, Tag, UpdateSessionRequest,
};
use crate::AppState;

/// URL prefix under which uploaded videos are served
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

async fn owned_session(state: &AppState, id: i64, athlete_id: i64) -> Result<Session, ApiError> {
    Session::get_for_athlete(&state.db, id, athlete_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Video exceeds the maximum upload size")
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// Path on disk of a stored video, if the URL points into the upload directory
fn stored_video_path(state: &AppState, video_url: &str) -> Option<PathBuf> {
    let file_name = video_url.strip_prefix(UPLOADS_URL_PREFIX)?;
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
        return None;
    }
    Some(state.config.uploads.dir.join(file_name))
}

/// Stream an uploaded video to a new file in the upload directory.
///
/// Returns the stored file name.
async fn store_video(
    state: &AppState,
    field: &mut axum::extract::multipart::Field<'_>,
) -> Result<String, ApiError> {
    let original = field.file_name().unwrap_or_default().to_string();
    let extension = validate_video_filename(&original)
        .map_err(|message| ApiError::validation_field("video", message))?;

    let file_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
    let path = state.config.uploads.dir.join(&file_name);

    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to create upload file");
        ApiError::internal("Failed to store video")
    })?;

    let mut written: u64 = 0;
    let result: Result<(), ApiError> = async {
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            written += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "Failed to write upload");
                ApiError::internal("Failed to store video")
            })?;
        }
        file.flush()
            .await
            .map_err(|_| ApiError::internal("Failed to store video"))
    }
    .await;

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(err);
    }

    tracing::debug!(
        file = %file_name,
        bytes = written,
        original = %original,
        "Stored video upload"
    );
    Ok(file_name)
}

async fn remove_video(state: &AppState, video_url: &str) {
    let Some(path) = stored_video_path(state, video_url) else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove session video");
    }
}

/// The caller's sessions in chronological order, optionally with their tags
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let athlete_id = auth.athlete_id()?;

    let response = if query.include_tags {
        let sessions = SessionWithTags::load_for_athlete(&state.db, athlete_id).await?;
        SessionListResponse::WithTags(sessions)
    } else {
        SessionListResponse::Plain(Session::list_for_athlete(&state.db, athlete_id).await?)
    };
    Ok(Json(response))
}

/// Upload a video (`video` field) with optional `notes` and open a session for it
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let athlete_id = auth.athlete_id()?;
    let mut multipart = multipart?;

    let mut stored: Option<String> = None;
    let mut notes: Option<String> = None;

    let parsed: Result<(), ApiError> = async {
        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "video" if stored.is_none() => {
                    stored = Some(store_video(&state, &mut field).await?);
                }
                "notes" => {
                    notes = Some(field.text().await.map_err(multipart_error)?);
                }
                _ => {}
            }
        }
        Ok(())
    }
    .await;

    let video_url = stored.as_ref().map(|f| format!("{}{}", UPLOADS_URL_PREFIX, f));
    if let Err(err) = parsed {
        if let Some(url) = &video_url {
            remove_video(&state, url).await;
        }
        return Err(err);
    }

    let Some(video_url) = video_url else {
        return Err(ApiError::validation_field("video", "A video file is required"));
    };

    let notes = normalize_text(notes);
    if let Err(message) = validate_text(&notes) {
        remove_video(&state, &video_url).await;
        return Err(ApiError::validation_field("notes", message));
    }

    let session = match Session::create(&state.db, athlete_id, &video_url, notes.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            remove_video(&state, &video_url).await;
            return Err(e.into());
        }
    };

    tracing::info!(session_id = session.id, athlete_id, video = %video_url, "Created session");
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(id): Path<i64>,
) -> Result<Json<SessionWithTags>, ApiError> {
    let session = owned_session(&state, id, auth.athlete_id()?).await?;
    Ok(Json(SessionWithTags::load(&state.db, session).await?))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = owned_session(&state, id, auth.athlete_id()?).await?;

    let notes = normalize_text(req.notes);
    let mut errors = ValidationErrorBuilder::new();
    errors.check("notes", validate_text(&notes));
    errors.finish()?;

    Session::update_notes(&state.db, id, notes.as_deref()).await?;
    Ok(Json(Session { notes, ..session }))
}

/// Delete a session, its tag applications and its stored video
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let athlete_id = auth.athlete_id()?;
    let session = owned_session(&state, id, athlete_id).await?;

    Session::delete(&state.db, id).await?;
    remove_video(&state, &session.video_url).await;

    tracing::info!(session_id = id, athlete_id, "Deleted session");
    Ok(StatusCode::NO_CONTENT)
}

/// Mark a moment of a session with a global or own tag
pub async fn add_session_tag(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(session_id): Path<i64>,
    Json(req): Json<CreateSessionTagRequest>,
) -> Result<(StatusCode, Json<SessionTagWithTag>), ApiError> {
    let athlete_id = auth.athlete_id()?;
    owned_session(&state, session_id, athlete_id).await?;

    let note = normalize_text(req.note.clone());
    let mut errors = ValidationErrorBuilder::new();
    errors.check("timestampSec", validate_timestamp(req.timestamp_sec));
    errors.check("note", validate_text(&note));
    errors.finish()?;

    let tag = Tag::get_visible(&state.db, req.tag_id, athlete_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag not found"))?;

    let session_tag = SessionTag::create(&state.db, session_id, &req, note.as_deref()).await?;
    tracing::debug!(
        session_id,
        tag_id = tag.id,
        timestamp_sec = ?req.timestamp_sec,
        "Tagged session"
    );

    Ok((
        StatusCode::CREATED,
        Json(SessionTagWithTag { session_tag, tag }),
    ))
}

pub async fn remove_session_tag(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path((session_id, session_tag_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    owned_session(&state, session_id, auth.athlete_id()?).await?;

    if SessionTag::delete(&state.db, session_tag_id, session_id).await? == 0 {
        return Err(ApiError::not_found("Session tag not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
