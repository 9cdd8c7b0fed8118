//! Training session and session-tag models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;

use super::tag::Tag;
use crate::db::now_timestamp;

/// One recorded training video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub athlete_id: i64,
    pub video_url: String,
    pub notes: Option<String>,
    pub created_at: String,
}

/// One application of a tag to a moment of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionTag {
    pub id: i64,
    pub session_id: i64,
    pub tag_id: i64,
    pub timestamp_sec: Option<i64>,
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTagWithTag {
    #[serde(flatten)]
    pub session_tag: SessionTag,
    pub tag: Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWithTags {
    #[serde(flatten)]
    pub session: Session,
    pub session_tags: Vec<SessionTagWithTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionListQuery {
    #[serde(default)]
    pub include_tags: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionTagRequest {
    pub tag_id: i64,
    pub timestamp_sec: Option<i64>,
    pub note: Option<String>,
}

/// Session list, with or without nested tags depending on the query
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SessionListResponse {
    Plain(Vec<Session>),
    WithTags(Vec<SessionWithTags>),
}

impl Session {
    /// All sessions of an athlete in chronological order
    pub async fn list_for_athlete(
        db: &SqlitePool,
        athlete_id: i64,
    ) -> Result<Vec<Session>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sessions WHERE athlete_id = ? ORDER BY created_at, id")
            .bind(athlete_id)
            .fetch_all(db)
            .await
    }

    pub async fn get_for_athlete(
        db: &SqlitePool,
        id: i64,
        athlete_id: i64,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM sessions WHERE id = ? AND athlete_id = ?")
            .bind(id)
            .bind(athlete_id)
            .fetch_optional(db)
            .await
    }

    pub async fn create(
        db: &SqlitePool,
        athlete_id: i64,
        video_url: &str,
        notes: Option<&str>,
    ) -> Result<Session, sqlx::Error> {
        let now = now_timestamp();
        let id = sqlx::query(
            "INSERT INTO sessions (athlete_id, video_url, notes, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(athlete_id)
        .bind(video_url)
        .bind(notes)
        .bind(&now)
        .execute(db)
        .await?
        .last_insert_rowid();

        Ok(Session {
            id,
            athlete_id,
            video_url: video_url.to_string(),
            notes: notes.map(str::to_string),
            created_at: now,
        })
    }

    pub async fn update_notes(
        db: &SqlitePool,
        id: i64,
        notes: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET notes = ? WHERE id = ?")
            .bind(notes)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete(db: &SqlitePool, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}

impl SessionTag {
    /// Every tag application across the athlete's sessions, in session order
    pub async fn list_for_athlete(
        db: &SqlitePool,
        athlete_id: i64,
    ) -> Result<Vec<SessionTag>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT st.* FROM session_tags st
            JOIN sessions s ON s.id = st.session_id
            WHERE s.athlete_id = ?
            ORDER BY s.created_at, s.id, st.created_at, st.id
            "#,
        )
        .bind(athlete_id)
        .fetch_all(db)
        .await
    }

    pub async fn list_for_session(
        db: &SqlitePool,
        session_id: i64,
    ) -> Result<Vec<SessionTag>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM session_tags WHERE session_id = ? ORDER BY created_at, id")
            .bind(session_id)
            .fetch_all(db)
            .await
    }

    pub async fn create(
        db: &SqlitePool,
        session_id: i64,
        req: &CreateSessionTagRequest,
        note: Option<&str>,
    ) -> Result<SessionTag, sqlx::Error> {
        let now = now_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO session_tags (session_id, tag_id, timestamp_sec, note, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(req.tag_id)
        .bind(req.timestamp_sec)
        .bind(note)
        .bind(&now)
        .execute(db)
        .await?
        .last_insert_rowid();

        Ok(SessionTag {
            id,
            session_id,
            tag_id: req.tag_id,
            timestamp_sec: req.timestamp_sec,
            note: note.map(str::to_string),
            created_at: now,
        })
    }

    pub async fn delete(db: &SqlitePool, id: i64, session_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM session_tags WHERE id = ? AND session_id = ?")
            .bind(id)
            .bind(session_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}

impl SessionWithTags {
    /// Full tag history of an athlete, sessions in chronological order
    pub async fn load_for_athlete(
        db: &SqlitePool,
        athlete_id: i64,
    ) -> Result<Vec<SessionWithTags>, sqlx::Error> {
        let sessions = Session::list_for_athlete(db, athlete_id).await?;
        let session_tags = SessionTag::list_for_athlete(db, athlete_id).await?;
        let tags = Tag::list_used_by_athlete(db, athlete_id).await?;
        Ok(attach_tags(sessions, session_tags, tags))
    }

    pub async fn load(db: &SqlitePool, session: Session) -> Result<SessionWithTags, sqlx::Error> {
        let session_tags = SessionTag::list_for_session(db, session.id).await?;
        let tags = Tag::list_used_by_athlete(db, session.athlete_id).await?;
        let tags_by_id: HashMap<i64, Tag> = tags.into_iter().map(|t| (t.id, t)).collect();

        let session_tags = session_tags
            .into_iter()
            .filter_map(|session_tag| {
                let tag = tags_by_id.get(&session_tag.tag_id)?.clone();
                Some(SessionTagWithTag { session_tag, tag })
            })
            .collect();

        Ok(SessionWithTags {
            session,
            session_tags,
        })
    }
}

/// Nest tag applications (already in display order) under their sessions
pub fn attach_tags(
    sessions: Vec<Session>,
    session_tags: Vec<SessionTag>,
    tags: Vec<Tag>,
) -> Vec<SessionWithTags> {
    let tags_by_id: HashMap<i64, Tag> = tags.into_iter().map(|t| (t.id, t)).collect();
    let mut by_session: HashMap<i64, Vec<SessionTagWithTag>> = HashMap::new();

    for session_tag in session_tags {
        if let Some(tag) = tags_by_id.get(&session_tag.tag_id) {
            by_session
                .entry(session_tag.session_id)
                .or_default()
                .push(SessionTagWithTag {
                    session_tag,
                    tag: tag.clone(),
                });
        }
    }

    sessions
        .into_iter()
        .map(|session| SessionWithTags {
            session_tags: by_session.remove(&session.id).unwrap_or_default(),
            session,
        })
        .collect()
}
