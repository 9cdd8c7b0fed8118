//! Athlete dashboard aggregation.
//!
//! Builds the summary shown on an athlete's dashboard from their sessions
//! and tag applications: totals, the most recent sessions and a ranking of
//! the tags applied most often.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db::{Athlete, Session, SessionTag, Tag};

/// Number of sessions listed under "recent sessions"
pub const RECENT_SESSIONS_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteDashboard {
    pub athlete: Athlete,
    pub summary: DashboardSummary,
    pub recent_sessions: Vec<RecentSession>,
    pub top_tags: Vec<TagUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub session_count: usize,
    pub total_tags: usize,
    pub average_tags_per_session: f64,
    pub distinct_tags_count: usize,
    pub most_used_tag: Option<TagUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSession {
    pub session_id: i64,
    pub video_url: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub tag_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUsage {
    pub tag_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub count: usize,
}

/// Aggregate an athlete's records into a dashboard.
///
/// `sessions` must be in chronological order (oldest first). Tag applications
/// whose tag is missing from `tags` still count towards the totals but are
/// left out of the ranking.
pub fn build_dashboard(
    athlete: Athlete,
    sessions: &[Session],
    session_tags: &[SessionTag],
    tags: &[Tag],
) -> AthleteDashboard {
    let mut tags_per_session: HashMap<i64, usize> = HashMap::new();
    let mut applications_per_tag: HashMap<i64, usize> = HashMap::new();
    for session_tag in session_tags {
        *tags_per_session.entry(session_tag.session_id).or_default() += 1;
        *applications_per_tag.entry(session_tag.tag_id).or_default() += 1;
    }

    let session_count = sessions.len();
    let total_tags = session_tags.len();
    let average_tags_per_session = if session_count == 0 {
        0.0
    } else {
        total_tags as f64 / session_count as f64
    };

    let recent_sessions = sessions
        .iter()
        .rev()
        .take(RECENT_SESSIONS_LIMIT)
        .map(|s| RecentSession {
            session_id: s.id,
            video_url: s.video_url.clone(),
            notes: s.notes.clone(),
            created_at: s.created_at.clone(),
            tag_count: tags_per_session.get(&s.id).copied().unwrap_or(0),
        })
        .collect();

    let distinct_tags_count = applications_per_tag.len();

    let tags_by_id: HashMap<i64, &Tag> = tags.iter().map(|t| (t.id, t)).collect();
    let mut ranked: Vec<(i64, usize)> = applications_per_tag.into_iter().collect();
    // Highest count first; equal counts keep a fixed order by tag id
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let top_tags: Vec<TagUsage> = ranked
        .into_iter()
        .filter_map(|(tag_id, count)| {
            let tag = tags_by_id.get(&tag_id)?;
            Some(TagUsage {
                tag_id,
                name: tag.name.clone(),
                description: tag.description.clone(),
                count,
            })
        })
        .collect();

    AthleteDashboard {
        athlete,
        summary: DashboardSummary {
            session_count,
            total_tags,
            average_tags_per_session,
            distinct_tags_count,
            most_used_tag: top_tags.first().cloned(),
        },
        recent_sessions,
        top_tags,
    }
}

/// Load an athlete's records and build their dashboard.
///
/// Returns `None` when the athlete does not exist.
pub async fn load_dashboard(
    db: &SqlitePool,
    athlete_id: i64,
) -> Result<Option<AthleteDashboard>, sqlx::Error> {
    let Some(athlete) = Athlete::get(db, athlete_id).await? else {
        return Ok(None);
    };

    let sessions = Session::list_for_athlete(db, athlete_id).await?;
    let session_tags = SessionTag::list_for_athlete(db, athlete_id).await?;
    let tags = Tag::list_used_by_athlete(db, athlete_id).await?;

    tracing::debug!(
        athlete_id,
        sessions = sessions.len(),
        tag_applications = session_tags.len(),
        "Building dashboard"
    );

    Ok(Some(build_dashboard(athlete, &sessions, &session_tags, &tags)))
}
