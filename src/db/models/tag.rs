//! Tag models.
//!
//! A tag's category decides whether it carries an outcome: offensive and
//! defensive observations are always a success or a failure, every other
//! category never has one. [`TagKind`] encodes that rule in the type, while
//! the database and the JSON API keep the flat `category` / `outcome` pair.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::db::now_timestamp;

/// Observation category of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagCategory {
    TechnicalError,
    TechnicalStrength,
    TacticalDecision,
    Offensive,
    Defensive,
    Physical,
    Mental,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::TechnicalError => "TECHNICAL_ERROR",
            TagCategory::TechnicalStrength => "TECHNICAL_STRENGTH",
            TagCategory::TacticalDecision => "TACTICAL_DECISION",
            TagCategory::Offensive => "OFFENSIVE",
            TagCategory::Defensive => "DEFENSIVE",
            TagCategory::Physical => "PHYSICAL",
            TagCategory::Mental => "MENTAL",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = TagKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TECHNICAL_ERROR" => Ok(TagCategory::TechnicalError),
            "TECHNICAL_STRENGTH" => Ok(TagCategory::TechnicalStrength),
            "TACTICAL_DECISION" => Ok(TagCategory::TacticalDecision),
            "OFFENSIVE" => Ok(TagCategory::Offensive),
            "DEFENSIVE" => Ok(TagCategory::Defensive),
            "PHYSICAL" => Ok(TagCategory::Physical),
            "MENTAL" => Ok(TagCategory::Mental),
            other => Err(TagKindError::UnknownCategory(other.to_string())),
        }
    }
}

/// Result of an offensive or defensive action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagOutcome {
    Success,
    Fail,
}

impl TagOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagOutcome::Success => "SUCCESS",
            TagOutcome::Fail => "FAIL",
        }
    }
}

impl FromStr for TagOutcome {
    type Err = TagKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(TagOutcome::Success),
            "FAIL" => Ok(TagOutcome::Fail),
            other => Err(TagKindError::UnknownOutcome(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagKindError {
    #[error("{0} tags require an outcome (SUCCESS or FAIL)")]
    MissingOutcome(TagCategory),
    #[error("{0} tags cannot have an outcome")]
    UnexpectedOutcome(TagCategory),
    #[error("unknown tag category: {0}")]
    UnknownCategory(String),
    #[error("unknown tag outcome: {0}")]
    UnknownOutcome(String),
}

/// Category of a tag together with the outcome the category requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TagKindParts", into = "TagKindParts")]
pub enum TagKind {
    TechnicalError,
    TechnicalStrength,
    TacticalDecision,
    Offensive(TagOutcome),
    Defensive(TagOutcome),
    Physical,
    Mental,
}

/// Flat wire/storage form of a [`TagKind`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TagKindParts {
    pub category: TagCategory,
    #[serde(default)]
    pub outcome: Option<TagOutcome>,
}

impl TagKind {
    pub fn from_parts(
        category: TagCategory,
        outcome: Option<TagOutcome>,
    ) -> Result<Self, TagKindError> {
        match (category, outcome) {
            (TagCategory::Offensive, Some(o)) => Ok(TagKind::Offensive(o)),
            (TagCategory::Defensive, Some(o)) => Ok(TagKind::Defensive(o)),
            (c, Some(_)) => Err(TagKindError::UnexpectedOutcome(c)),
            (TagCategory::TechnicalError, None) => Ok(TagKind::TechnicalError),
            (TagCategory::TechnicalStrength, None) => Ok(TagKind::TechnicalStrength),
            (TagCategory::TacticalDecision, None) => Ok(TagKind::TacticalDecision),
            (TagCategory::Physical, None) => Ok(TagKind::Physical),
            (TagCategory::Mental, None) => Ok(TagKind::Mental),
            (TagCategory::Offensive | TagCategory::Defensive, None) => {
                Err(TagKindError::MissingOutcome(category))
            }
        }
    }

    /// Parse the raw column values stored in the `tags` table
    pub fn from_columns(category: &str, outcome: Option<&str>) -> Result<Self, TagKindError> {
        let category = category.parse()?;
        let outcome = outcome.map(str::parse).transpose()?;
        Self::from_parts(category, outcome)
    }

    pub fn category(&self) -> TagCategory {
        match self {
            TagKind::TechnicalError => TagCategory::TechnicalError,
            TagKind::TechnicalStrength => TagCategory::TechnicalStrength,
            TagKind::TacticalDecision => TagCategory::TacticalDecision,
            TagKind::Offensive(_) => TagCategory::Offensive,
            TagKind::Defensive(_) => TagCategory::Defensive,
            TagKind::Physical => TagCategory::Physical,
            TagKind::Mental => TagCategory::Mental,
        }
    }

    pub fn outcome(&self) -> Option<TagOutcome> {
        match self {
            TagKind::Offensive(o) | TagKind::Defensive(o) => Some(*o),
            _ => None,
        }
    }
}

impl TryFrom<TagKindParts> for TagKind {
    type Error = TagKindError;

    fn try_from(parts: TagKindParts) -> Result<Self, Self::Error> {
        TagKind::from_parts(parts.category, parts.outcome)
    }
}

impl From<TagKind> for TagKindParts {
    fn from(kind: TagKind) -> Self {
        Self {
            category: kind.category(),
            outcome: kind.outcome(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: TagKind,
    /// Owning athlete; `None` for global tags
    pub athlete_id: Option<i64>,
    pub created_at: String,
}

impl Tag {
    pub fn is_global(&self) -> bool {
        self.athlete_id.is_none()
    }
}

impl<'r> FromRow<'r, SqliteRow> for Tag {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let category: String = row.try_get("category")?;
        let outcome: Option<String> = row.try_get("outcome")?;
        let kind = TagKind::from_columns(&category, outcome.as_deref()).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "category".to_string(),
                source: Box::new(e),
            }
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            kind,
            athlete_id: row.try_get("athlete_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTagRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<TagCategory>,
    pub outcome: Option<TagOutcome>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTagRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<TagCategory>,
    pub outcome: Option<TagOutcome>,
}

impl UpdateTagRequest {
    /// Resolve the kind a tag ends up with after this update.
    ///
    /// A new category replaces the outcome too; an outcome on its own is
    /// applied to the existing category.
    pub fn merged_kind(&self, current: TagKind) -> Result<TagKind, TagKindError> {
        match (self.category, self.outcome) {
            (Some(category), outcome) => TagKind::from_parts(category, outcome),
            (None, Some(outcome)) => TagKind::from_parts(current.category(), Some(outcome)),
            (None, None) => Ok(current),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TagListQuery {
    pub category: Option<TagCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUsageResponse {
    pub tag_id: i64,
    pub usage_count: i64,
}

/// New tag values after validation
#[derive(Debug, Clone)]
pub struct NewTag<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub kind: TagKind,
    pub athlete_id: Option<i64>,
}

impl Tag {
    pub async fn get(db: &SqlitePool, id: i64) -> Result<Option<Tag>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Global tags followed by the athlete's own tags
    pub async fn list_visible(
        db: &SqlitePool,
        athlete_id: i64,
        category: Option<TagCategory>,
    ) -> Result<Vec<Tag>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM tags
            WHERE (athlete_id IS NULL OR athlete_id = ?)
              AND (? IS NULL OR category = ?)
            ORDER BY athlete_id IS NOT NULL, category, name COLLATE NOCASE, id
            "#,
        )
        .bind(athlete_id)
        .bind(category.map(|c| c.as_str()))
        .bind(category.map(|c| c.as_str()))
        .fetch_all(db)
        .await
    }

    /// A tag the athlete may apply: global or their own
    pub async fn get_visible(
        db: &SqlitePool,
        id: i64,
        athlete_id: i64,
    ) -> Result<Option<Tag>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM tags WHERE id = ? AND (athlete_id IS NULL OR athlete_id = ?)")
            .bind(id)
            .bind(athlete_id)
            .fetch_optional(db)
            .await
    }

    /// Every tag applied at least once in the athlete's sessions
    pub async fn list_used_by_athlete(
        db: &SqlitePool,
        athlete_id: i64,
    ) -> Result<Vec<Tag>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT DISTINCT t.* FROM tags t
            JOIN session_tags st ON st.tag_id = t.id
            JOIN sessions s ON s.id = st.session_id
            WHERE s.athlete_id = ?
            ORDER BY t.id
            "#,
        )
        .bind(athlete_id)
        .fetch_all(db)
        .await
    }

    pub async fn create(db: &SqlitePool, new: NewTag<'_>) -> Result<Tag, sqlx::Error> {
        let now = now_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO tags (name, description, category, outcome, athlete_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.name)
        .bind(new.description)
        .bind(new.kind.category().as_str())
        .bind(new.kind.outcome().map(|o| o.as_str()))
        .bind(new.athlete_id)
        .bind(&now)
        .execute(db)
        .await?
        .last_insert_rowid();

        Ok(Tag {
            id,
            name: new.name.to_string(),
            description: new.description.map(str::to_string),
            kind: new.kind,
            athlete_id: new.athlete_id,
            created_at: now,
        })
    }

    pub async fn update(
        db: &SqlitePool,
        id: i64,
        name: &str,
        description: Option<&str>,
        kind: TagKind,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tags SET name = ?, description = ?, category = ?, outcome = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(kind.category().as_str())
        .bind(kind.outcome().map(|o| o.as_str()))
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn delete(db: &SqlitePool, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of times the tag has been applied to any session
    pub async fn usage_count(db: &SqlitePool, id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM session_tags WHERE tag_id = ?")
            .bind(id)
            .fetch_one(db)
            .await
    }

    /// Number of times the tag has been applied in one athlete's sessions
    pub async fn usage_count_for_athlete(
        db: &SqlitePool,
        id: i64,
        athlete_id: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM session_tags st
            JOIN sessions s ON s.id = st.session_id
            WHERE st.tag_id = ? AND s.athlete_id = ?
            "#,
        )
        .bind(id)
        .bind(athlete_id)
        .fetch_one(db)
        .await
    }
}
