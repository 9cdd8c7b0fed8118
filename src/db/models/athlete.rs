//! Athlete profile model.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::now_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Athlete {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub user_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAthleteRequest {
    pub name: String,
}

impl Athlete {
    pub async fn list(db: &SqlitePool) -> Result<Vec<Athlete>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM athletes ORDER BY name COLLATE NOCASE, id")
            .fetch_all(db)
            .await
    }

    pub async fn get(db: &SqlitePool, id: i64) -> Result<Option<Athlete>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM athletes WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_user(
        db: &SqlitePool,
        user_id: i64,
    ) -> Result<Option<Athlete>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM athletes WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    pub async fn create(
        db: &SqlitePool,
        name: &str,
        user_id: Option<i64>,
    ) -> Result<Athlete, sqlx::Error> {
        let now = now_timestamp();
        let id = sqlx::query("INSERT INTO athletes (name, user_id, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(user_id)
            .bind(&now)
            .execute(db)
            .await?
            .last_insert_rowid();

        Ok(Athlete {
            id,
            name: name.to_string(),
            user_id,
            created_at: now,
        })
    }
}
