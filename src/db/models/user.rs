//! User and auth token models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::athlete::Athlete;
use crate::db::now_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthToken {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
    pub athlete: Option<Athlete>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub athlete: Option<Athlete>,
}

impl User {
    /// Emails are stored lower-cased, lookups are case-insensitive
    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn get(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Create a user and the athlete profile they own in one transaction
    pub async fn register(
        db: &SqlitePool,
        email: &str,
        password_hash: &str,
        athlete_name: &str,
    ) -> Result<(User, Athlete), sqlx::Error> {
        let now = now_timestamp();
        let email = email.trim().to_lowercase();
        let mut tx = db.begin().await?;

        let user_id = sqlx::query("INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?)")
            .bind(&email)
            .bind(password_hash)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let athlete_id =
            sqlx::query("INSERT INTO athletes (name, user_id, created_at) VALUES (?, ?, ?)")
                .bind(athlete_name)
                .bind(user_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

        tx.commit().await?;

        let user = User {
            id: user_id,
            email,
            password_hash: password_hash.to_string(),
            created_at: now.clone(),
        };
        let athlete = Athlete {
            id: athlete_id,
            name: athlete_name.to_string(),
            user_id: Some(user_id),
            created_at: now,
        };
        Ok((user, athlete))
    }
}

impl AuthToken {
    pub async fn create(
        db: &SqlitePool,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO auth_tokens (user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(now_timestamp())
        .execute(db)
        .await?;
        Ok(())
    }

    /// A token that exists and has not expired
    pub async fn find_valid(
        db: &SqlitePool,
        token_hash: &str,
    ) -> Result<Option<AuthToken>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM auth_tokens WHERE token_hash = ? AND expires_at > ?")
            .bind(token_hash)
            .bind(now_timestamp())
            .fetch_optional(db)
            .await
    }

    pub async fn revoke(db: &SqlitePool, token_hash: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_expired(db: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= ?")
            .bind(now_timestamp())
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
