//! Built-in global tags.
//!
//! Global tags are shared by every athlete and cannot be edited through the
//! per-athlete endpoints; the operator manages them with `db` subcommands.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use super::now_timestamp;

/// Format: (name, description, category, outcome)
const GLOBAL_TAGS: &[(&str, &str, &str, Option<&str>)] = &[
    ("Dropped guard", "Hands drop after an attack", "TECHNICAL_ERROR", None),
    ("Crossed feet", "Feet cross while moving laterally", "TECHNICAL_ERROR", None),
    ("Telegraphed strike", "Visible wind-up before striking", "TECHNICAL_ERROR", None),
    ("Clean jab", "Fast, straight jab with recovery", "TECHNICAL_STRENGTH", None),
    ("Good head movement", "Slips and rolls under pressure", "TECHNICAL_STRENGTH", None),
    ("Cut off the ring", "Forced opponent toward the ropes or cage", "TACTICAL_DECISION", None),
    ("Takedown landed", "Completed takedown", "OFFENSIVE", Some("SUCCESS")),
    ("Takedown stuffed", "Takedown attempt defended by opponent", "OFFENSIVE", Some("FAIL")),
    ("Takedown defended", "Stopped the opponent's takedown", "DEFENSIVE", Some("SUCCESS")),
    ("Taken down", "Opponent completed a takedown", "DEFENSIVE", Some("FAIL")),
    ("Gassed", "Visible fatigue, output drops", "PHYSICAL", None),
    ("Lost composure", "Rushed or emotional exchanges", "MENTAL", None),
];

/// Insert the built-in global tags; existing names are left untouched
pub async fn seed_global_tags(pool: &SqlitePool) -> Result<u64> {
    info!("Seeding built-in global tags...");

    let now = now_timestamp();
    let mut inserted = 0u64;
    for (name, description, category, outcome) in GLOBAL_TAGS {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tags (name, description, category, outcome, athlete_id, created_at)
            VALUES (?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(category)
        .bind(outcome)
        .bind(&now)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    info!(inserted, total = GLOBAL_TAGS.len(), "Global tags seeded");
    Ok(inserted)
}

/// Delete every global tag (and, through the foreign key, its applications).
///
/// Returns the number of global tags found; nothing is deleted unless `execute` is set.
pub async fn prune_global_tags(pool: &SqlitePool, execute: bool) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE athlete_id IS NULL")
        .fetch_one(pool)
        .await?;

    if execute {
        let result = sqlx::query("DELETE FROM tags WHERE athlete_id IS NULL")
            .execute(pool)
            .await?;
        info!(deleted = result.rows_affected(), "Deleted global tags");
        return Ok(result.rows_affected());
    }

    Ok(count as u64)
}
