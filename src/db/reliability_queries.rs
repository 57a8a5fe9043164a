use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::models::reliability::{FieldScore, ReliabilityLogEntry, ReliabilitySummary};

fn map_summary(row: PgRow) -> Result<ReliabilitySummary, sqlx::Error> {
    Ok(ReliabilitySummary {
        id: row.try_get("id")?,
        model: row.try_get("model")?,
        foreign_key: row.try_get("foreign_key")?,
        total_score: row.try_get("total_score")?,
        completeness_percent: row.try_get("completeness_percent")?,
        field_scores_json: row.try_get("field_scores_json")?,
        scoring_version: row.try_get("scoring_version")?,
        last_source: row.try_get("last_source")?,
        last_calculated: row.try_get("last_calculated")?,
        updated_by_user_id: row.try_get("updated_by_user_id")?,
        updated_by_service: row.try_get("updated_by_service")?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
    })
}

fn map_log(row: PgRow) -> Result<ReliabilityLogEntry, sqlx::Error> {
    Ok(ReliabilityLogEntry {
        id: row.try_get("id")?,
        model: row.try_get("model")?,
        foreign_key: row.try_get("foreign_key")?,
        from_total_score: row.try_get("from_total_score")?,
        to_total_score: row.try_get("to_total_score")?,
        from_field_scores_json: row.try_get("from_field_scores_json")?,
        to_field_scores_json: row.try_get("to_field_scores_json")?,
        source: row.try_get("source")?,
        actor_user_id: row.try_get("actor_user_id")?,
        actor_service: row.try_get("actor_service")?,
        message: row.try_get("message")?,
        checksum_sha256: row.try_get("checksum_sha256")?,
        created: row.try_get("created")?,
    })
}

const SUMMARY_COLUMNS: &str = r#"
    id, model, foreign_key, total_score, completeness_percent, field_scores_json,
    scoring_version, last_source, last_calculated, updated_by_user_id,
    updated_by_service, created, modified
"#;

/// Read the current summary without locking.
pub async fn find_summary(
    pool: &PgPool,
    model: &str,
    foreign_key: Uuid,
) -> Result<Option<ReliabilitySummary>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM reliability_summaries WHERE model = $1 AND foreign_key = $2"
    ))
    .bind(model)
    .bind(foreign_key)
    .fetch_optional(pool)
    .await?;

    row.map(map_summary).transpose()
}

/// Read the current summary with a row lock, blocking concurrent writers
/// until the surrounding transaction commits.
pub async fn find_summary_for_update(
    conn: &mut PgConnection,
    model: &str,
    foreign_key: Uuid,
) -> Result<Option<ReliabilitySummary>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM reliability_summaries \
         WHERE model = $1 AND foreign_key = $2 FOR UPDATE"
    ))
    .bind(model)
    .bind(foreign_key)
    .fetch_optional(conn)
    .await?;

    row.map(map_summary).transpose()
}

/// Insert or update the summary row for (model, foreign_key).
#[allow(clippy::too_many_arguments)]
pub async fn upsert_summary(
    conn: &mut PgConnection,
    model: &str,
    foreign_key: Uuid,
    total_score: f64,
    completeness_percent: f64,
    field_scores_json: &serde_json::Value,
    scoring_version: &str,
    source: &str,
    actor_user_id: Option<Uuid>,
    actor_service: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reliability_summaries
            (model, foreign_key, total_score, completeness_percent, field_scores_json,
             scoring_version, last_source, last_calculated, updated_by_user_id,
             updated_by_service, created, modified)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), $8, $9, NOW(), NOW())
        ON CONFLICT (model, foreign_key)
        DO UPDATE SET
            total_score = EXCLUDED.total_score,
            completeness_percent = EXCLUDED.completeness_percent,
            field_scores_json = EXCLUDED.field_scores_json,
            scoring_version = EXCLUDED.scoring_version,
            last_source = EXCLUDED.last_source,
            last_calculated = NOW(),
            updated_by_user_id = EXCLUDED.updated_by_user_id,
            updated_by_service = EXCLUDED.updated_by_service,
            modified = NOW()
        "#,
    )
    .bind(model)
    .bind(foreign_key)
    .bind(total_score)
    .bind(completeness_percent)
    .bind(field_scores_json)
    .bind(scoring_version)
    .bind(source)
    .bind(actor_user_id)
    .bind(actor_service)
    .execute(conn)
    .await?;

    Ok(())
}

/// Replace all per-field rows for (model, foreign_key). Delete-then-insert
/// keeps the table exactly in sync with the latest pass, including fields
/// that disappeared from the ruleset.
pub async fn replace_fields(
    conn: &mut PgConnection,
    model: &str,
    foreign_key: Uuid,
    fields: &[FieldScore],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM reliability_fields WHERE model = $1 AND foreign_key = $2")
        .bind(model)
        .bind(foreign_key)
        .execute(&mut *conn)
        .await?;

    for fs in fields {
        sqlx::query(
            r#"
            INSERT INTO reliability_fields
                (model, foreign_key, field, score, weight, contribution, max_score, notes,
                 created, modified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            "#,
        )
        .bind(model)
        .bind(foreign_key)
        .bind(&fs.field)
        .bind(fs.score)
        .bind(fs.weight)
        .bind(fs.contribution)
        .bind(fs.max_score)
        .bind(&fs.notes)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Append one audit log row. The table has no UPDATE/DELETE path.
pub async fn insert_log(
    conn: &mut PgConnection,
    entry: &ReliabilityLogEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reliability_logs
            (id, model, foreign_key, from_total_score, to_total_score,
             from_field_scores_json, to_field_scores_json, source, actor_user_id,
             actor_service, message, checksum_sha256, created)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.model)
    .bind(entry.foreign_key)
    .bind(entry.from_total_score)
    .bind(entry.to_total_score)
    .bind(&entry.from_field_scores_json)
    .bind(&entry.to_field_scores_json)
    .bind(&entry.source)
    .bind(entry.actor_user_id)
    .bind(&entry.actor_service)
    .bind(&entry.message)
    .bind(&entry.checksum_sha256)
    .bind(entry.created)
    .execute(conn)
    .await?;

    Ok(())
}

/// Mirror the latest total onto the entity's legacy score column.
pub async fn update_entity_score(
    conn: &mut PgConnection,
    model: &str,
    foreign_key: Uuid,
    total_score: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE entities SET reliability_score = $1, modified = NOW() \
         WHERE model = $2 AND id = $3",
    )
    .bind(total_score)
    .bind(model)
    .bind(foreign_key)
    .execute(conn)
    .await?;

    Ok(())
}

/// Corpus-wide average score per field for one model. Fields never scored
/// are simply absent from the map.
pub async fn field_stats(pool: &PgPool, model: &str) -> Result<HashMap<String, f64>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT field, AVG(score) AS avg_score FROM reliability_fields \
         WHERE model = $1 GROUP BY field",
    )
    .bind(model)
    .fetch_all(pool)
    .await?;

    let mut stats = HashMap::new();
    for row in rows {
        let field: String = row.try_get("field")?;
        let avg: f64 = row.try_get("avg_score")?;
        stats.insert(field, avg);
    }
    Ok(stats)
}

/// Most recent audit log entries across a whole model, for batch
/// verification runs.
pub async fn recent_logs(
    pool: &PgPool,
    model: &str,
    limit: i64,
) -> Result<Vec<ReliabilityLogEntry>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, model, foreign_key, from_total_score, to_total_score, \
                from_field_scores_json, to_field_scores_json, source, actor_user_id, \
                actor_service, message, checksum_sha256, created \
         FROM reliability_logs \
         WHERE model = $1 \
         ORDER BY created DESC \
         LIMIT $2",
    )
    .bind(model)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_log).collect()
}

/// Audit log entries for one entity, oldest first.
pub async fn logs_for(
    pool: &PgPool,
    model: &str,
    foreign_key: Uuid,
    limit: i64,
) -> Result<Vec<ReliabilityLogEntry>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, model, foreign_key, from_total_score, to_total_score, \
                from_field_scores_json, to_field_scores_json, source, actor_user_id, \
                actor_service, message, checksum_sha256, created \
         FROM reliability_logs \
         WHERE model = $1 AND foreign_key = $2 \
         ORDER BY created ASC \
         LIMIT $3",
    )
    .bind(model)
    .bind(foreign_key)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_log).collect()
}
