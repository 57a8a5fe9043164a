use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::reliability_queries;
use crate::models::reliability::{ReliabilityLogEntry, ScoreContext, ScoreResult};
use crate::reliability::checksum;

/// Persist one scoring pass atomically: summary upsert, full field-row
/// replace, checksummed audit log append, and the legacy score column on
/// the entity itself. Returns `false` when anything fails; the transaction
/// rolls back and the caller counts it as an error and moves on.
pub async fn persist_final_score(
    pool: &PgPool,
    model: &str,
    entity_id: Uuid,
    result: &ScoreResult,
    context: &ScoreContext,
) -> bool {
    match try_persist(pool, model, entity_id, result, context).await {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(
                model,
                entity_id = %entity_id,
                error = %error,
                "Failed to persist reliability score, transaction rolled back"
            );
            false
        }
    }
}

async fn try_persist(
    pool: &PgPool,
    model: &str,
    entity_id: Uuid,
    result: &ScoreResult,
    context: &ScoreContext,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Row lock serializes concurrent re-scores of the same entity.
    let existing =
        reliability_queries::find_summary_for_update(&mut tx, model, entity_id).await?;

    let field_scores_json = result.field_scores_json();

    reliability_queries::upsert_summary(
        &mut tx,
        model,
        entity_id,
        result.total_score,
        result.completeness_percent,
        &field_scores_json,
        &result.version,
        &context.source,
        context.actor_user_id,
        &context.actor_service,
    )
    .await?;

    reliability_queries::replace_fields(&mut tx, model, entity_id, &result.field_scores).await?;

    let created = Utc::now();
    let from_total_score = existing.as_ref().map(|s| s.total_score);
    let from_field_scores = existing.map(|s| s.field_scores_json);
    let payload = checksum::log_payload(
        model,
        entity_id,
        from_total_score,
        result.total_score,
        from_field_scores.as_ref(),
        &field_scores_json,
        &context.source,
        context.actor_user_id,
        &context.actor_service,
        &context.message,
        created,
    );

    let entry = ReliabilityLogEntry {
        id: Uuid::new_v4(),
        model: model.to_string(),
        foreign_key: entity_id,
        from_total_score,
        to_total_score: result.total_score,
        from_field_scores_json: from_field_scores,
        to_field_scores_json: field_scores_json,
        source: context.source.clone(),
        actor_user_id: context.actor_user_id,
        actor_service: context.actor_service.clone(),
        message: context.message.clone(),
        checksum_sha256: checksum::compute_checksum(&payload),
        created,
    };
    reliability_queries::insert_log(&mut tx, &entry).await?;

    // Legacy denormalized column, written directly so entity-save hooks do
    // not fire.
    reliability_queries::update_entity_score(&mut tx, model, entity_id, result.total_score)
        .await?;

    tx.commit().await?;
    Ok(())
}
