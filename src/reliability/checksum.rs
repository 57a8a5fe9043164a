use chrono::SecondsFormat;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::reliability::ReliabilityLogEntry;

/// Rebuild a JSON value with all object keys in sorted order, recursively.
/// Serialization of the result is then independent of insertion order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over the canonical JSON serialization of `payload`.
pub fn compute_checksum(payload: &Value) -> String {
    let canonical = canonicalize(payload);
    // Canonical values only contain sorted maps, so this cannot fail, but
    // the signature stays infallible by hashing the Value's Display as a
    // last resort.
    let serialized =
        serde_json::to_string(&canonical).unwrap_or_else(|_| canonical.to_string());
    let digest = Sha256::digest(serialized.as_bytes());
    hex::encode(digest)
}

/// The payload shape hashed at write time. Verification rebuilds exactly
/// this from a stored row, excluding the row id and the stored checksum.
#[allow(clippy::too_many_arguments)]
pub fn log_payload(
    model: &str,
    foreign_key: uuid::Uuid,
    from_total_score: Option<f64>,
    to_total_score: f64,
    from_field_scores: Option<&Value>,
    to_field_scores: &Value,
    source: &str,
    actor_user_id: Option<uuid::Uuid>,
    actor_service: &str,
    message: &str,
    created: chrono::DateTime<chrono::Utc>,
) -> Value {
    serde_json::json!({
        "model": model,
        "foreign_key": foreign_key,
        "from_total_score": from_total_score,
        "to_total_score": to_total_score,
        "from_field_scores": from_field_scores,
        "to_field_scores": to_field_scores,
        "source": source,
        "actor_user_id": actor_user_id,
        "actor_service": actor_service,
        "message": message,
        "created": created.to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// Recompute a stored log row's checksum and compare. `false` means the
/// row no longer hashes to its recorded value.
pub fn verify_entry(entry: &ReliabilityLogEntry) -> bool {
    let payload = log_payload(
        &entry.model,
        entry.foreign_key,
        entry.from_total_score,
        entry.to_total_score,
        entry.from_field_scores_json.as_ref(),
        &entry.to_field_scores_json,
        &entry.source,
        entry.actor_user_id,
        &entry.actor_service,
        &entry.message,
        entry.created,
    );
    compute_checksum(&payload) == entry.checksum_sha256
}
