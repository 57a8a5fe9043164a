use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;
use uuid::Uuid;

/// Computed result for one scored field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldScore {
    pub field: String,
    /// Raw rule score in [0, 1].
    pub score: f64,
    pub weight: f64,
    /// `score * weight`.
    pub contribution: f64,
    pub max_score: f64,
    pub notes: String,
}

/// Advisory UI bucket derived from the total score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Warning,
    Info,
}

impl Severity {
    pub fn for_score(total_score: f64) -> Self {
        if total_score >= 0.80 {
            Severity::Success
        } else if total_score >= 0.60 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// Output of a scoring pass. Pure data, no persistence concerns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    pub total_score: f64,
    pub completeness_percent: f64,
    pub field_scores: Vec<FieldScore>,
    pub version: String,
    pub severity: Severity,
    /// Up to 3 fields most worth improving, best first.
    pub field_importance: Vec<String>,
}

impl ScoreResult {
    /// Field scores keyed by field name, as persisted in summary rows and
    /// audit log snapshots.
    pub fn field_scores_json(&self) -> Value {
        let mut map = Map::new();
        for fs in &self.field_scores {
            map.insert(
                fs.field.clone(),
                serde_json::json!({
                    "score": fs.score,
                    "weight": fs.weight,
                    "contribution": fs.contribution,
                    "max_score": fs.max_score,
                    "notes": fs.notes,
                }),
            );
        }
        Value::Object(map)
    }
}

/// Actor metadata attached to a persisted scoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreContext {
    pub source: String,
    pub actor_user_id: Option<Uuid>,
    pub actor_service: String,
    pub message: String,
}

impl Default for ScoreContext {
    fn default() -> Self {
        Self {
            source: "system".to_string(),
            actor_user_id: None,
            actor_service: "reliability-service".to_string(),
            message: "Score updated".to_string(),
        }
    }
}

/// Current-state summary row, one per (model, entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilitySummary {
    pub id: Uuid,
    pub model: String,
    pub foreign_key: Uuid,
    pub total_score: f64,
    pub completeness_percent: f64,
    pub field_scores_json: Value,
    pub scoring_version: String,
    pub last_source: String,
    pub last_calculated: DateTime<Utc>,
    pub updated_by_user_id: Option<Uuid>,
    pub updated_by_service: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Append-only audit log row. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityLogEntry {
    pub id: Uuid,
    pub model: String,
    pub foreign_key: Uuid,
    pub from_total_score: Option<f64>,
    pub to_total_score: f64,
    pub from_field_scores_json: Option<Value>,
    pub to_field_scores_json: Value,
    pub source: String,
    pub actor_user_id: Option<Uuid>,
    pub actor_service: String,
    pub message: String,
    pub checksum_sha256: String,
    pub created: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_buckets() {
        assert_eq!(Severity::for_score(0.95), Severity::Success);
        assert_eq!(Severity::for_score(0.80), Severity::Success);
        assert_eq!(Severity::for_score(0.79), Severity::Warning);
        assert_eq!(Severity::for_score(0.60), Severity::Warning);
        assert_eq!(Severity::for_score(0.59), Severity::Info);
        assert_eq!(Severity::for_score(0.0), Severity::Info);
    }
}
