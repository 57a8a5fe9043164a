use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::entity::EntityModel;

/// One failed attempt of a retried job, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload for the translate job family. `seo_wait_attempt` tracks the
/// soft-dependency wait loop, independent of the retry attempt counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranslatePayload {
    pub model: EntityModel,
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub seo_wait_attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeoUpdatePayload {
    pub model: EntityModel,
    pub id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagUpdatePayload {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageGenerationPayload {
    pub model: EntityModel,
    pub id: Uuid,
    #[serde(default)]
    pub prompt_hint: Option<String>,
}

/// Operation variants for the generic AI operation job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum AiOperationRequest {
    GenerateSeo { title: String, content: String },
    AnalyzeImage { image_url: String },
    GenerateTags { content: String },
    AnalyzeSentiment { text: String },
    TranslateContent { text: String, target_language: String },
    GenerateSummary { content: String },
}

impl AiOperationRequest {
    /// Stable operation label for logging and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            AiOperationRequest::GenerateSeo { .. } => "generate_seo",
            AiOperationRequest::AnalyzeImage { .. } => "analyze_image",
            AiOperationRequest::GenerateTags { .. } => "generate_tags",
            AiOperationRequest::AnalyzeSentiment { .. } => "analyze_sentiment",
            AiOperationRequest::TranslateContent { .. } => "translate_content",
            AiOperationRequest::GenerateSummary { .. } => "generate_summary",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiOperationPayload {
    /// Service key for circuit breaker / rate limiter bookkeeping.
    pub service: String,
    #[serde(flatten)]
    pub request: AiOperationRequest,
    /// Entity to write results back to, when the operation targets one.
    #[serde(default)]
    pub model: Option<EntityModel>,
    #[serde(default)]
    pub entity_id: Option<Uuid>,
}

/// Typed job payloads. The tag doubles as the dispatch key, replacing
/// runtime class-name resolution with a closed registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobPayload {
    TranslateEntity(TranslatePayload),
    SeoUpdate(SeoUpdatePayload),
    TagUpdate(TagUpdatePayload),
    ImageGeneration(ImageGenerationPayload),
    AiOperation(AiOperationPayload),
}

/// Envelope serialized onto the queue. Immutable once enqueued; retries
/// push a fresh envelope built via [`JobEnvelope::next_attempt`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEnvelope {
    pub id: Uuid,
    /// 1-based execution attempt.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    #[serde(default)]
    pub previous_attempts: Vec<AttemptRecord>,
    /// Group tag for queue prioritization.
    #[serde(default)]
    pub group: Option<String>,
    /// At-most-once-in-flight key; set when the job declares uniqueness.
    #[serde(default)]
    pub unique_key: Option<String>,
    pub payload: JobPayload,
}

fn first_attempt() -> u32 {
    1
}

impl JobEnvelope {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 1,
            previous_attempts: Vec::new(),
            group: None,
            unique_key: None,
            payload,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_unique_key(mut self, key: String) -> Self {
        self.unique_key = Some(key);
        self
    }

    /// Successor envelope for a reschedule that is not a failure: fresh
    /// queue identity, attempt counter and history untouched.
    pub fn reschedule(&self) -> Self {
        let mut next = self.clone();
        next.id = Uuid::new_v4();
        next
    }

    /// Successor envelope for a retry: attempt incremented, the failure
    /// recorded in the attempt history, queue identity regenerated.
    pub fn next_attempt(&self, reason: &str) -> Self {
        let mut next = self.clone();
        next.id = Uuid::new_v4();
        next.previous_attempts.push(AttemptRecord {
            attempt: self.attempt,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        next.attempt = self.attempt + 1;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> JobEnvelope {
        JobEnvelope::new(JobPayload::TagUpdate(TagUpdatePayload {
            id: Uuid::new_v4(),
            title: "Sensors".to_string(),
        }))
    }

    #[test]
    fn next_attempt_appends_history() {
        let first = sample_envelope();
        let second = first.next_attempt("timeout while calling provider");
        let third = second.next_attempt("connection reset");

        assert_eq!(third.attempt, 3);
        assert_eq!(third.previous_attempts.len(), 2);
        assert_eq!(third.previous_attempts[0].attempt, 1);
        assert_eq!(third.previous_attempts[1].reason, "connection reset");
        assert_ne!(third.id, first.id);
        assert_eq!(third.payload, first.payload);
    }

    #[test]
    fn reschedule_keeps_attempt_and_history_but_changes_id() {
        let first = sample_envelope().next_attempt("timeout while calling provider");
        let rescheduled = first.reschedule();

        assert_ne!(rescheduled.id, first.id);
        assert_eq!(rescheduled.attempt, first.attempt);
        assert_eq!(rescheduled.previous_attempts, first.previous_attempts);
        assert_eq!(rescheduled.payload, first.payload);
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = JobEnvelope::new(JobPayload::AiOperation(AiOperationPayload {
            service: "anthropic".to_string(),
            request: AiOperationRequest::GenerateSeo {
                title: "Title".to_string(),
                content: "Body".to_string(),
            },
            model: Some(EntityModel::Articles),
            entity_id: Some(Uuid::new_v4()),
        }));

        let raw = serde_json::to_string(&envelope).unwrap();
        let parsed: JobEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn attempt_defaults_to_one_for_legacy_payloads() {
        let raw = r#"{
            "id": "5f2e7f1e-0000-4000-8000-000000000000",
            "payload": {"job": "tag_update", "id": "5f2e7f1e-0000-4000-8000-000000000001", "title": "x"}
        }"#;
        let parsed: JobEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.attempt, 1);
        assert!(parsed.previous_attempts.is_empty());
    }
}
