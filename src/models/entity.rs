use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Content models the engine knows how to process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityModel {
    Articles,
    Tags,
    Products,
}

/// SEO fields populated by an earlier generation job. Translation must not
/// run until all of these are filled.
pub const SEO_FIELDS: [&str; 3] = ["meta_title", "meta_description", "meta_keywords"];

/// An entity loaded from the opaque entity store.
///
/// The ORM layer is an external collaborator, so entities are carried as a
/// field-name → JSON-value map rather than typed per-model structs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntity {
    pub model: EntityModel,
    pub id: Uuid,
    pub fields: Map<String, Value>,
    pub reliability_score: Option<f64>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl ContentEntity {
    pub fn new(model: EntityModel, id: Uuid, fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            model,
            id,
            fields,
            reliability_score: None,
            created: now,
            modified: now,
        }
    }

    /// String value of a field, `None` when absent or not a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Title or name of the entity for logging.
    pub fn display_name(&self) -> String {
        self.field_str("title")
            .or_else(|| self.field_str("name"))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    /// SEO fields that are still missing or blank.
    pub fn empty_seo_fields(&self) -> Vec<&'static str> {
        SEO_FIELDS
            .iter()
            .filter(|field| {
                self.field_str(field)
                    .map(|v| v.trim().is_empty())
                    .unwrap_or(true)
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity_with(fields: Value) -> ContentEntity {
        let map = fields.as_object().cloned().unwrap_or_default();
        ContentEntity::new(EntityModel::Articles, Uuid::new_v4(), map)
    }

    #[test]
    fn empty_seo_fields_reports_missing_and_blank() {
        let entity = entity_with(json!({
            "title": "Widget",
            "meta_title": "Widget",
            "meta_description": "  ",
        }));
        assert_eq!(
            entity.empty_seo_fields(),
            vec!["meta_description", "meta_keywords"]
        );
    }

    #[test]
    fn empty_seo_fields_clear_when_populated() {
        let entity = entity_with(json!({
            "meta_title": "a",
            "meta_description": "b",
            "meta_keywords": "c",
        }));
        assert!(entity.empty_seo_fields().is_empty());
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let entity = entity_with(json!({}));
        assert_eq!(entity.display_name(), entity.id.to_string());
    }
}
