use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::entity::{ContentEntity, EntityModel};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown entity model: {0}")]
    UnknownModel(String),

    #[error("Entity fields column is not a JSON object")]
    MalformedFields,
}

/// Persistence seam for content entities. The engine treats the CMS data
/// model as opaque field maps, so this is the only place that knows about
/// the entity tables.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, model: EntityModel, id: Uuid) -> Result<Option<ContentEntity>, StoreError>;

    /// Persist the entity's fields, bumping `modified`.
    async fn save(&self, entity: &ContentEntity) -> Result<(), StoreError>;

    /// Upsert the translated field map for one locale.
    async fn save_translation(
        &self,
        model: EntityModel,
        id: Uuid,
        locale: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn get_translation(
        &self,
        model: EntityModel,
        id: Uuid,
        locale: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError>;

    /// Page through entities of one model, oldest first.
    async fn list(
        &self,
        model: EntityModel,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContentEntity>, StoreError>;

    async fn count(&self, model: EntityModel) -> Result<i64, StoreError>;
}

/// Store backed by the `entities` / `entity_translations` tables.
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> Result<ContentEntity, StoreError> {
        let model_str: String = row.try_get("model")?;
        let model: EntityModel = model_str
            .parse()
            .map_err(|_| StoreError::UnknownModel(model_str))?;

        let fields: Value = row.try_get("fields")?;
        let fields = match fields {
            Value::Object(map) => map,
            _ => return Err(StoreError::MalformedFields),
        };

        Ok(ContentEntity {
            model,
            id: row.try_get("id")?,
            fields,
            reliability_score: row.try_get("reliability_score")?,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn get(&self, model: EntityModel, id: Uuid) -> Result<Option<ContentEntity>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT model, id, fields, reliability_score, created, modified
            FROM entities
            WHERE model = $1 AND id = $2
            "#,
        )
        .bind(model.to_string())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::map_row).transpose()
    }

    async fn save(&self, entity: &ContentEntity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO entities (model, id, fields, reliability_score, created, modified)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (model, id)
            DO UPDATE SET fields = EXCLUDED.fields, modified = NOW()
            "#,
        )
        .bind(entity.model.to_string())
        .bind(entity.id)
        .bind(Value::Object(entity.fields.clone()))
        .bind(entity.reliability_score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_translation(
        &self,
        model: EntityModel,
        id: Uuid,
        locale: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO entity_translations (model, foreign_key, locale, fields, created, modified)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (model, foreign_key, locale)
            DO UPDATE SET fields = EXCLUDED.fields, modified = NOW()
            "#,
        )
        .bind(model.to_string())
        .bind(id)
        .bind(locale)
        .bind(Value::Object(fields.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_translation(
        &self,
        model: EntityModel,
        id: Uuid,
        locale: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT fields
            FROM entity_translations
            WHERE model = $1 AND foreign_key = $2 AND locale = $3
            "#,
        )
        .bind(model.to_string())
        .bind(id)
        .bind(locale)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let fields: Value = r.try_get("fields")?;
                match fields {
                    Value::Object(map) => Ok(Some(map)),
                    _ => Err(StoreError::MalformedFields),
                }
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        model: EntityModel,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContentEntity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT model, id, fields, reliability_score, created, modified
            FROM entities
            WHERE model = $1
            ORDER BY created ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(model.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn count(&self, model: EntityModel) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM entities WHERE model = $1")
            .bind(model.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }
}

/// In-memory store for job tests.
#[derive(Default)]
pub struct MemoryEntityStore {
    entities: std::sync::Mutex<std::collections::HashMap<(String, Uuid), ContentEntity>>,
    translations:
        std::sync::Mutex<std::collections::HashMap<(String, Uuid, String), Map<String, Value>>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(self, entity: ContentEntity) -> Self {
        self.entities
            .lock()
            .unwrap()
            .insert((entity.model.to_string(), entity.id), entity);
        self
    }

    pub fn translation_for(
        &self,
        model: EntityModel,
        id: Uuid,
        locale: &str,
    ) -> Option<Map<String, Value>> {
        self.translations
            .lock()
            .unwrap()
            .get(&(model.to_string(), id, locale.to_string()))
            .cloned()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn get(&self, model: EntityModel, id: Uuid) -> Result<Option<ContentEntity>, StoreError> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .get(&(model.to_string(), id))
            .cloned())
    }

    async fn save(&self, entity: &ContentEntity) -> Result<(), StoreError> {
        self.entities
            .lock()
            .unwrap()
            .insert((entity.model.to_string(), entity.id), entity.clone());
        Ok(())
    }

    async fn save_translation(
        &self,
        model: EntityModel,
        id: Uuid,
        locale: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.translations
            .lock()
            .unwrap()
            .insert((model.to_string(), id, locale.to_string()), fields.clone());
        Ok(())
    }

    async fn get_translation(
        &self,
        model: EntityModel,
        id: Uuid,
        locale: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        Ok(self.translation_for(model, id, locale))
    }

    async fn list(
        &self,
        model: EntityModel,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContentEntity>, StoreError> {
        let entities = self.entities.lock().unwrap();
        let mut matching: Vec<ContentEntity> = entities
            .values()
            .filter(|e| e.model == model)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.created);
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, model: EntityModel) -> Result<i64, StoreError> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.model == model)
            .count() as i64)
    }
}
