use crate::models::entity::EntityModel;

/// Version tag stamped onto every persisted scoring pass. Bump when the
/// rules or weights change so historical rows stay interpretable.
pub const SCORING_VERSION: &str = "v2.0";

/// Currencies that earn full credit. Anything else present-but-unknown
/// earns half credit.
pub const VALID_CURRENCIES: [&str; 6] = ["USD", "EUR", "GBP", "CAD", "JPY", "AUD"];

/// Certifying bodies recognized by the standards-name rule.
pub const KNOWN_STANDARDS_BODIES: [&str; 13] = [
    "ISO", "IEC", "ANSI", "ASTM", "DIN", "BSI", "CE", "UL", "FDA", "FCC", "RoHS", "REACH", "NSF",
];

/// How a field's raw score is computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Parseable JSON, scored by key breadth (capped at 5 keys).
    Structured,
    /// Certifying-body name matched against [`KNOWN_STANDARDS_BODIES`].
    StandardsBody,
    /// Numeric rating, full credit when > 0.
    Rating,
    /// Boolean flag. `false` still earns half credit.
    Boolean,
    /// Free text with linear interpolation between `min` and `ideal` length.
    Text { min: usize, ideal: usize },
    /// Numeric price, full credit when > 0.
    Price,
    /// Currency code matched against [`VALID_CURRENCIES`].
    Currency,
    /// Image URL, alt text and similar: full credit when non-blank.
    MediaPresence,
    /// Fallback: full credit when non-blank.
    Generic,
}

/// One entry of the static per-model weight configuration.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub weight: f64,
    pub kind: FieldKind,
}

const fn rule(weight: f64, kind: FieldKind) -> FieldRule {
    FieldRule { weight, kind }
}

/// Product ruleset. Weights sum to 1.0.
pub const PRODUCT_FIELDS: [(&str, FieldRule); 13] = [
    ("title", rule(0.12, FieldKind::Text { min: 3, ideal: 50 })),
    ("description", rule(0.12, FieldKind::Text { min: 20, ideal: 300 })),
    ("price", rule(0.10, FieldKind::Price)),
    ("currency", rule(0.04, FieldKind::Currency)),
    ("rating", rule(0.06, FieldKind::Rating)),
    ("certified", rule(0.06, FieldKind::Boolean)),
    ("standards_body", rule(0.08, FieldKind::StandardsBody)),
    ("specifications", rule(0.10, FieldKind::Structured)),
    ("image_url", rule(0.08, FieldKind::MediaPresence)),
    ("alt_text", rule(0.06, FieldKind::MediaPresence)),
    ("meta_title", rule(0.06, FieldKind::Text { min: 5, ideal: 60 })),
    ("meta_description", rule(0.06, FieldKind::Text { min: 20, ideal: 160 })),
    ("meta_keywords", rule(0.06, FieldKind::Generic)),
];

/// Article ruleset. Weights sum to 1.0.
pub const ARTICLE_FIELDS: [(&str, FieldRule); 7] = [
    ("title", rule(0.20, FieldKind::Text { min: 3, ideal: 60 })),
    ("body", rule(0.25, FieldKind::Text { min: 50, ideal: 500 })),
    ("meta_title", rule(0.15, FieldKind::Text { min: 5, ideal: 60 })),
    ("meta_description", rule(0.15, FieldKind::Text { min: 20, ideal: 160 })),
    ("meta_keywords", rule(0.10, FieldKind::Generic)),
    ("image_url", rule(0.10, FieldKind::MediaPresence)),
    ("alt_text", rule(0.05, FieldKind::MediaPresence)),
];

/// Tag ruleset. Weights sum to 1.0.
pub const TAG_FIELDS: [(&str, FieldRule); 5] = [
    ("title", rule(0.30, FieldKind::Text { min: 2, ideal: 30 })),
    ("description", rule(0.30, FieldKind::Text { min: 10, ideal: 160 })),
    ("meta_title", rule(0.15, FieldKind::Text { min: 5, ideal: 60 })),
    ("meta_description", rule(0.15, FieldKind::Text { min: 20, ideal: 160 })),
    ("meta_keywords", rule(0.10, FieldKind::Generic)),
];

/// Static ruleset for a model.
pub fn rules_for(model: EntityModel) -> &'static [(&'static str, FieldRule)] {
    match model {
        EntityModel::Articles => &ARTICLE_FIELDS,
        EntityModel::Tags => &TAG_FIELDS,
        EntityModel::Products => &PRODUCT_FIELDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight_sum(rules: &[(&str, FieldRule)]) -> f64 {
        rules.iter().map(|(_, r)| r.weight).sum()
    }

    #[test]
    fn weights_sum_to_one_per_model() {
        assert!((weight_sum(&PRODUCT_FIELDS) - 1.0).abs() < 1e-9);
        assert!((weight_sum(&ARTICLE_FIELDS) - 1.0).abs() < 1e-9);
        assert!((weight_sum(&TAG_FIELDS) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn every_model_has_rules() {
        assert_eq!(rules_for(EntityModel::Products).len(), 13);
        assert_eq!(rules_for(EntityModel::Articles).len(), 7);
        assert_eq!(rules_for(EntityModel::Tags).len(), 5);
    }
}
