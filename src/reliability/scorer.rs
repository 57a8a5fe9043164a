use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::models::reliability::{FieldScore, ScoreResult, Severity};
use crate::reliability::weights::{
    FieldKind, FieldRule, KNOWN_STANDARDS_BODIES, SCORING_VERSION, VALID_CURRENCIES,
};

/// Corpus average assumed for fields never scored before, keeping the
/// importance ranking meaningful on an empty corpus.
const DEFAULT_CORPUS_AVG: f64 = 0.5;

/// Number of fields surfaced in the importance ranking.
const IMPORTANCE_TOP_N: usize = 3;

/// Score an entity's fields against a ruleset. Pure function, no I/O;
/// `corpus_avg` carries the aggregate statistics the importance ranking
/// needs (field → average score across the model's corpus).
pub fn score_entity(
    fields: &Map<String, Value>,
    rules: &[(&str, FieldRule)],
    corpus_avg: &HashMap<String, f64>,
) -> ScoreResult {
    let mut field_scores = Vec::with_capacity(rules.len());
    let mut contribution_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut completed = 0usize;

    for (name, rule) in rules {
        let value = fields.get(*name);
        let (score, notes) = raw_score(rule.kind, value);
        if score > 0.0 {
            completed += 1;
        }
        let contribution = score * rule.weight;
        contribution_sum += contribution;
        weight_sum += rule.weight;

        field_scores.push(FieldScore {
            field: (*name).to_string(),
            score,
            weight: rule.weight,
            contribution,
            max_score: 1.0,
            notes,
        });
    }

    // Self-normalizes when weights do not sum to exactly 1.0.
    let total_score = if weight_sum > 0.0 {
        contribution_sum / weight_sum
    } else {
        0.0
    };
    let completeness_percent = if rules.is_empty() {
        0.0
    } else {
        completed as f64 / rules.len() as f64 * 100.0
    };

    let field_importance = rank_importance(&field_scores, corpus_avg);

    ScoreResult {
        total_score,
        completeness_percent,
        field_scores,
        version: SCORING_VERSION.to_string(),
        severity: Severity::for_score(total_score),
        field_importance,
    }
}

/// `importance = weight * (1 - corpus_avg) * (1 - current_score)`: heavy
/// fields that are commonly weak and weak on this entity rank highest.
fn rank_importance(field_scores: &[FieldScore], corpus_avg: &HashMap<String, f64>) -> Vec<String> {
    let mut ranked: Vec<(f64, &str)> = field_scores
        .iter()
        .map(|fs| {
            let avg = corpus_avg
                .get(&fs.field)
                .copied()
                .unwrap_or(DEFAULT_CORPUS_AVG);
            let importance = fs.weight * (1.0 - avg) * (1.0 - fs.score);
            (importance, fs.field.as_str())
        })
        .collect();

    // Name tie-break keeps the ranking deterministic.
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(IMPORTANCE_TOP_N)
        .filter(|(importance, _)| *importance > 0.0)
        .map(|(_, field)| field.to_string())
        .collect()
}

fn raw_score(kind: FieldKind, value: Option<&Value>) -> (f64, String) {
    match kind {
        FieldKind::Structured => score_structured(value),
        FieldKind::StandardsBody => score_standards_body(value),
        FieldKind::Rating => score_positive_number(value, "rating"),
        FieldKind::Boolean => score_boolean(value),
        FieldKind::Text { min, ideal } => score_text(value, min, ideal),
        FieldKind::Price => score_positive_number(value, "price"),
        FieldKind::Currency => score_currency(value),
        FieldKind::MediaPresence | FieldKind::Generic => score_presence(value),
    }
}

fn text_of(value: Option<&Value>) -> &str {
    value.and_then(Value::as_str).unwrap_or("")
}

fn score_structured(value: Option<&Value>) -> (f64, String) {
    let parsed = match value {
        Some(Value::Object(_)) | Some(Value::Array(_)) => value.cloned(),
        Some(Value::String(s)) => serde_json::from_str(s).ok(),
        _ => None,
    };

    let key_count = match parsed {
        Some(Value::Object(map)) => map.len(),
        Some(Value::Array(items)) => items.len(),
        _ => return (0.0, "not parseable as structured data".to_string()),
    };

    let score = (key_count as f64 / 5.0).min(1.0);
    (score, format!("{key_count} structured keys"))
}

fn score_standards_body(value: Option<&Value>) -> (f64, String) {
    let text = text_of(value).trim();
    if text.len() < 2 {
        return (0.0, "missing or too short".to_string());
    }
    let lowered = text.to_lowercase();
    if KNOWN_STANDARDS_BODIES
        .iter()
        .any(|body| lowered.contains(&body.to_lowercase()))
    {
        (1.0, "recognized standards body".to_string())
    } else if text.len() >= 3 {
        (0.8, "unrecognized standards body".to_string())
    } else {
        (0.4, "short unrecognized value".to_string())
    }
}

fn score_positive_number(value: Option<&Value>, label: &str) -> (f64, String) {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n > 0.0 => (1.0, format!("{label} present")),
        Some(_) => (0.0, format!("{label} not positive")),
        None => (0.0, format!("{label} missing or not numeric")),
    }
}

fn score_boolean(value: Option<&Value>) -> (f64, String) {
    match value {
        // False is a deliberate answer, so it keeps half credit.
        Some(Value::Bool(true)) => (1.0, "flag set".to_string()),
        Some(Value::Bool(false)) => (0.5, "flag explicitly false".to_string()),
        _ => (0.0, "flag missing".to_string()),
    }
}

fn score_text(value: Option<&Value>, min: usize, ideal: usize) -> (f64, String) {
    let len = text_of(value).trim().chars().count();
    if len < min {
        return (0.0, format!("{len} chars, below minimum {min}"));
    }
    if len >= ideal || ideal <= min {
        return (1.0, format!("{len} chars, at or above ideal {ideal}"));
    }
    let score = (len - min) as f64 / (ideal - min) as f64;
    (score, format!("{len} chars, between {min} and {ideal}"))
}

fn score_currency(value: Option<&Value>) -> (f64, String) {
    let text = text_of(value).trim();
    if text.is_empty() {
        return (0.0, "currency missing".to_string());
    }
    if VALID_CURRENCIES
        .iter()
        .any(|code| code.eq_ignore_ascii_case(text))
    {
        (1.0, "valid currency".to_string())
    } else {
        (0.5, "unknown currency".to_string())
    }
}

fn score_presence(value: Option<&Value>) -> (f64, String) {
    if text_of(value).trim().is_empty() {
        (0.0, "empty".to_string())
    } else {
        (1.0, "present".to_string())
    }
}
