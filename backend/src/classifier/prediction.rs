use serde::Serialize;
use serde_json::Value;

pub const UNKNOWN_LABEL: &str = "unknown";

/// A classifier verdict with confidence on the 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: 0.0,
        }
    }

    /// Reads `{"label", "confidence"}` objects or `[{"label", "score"}]` lists.
    /// Anything ambiguous degrades to `unknown` / 0 instead of failing.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self {
                label: label_of(value),
                confidence: to_percentage(number_of(value.get("confidence"))),
            },
            Value::Array(entries) => best_of(entries),
            _ => Self::unknown(),
        }
    }
}

fn best_of(entries: &[Value]) -> Prediction {
    // Some hosted APIs wrap the list once more per input image.
    if let Some(Value::Array(inner)) = entries.first() {
        return best_of(inner);
    }

    entries
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| {
            let score = entry
                .get("score")
                .or_else(|| entry.get("confidence"));
            (label_of(entry), number_of(score))
        })
        .fold(None::<(String, f64)>, |best, candidate| match best {
            Some(current) if current.1 >= candidate.1 => Some(current),
            _ => Some(candidate),
        })
        .map(|(label, score)| Prediction {
            label,
            confidence: to_percentage(score),
        })
        .unwrap_or_else(Prediction::unknown)
}

fn label_of(value: &Value) -> String {
    match value.get("label") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

fn number_of(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_finite() { raw } else { 0.0 }
}

/// Scales a 0–1 fraction to 0–100, rounded to four places to drop float noise.
pub fn to_percentage(fraction: f64) -> f64 {
    if !fraction.is_finite() {
        return 0.0;
    }
    (fraction * 100.0 * 10_000.0).round() / 10_000.0
}
