//! Input validation for submitted measurements and feedback
//!
//! Form values arrive either as JSON numbers or as strings typed by an
//! analyst ("12.5", " 7,25 "). They are normalized here before anything is
//! persisted; a value that cannot be read as a finite number is rejected with
//! the offending field name instead of being silently replaced.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Validation failure, reported back to the submitter verbatim
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(String),

    #[error("{field} is not a valid number: {value}")]
    NotANumber { field: String, value: String },

    #[error("measurement {0} is given more than once")]
    Duplicate(String),
}

/// Read a numeric form value
///
/// Accepts finite JSON numbers and numeric strings. Strings are trimmed and a
/// single decimal comma is accepted. Returns `None` for anything else,
/// including NaN and infinities.
///
/// # Examples
///
/// ```
/// use qcflow_common::validation::sanitize_number;
/// use serde_json::json;
///
/// assert_eq!(sanitize_number(&json!(4.5)), Some(4.5));
/// assert_eq!(sanitize_number(&json!(" 7,25 ")), Some(7.25));
/// assert_eq!(sanitize_number(&json!("n/a")), None);
/// ```
pub fn sanitize_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            let normalized = if trimmed.matches(',').count() == 1 && !trimmed.contains('.') {
                trimmed.replace(',', ".")
            } else {
                trimmed.to_string()
            };
            normalized.parse::<f64>().ok()?
        }
        _ => return None,
    };

    number.is_finite().then_some(number)
}

/// Sanitize a whole measurement map
///
/// Field names are trimmed; blank names and names that collide after trimming
/// are rejected. The map must contain at least one measurement.
pub fn sanitize_measurements(
    raw: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, f64>, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::Missing("measurements".to_string()));
    }

    let mut clean = BTreeMap::new();
    for (name, value) in raw {
        let field = name.trim();
        if field.is_empty() {
            return Err(ValidationError::Missing("measurement name".to_string()));
        }
        let number = sanitize_number(value).ok_or_else(|| ValidationError::NotANumber {
            field: field.to_string(),
            value: value.to_string(),
        })?;
        if clean.insert(field.to_string(), number).is_some() {
            return Err(ValidationError::Duplicate(field.to_string()));
        }
    }

    Ok(clean)
}

/// Average of the finite values, 0.0 when there are none
///
/// ```
/// use qcflow_common::validation::safe_average;
///
/// assert_eq!(safe_average(&[]), 0.0);
/// assert_eq!(safe_average(&[1.0, f64::NAN, 3.0]), 2.0);
/// ```
pub fn safe_average(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Trim each line and drop the blank ones
pub fn clean_lines<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| line.as_ref().trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Trimmed copy of a required text field
pub fn require_text(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Missing(field.to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trimmed optional text; blank becomes `None`
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
