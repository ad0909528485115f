//! Request-shape validation for sum submissions.
//!
//! Validation collects every problem instead of stopping at the first one so
//! the boundary can report a complete list of `{field, message}` pairs.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a decoded `{ "numbers": [...] }` body, returning the numbers in
/// submission order.
pub fn validate_sum_request(body: &Value, max_numbers: usize) -> Result<Vec<f64>, Vec<FieldError>> {
    let Some(object) = body.as_object() else {
        return Err(vec![FieldError::new("body", "request body must be a JSON object")]);
    };

    let items = match object.get("numbers") {
        None | Some(Value::Null) => {
            return Err(vec![FieldError::new("numbers", "Numbers array is required")]);
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(vec![FieldError::new("numbers", "numbers must be an array")]);
        }
    };

    let mut errors = Vec::new();
    if items.is_empty() {
        errors.push(FieldError::new("numbers", "At least one number is required"));
    }
    if items.len() > max_numbers {
        errors.push(FieldError::new(
            "numbers",
            format!("Maximum {max_numbers} numbers allowed"),
        ));
    }

    let mut numbers = Vec::with_capacity(items.len().min(max_numbers));
    for (index, item) in items.iter().enumerate() {
        match item.as_f64() {
            Some(value) if value.is_finite() => numbers.push(value),
            _ => errors.push(FieldError::new(
                format!("numbers.{index}"),
                "must be a finite number",
            )),
        }
    }

    if errors.is_empty() {
        Ok(numbers)
    } else {
        Err(errors)
    }
}
