//! Validation Utilities

use validator::ValidationErrors;

use super::error::ChatError;

/// Convert validator errors to a `BadInput` error naming the first failing field.
pub fn validation_error(errors: ValidationErrors) -> ChatError {
    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                (field.to_string(), message)
            })
        })
        .collect();
    fields.sort();

    let message = fields
        .first()
        .map(|(field, message)| format!("{}: {}", field, message))
        .unwrap_or_else(|| "Validation failed".into());

    ChatError::BadInput(message)
}
