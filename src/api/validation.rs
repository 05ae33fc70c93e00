use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::api::errors::ApiError;

/// Runs `validator` rules and reports the first failing field as a 400.
pub(crate) fn validate_payload<T: Validate>(payload: &T) -> Result<(), ApiError> {
    payload.validate().map_err(|errors| ApiError::BadRequest(first_message(&errors)))
}

fn first_message(errors: &ValidationErrors) -> String {
    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(list) => {
                if let Some(error) = list.first() {
                    return match &error.message {
                        Some(message) => message.to_string(),
                        None => format!("{field} is invalid"),
                    };
                }
            }
            ValidationErrorsKind::Struct(nested) => return first_message(nested),
            ValidationErrorsKind::List(items) => {
                if let Some(nested) = items.values().next() {
                    return first_message(nested);
                }
            }
        }
    }

    errors.to_string()
}
