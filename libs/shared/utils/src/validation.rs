use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use shared_models::error::{AppError, FieldIssue};

/// JSON body extractor that runs `validator` rules and reports failures in the
/// shared error envelope instead of axum's plain-text rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::field("body", rejection.body_text()))?;

        value.validate().map_err(|errors| validation_error(&errors))?;

        Ok(ValidatedJson(value))
    }
}

pub fn validation_error(errors: &ValidationErrors) -> AppError {
    let mut issues: Vec<FieldIssue> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid ({})", field, e.code));
                FieldIssue::new(field.to_string(), message)
            })
        })
        .collect();
    issues.sort_by(|a, b| a.field.cmp(&b.field));

    AppError::Validation {
        message: "Request validation failed".to_string(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Note {
        #[validate(length(min = 1, max = 5, message = "text must be 1-5 characters"))]
        text: String,
        #[validate(range(min = 1))]
        count: i64,
    }

    #[test]
    fn collects_every_failing_field_sorted() {
        let note = Note {
            text: "too long".to_string(),
            count: 0,
        };
        let err = validation_error(&note.validate().unwrap_err());

        match err {
            AppError::Validation { issues, .. } => {
                assert_eq!(issues.len(), 2);
                assert_eq!(issues[0].field, "count");
                assert_eq!(issues[1].field, "text");
                assert_eq!(issues[1].message, "text must be 1-5 characters");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
