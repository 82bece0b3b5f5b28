//! LetsCloud gateway error types

use letsflow_cloud::{CloudError, ErrorClass};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LetsCloudError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LetsCloud API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid identifier for a request path: {0:?}")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(#[from] letsflow_config::ConfigError),

    #[error("Connection check failed: {0}")]
    Probe(#[source] CloudError),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LetsCloudError>;

impl LetsCloudError {
    /// Retry class of a failure, from the HTTP status when there is one.
    pub fn class(&self) -> ErrorClass {
        match self {
            LetsCloudError::Http(e) => match e.status() {
                Some(status) => ErrorClass::from_status(status.as_u16()),
                None if e.is_decode() => ErrorClass::Permanent,
                None => ErrorClass::Transient,
            },
            LetsCloudError::Api { status, message } if *status >= 400 => {
                match ErrorClass::from_status(*status) {
                    // some endpoints answer a missing resource with 400/422
                    ErrorClass::Permanent if ErrorClass::from_message(message) == ErrorClass::NotFound => {
                        ErrorClass::NotFound
                    }
                    class => class,
                }
            }
            LetsCloudError::Api { message, .. } => ErrorClass::from_message(message),
            LetsCloudError::Probe(e) => e.class().unwrap_or(ErrorClass::Permanent),
            LetsCloudError::InvalidResponse(_)
            | LetsCloudError::InvalidConfig(_)
            | LetsCloudError::InvalidIdentifier(_)
            | LetsCloudError::Config(_)
            | LetsCloudError::JsonError(_) => ErrorClass::Permanent,
        }
    }
}

impl From<LetsCloudError> for CloudError {
    fn from(err: LetsCloudError) -> Self {
        match err {
            LetsCloudError::InvalidResponse(msg) => CloudError::InvalidResponse(msg),
            LetsCloudError::JsonError(e) => CloudError::InvalidResponse(e.to_string()),
            LetsCloudError::InvalidConfig(msg) => CloudError::Validation(msg),
            e @ LetsCloudError::InvalidIdentifier(_) => CloudError::Validation(e.to_string()),
            LetsCloudError::Config(e) => CloudError::Validation(e.to_string()),
            LetsCloudError::Probe(e) => e,
            other => {
                let class = other.class();
                class.into_error(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, message: &str) -> LetsCloudError {
        LetsCloudError::Api {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(api(404, "whatever").class(), ErrorClass::NotFound);
        assert_eq!(api(503, "Service Unavailable").class(), ErrorClass::Transient);
        assert_eq!(api(429, "slow down").class(), ErrorClass::Transient);
        assert_eq!(api(422, "The label field is required").class(), ErrorClass::Permanent);
        assert_eq!(api(400, "Instance not found").class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_unsuccessful_envelope_classified_by_message() {
        assert_eq!(api(200, "Instance not found").class(), ErrorClass::NotFound);
        assert_eq!(api(200, "Plan unavailable, try again").class(), ErrorClass::Transient);
        assert_eq!(api(200, "Invalid image").class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_into_cloud_error_keeps_message() {
        let err: CloudError = api(500, "boom").into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("boom"));

        let err: CloudError = LetsCloudError::InvalidResponse("missing data".into()).into();
        assert!(matches!(err, CloudError::InvalidResponse(_)));
    }
}
