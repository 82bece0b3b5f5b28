//! Cloud engine error types

use crate::model::ResourceKind;
use thiserror::Error;

/// Cloud engine errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Label '{label}' already exists for {kind} {existing_id}. Please choose a different label.")]
    DuplicateLabel {
        kind: ResourceKind,
        label: String,
        existing_id: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Transient API error: {0}")]
    Transient(String),

    #[error("API error: {0}")]
    Permanent(String),

    #[error(
        "Instance {instance_id} (label '{label}', hostname '{hostname}') is suspended \
         (observed on attempt {attempt}, built={built}, booted={booted})"
    )]
    Suspended {
        instance_id: String,
        label: String,
        hostname: String,
        attempt: u32,
        built: bool,
        booted: bool,
    },

    #[error(
        "Timeout waiting for {target} to be ready after {attempts} attempts ({waited_secs} seconds). \
         Last known state: {last_state}, Last error: {last_error}, Last IPs: {last_ips}, Last response: {last_response}"
    )]
    TimedOut {
        target: String,
        attempts: u32,
        waited_secs: u64,
        last_state: String,
        last_error: String,
        last_ips: String,
        last_response: String,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Unable to {operation} {kind} during {phase}: {source}")]
    Operation {
        kind: ResourceKind,
        operation: &'static str,
        phase: &'static str,
        #[source]
        source: Box<CloudError>,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Retry-relevant classification of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Transient,
    Permanent,
}

impl ErrorClass {
    /// Infer the class from an error message when the transport carries no typed code.
    ///
    /// Status codes only count as standalone words, so "plan-4040" is not a 404.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has_word = |word: &str| {
            lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|token| token == word)
        };

        if lower.contains("not found") || has_word("404") {
            return ErrorClass::NotFound;
        }

        const TRANSIENT_PHRASES: &[&str] = &[
            "timeout",
            "timed out",
            "temporarily",
            "service unavailable",
            "connection refused",
            "connection reset",
            "connection closed",
            "connection aborted",
            "reset by peer",
            "too many requests",
            "bad gateway",
            "internal server error",
            "try again",
        ];
        if TRANSIENT_PHRASES.iter().any(|p| lower.contains(p))
            || ["502", "503", "504"].into_iter().any(has_word)
        {
            return ErrorClass::Transient;
        }

        ErrorClass::Permanent
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ErrorClass::NotFound,
            408 | 425 | 429 => ErrorClass::Transient,
            s if s >= 500 => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }

    /// Build the matching remote error carrying `message`.
    pub fn into_error(self, message: impl Into<String>) -> CloudError {
        let message = message.into();
        match self {
            ErrorClass::NotFound => CloudError::NotFound(message),
            ErrorClass::Transient => CloudError::Transient(message),
            ErrorClass::Permanent => CloudError::Permanent(message),
        }
    }
}

impl CloudError {
    /// Build a remote error, classifying it from its message.
    pub fn remote(message: impl Into<String>) -> Self {
        let message = message.into();
        ErrorClass::from_message(&message).into_error(message)
    }

    /// Wrap an error with the lifecycle operation and phase it failed in.
    pub fn during(
        self,
        kind: ResourceKind,
        operation: &'static str,
        phase: &'static str,
    ) -> Self {
        CloudError::Operation {
            kind,
            operation,
            phase,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through operation context.
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn class(&self) -> Option<ErrorClass> {
        match self.root() {
            CloudError::NotFound(_) => Some(ErrorClass::NotFound),
            CloudError::Transient(_) | CloudError::Io(_) => Some(ErrorClass::Transient),
            CloudError::Permanent(_) | CloudError::InvalidResponse(_) | CloudError::Json(_) => {
                Some(ErrorClass::Permanent)
            }
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == Some(ErrorClass::Transient)
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == Some(ErrorClass::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_from_message() {
        assert_eq!(
            ErrorClass::from_message("Instance not found"),
            ErrorClass::NotFound
        );
        assert_eq!(
            ErrorClass::from_message("connection refused"),
            ErrorClass::Transient
        );
        assert_eq!(
            ErrorClass::from_message("Service Temporarily Unavailable"),
            ErrorClass::Transient
        );
        assert_eq!(
            ErrorClass::from_message("The plan slug field is invalid"),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_classify_from_message_matches_whole_words() {
        assert_eq!(ErrorClass::from_message("HTTP 404"), ErrorClass::NotFound);
        assert_eq!(ErrorClass::from_message("upstream returned 503"), ErrorClass::Transient);
        assert_eq!(
            ErrorClass::from_message("plan-4040 invalid"),
            ErrorClass::Permanent
        );
        assert_eq!(
            ErrorClass::from_message("Invalid connection string for image"),
            ErrorClass::Permanent
        );
        assert_eq!(
            ErrorClass::from_message("Image unavailable in this location"),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn test_classify_from_status() {
        assert_eq!(ErrorClass::from_status(404), ErrorClass::NotFound);
        assert_eq!(ErrorClass::from_status(429), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(503), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(422), ErrorClass::Permanent);
        assert_eq!(ErrorClass::from_status(401), ErrorClass::Permanent);
    }

    #[test]
    fn test_root_looks_through_context() {
        let err = CloudError::Transient("503".into())
            .during(ResourceKind::Instance, "create", "create request")
            .during(ResourceKind::Instance, "create", "outer");

        assert!(matches!(err.root(), CloudError::Transient(_)));
        assert!(err.is_transient());
        assert!(err.to_string().contains("Unable to create instance during outer"));
    }
}
