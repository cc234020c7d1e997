//! Engine error types.

use huddle_core::TimeError;
use huddle_providers::{ProviderError, ProviderErrorCode};
use thiserror::Error;

use crate::config::ConfigError;
use crate::result::CalendarFailure;

/// Result type for engine operations.
pub type AggregateResult<T> = Result<T, AggregateError>;

/// Errors an aggregation can end with.
///
/// Calendar-scoped failures never surface here on their own; they degrade
/// the result instead. Only failures that make the respondent's answer
/// meaningless, or a caller cancellation, become errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// A linked account's credential is invalid and could not be refreshed.
    #[error("credentials for account {account} expired: {message}")]
    AuthExpired { account: String, message: String },

    /// Every enabled sub-calendar of the respondent failed.
    #[error("no calendar of {respondent} could be read ({} failed)", failures.len())]
    ProviderUnavailable {
        respondent: String,
        failures: Vec<CalendarFailure>,
    },

    /// The account's provider type has no adapter.
    #[error("account {account} has unknown provider type `{provider_type}`")]
    UnknownProviderType {
        account: String,
        provider_type: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl AggregateError {
    /// Lifts a provider error raised for `account` that ends the respondent.
    pub(crate) fn from_provider(account: &str, provider_type: &str, error: &ProviderError) -> Self {
        match error.code() {
            ProviderErrorCode::AuthExpired => Self::AuthExpired {
                account: account.to_string(),
                message: error.message().to_string(),
            },
            ProviderErrorCode::UnknownProviderType => Self::UnknownProviderType {
                account: account.to_string(),
                provider_type: provider_type.to_string(),
            },
            ProviderErrorCode::Cancelled => Self::Cancelled,
            ProviderErrorCode::InvalidRequest => Self::InvalidRequest(error.to_string()),
            ProviderErrorCode::Configuration | ProviderErrorCode::CredentialStore => {
                Self::Configuration(error.to_string())
            }
            ProviderErrorCode::ProviderUnavailable | ProviderErrorCode::MalformedResponse => {
                Self::ProviderUnavailable {
                    respondent: account.to_string(),
                    failures: vec![CalendarFailure::new(account, "", error)],
                }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<TimeError> for AggregateError {
    fn from(e: TimeError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

impl From<ConfigError> for AggregateError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_respondent_errors() {
        let auth = ProviderError::auth_expired("token revoked");
        assert_eq!(
            AggregateError::from_provider("acc-1", "google", &auth),
            AggregateError::AuthExpired {
                account: "acc-1".into(),
                message: "token revoked".into()
            }
        );

        let unknown = ProviderError::unknown_provider_type("outlook");
        assert!(matches!(
            AggregateError::from_provider("acc-2", "outlook", &unknown),
            AggregateError::UnknownProviderType { provider_type, .. } if provider_type == "outlook"
        ));

        assert!(AggregateError::from_provider("a", "google", &ProviderError::cancelled()).is_cancelled());
    }

    #[test]
    fn display_messages() {
        let err = AggregateError::ProviderUnavailable {
            respondent: "Ada".into(),
            failures: vec![],
        };
        assert_eq!(err.to_string(), "no calendar of Ada could be read (0 failed)");
        assert_eq!(AggregateError::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn time_error_is_invalid_request() {
        let err: AggregateError = TimeError::EmptyPoll.into();
        assert!(matches!(err, AggregateError::InvalidRequest(_)));
    }
}
