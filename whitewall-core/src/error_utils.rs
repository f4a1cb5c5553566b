use crate::error::*;
use tracing::{error, warn};

/// Process exit status for a normal run.
pub const EXIT_OK: i32 = 0;
/// Credentials missing or configuration unusable.
pub const EXIT_UNAUTHED: i32 = 1;
/// Credentials rejected by the API.
pub const EXIT_AUTHFAIL: i32 = 2;
/// Local files (config, archive) could not be read.
pub const EXIT_FSFAIL: i32 = 3;
/// Any other remote failure.
pub const EXIT_TWFAIL: i32 = 4;

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn is_auth_failure(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
    fn exit_code(&self) -> i32;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::TwitterApi(e) => {
                error!("Twitter API error details: {:?}", e);
            }
            CoreError::Archive(e) => {
                error!("Archive error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::TwitterApi(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    fn is_auth_failure(&self) -> bool {
        matches!(self, CoreError::TwitterApi(e) if e.is_auth_failure())
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::TwitterApi(e) => e.user_friendly_message(),
            CoreError::Archive(e) => format!("Could not read the post archive: {e}"),
            CoreError::Config(ConfigError::MissingCredentials { var_name }) => format!(
                "Access not configured. Put an access token in the [credentials] section or set {var_name}."
            ),
            CoreError::Config(e) => format!("Invalid configuration: {e}"),
            CoreError::Io(e) => format!("File system error: {e}"),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            _ => "An unexpected error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::TwitterApi(e) => e.error_code(),
            CoreError::Archive(_) => "ARCHIVE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            CoreError::TwitterApi(e) => e.exit_code(),
            CoreError::Config(ConfigError::MissingCredentials { .. })
            | CoreError::Config(ConfigError::InvalidValue { .. })
            | CoreError::Config(ConfigError::ValidationFailed { .. })
            | CoreError::Config(ConfigError::Parse(_)) => EXIT_UNAUTHED,
            CoreError::Config(ConfigError::FileNotFound { .. })
            | CoreError::Config(ConfigError::Unreadable { .. })
            | CoreError::Archive(_)
            | CoreError::Io(_) => EXIT_FSFAIL,
            CoreError::Network(_) | CoreError::Internal { .. } => EXIT_TWFAIL,
        }
    }
}

impl ErrorExt for TwitterApiError {
    fn log_error(&self) -> &Self {
        error!("TwitterApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("TwitterApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            TwitterApiError::RateLimitExceeded { .. } => true,
            TwitterApiError::RequestTimeout => true,
            TwitterApiError::ServerError { status_code } => {
                matches!(status_code, 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            TwitterApiError::AuthenticationFailed { .. } | TwitterApiError::InvalidToken
        )
    }

    fn user_friendly_message(&self) -> String {
        match self {
            TwitterApiError::AuthenticationFailed { .. } | TwitterApiError::InvalidToken => {
                "Access token invalid or expired. Generate a new one and run again.".to_string()
            }
            TwitterApiError::RateLimitExceeded { .. } => {
                "Too many requests. Please wait for the rate-limit window to reset.".to_string()
            }
            TwitterApiError::Forbidden { resource } => {
                format!("Access denied to {resource}.")
            }
            TwitterApiError::NotFound { resource } => format!("Not found: {resource}"),
            TwitterApiError::RequestTimeout => {
                "Request to Twitter timed out. Please try again.".to_string()
            }
            TwitterApiError::Rejected {
                status_code,
                code,
                message,
            } => match code {
                Some(code) => format!("Exiting on status {status_code}: error #{code}, {message}"),
                None => format!("Exiting on status {status_code}: {message}"),
            },
            _ => "Twitter API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            TwitterApiError::AuthenticationFailed { .. } => "TWITTER_AUTH_FAILED".to_string(),
            TwitterApiError::InvalidToken => "TWITTER_INVALID_TOKEN".to_string(),
            TwitterApiError::RateLimitExceeded { .. } => "TWITTER_RATE_LIMIT".to_string(),
            TwitterApiError::Forbidden { .. } => "TWITTER_FORBIDDEN".to_string(),
            TwitterApiError::NotFound { .. } => "TWITTER_NOT_FOUND".to_string(),
            TwitterApiError::RequestTimeout => "TWITTER_TIMEOUT".to_string(),
            TwitterApiError::InvalidResponse { .. } => "TWITTER_INVALID_RESPONSE".to_string(),
            TwitterApiError::ServerError { .. } => "TWITTER_SERVER_ERROR".to_string(),
            TwitterApiError::Rejected { .. } => "TWITTER_REJECTED".to_string(),
        }
    }

    fn exit_code(&self) -> i32 {
        if self.is_auth_failure() {
            EXIT_AUTHFAIL
        } else {
            EXIT_TWFAIL
        }
    }
}
