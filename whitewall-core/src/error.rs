use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Twitter API error: {0}")]
    TwitterApi(#[from] TwitterApiError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TwitterApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Invalid or expired access token")]
    InvalidToken,

    #[error("Rate limit exceeded, window resets at {}", format_reset(.reset_at))]
    RateLimitExceeded { reset_at: Option<DateTime<Utc>> },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Request rejected with status {status_code}: error #{}, {message}", format_code(.code))]
    Rejected {
        status_code: u16,
        code: Option<i64>,
        message: String,
    },
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => at.to_rfc3339(),
        None => "an unknown time".to_string(),
    }
}

fn format_code(code: &Option<i64>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "?".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive not found: {path}")]
    NotFound { path: String },

    #[error("Invalid archive format in {path}: {details}")]
    InvalidFormat { path: String, details: String },

    #[error("Invalid post {post_id} in {path}: {details}")]
    InvalidPost {
        path: String,
        post_id: String,
        details: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration file unreadable: {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("No access token configured; set credentials.access_token or {var_name}")]
    MissingCredentials { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
