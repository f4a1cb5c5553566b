use chrono::{DateTime, Local, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};
use whitewall_core::{CoreError, ErrorExt, RetrySettings, TwitterApiError};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Added on top of the reported rate-limit reset time
    pub rate_limit_margin: Duration,
    /// Fixed pause before retrying a transient server failure
    pub transient_delay: Duration,
    /// Wait used when a rate-limit response does not say when the window resets
    pub default_rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            rate_limit_margin: Duration::from_secs(settings.rate_limit_margin_seconds),
            transient_delay: Duration::from_secs(settings.transient_delay_seconds),
            default_rate_limit_wait: Duration::from_secs(settings.default_rate_limit_wait_seconds),
        }
    }
}

/// How a failed remote call should be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Credentials are invalid or expired; nothing but new credentials helps.
    FatalAuth,
    /// Not recognized as recoverable.
    FatalUnclassified,
    RateLimited { reset_at: Option<DateTime<Utc>> },
    Transient,
    /// The target no longer exists.
    NotFound,
}

impl ErrorClass {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorClass::FatalAuth | ErrorClass::FatalUnclassified)
    }
}

/// Classify a remote failure
pub fn classify(error: &CoreError) -> ErrorClass {
    match error {
        CoreError::TwitterApi(api_error) => match api_error {
            TwitterApiError::AuthenticationFailed { .. } | TwitterApiError::InvalidToken => {
                ErrorClass::FatalAuth
            }
            TwitterApiError::RateLimitExceeded { reset_at } => ErrorClass::RateLimited {
                reset_at: *reset_at,
            },
            TwitterApiError::NotFound { .. } => ErrorClass::NotFound,
            TwitterApiError::RequestTimeout | TwitterApiError::ServerError { .. }
                if api_error.is_retryable() =>
            {
                ErrorClass::Transient
            }
            _ => ErrorClass::FatalUnclassified,
        },
        CoreError::Network(_) if error.is_retryable() => ErrorClass::Transient,
        _ => ErrorClass::FatalUnclassified,
    }
}

/// Delay before retrying after a rate limit. Never negative: a reset time in
/// the past still waits the safety margin.
pub fn rate_limit_delay(
    reset_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &RetryConfig,
) -> Duration {
    match reset_at {
        Some(reset_at) => {
            let remaining = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
            remaining + config.rate_limit_margin
        }
        None => config.default_rate_limit_wait + config.rate_limit_margin,
    }
}

/// Result of a delete that went through the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The API reported the post missing; it was deleted earlier.
    AlreadyGone,
}

/// Retry metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub rate_limit_waits: u64,
    pub transient_retries: u64,
    pub already_gone: u64,
    pub total_delay: Duration,
}

/// Wraps remote operations, waiting out rate limits and transient failures.
///
/// Retries are unbounded in number. The controller either eventually returns
/// the operation's result or hands back an error it classified as fatal, and
/// the caller is expected to stop.
#[derive(Debug, Default)]
pub struct RetryController {
    config: RetryConfig,
    total_retries: AtomicU64,
    rate_limit_waits: AtomicU64,
    transient_retries: AtomicU64,
    already_gone: AtomicU64,
    total_delay_ms: AtomicU64,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic. A not-found failure is fatal here.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        self.drive(operation_name, operation, None).await
    }

    /// Execute a delete. Not-found means the post is already gone and counts
    /// as success.
    pub async fn execute_delete<F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<DeleteOutcome, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), CoreError>>,
    {
        self.drive(
            operation_name,
            || {
                let attempt = operation();
                async move { attempt.await.map(|()| DeleteOutcome::Deleted) }
            },
            Some(DeleteOutcome::AlreadyGone),
        )
        .await
    }

    async fn drive<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
        mut on_not_found: Option<T>,
    ) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt: u64 = 0;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            let delay = match classify(&error) {
                ErrorClass::RateLimited { reset_at } => {
                    let delay = rate_limit_delay(reset_at, Utc::now(), &self.config);
                    let resume_at = Local::now()
                        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                    info!(
                        "Rate limited on {}. Waiting {} seconds, will try again at {} ...",
                        operation_name,
                        delay.as_secs_f64().round(),
                        resume_at.format("%H:%M")
                    );
                    self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
                    delay
                }
                ErrorClass::Transient => {
                    error.log_warn();
                    info!(
                        "Transient failure on {}, retrying in {:?}",
                        operation_name, self.config.transient_delay
                    );
                    self.transient_retries.fetch_add(1, Ordering::Relaxed);
                    self.config.transient_delay
                }
                ErrorClass::NotFound => match on_not_found.take() {
                    Some(already_applied) => {
                        info!("{} found nothing to act on; treating as done", operation_name);
                        self.already_gone.fetch_add(1, Ordering::Relaxed);
                        return Ok(already_applied);
                    }
                    None => {
                        error!("Operation {} failed: {}", operation_name, error);
                        return Err(error);
                    }
                },
                class @ (ErrorClass::FatalAuth | ErrorClass::FatalUnclassified) => {
                    error!(
                        "Operation {} failed ({:?}), not retrying: {}",
                        operation_name, class, error
                    );
                    return Err(error);
                }
            };

            self.total_retries.fetch_add(1, Ordering::Relaxed);
            self.total_delay_ms.fetch_add(
                u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                Ordering::Relaxed,
            );
            attempt += 1;
            sleep(delay).await;
        }
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        RetryMetrics {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
            already_gone: self.already_gone.load(Ordering::Relaxed),
            total_delay: Duration::from_millis(self.total_delay_ms.load(Ordering::Relaxed)),
        }
    }
}
