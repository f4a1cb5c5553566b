use crate::model::{AccountRecord, ErrorBody, StatusRecord};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use oauth2::AccessToken;
use reqwest::{Client, Method, Response, StatusCode};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, error, warn};
use url::Url;
use whitewall_core::{Account, ApiConfig, CoreError, Credentials, Post, TwitterApiError};

const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Remote operations the purge pipeline needs from the timeline API.
///
/// Implementations report raw outcomes; classifying failures is left to
/// [`crate::RetryController`].
#[async_trait]
pub trait TimelineApi: Send + Sync {
    async fn verify_credentials(&self) -> Result<Account, CoreError>;

    /// Up to `count` of the account's posts, newest first, no newer than
    /// `max_id` (inclusive) when given.
    async fn fetch_page(&self, max_id: Option<&str>, count: u32) -> Result<Vec<Post>, CoreError>;

    async fn delete_post(&self, id: &str) -> Result<(), CoreError>;

    /// Whether the authenticated account has favorited post `id`.
    async fn is_own_favorite(&self, id: &str) -> Result<bool, CoreError>;
}

#[derive(Debug)]
pub struct TwitterApiClient {
    http_client: Client,
    base_url: Url,
    access_token: AccessToken,
    user_id: Option<String>,
    include_retweets: bool,
    // epoch seconds of the last reported reset, 0 when none seen yet
    rate_limit_reset: AtomicI64,
}

impl TwitterApiClient {
    pub fn new(api: &ApiConfig, credentials: &Credentials) -> Result<Self, CoreError> {
        let base_url = api.base_url()?;
        let access_token = AccessToken::new(credentials.access_token()?.to_string());

        let http_client = Client::builder()
            .user_agent(&api.user_agent)
            .timeout(api.timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            access_token,
            user_id: credentials.user_id.clone(),
            include_retweets: false,
            rate_limit_reset: AtomicI64::new(0),
        })
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_retweets(mut self, include_retweets: bool) -> Self {
        self.include_retweets = include_retweets;
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Reset time of the current rate-limit window, as last reported by the API.
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self.rate_limit_reset.load(Ordering::Relaxed) {
            0 => None,
            secs => Utc.timestamp_opt(secs, 0).single(),
        }
    }

    /// Remembers the reset time carried by `response`, if any, and returns it.
    fn record_rate_limit_reset(&self, response: &Response) -> Option<DateTime<Utc>> {
        let secs = response
            .headers()
            .get(RATE_LIMIT_RESET_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())?;

        self.rate_limit_reset.store(secs, Ordering::Relaxed);
        Utc.timestamp_opt(secs, 0).single()
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = self.base_url.join(endpoint).map_err(|e| CoreError::Internal {
            message: format!("Invalid endpoint {endpoint}: {e}"),
        })?;

        let mut request_builder = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(self.access_token.secret());

        if !query_params.is_empty() {
            request_builder = request_builder.query(query_params);
        }

        debug!("Making Twitter API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::TwitterApi(TwitterApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let reset_at = self.record_rate_limit_reset(&response);

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        warn!("Request failed with status: {} for {}", status, endpoint);
        Err(CoreError::TwitterApi(
            Self::status_error(status, endpoint, reset_at, response).await,
        ))
    }

    /// `reset_at` comes from the failing response only; an earlier window's
    /// reset says nothing about this one.
    async fn status_error(
        status: StatusCode,
        endpoint: &str,
        reset_at: Option<DateTime<Utc>>,
        response: Response,
    ) -> TwitterApiError {
        match status.as_u16() {
            420 | 429 => return TwitterApiError::RateLimitExceeded { reset_at },
            404 => {
                return TwitterApiError::NotFound {
                    resource: endpoint.to_string(),
                }
            }
            code @ (500 | 502 | 503 | 504) => {
                return TwitterApiError::ServerError { status_code: code }
            }
            _ => {}
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let first = body.first();

        match status.as_u16() {
            401 => match first {
                Some(entry) => TwitterApiError::AuthenticationFailed {
                    reason: entry.message.clone(),
                },
                None => TwitterApiError::InvalidToken,
            },
            403 if first.is_none() => TwitterApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            code => TwitterApiError::Rejected {
                status_code: code,
                code: first.and_then(|entry| entry.code),
                message: first
                    .map(|entry| entry.message.clone())
                    .unwrap_or_else(|| status.to_string()),
            },
        }
    }

    async fn parse_statuses(response: Response, what: &str) -> Result<Vec<Post>, CoreError> {
        let records: Vec<StatusRecord> = response.json().await.map_err(|e| {
            error!("Failed to parse {}: {}", what, e);
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("Failed to parse {what}"),
            })
        })?;

        records
            .into_iter()
            .map(|record| {
                let id = record.id_str.clone();
                record.into_post().map_err(|e| {
                    CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                        details: format!("Bad created_at on status {id}: {e}"),
                    })
                })
            })
            .collect()
    }
}

#[async_trait]
impl TimelineApi for TwitterApiClient {
    async fn verify_credentials(&self) -> Result<Account, CoreError> {
        let response = self
            .make_request(
                Method::GET,
                "account/verify_credentials.json",
                &[("skip_status", "true".to_string())],
            )
            .await?;

        let account: AccountRecord = response.json().await.map_err(|e| {
            error!("Failed to parse account data: {}", e);
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: "Failed to parse account data".to_string(),
            })
        })?;

        debug!(
            "Credentials belong to @{}, #{}",
            account.screen_name, account.id_str
        );
        Ok(account.into())
    }

    async fn fetch_page(&self, max_id: Option<&str>, count: u32) -> Result<Vec<Post>, CoreError> {
        let mut params = vec![
            ("count", count.to_string()),
            ("trim_user", "true".to_string()),
            ("include_rts", self.include_retweets.to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        if let Some(user_id) = &self.user_id {
            params.push(("user_id", user_id.clone()));
        }
        if let Some(max_id) = max_id {
            params.push(("max_id", max_id.to_string()));
        }

        let response = self
            .make_request(Method::GET, "statuses/user_timeline.json", &params)
            .await?;
        let posts = Self::parse_statuses(response, "timeline page").await?;

        debug!(
            "Retrieved {} posts (max_id: {})",
            posts.len(),
            max_id.unwrap_or("none")
        );
        Ok(posts)
    }

    async fn delete_post(&self, id: &str) -> Result<(), CoreError> {
        let endpoint = format!("statuses/destroy/{id}.json");
        let response = self
            .make_request(Method::POST, &endpoint, &[("trim_user", "true".to_string())])
            .await?;

        let deleted: StatusRecord = response.json().await.map_err(|e| {
            error!("Failed to parse deleted status: {}", e);
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("Failed to parse response deleting {id}"),
            })
        })?;

        if deleted.id_str != id {
            return Err(CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("Asked to delete {id}, API reported {}", deleted.id_str),
            }));
        }
        Ok(())
    }

    async fn is_own_favorite(&self, id: &str) -> Result<bool, CoreError> {
        let mut params = vec![("count", "1".to_string()), ("max_id", id.to_string())];
        if let Some(user_id) = &self.user_id {
            params.push(("user_id", user_id.clone()));
        }

        let response = self
            .make_request(Method::GET, "favorites/list.json", &params)
            .await?;
        let favorites = Self::parse_statuses(response, "favorites").await?;

        Ok(favorites.first().is_some_and(|post| post.id == id))
    }
}
