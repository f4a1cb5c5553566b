pub mod api;
pub mod model;
pub mod retry;


pub use api::{TimelineApi, TwitterApiClient};
pub use retry::{
    classify, rate_limit_delay, DeleteOutcome, ErrorClass, RetryConfig, RetryController,
    RetryMetrics,
};
