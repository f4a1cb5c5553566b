use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

/// One item of the account's history, as delivered by a post source.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub retweeted_by_self: bool,
    /// `None` when the source cannot say whether the account favorited the post.
    pub favorited_by_self: Option<bool>,
    pub in_reply_to_id: Option<String>,
    pub hashtags: BTreeSet<String>,
}

impl Post {
    /// Returns a copy of this post with the self-favorite flag resolved.
    pub fn with_own_favorite(&self, favorited: bool) -> Self {
        Self {
            favorited_by_self: Some(favorited),
            ..self.clone()
        }
    }

    pub fn is_reply(&self) -> bool {
        self.in_reply_to_id.is_some()
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

/// Id of the oldest post examined so far in the current walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor(Option<String>);

impl Cursor {
    pub fn new(start: Option<String>) -> Self {
        Self(start)
    }

    pub fn advance(&mut self, id: &str) {
        self.0 = Some(id.to_string());
    }

    pub fn reset(&mut self) {
        self.0 = None;
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// True when `id` is the post the cursor already points at.
    pub fn is_boundary(&self, id: &str) -> bool {
        self.0.as_deref() == Some(id)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "<newest>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepReason {
    TooNew { age_days: i64 },
    Reply,
    Retweeted { count: u64 },
    Favorited { count: u64 },
    Tagged { tag: String },
    SelfFavorited,
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeepReason::TooNew { age_days } => write!(f, "too new ({age_days} days old)"),
            KeepReason::Reply => write!(f, "is a reply"),
            KeepReason::Retweeted { count } => {
                write!(f, "sufficiently retweeted ({count} times)")
            }
            KeepReason::Favorited { count } => {
                write!(f, "sufficiently favorited ({count} times)")
            }
            KeepReason::Tagged { tag } => write!(f, "tagged #{tag}"),
            KeepReason::SelfFavorited => write!(f, "favorited by self"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionDecision {
    Keep(KeepReason),
    Delete,
}

impl RetentionDecision {
    pub fn is_keep(&self) -> bool {
        matches!(self, RetentionDecision::Keep(_))
    }
}

/// The authenticated account, as reported by the credential check.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub screen_name: String,
}
