//! Keep-or-delete decision for a single post.
//!
//! Rules are consulted in order and the first one that wants to keep the post
//! wins. Every rule is independent, so the order only changes which reason is
//! reported. The self-favorite rule is last because settling it may need a
//! remote lookup when the source did not say whether the account favorited
//! the post; [`RetentionPolicy::needs_favorite_lookup`] tells the caller when
//! that lookup is worth doing.

use crate::config::RetentionConfig;
use crate::types::{KeepReason, Post, RetentionDecision};
use chrono::{DateTime, Utc};

type Rule = fn(&Post, &RetentionConfig, DateTime<Utc>) -> Option<KeepReason>;

const RULES: [Rule; 6] = [
    keep_if_recent,
    keep_if_reply,
    keep_if_retweeted,
    keep_if_favorited,
    keep_if_tagged,
    keep_if_own_favorite,
];

/// Rules that never need anything beyond the post itself.
const LOCAL_RULES: usize = 5;

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    config: RetentionConfig,
}

impl RetentionPolicy {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Decides the fate of `post`. An unresolved self-favorite flag counts as
    /// "not favorited".
    pub fn evaluate(&self, post: &Post, now: DateTime<Utc>) -> RetentionDecision {
        evaluate_rules(&RULES, post, &self.config, now)
    }

    /// True when only the account's own favorite status can still save the
    /// post and the source left that status unknown.
    pub fn needs_favorite_lookup(&self, post: &Post, now: DateTime<Utc>) -> bool {
        self.config.keep_own_favorites
            && post.favorited_by_self.is_none()
            // nobody favorited it, so the account did not either
            && post.favorite_count > 0
            && !evaluate_rules(&RULES[..LOCAL_RULES], post, &self.config, now).is_keep()
    }
}

fn evaluate_rules(
    rules: &[Rule],
    post: &Post,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> RetentionDecision {
    rules
        .iter()
        .find_map(|rule| rule(post, config, now))
        .map(RetentionDecision::Keep)
        .unwrap_or(RetentionDecision::Delete)
}

fn keep_if_recent(post: &Post, config: &RetentionConfig, now: DateTime<Utc>) -> Option<KeepReason> {
    let age = post.age_seconds(now);
    // future-dated posts have a negative age and are kept
    if age <= i64::try_from(config.max_age_seconds).unwrap_or(i64::MAX) {
        Some(KeepReason::TooNew {
            age_days: age.max(0) / 86_400,
        })
    } else {
        None
    }
}

fn keep_if_reply(post: &Post, config: &RetentionConfig, _now: DateTime<Utc>) -> Option<KeepReason> {
    (config.keep_replies && post.is_reply()).then_some(KeepReason::Reply)
}

fn keep_if_retweeted(
    post: &Post,
    config: &RetentionConfig,
    _now: DateTime<Utc>,
) -> Option<KeepReason> {
    (config.min_retweets > 0 && post.retweeted_by_self && post.retweet_count >= config.min_retweets)
        .then_some(KeepReason::Retweeted {
            count: post.retweet_count,
        })
}

fn keep_if_favorited(
    post: &Post,
    config: &RetentionConfig,
    _now: DateTime<Utc>,
) -> Option<KeepReason> {
    (config.min_favorites > 0
        && post.favorited_by_self == Some(true)
        && post.favorite_count >= config.min_favorites)
        .then_some(KeepReason::Favorited {
            count: post.favorite_count,
        })
}

fn keep_if_tagged(post: &Post, config: &RetentionConfig, _now: DateTime<Utc>) -> Option<KeepReason> {
    post.hashtags
        .intersection(&config.keep_hashtags)
        .next()
        .map(|tag| KeepReason::Tagged { tag: tag.clone() })
}

fn keep_if_own_favorite(
    post: &Post,
    config: &RetentionConfig,
    _now: DateTime<Utc>,
) -> Option<KeepReason> {
    (config.keep_own_favorites && post.favorited_by_self == Some(true))
        .then_some(KeepReason::SelfFavorited)
}
