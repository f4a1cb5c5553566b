//! The purge loop.
//!
//! One post at a time: pull a batch, move the cursor onto each post, decide,
//! delete if needed, repeat until the source runs dry. Then either stop or
//! sleep and walk the timeline again from the newest post.

use crate::source::{PostSource, SourceBatch};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};
use twitter_client::{DeleteOutcome, RetryController, TimelineApi};
use whitewall_core::{Config, CoreError, Cursor, KeepReason, Post, RetentionDecision, RetentionPolicy};

/// Counters for a whole run, across walks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub walks: u64,
    pub examined: u64,
    pub kept: u64,
    pub deleted: u64,
    pub already_gone: u64,
    pub would_delete: u64,
    pub boundary_repeats: u64,
    pub favorite_lookups: u64,
}

pub struct PurgeEngine<A> {
    api: Arc<A>,
    source: PostSource<A>,
    policy: RetentionPolicy,
    retry: Arc<RetryController>,
    idle: Duration,
    dry_run: bool,
    cursor: Cursor,
}

impl<A: TimelineApi> PurgeEngine<A> {
    pub fn new(
        api: Arc<A>,
        source: PostSource<A>,
        retry: Arc<RetryController>,
        config: &Config,
    ) -> Self {
        Self {
            api,
            source,
            policy: RetentionPolicy::new(config.retention.clone()),
            retry,
            idle: config.run.idle(),
            dry_run: config.run.dry_run,
            cursor: Cursor::new(config.run.start_cursor.clone()),
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn source(&self) -> &PostSource<A> {
        &self.source
    }

    /// Runs until the history is exhausted with no idle time configured, or
    /// until a remote failure is classified fatal. With idle time set and a
    /// live source this only returns on error.
    pub async fn run(&mut self) -> Result<PurgeReport, CoreError> {
        let mut report = PurgeReport::default();

        info!(
            "Starting purge from {} source at cursor {}{}",
            self.source.origin(),
            self.cursor,
            if self.dry_run { " (DRY RUN)" } else { "" }
        );

        loop {
            report.walks += 1;
            self.walk(Utc::now(), &mut report).await?;

            if self.idle.is_zero() {
                info!("No more posts, quitting");
                return Ok(report);
            }
            if !self.source.restart() {
                info!(
                    "No more posts; the {} source cannot be walked again, quitting",
                    self.source.origin()
                );
                return Ok(report);
            }

            info!(
                "No more posts, running again in {} seconds..",
                self.idle.as_secs()
            );
            sleep(self.idle).await;
            self.cursor.reset();
        }
    }

    async fn walk(&mut self, now: DateTime<Utc>, report: &mut PurgeReport) -> Result<(), CoreError> {
        loop {
            let batch = match self.source.next_batch(&self.cursor).await? {
                SourceBatch::Posts(posts) => posts,
                SourceBatch::Exhausted => return Ok(()),
            };

            for post in batch {
                if self.cursor.is_boundary(&post.id) {
                    debug!("Skipping repeated boundary post {}", post.id);
                    report.boundary_repeats += 1;
                    continue;
                }
                // advance first: a crash after this point never revisits the post
                self.cursor.advance(&post.id);
                report.examined += 1;
                self.process(post, now, report).await?;
            }
        }
    }

    async fn process(
        &self,
        post: Post,
        now: DateTime<Utc>,
        report: &mut PurgeReport,
    ) -> Result<(), CoreError> {
        let post = if self.policy.needs_favorite_lookup(&post, now) {
            report.favorite_lookups += 1;
            let favorited = self
                .retry
                .execute("favorite_lookup", || self.api.is_own_favorite(&post.id))
                .await?;
            post.with_own_favorite(favorited)
        } else {
            post
        };

        match self.policy.evaluate(&post, now) {
            RetentionDecision::Keep(reason) => {
                log_keep(&post, &reason);
                report.kept += 1;
            }
            RetentionDecision::Delete if self.dry_run => {
                info!(post_id = %post.id, "Would delete post (dry run)");
                report.would_delete += 1;
            }
            RetentionDecision::Delete => {
                info!(post_id = %post.id, "Deleting {} ..", post.id);
                let operation = format!("delete {}", post.id);
                match self
                    .retry
                    .execute_delete(&operation, || self.api.delete_post(&post.id))
                    .await?
                {
                    DeleteOutcome::Deleted => {
                        info!(post_id = %post.id, "Deleted");
                        report.deleted += 1;
                    }
                    DeleteOutcome::AlreadyGone => {
                        info!(post_id = %post.id, "Already deleted");
                        report.already_gone += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

fn log_keep(post: &Post, reason: &KeepReason) {
    match reason {
        KeepReason::TooNew { age_days } => {
            info!(post_id = %post.id, "Keeping post {} days old", age_days)
        }
        KeepReason::Retweeted { count } => {
            info!(post_id = %post.id, "Keeping post retweeted {} times", count)
        }
        KeepReason::Favorited { count } => {
            info!(post_id = %post.id, "Keeping post favorited {} times", count)
        }
        KeepReason::Tagged { tag } => info!(post_id = %post.id, "Keeping post tagged #{}", tag),
        KeepReason::Reply => info!(post_id = %post.id, "Keeping reply"),
        KeepReason::SelfFavorited => info!(post_id = %post.id, "Keeping post favorited by self"),
    }
}
