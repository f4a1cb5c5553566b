#[cfg(test)]
mod tests {
    use crate::{ArchiveSource, PostSource, PurgeEngine, RemoteSource};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::{BTreeSet, HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};
    use twitter_client::{RetryConfig, RetryController, TimelineApi};
    use whitewall_core::{Account, Config, CoreError, ErrorExt, Post, TwitterApiError};

    /// In-memory timeline with the inclusive `max_id` paging of the real API.
    #[derive(Default)]
    struct MockTimeline {
        posts: Mutex<Vec<Post>>,
        /// Deleted posts keep showing up in pages, as with a lagging replica.
        lagging_deletes: bool,
        own_favorites: HashSet<String>,
        fetch_failures: Mutex<HashMap<usize, TwitterApiError>>,
        delete_failures: Mutex<HashMap<String, TwitterApiError>>,
        deleted: Mutex<HashSet<String>>,
        fetch_calls: Mutex<Vec<(Option<String>, Instant)>>,
        delete_calls: Mutex<Vec<String>>,
        lookup_calls: Mutex<Vec<String>>,
    }

    impl MockTimeline {
        fn with_posts(mut posts: Vec<Post>) -> Self {
            posts.sort_by_key(|post| std::cmp::Reverse(id_number(&post.id)));
            Self {
                posts: Mutex::new(posts),
                ..Default::default()
            }
        }

        fn fail_fetch(self, call: usize, error: TwitterApiError) -> Self {
            self.fetch_failures.lock().unwrap().insert(call, error);
            self
        }

        fn fail_delete(self, id: &str, error: TwitterApiError) -> Self {
            self.delete_failures
                .lock()
                .unwrap()
                .insert(id.to_string(), error);
            self
        }

        fn fetched_max_ids(&self) -> Vec<Option<String>> {
            self.fetch_calls
                .lock()
                .unwrap()
                .iter()
                .map(|(max_id, _)| max_id.clone())
                .collect()
        }

        fn delete_calls(&self) -> Vec<String> {
            self.delete_calls.lock().unwrap().clone()
        }

        fn lookup_calls(&self) -> Vec<String> {
            self.lookup_calls.lock().unwrap().clone()
        }
    }

    fn id_number(id: &str) -> u64 {
        id.parse().unwrap()
    }

    #[async_trait]
    impl TimelineApi for MockTimeline {
        async fn verify_credentials(&self) -> Result<Account, CoreError> {
            Ok(Account {
                id: "42".to_string(),
                screen_name: "whitewaller".to_string(),
            })
        }

        async fn fetch_page(
            &self,
            max_id: Option<&str>,
            count: u32,
        ) -> Result<Vec<Post>, CoreError> {
            let call = {
                let mut calls = self.fetch_calls.lock().unwrap();
                calls.push((max_id.map(str::to_string), Instant::now()));
                calls.len() - 1
            };
            if let Some(error) = self.fetch_failures.lock().unwrap().remove(&call) {
                return Err(CoreError::TwitterApi(error));
            }

            let ceiling = max_id.map(id_number).unwrap_or(u64::MAX);
            Ok(self
                .posts
                .lock()
                .unwrap()
                .iter()
                .filter(|post| id_number(&post.id) <= ceiling)
                .take(count as usize)
                .cloned()
                .collect())
        }

        async fn delete_post(&self, id: &str) -> Result<(), CoreError> {
            self.delete_calls.lock().unwrap().push(id.to_string());
            if let Some(error) = self.delete_failures.lock().unwrap().remove(id) {
                return Err(CoreError::TwitterApi(error));
            }

            let mut deleted = self.deleted.lock().unwrap();
            let mut posts = self.posts.lock().unwrap();
            if deleted.contains(id) || !posts.iter().any(|post| post.id == id) {
                return Err(CoreError::TwitterApi(TwitterApiError::NotFound {
                    resource: format!("statuses/destroy/{id}.json"),
                }));
            }
            deleted.insert(id.to_string());
            if !self.lagging_deletes {
                posts.retain(|post| post.id != id);
            }
            Ok(())
        }

        async fn is_own_favorite(&self, id: &str) -> Result<bool, CoreError> {
            self.lookup_calls.lock().unwrap().push(id.to_string());
            Ok(self.own_favorites.contains(id))
        }
    }

    fn post(id: u64, age_days: i64) -> Post {
        Post {
            id: id.to_string(),
            created_at: Utc::now() - ChronoDuration::days(age_days),
            text: format!("post {id}"),
            retweet_count: 0,
            favorite_count: 0,
            retweeted_by_self: false,
            favorited_by_self: Some(false),
            in_reply_to_id: None,
            hashtags: BTreeSet::new(),
        }
    }

    fn tagged(mut post: Post, tag: &str) -> Post {
        post.hashtags.insert(tag.to_string());
        post
    }

    fn test_config(page_size: u32) -> Config {
        let mut config = Config::default();
        config.run.page_size = page_size;
        config
    }

    fn retry() -> Arc<RetryController> {
        Arc::new(RetryController::new(RetryConfig::default()))
    }

    fn remote_engine(api: &Arc<MockTimeline>, config: &Config) -> PurgeEngine<MockTimeline> {
        let retry = retry();
        let source = PostSource::Remote(RemoteSource::new(
            api.clone(),
            retry.clone(),
            config.run.page_size,
        ));
        PurgeEngine::new(api.clone(), source, retry, config)
    }

    fn archive_engine(
        api: &Arc<MockTimeline>,
        batches: Vec<Vec<Post>>,
        config: &Config,
    ) -> PurgeEngine<MockTimeline> {
        let source = PostSource::Archive(ArchiveSource::new(batches));
        PurgeEngine::new(api.clone(), source, retry(), config)
    }

    #[tokio::test]
    async fn test_old_untagged_post_is_deleted() {
        let api = Arc::new(MockTimeline::with_posts(vec![post(101, 40), post(102, 1)]));
        let mut engine = remote_engine(&api, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert_eq!(api.delete_calls(), vec!["101"]);
        assert_eq!(report.examined, 2);
        assert_eq!(report.kept, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.walks, 1);
    }

    #[tokio::test]
    async fn test_bookmarked_post_is_kept() {
        let api = Arc::new(MockTimeline::with_posts(vec![tagged(
            post(101, 40),
            "bookmarked",
        )]));
        let mut engine = remote_engine(&api, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert!(api.delete_calls().is_empty());
        assert_eq!(report.kept, 1);
    }

    #[tokio::test]
    async fn test_pagination_walks_every_post_once() {
        let posts: Vec<Post> = (101..=107)
            .map(|id| {
                if id % 2 == 0 {
                    tagged(post(id, 60), "bookmarked")
                } else {
                    post(id, 60)
                }
            })
            .collect();
        let api = Arc::new(MockTimeline::with_posts(posts));
        let mut engine = remote_engine(&api, &test_config(3));

        let report = assert_ok!(engine.run().await);

        assert_eq!(report.examined, 7);
        assert_eq!(report.kept, 3);
        assert_eq!(report.deleted, 4);
        assert_eq!(api.delete_calls(), vec!["107", "105", "103", "101"]);
        assert_eq!(
            api.fetched_max_ids(),
            vec![
                None,
                Some("105".to_string()),
                Some("102".to_string()),
                Some("101".to_string()),
            ]
        );
        assert_eq!(engine.cursor().as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn test_repeated_boundary_post_is_not_deleted_twice() {
        let mut timeline = MockTimeline::with_posts((101..=106).map(|id| post(id, 90)).collect());
        timeline.lagging_deletes = true;
        let api = Arc::new(timeline);
        let mut engine = remote_engine(&api, &test_config(2));

        let report = assert_ok!(engine.run().await);

        let deletes = api.delete_calls();
        let unique: HashSet<&String> = deletes.iter().collect();
        assert_eq!(deletes.len(), 6);
        assert_eq!(unique.len(), 6);
        assert_eq!(report.examined, 6);
        assert_eq!(report.already_gone, 0);
    }

    #[tokio::test]
    async fn test_engine_skips_boundary_repeated_by_source() {
        let api = Arc::new(MockTimeline::with_posts(vec![
            post(101, 50),
            post(102, 50),
            post(103, 50),
        ]));
        let batches = vec![
            vec![post(103, 50), post(102, 50)],
            vec![post(102, 50), post(101, 50)],
        ];
        let mut engine = archive_engine(&api, batches, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert_eq!(report.examined, 3);
        assert_eq!(report.boundary_repeats, 1);
        assert_eq!(api.delete_calls(), vec!["103", "102", "101"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_fetch_is_retried_after_reset() {
        let reset_at = Utc::now() + ChronoDuration::seconds(90);
        let timeline = MockTimeline::with_posts((101..=104).map(|id| post(id, 1)).collect())
            .fail_fetch(
                1,
                TwitterApiError::RateLimitExceeded {
                    reset_at: Some(reset_at),
                },
            );
        let api = Arc::new(timeline);
        let mut engine = remote_engine(&api, &test_config(2));

        let report = assert_ok!(engine.run().await);
        assert_eq!(report.examined, 4);

        let calls = api.fetch_calls.lock().unwrap().clone();
        // the failed request is repeated as-is, not replaced by a fresh page
        assert_eq!(calls[1].0, Some("103".to_string()));
        assert_eq!(calls[2].0, calls[1].0);
        assert!(calls[2].1 - calls[1].1 >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fetch_failure_is_retried() {
        let timeline = MockTimeline::with_posts(vec![post(101, 40)]).fail_fetch(
            0,
            TwitterApiError::ServerError { status_code: 503 },
        );
        let api = Arc::new(timeline);
        let mut engine = remote_engine(&api, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert_eq!(report.deleted, 1);
        let calls = api.fetch_calls.lock().unwrap().clone();
        assert!(calls[1].1 - calls[0].1 >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_archive_stops_at_empty_batch() {
        let api = Arc::new(MockTimeline::with_posts(
            (101..=103).map(|id| post(id, 40)).collect(),
        ));
        let batches = vec![vec![post(103, 40), post(102, 40), post(101, 40)], vec![]];
        let mut engine = archive_engine(&api, batches, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert_eq!(report.examined, 3);
        assert_eq!(report.deleted, 3);
        let archive = engine.source().as_archive().unwrap();
        assert_eq!(archive.batches_served(), 2);
        assert!(api.fetched_max_ids().is_empty());
    }

    #[tokio::test]
    async fn test_archive_ignores_batches_after_empty_one() {
        let api = Arc::new(MockTimeline::default());
        let batches = vec![vec![post(103, 1)], vec![], vec![post(101, 1)]];
        let mut engine = archive_engine(&api, batches, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert_eq!(report.examined, 1);
        let archive = engine.source().as_archive().unwrap();
        assert_eq!(archive.batches_served(), 2);
        assert_eq!(archive.batches_remaining(), 1);
    }

    #[tokio::test]
    async fn test_fatal_auth_failure_stops_the_run() {
        let timeline = MockTimeline::with_posts((101..=103).map(|id| post(id, 40)).collect())
            .fail_delete(
                "102",
                TwitterApiError::AuthenticationFailed {
                    reason: "Invalid or expired token.".to_string(),
                },
            );
        let api = Arc::new(timeline);
        let mut engine = remote_engine(&api, &test_config(200));

        let error = assert_err!(engine.run().await);

        assert!(error.is_auth_failure());
        assert_eq!(api.delete_calls(), vec!["103", "102"]);
        assert_eq!(api.fetched_max_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_unclassified_failure_stops_the_run() {
        let timeline = MockTimeline::with_posts(vec![post(101, 40)]).fail_fetch(
            0,
            TwitterApiError::Rejected {
                status_code: 400,
                code: Some(44),
                message: "count parameter is invalid.".to_string(),
            },
        );
        let api = Arc::new(timeline);
        let mut engine = remote_engine(&api, &test_config(200));

        let error = assert_err!(engine.run().await);
        assert_eq!(error.exit_code(), whitewall_core::EXIT_TWFAIL);
        assert!(api.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_post_on_delete_does_not_stop_the_run() {
        let timeline = MockTimeline::with_posts((101..=103).map(|id| post(id, 40)).collect())
            .fail_delete(
                "103",
                TwitterApiError::NotFound {
                    resource: "statuses/destroy/103.json".to_string(),
                },
            );
        let api = Arc::new(timeline);
        let mut engine = remote_engine(&api, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert_eq!(report.already_gone, 1);
        assert_eq!(report.deleted, 2);
        assert_eq!(api.delete_calls(), vec!["103", "102", "101"]);
    }

    #[tokio::test]
    async fn test_own_favorite_lookup_only_when_needed() {
        let mut timeline = MockTimeline::default();
        timeline.own_favorites.insert("103".to_string());
        let api = Arc::new(timeline);

        let unresolved = |id: u64, favorites: u64| {
            let mut post = post(id, 40);
            post.favorite_count = favorites;
            post.favorited_by_self = None;
            post
        };
        let batches = vec![vec![
            unresolved(104, 0),
            unresolved(103, 2),
            unresolved(102, 5),
            tagged(unresolved(101, 1), "bookmarked"),
        ]];
        let mut engine = archive_engine(&api, batches, &test_config(200));

        let report = assert_ok!(engine.run().await);

        assert_eq!(api.lookup_calls(), vec!["103", "102"]);
        assert_eq!(report.favorite_lookups, 2);
        assert_eq!(report.kept, 2);
        assert_eq!(api.delete_calls(), vec!["104", "102"]);
    }

    #[tokio::test]
    async fn test_dry_run_never_deletes() {
        let api = Arc::new(MockTimeline::with_posts(
            (101..=104).map(|id| post(id, 40)).collect(),
        ));
        let mut config = test_config(2);
        config.run.dry_run = true;
        let mut engine = remote_engine(&api, &config);

        let report = assert_ok!(engine.run().await);

        assert!(api.delete_calls().is_empty());
        assert_eq!(report.would_delete, 4);
        assert_eq!(report.examined, 4);
    }

    #[tokio::test]
    async fn test_start_cursor_resumes_below_it() {
        let api = Arc::new(MockTimeline::with_posts(
            (101..=106).map(|id| post(id, 40)).collect(),
        ));
        let mut config = test_config(200);
        config.run.start_cursor = Some("104".to_string());
        let mut engine = remote_engine(&api, &config);

        let report = assert_ok!(engine.run().await);

        assert_eq!(api.fetched_max_ids()[0], Some("104".to_string()));
        assert_eq!(api.delete_calls(), vec!["103", "102", "101"]);
        assert_eq!(report.examined, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_restarts_from_newest_post() {
        let api = Arc::new(MockTimeline::with_posts(vec![
            post(101, 40),
            tagged(post(102, 40), "bookmarked"),
        ]));
        let mut config = test_config(200);
        config.run.idle_seconds = 60;
        config.run.start_cursor = Some("500".to_string());
        let mut engine = remote_engine(&api, &config);

        let result = tokio::time::timeout(Duration::from_secs(90), engine.run()).await;
        assert!(result.is_err(), "an idling run only ends on error");

        let max_ids = api.fetched_max_ids();
        assert_eq!(max_ids[0], Some("500".to_string()));
        let restarts: Vec<usize> = max_ids
            .iter()
            .enumerate()
            .filter(|(_, max_id)| max_id.is_none())
            .map(|(index, _)| index)
            .collect();
        assert_eq!(restarts.len(), 1);

        let calls = api.fetch_calls.lock().unwrap().clone();
        assert!(calls[restarts[0]].1 - calls[0].1 >= Duration::from_secs(60));
        assert_eq!(api.delete_calls(), vec!["101"]);
    }

    #[tokio::test]
    async fn test_archive_with_idle_still_terminates() {
        let api = Arc::new(MockTimeline::default());
        let mut config = test_config(200);
        config.run.idle_seconds = 3600;
        let mut engine = archive_engine(&api, vec![vec![post(101, 1)]], &config);

        let report = assert_ok!(engine.run().await);
        assert_eq!(report.walks, 1);
        assert_eq!(report.kept, 1);
    }

    #[tokio::test]
    async fn test_source_selected_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tweets.json");
        std::fs::write(
            &file,
            r#"[{"id_str":"9","created_at":"Mon Jan 01 00:00:00 +0000 2018"}]"#,
        )
        .unwrap();

        let api = Arc::new(MockTimeline::default());
        let mut config = test_config(200);

        let source = assert_ok!(PostSource::from_config(api.clone(), retry(), &config.run).await);
        assert_eq!(source.origin(), "remote");

        config.run.archive_source = Some(file);
        let source = assert_ok!(PostSource::from_config(api, retry(), &config.run).await);
        assert_eq!(source.origin(), "archive");
        assert_eq!(source.as_archive().unwrap().batches_remaining(), 1);
    }
}
