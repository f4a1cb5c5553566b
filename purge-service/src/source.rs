use crate::archive;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use twitter_client::{RetryController, TimelineApi};
use whitewall_core::{CoreError, Cursor, Post, RunConfig};

/// One pull from a post source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBatch {
    /// Posts strictly older than the cursor, newest first. Never empty.
    Posts(Vec<Post>),
    /// The history is used up for this walk.
    Exhausted,
}

/// Walks the live timeline backwards a page at a time.
#[derive(Debug)]
pub struct RemoteSource<A> {
    api: Arc<A>,
    retry: Arc<RetryController>,
    page_size: u32,
    exhausted: bool,
}

impl<A: TimelineApi> RemoteSource<A> {
    pub fn new(api: Arc<A>, retry: Arc<RetryController>, page_size: u32) -> Self {
        Self {
            api,
            retry,
            page_size,
            exhausted: false,
        }
    }

    pub async fn next_batch(&mut self, cursor: &Cursor) -> Result<SourceBatch, CoreError> {
        if self.exhausted {
            return Ok(SourceBatch::Exhausted);
        }

        let max_id = cursor.as_deref();
        let mut posts = self
            .retry
            .execute("fetch_page", || self.api.fetch_page(max_id, self.page_size))
            .await?;

        // max_id is inclusive, so the page normally starts with the cursor post
        if let Some(boundary) = max_id {
            match posts.first() {
                Some(first) if first.id == boundary => {
                    posts.remove(0);
                }
                first => {
                    // expected once the boundary post itself was deleted
                    debug!(
                        "Expecting first post to match cursor {}, got {}",
                        boundary,
                        first.map(|post| post.id.as_str()).unwrap_or("none")
                    );
                }
            }
        }

        if posts.is_empty() {
            debug!("Timeline exhausted below cursor {}", cursor);
            self.exhausted = true;
            return Ok(SourceBatch::Exhausted);
        }

        debug!("Fetched {} posts below cursor {}", posts.len(), cursor);
        Ok(SourceBatch::Posts(posts))
    }

    fn restart(&mut self) {
        self.exhausted = false;
    }
}

/// Serves pre-loaded batches, ignoring the cursor.
#[derive(Debug, Default)]
pub struct ArchiveSource {
    batches: VecDeque<Vec<Post>>,
    served: usize,
    exhausted: bool,
}

impl ArchiveSource {
    pub fn new(batches: Vec<Vec<Post>>) -> Self {
        Self {
            batches: batches.into(),
            served: 0,
            exhausted: false,
        }
    }

    pub async fn open(path: &std::path::Path, page_size: usize) -> Result<Self, CoreError> {
        Ok(Self::new(archive::list_batches(path, page_size).await?))
    }

    pub fn next_batch(&mut self) -> SourceBatch {
        if self.exhausted {
            return SourceBatch::Exhausted;
        }
        match self.batches.pop_front() {
            Some(batch) => {
                self.served += 1;
                if batch.is_empty() {
                    self.exhausted = true;
                    SourceBatch::Exhausted
                } else {
                    SourceBatch::Posts(batch)
                }
            }
            None => {
                self.exhausted = true;
                SourceBatch::Exhausted
            }
        }
    }

    /// Number of batches handed out so far, empty ones included.
    pub fn batches_served(&self) -> usize {
        self.served
    }

    pub fn batches_remaining(&self) -> usize {
        self.batches.len()
    }
}

/// Where posts come from, chosen once at startup.
#[derive(Debug)]
pub enum PostSource<A> {
    Remote(RemoteSource<A>),
    Archive(ArchiveSource),
}

impl<A: TimelineApi> PostSource<A> {
    /// Archive when `run.archive_source` is set, the live timeline otherwise.
    pub async fn from_config(
        api: Arc<A>,
        retry: Arc<RetryController>,
        run: &RunConfig,
    ) -> Result<Self, CoreError> {
        match &run.archive_source {
            Some(path) => {
                info!("Reading posts from archive {}", path.display());
                let source = ArchiveSource::open(path, run.page_size as usize).await?;
                Ok(PostSource::Archive(source))
            }
            None => {
                info!("Reading posts from the remote timeline");
                Ok(PostSource::Remote(RemoteSource::new(
                    api,
                    retry,
                    run.page_size,
                )))
            }
        }
    }

    pub async fn next_batch(&mut self, cursor: &Cursor) -> Result<SourceBatch, CoreError> {
        match self {
            PostSource::Remote(source) => source.next_batch(cursor).await,
            PostSource::Archive(source) => Ok(source.next_batch()),
        }
    }

    /// Prepares a fresh walk from the newest post. Returns false when the
    /// source cannot be walked again.
    pub fn restart(&mut self) -> bool {
        match self {
            PostSource::Remote(source) => {
                source.restart();
                true
            }
            PostSource::Archive(_) => false,
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            PostSource::Remote(_) => "remote",
            PostSource::Archive(_) => "archive",
        }
    }

    pub fn as_archive(&self) -> Option<&ArchiveSource> {
        match self {
            PostSource::Archive(source) => Some(source),
            PostSource::Remote(_) => None,
        }
    }
}
