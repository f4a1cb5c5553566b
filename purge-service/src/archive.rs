//! Reads pre-fetched post history from local files.
//!
//! Two layouts are understood:
//!
//! * a directory, where every `*.json` / `*.js` file (in file-name order) is
//!   one batch;
//! * a single file, whose posts are sorted newest first and split into
//!   batches of the page size.
//!
//! A file is either a plain JSON array of statuses or a data-export
//! `tweets.js`, i.e. `window.YTD.tweets.part0 = [ { "tweet": { ... } } ]`.
//! Exports do not say whether the account favorited its own posts, so every
//! archive post leaves that flag unresolved.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use twitter_client::model::StatusRecord;
use whitewall_core::{ArchiveError, CoreError, Post};

#[derive(Deserialize)]
#[serde(untagged)]
enum ArchiveEntry {
    Wrapped { tweet: StatusRecord },
    Bare(StatusRecord),
}

impl ArchiveEntry {
    fn into_record(self) -> StatusRecord {
        match self {
            ArchiveEntry::Wrapped { tweet } => tweet,
            ArchiveEntry::Bare(record) => record,
        }
    }
}

/// Lists the archive's batches in the order they should be walked.
pub async fn list_batches(path: &Path, page_size: usize) -> Result<Vec<Vec<Post>>, CoreError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CoreError::Archive(ArchiveError::NotFound {
            path: path.display().to_string(),
        }),
        _ => CoreError::Io(e),
    })?;

    let batches = if metadata.is_dir() {
        let mut batches = Vec::new();
        for file in batch_files(path).await? {
            batches.push(read_posts(&file).await?);
        }
        batches
    } else {
        let mut posts = read_posts(path).await?;
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
            .chunks(page_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    };

    info!(
        "Loaded {} archive batches ({} posts) from {}",
        batches.len(),
        batches.iter().map(Vec::len).sum::<usize>(),
        path.display()
    );
    Ok(batches)
}

async fn batch_files(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_batch = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "json" || ext == "js");
        if is_batch && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    debug!("Found {} batch files in {}", files.len(), dir.display());
    Ok(files)
}

async fn read_posts(path: &Path) -> Result<Vec<Post>, CoreError> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(parse_posts(&contents, &path.display().to_string())?)
}

/// Parses one archive file. `origin` only labels errors.
pub fn parse_posts(contents: &str, origin: &str) -> Result<Vec<Post>, ArchiveError> {
    let entries: Vec<ArchiveEntry> =
        serde_json::from_str(strip_assignment(contents)).map_err(|e| {
            ArchiveError::InvalidFormat {
                path: origin.to_string(),
                details: e.to_string(),
            }
        })?;

    entries
        .into_iter()
        .map(|entry| {
            let record = entry.into_record();
            let id = record.id_str.clone();
            record
                .into_post()
                .map(|post| Post {
                    favorited_by_self: None,
                    ..post
                })
                .map_err(|e| ArchiveError::InvalidPost {
                    path: origin.to_string(),
                    post_id: id,
                    details: e.to_string(),
                })
        })
        .collect()
}

/// Drops a leading `window.YTD.tweets.part0 =` and any trailing `;`.
fn strip_assignment(contents: &str) -> &str {
    let trimmed = contents.trim();
    let body = if trimmed.starts_with('[') {
        trimmed
    } else {
        match trimmed.find('=') {
            Some(index) => trimmed[index + 1..].trim_start(),
            None => trimmed,
        }
    };
    body.trim_end_matches(';').trim_end()
}
