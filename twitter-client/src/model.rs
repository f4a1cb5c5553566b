use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;
use whitewall_core::{Account, Post};

/// Timestamp layout used by the v1.1 API and by data exports.
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// A status as returned by the timeline endpoints and found in archive exports.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusRecord {
    pub id_str: String,
    pub created_at: String,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub retweet_count: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub favorite_count: u64,
    #[serde(default)]
    pub favorited: Option<bool>,
    #[serde(default)]
    pub retweeted: Option<bool>,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
    #[serde(default)]
    pub entities: Option<StatusEntities>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusEntities {
    #[serde(default)]
    pub hashtags: Vec<HashtagEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashtagEntity {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    pub id_str: String,
    pub screen_name: String,
}

/// Error payload: `{"errors":[{"code":89,"message":"Invalid or expired token."}]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEntry {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl ErrorBody {
    pub fn first(&self) -> Option<&ErrorEntry> {
        self.errors.first()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountRepr {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

/// Counts arrive as numbers from the API and as strings in exports; null or
/// garbage degrades to zero.
fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let count = match Option::<CountRepr>::deserialize(deserializer)? {
        None => 0,
        Some(CountRepr::Unsigned(n)) => n,
        Some(CountRepr::Signed(n)) => u64::try_from(n).unwrap_or(0),
        Some(CountRepr::Float(n)) if n.is_finite() && n > 0.0 => n as u64,
        Some(CountRepr::Float(_)) => 0,
        Some(CountRepr::Text(s)) => s.trim().parse().unwrap_or(0),
    };
    Ok(count)
}

pub fn parse_created_at(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|at| at.with_timezone(&Utc))
}

impl StatusRecord {
    /// Converts into a [`Post`], trusting the embedded `favorited` flag.
    pub fn into_post(self) -> Result<Post, chrono::ParseError> {
        let created_at = parse_created_at(&self.created_at)?;
        let hashtags: BTreeSet<String> = self
            .entities
            .map(|entities| entities.hashtags.into_iter().map(|tag| tag.text).collect())
            .unwrap_or_default();

        Ok(Post {
            id: self.id_str,
            created_at,
            text: self.full_text.or(self.text).unwrap_or_default(),
            retweet_count: self.retweet_count,
            favorite_count: self.favorite_count,
            retweeted_by_self: self.retweeted.unwrap_or(false),
            favorited_by_self: self.favorited,
            in_reply_to_id: self.in_reply_to_status_id_str.filter(|id| !id.is_empty()),
            hashtags,
        })
    }
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        Self {
            id: record.id_str,
            screen_name: record.screen_name,
        }
    }
}
