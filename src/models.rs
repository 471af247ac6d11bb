use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::times;

/// Post as returned by the listing endpoint, validated at the collector
/// boundary. Timestamps are still raw epoch seconds here.
#[derive(Debug, Clone)]
pub struct RawPost {
    pub id: String,
    pub title: String,
    pub subreddit: String,
    pub selftext: Option<String>,
    pub score: i64,
    pub author: Option<String>,
    pub num_comments: i64,
    pub url: String,
    pub created_utc: i64,
}

#[derive(Debug, Clone)]
pub struct RawComment {
    pub id: String,
    pub subreddit: String,
    pub body: String,
    pub score: i64,
    pub author: Option<String>,
    /// Fullname of the parent: `t3_<post>` for top-level comments,
    /// `t1_<comment>` for replies.
    pub parent_id: String,
    pub created_utc: i64,
}

/// Persisted post shape, one per spreadsheet row.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRow {
    pub id: String,
    pub title: String,
    pub subreddit: String,
    pub selftext: Option<String>,
    pub score: i64,
    pub author: Option<String>,
    pub num_comments: i64,
    pub url: String,
    pub created_utc: DateTime<Utc>,
    pub created_central: DateTime<Tz>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub id: String,
    pub subreddit: String,
    pub body: String,
    pub score: i64,
    pub author: Option<String>,
    pub parent_id: String,
    pub created_utc: DateTime<Utc>,
    pub created_central: DateTime<Tz>,
}

impl PostRow {
    pub fn from_raw(raw: RawPost) -> Result<Self> {
        let (created_utc, created_central) = times::normalize(raw.created_utc)?;
        Ok(Self {
            id: raw.id,
            title: raw.title,
            subreddit: raw.subreddit,
            selftext: raw.selftext,
            score: raw.score,
            author: raw.author,
            num_comments: raw.num_comments,
            url: raw.url,
            created_utc,
            created_central,
        })
    }
}

impl CommentRow {
    pub fn from_raw(raw: RawComment) -> Result<Self> {
        let (created_utc, created_central) = times::normalize(raw.created_utc)?;
        Ok(Self {
            id: raw.id,
            subreddit: raw.subreddit,
            body: raw.body,
            score: raw.score,
            author: raw.author,
            parent_id: raw.parent_id,
            created_utc,
            created_central,
        })
    }
}

/// What the merge engine needs from a row: a stable identity and the
/// creation instant used as the survivor tie-break.
pub trait Record {
    fn id(&self) -> &str;
    fn created_utc(&self) -> DateTime<Utc>;
}

impl Record for PostRow {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }
}

impl Record for CommentRow {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }
}
