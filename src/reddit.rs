use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::models::{RawComment, RawPost};
use crate::throttle::{gate, make_limiter, Cooldown, Limiter};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const PAGE_SIZE: usize = 100;
const MORE_BATCH: usize = 100;
const API_RPM: u32 = 60;
const ABSORB_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Everything the run needs from the remote platform.
#[async_trait]
pub trait Source {
    /// Top posts over the one-day lookback window, fully paginated.
    async fn top_posts_today(&self, subreddit: &str) -> Result<Vec<RawPost>, SourceError>;

    /// Every concrete comment on a post, deeply nested replies included.
    /// Placeholder "more" nodes are expanded before anything is returned.
    async fn comments(&self, post_id: &str) -> Result<Vec<RawComment>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct Token {
    value: String,
    expires_at: Instant,
}

pub struct RedditClient {
    http: Client,
    client_id: String,
    client_secret: String,
    ratelimit_budget: u64,
    limiter: Limiter,
    cooldown: Cooldown,
    token: Mutex<Option<Token>>,
}

impl RedditClient {
    pub async fn connect(settings: &Settings) -> Result<Self, SourceError> {
        let http = Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()?;
        let client = Self {
            http,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            ratelimit_budget: settings.rate_limit_secs,
            limiter: make_limiter(API_RPM),
            cooldown: Cooldown::default(),
            token: Mutex::new(None),
        };
        client.ensure_token().await?;
        Ok(client)
    }

    async fn ensure_token(&self) -> Result<String, SourceError> {
        let mut slot = self.token.lock().await;
        if let Some(tok) = slot.as_ref() {
            if tok.expires_at > Instant::now() + Duration::from_secs(60) {
                return Ok(tok.value.clone());
            }
        }
        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                url: TOKEN_URL.to_string(),
                status: resp.status(),
            });
        }
        let tok: TokenResponse = resp.json().await?;
        let value = tok.access_token.clone();
        *slot = Some(Token {
            value: tok.access_token,
            expires_at: Instant::now() + Duration::from_secs(tok.expires_in),
        });
        Ok(value)
    }

    /// GET an API path as JSON. Waits the server asks for are absorbed here
    /// while they fit the RATE_LIMIT budget; anything larger surfaces as
    /// `RateLimited` and aborts the whole run.
    async fn get_json(&self, path_and_query: &str) -> Result<Value, SourceError> {
        let url = format!("{API_BASE}{path_and_query}");
        let mut attempt = 0u32;
        loop {
            gate(&self.limiter, &self.cooldown).await;
            let token = self.ensure_token().await?;
            let resp = self.http.get(&url).bearer_auth(&token).send().await?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                attempt += 1;
                let wait = retry_after_secs(&resp).unwrap_or_else(|| self.ratelimit_budget.max(1));
                if wait > self.ratelimit_budget || attempt >= ABSORB_ATTEMPTS {
                    return Err(SourceError::RateLimited { retry_after_secs: wait });
                }
                eprintln!("[429] {url} → absorbing {wait}s (attempt {attempt}/{ABSORB_ATTEMPTS})");
                self.cooldown.set_secs(wait);
                continue;
            }
            if !resp.status().is_success() {
                return Err(SourceError::Status { url, status: resp.status() });
            }
            return Ok(resp.json().await?);
        }
    }

    /// A stub naming hidden children resolves through `morechildren`; a
    /// depth-limit marker (no children named) only resolves by re-listing
    /// the thread from its parent comment.
    async fn resolve_more(&self, post_id: &str, stub: MoreStub) -> Result<Vec<Node>, SourceError> {
        if stub.ids.is_empty() {
            return self.deep_thread(post_id, &stub.parent_id).await;
        }
        self.more_children(post_id, stub.ids).await
    }

    async fn deep_thread(&self, post_id: &str, parent_fullname: &str) -> Result<Vec<Node>, SourceError> {
        let parent = parent_fullname.strip_prefix("t1_").unwrap_or(parent_fullname);
        let v = self
            .get_json(&format!("/comments/{post_id}/_/{parent}?limit=500&raw_json=1"))
            .await?;
        let listing = v
            .get(1)
            .ok_or_else(|| SourceError::Malformed("deep thread payload without listing".into()))?;
        Ok(subtree_below(parse_forest(listing)?, parent))
    }

    async fn more_children(&self, post_id: &str, ids: Vec<String>) -> Result<Vec<Node>, SourceError> {
        let mut nodes = vec![];
        for chunk in ids.chunks(MORE_BATCH) {
            let path = format!(
                "/api/morechildren?api_type=json&raw_json=1&limit_children=false&link_id=t3_{}&children={}",
                post_id,
                chunk.join(",")
            );
            let v = self.get_json(&path).await?;
            let things = v
                .pointer("/json/data/things")
                .and_then(Value::as_array)
                .ok_or_else(|| SourceError::Malformed("morechildren without json.data.things".into()))?;
            for t in things {
                nodes.push(parse_node(t)?);
            }
        }
        Ok(nodes)
    }
}

#[async_trait]
impl Source for RedditClient {
    async fn top_posts_today(&self, subreddit: &str) -> Result<Vec<RawPost>, SourceError> {
        let mut out = vec![];
        let mut after: Option<String> = None;
        loop {
            let mut path = format!("/r/{subreddit}/top?t=day&limit={PAGE_SIZE}&raw_json=1");
            if let Some(a) = &after {
                path.push_str(&format!("&after={a}"));
            }
            let v = self.get_json(&path).await?;
            let children = v
                .pointer("/data/children")
                .and_then(Value::as_array)
                .ok_or_else(|| SourceError::Malformed("listing without data.children".into()))?;
            for child in children {
                let data = child
                    .get("data")
                    .ok_or_else(|| SourceError::Malformed("listing child without data".into()))?;
                out.push(parse_post(data)?);
            }
            after = v.pointer("/data/after").and_then(Value::as_str).map(str::to_string);
            if after.is_none() || children.is_empty() {
                break;
            }
        }
        Ok(out)
    }

    async fn comments(&self, post_id: &str) -> Result<Vec<RawComment>, SourceError> {
        let v = self
            .get_json(&format!("/comments/{post_id}?limit=500&raw_json=1"))
            .await?;
        // payload is [post listing, comment listing]
        let listing = v
            .get(1)
            .ok_or_else(|| SourceError::Malformed("comment payload without listing".into()))?;
        let roots = parse_forest(listing)?;
        expand(roots, |stub| self.resolve_more(post_id, stub)).await
    }
}

/// Comment tree as the listing endpoint reports it: concrete comments with
/// their replies, plus collapsed "more" stubs.
#[derive(Debug)]
pub(crate) enum Node {
    Comment(RawComment, Vec<Node>),
    More(MoreStub),
}

/// A collapsed placeholder. `ids` names hidden children; an empty list is
/// the depth-limit "continue this thread" marker, whose subtree hangs off
/// `parent_id`.
#[derive(Debug)]
pub(crate) struct MoreStub {
    pub parent_id: String,
    pub ids: Vec<String>,
}

/// Worklist walk over the tree, resolving every `More` stub through
/// `fetch_more` until only concrete rows remain.
pub(crate) async fn expand<F, Fut>(roots: Vec<Node>, mut fetch_more: F) -> Result<Vec<RawComment>, SourceError>
where
    F: FnMut(MoreStub) -> Fut,
    Fut: Future<Output = Result<Vec<Node>, SourceError>>,
{
    let mut out = vec![];
    let mut queue: VecDeque<Node> = roots.into();
    while let Some(node) = queue.pop_front() {
        match node {
            Node::Comment(row, replies) => {
                out.push(row);
                for r in replies {
                    queue.push_back(r);
                }
            }
            Node::More(stub) => {
                for n in fetch_more(stub).await? {
                    queue.push_back(n);
                }
            }
        }
    }
    Ok(out)
}

/// A deep-thread listing repeats the parent comment; keep only what hangs
/// below it so the parent row is not emitted twice.
pub(crate) fn subtree_below(roots: Vec<Node>, parent_short_id: &str) -> Vec<Node> {
    let mut out = vec![];
    for node in roots {
        match node {
            Node::Comment(row, replies) if row.id == parent_short_id => out.extend(replies),
            other => out.push(other),
        }
    }
    out
}

fn parse_forest(listing: &Value) -> Result<Vec<Node>, SourceError> {
    let children = listing
        .pointer("/data/children")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Malformed("comment listing without data.children".into()))?;
    children.iter().map(parse_node).collect()
}

fn parse_node(thing: &Value) -> Result<Node, SourceError> {
    let kind = thing.get("kind").and_then(Value::as_str).unwrap_or("");
    let data = thing
        .get("data")
        .ok_or_else(|| SourceError::Malformed("thing without data".into()))?;
    match kind {
        "more" => {
            let ids = data
                .get("children")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            Ok(Node::More(MoreStub {
                parent_id: req_str(data, "parent_id")?,
                ids,
            }))
        }
        "t1" => {
            // replies is "" when the comment has none
            let replies = match data.get("replies") {
                Some(r) if r.is_object() => parse_forest(r)?,
                _ => vec![],
            };
            Ok(Node::Comment(parse_comment(data)?, replies))
        }
        other => Err(SourceError::Malformed(format!("unexpected thing kind {other:?}"))),
    }
}

fn parse_post(data: &Value) -> Result<RawPost, SourceError> {
    Ok(RawPost {
        id: req_str(data, "id")?,
        title: req_str(data, "title")?,
        subreddit: req_str(data, "subreddit")?,
        selftext: opt_str(data, "selftext"),
        score: data.get("score").and_then(Value::as_i64).unwrap_or(0),
        author: author_of(data),
        num_comments: data.get("num_comments").and_then(Value::as_i64).unwrap_or(0),
        url: req_str(data, "url")?,
        created_utc: epoch_of(data)?,
    })
}

fn parse_comment(data: &Value) -> Result<RawComment, SourceError> {
    Ok(RawComment {
        id: req_str(data, "id")?,
        subreddit: req_str(data, "subreddit")?,
        body: req_str(data, "body")?,
        score: data.get("score").and_then(Value::as_i64).unwrap_or(0),
        author: author_of(data),
        parent_id: req_str(data, "parent_id")?,
        created_utc: epoch_of(data)?,
    })
}

fn req_str(data: &Value, key: &str) -> Result<String, SourceError> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SourceError::Malformed(format!("missing field `{key}`")))
}

fn opt_str(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn author_of(data: &Value) -> Option<String> {
    // deleted accounts come back as the literal "[deleted]"
    opt_str(data, "author").filter(|a| a != "[deleted]")
}

fn epoch_of(data: &Value) -> Result<i64, SourceError> {
    data.get("created_utc")
        .and_then(Value::as_f64)
        .map(|f| f as i64)
        .ok_or_else(|| SourceError::Malformed("missing field `created_utc`".into()))
}

fn retry_after_secs(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn comment(id: &str) -> RawComment {
        RawComment {
            id: id.to_string(),
            subreddit: "pickleball".to_string(),
            body: format!("body of {id}"),
            score: 1,
            author: Some("someone".to_string()),
            parent_id: "t3_post".to_string(),
            created_utc: 1_700_000_000,
        }
    }

    fn stub(parent: &str, ids: &[&str]) -> Node {
        Node::More(MoreStub {
            parent_id: parent.to_string(),
            ids: ids.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn expand_resolves_placeholders_to_concrete_rows() {
        // one visible comment and one stub hiding three replies
        let roots = vec![
            Node::Comment(comment("c1"), vec![]),
            stub("t3_post", &["h1", "h2", "h3"]),
        ];
        let calls = Cell::new(0u32);
        let out = expand(roots, |stub| {
            calls.set(calls.get() + 1);
            async move { Ok(stub.ids.iter().map(|i| Node::Comment(comment(i), vec![])).collect()) }
        })
        .await
        .unwrap();

        assert_eq!(calls.get(), 1);
        let mut ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["c1", "h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn expand_walks_nested_replies_and_nested_stubs() {
        let roots = vec![Node::Comment(
            comment("top"),
            vec![Node::Comment(comment("child"), vec![stub("t1_child", &["deep"])])],
        )];
        let out = expand(roots, |stub| async move {
            Ok(stub.ids.iter().map(|i| Node::Comment(comment(i), vec![])).collect())
        })
        .await
        .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().any(|c| c.id == "deep"));
    }

    #[tokio::test]
    async fn depth_limit_marker_pulls_in_the_hidden_subtree() {
        // a marker with no named children means "continue this thread":
        // the replies below the parent are only reachable by re-listing
        // from that comment
        let roots = vec![Node::Comment(comment("c1"), vec![stub("t1_c1", &[])])];
        let out = expand(roots, |stub| async move {
            assert_eq!(stub.parent_id, "t1_c1");
            assert!(stub.ids.is_empty());
            Ok(vec![
                Node::Comment(comment("d1"), vec![Node::Comment(comment("d2"), vec![])]),
                Node::Comment(comment("d3"), vec![]),
            ])
        })
        .await
        .unwrap();

        let mut ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["c1", "d1", "d2", "d3"]);
    }

    #[test]
    fn subtree_below_drops_only_the_repeated_parent() {
        let roots = vec![Node::Comment(
            comment("parent"),
            vec![
                Node::Comment(comment("r1"), vec![]),
                stub("t1_r1", &["x"]),
            ],
        )];
        let below = subtree_below(roots, "parent");
        assert_eq!(below.len(), 2);
        assert!(matches!(&below[0], Node::Comment(c, _) if c.id == "r1"));
        assert!(matches!(&below[1], Node::More(s) if s.ids == ["x"]));
    }

    #[test]
    fn parse_forest_reads_listing_shape() {
        let listing = json!({
            "kind": "Listing",
            "data": { "children": [
                { "kind": "t1", "data": {
                    "id": "c1", "subreddit": "pickleball", "body": "nice dink",
                    "score": 4, "author": "paddler", "parent_id": "t3_abc",
                    "created_utc": 1700000000.0,
                    "replies": { "kind": "Listing", "data": { "children": [
                        { "kind": "more", "data": { "parent_id": "t1_c1", "children": ["x", "y"] } }
                    ]}}
                }}
            ]}
        });
        let forest = parse_forest(&listing).unwrap();
        assert_eq!(forest.len(), 1);
        match &forest[0] {
            Node::Comment(c, replies) => {
                assert_eq!(c.id, "c1");
                assert_eq!(c.parent_id, "t3_abc");
                assert!(matches!(&replies[0], Node::More(s) if s.ids.len() == 2));
            }
            _ => panic!("expected a comment node"),
        }
    }

    #[test]
    fn parse_keeps_the_parent_of_a_depth_limit_marker() {
        let thing = json!({
            "kind": "more",
            "data": { "parent_id": "t1_deep", "children": [] }
        });
        match parse_node(&thing).unwrap() {
            Node::More(s) => {
                assert_eq!(s.parent_id, "t1_deep");
                assert!(s.ids.is_empty());
            }
            _ => panic!("expected a more node"),
        }
    }

    #[test]
    fn deleted_author_becomes_none() {
        let data = json!({
            "id": "p1", "title": "t", "subreddit": "s", "selftext": "",
            "score": 10, "author": "[deleted]", "num_comments": 0,
            "url": "https://example.com", "created_utc": 1700000000.0
        });
        let post = parse_post(&data).unwrap();
        assert_eq!(post.author, None);
        assert_eq!(post.selftext, None);
        assert_eq!(post.created_utc, 1_700_000_000);
    }

    #[test]
    fn missing_id_is_malformed() {
        let data = json!({ "title": "t" });
        assert!(matches!(parse_post(&data), Err(SourceError::Malformed(_))));
    }
}
