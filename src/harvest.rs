use anyhow::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use crate::merge::merge;
use crate::models::{CommentRow, PostRow};
use crate::reddit::Source;
use crate::store::{self, Layout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Wipe results/, one comments file per post.
    Snapshot,
    /// Cumulative posts.xlsx / comments.xlsx, de-duplicated by id.
    Incremental,
}

/// One full collection pass. The retry controller re-invokes this from the
/// top when the source reports an exhausted quota.
#[async_trait]
pub trait Harvest {
    async fn run_once(&mut self) -> Result<()>;
}

pub struct Harvester<'a, S: Source + Sync> {
    pub source: &'a S,
    pub subreddit: String,
    pub layout: Layout,
    pub mode: Mode,
}

/// Previously persisted datasets, read once at the start of an incremental
/// run and only written back (merged) at the very end.
pub struct PriorState {
    pub posts: Vec<PostRow>,
    pub comments: Vec<CommentRow>,
}

impl PriorState {
    pub fn load(layout: &Layout) -> Result<Self> {
        let posts_file = layout.posts_file();
        let comments_file = layout.comments_file();
        Ok(Self {
            posts: if posts_file.exists() { store::read_posts(&posts_file)? } else { vec![] },
            comments: if comments_file.exists() { store::read_comments(&comments_file)? } else { vec![] },
        })
    }
}

#[async_trait]
impl<S: Source + Sync> Harvest for Harvester<'_, S> {
    async fn run_once(&mut self) -> Result<()> {
        match self.mode {
            Mode::Snapshot => self.snapshot().await,
            Mode::Incremental => self.incremental().await,
        }
    }
}

impl<S: Source + Sync> Harvester<'_, S> {
    async fn fetch_posts(&self) -> Result<Vec<PostRow>> {
        let raw = self.source.top_posts_today(&self.subreddit).await?;
        raw.into_iter().map(PostRow::from_raw).collect()
    }

    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        let raw = self.source.comments(post_id).await?;
        raw.into_iter().map(CommentRow::from_raw).collect()
    }

    async fn snapshot(&self) -> Result<()> {
        self.layout.reset()?;
        let posts = self.fetch_posts().await?;
        store::write_posts(&self.layout.posts_file(), &posts)?;

        let pb = progress_bar(posts.len());
        for post in &posts {
            pb.set_message(format!("r/{} — comments for {}", self.subreddit, post.id));
            let comments = self.fetch_comments(&post.id).await?;
            store::write_comments(&self.layout.post_comments_file(&post.id), &comments)?;
            pb.inc(1);
        }
        pb.finish_and_clear();

        eprintln!("[DONE] {} posts saved under {}", posts.len(), self.layout.root.display());
        Ok(())
    }

    async fn incremental(&self) -> Result<()> {
        self.layout.ensure()?;
        let prior = PriorState::load(&self.layout)?;
        let fetched = self.fetch_posts().await?;

        let pb = progress_bar(fetched.len());
        let mut fetched_comments = vec![];
        for post in &fetched {
            pb.set_message(format!("r/{} — comments for {}", self.subreddit, post.id));
            fetched_comments.extend(self.fetch_comments(&post.id).await?);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let posts = merge(prior.posts, fetched);
        let comments = merge(prior.comments, fetched_comments);
        store::write_posts(&self.layout.posts_file(), &posts)?;
        store::write_comments(&self.layout.comments_file(), &comments)?;

        eprintln!(
            "[DONE] {} posts / {} comments in {}",
            posts.len(),
            comments.len(),
            self.layout.root.display()
        );
        Ok(())
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {pos}/{len} {wide_msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}
