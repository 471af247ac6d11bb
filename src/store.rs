use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Reader, Xlsx};
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::models::{CommentRow, PostRow};
use crate::times;

pub const POST_COLUMNS: &[&str] = &[
    "id", "title", "subreddit", "selftext", "score", "author",
    "num_comments", "url", "created_utc", "created_central",
];

pub const COMMENT_COLUMNS: &[&str] = &[
    "id", "subreddit", "body", "score", "author", "parent_id",
    "created_utc", "created_central",
];

/// Where results land on disk, for both operating modes.
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn posts_file(&self) -> PathBuf {
        self.root.join("posts.xlsx")
    }

    /// Cumulative comments file (incremental mode).
    pub fn comments_file(&self) -> PathBuf {
        self.root.join("comments.xlsx")
    }

    pub fn comments_dir(&self) -> PathBuf {
        self.root.join("comments")
    }

    /// Per-post comments file (snapshot mode).
    pub fn post_comments_file(&self, post_id: &str) -> PathBuf {
        self.comments_dir().join(format!("{post_id}.xlsx"))
    }

    /// Snapshot mode: drop any previous results wholesale and start clean.
    pub fn reset(&self) -> Result<()> {
        if self.root.exists() {
            eprintln!("[SETUP] deleting existing results directory");
            std::fs::remove_dir_all(&self.root)
                .with_context(|| format!("removing {}", self.root.display()))?;
        }
        std::fs::create_dir_all(self.comments_dir())
            .with_context(|| format!("creating {}", self.comments_dir().display()))?;
        Ok(())
    }

    /// Incremental mode: keep what is there, just make sure the directory exists.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        Ok(())
    }
}

pub fn write_posts(path: &Path, rows: &[PostRow]) -> Result<()> {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    write_header(ws, POST_COLUMNS)?;
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        ws.write(r, 0, row.id.as_str())?;
        ws.write(r, 1, row.title.as_str())?;
        ws.write(r, 2, row.subreddit.as_str())?;
        ws.write(r, 3, row.selftext.as_deref().unwrap_or(""))?;
        ws.write(r, 4, row.score)?;
        ws.write(r, 5, row.author.as_deref().unwrap_or(""))?;
        ws.write(r, 6, row.num_comments)?;
        ws.write(r, 7, row.url.as_str())?;
        ws.write(r, 8, row.created_utc.to_rfc3339())?;
        ws.write(r, 9, row.created_central.to_rfc3339())?;
    }
    wb.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn write_comments(path: &Path, rows: &[CommentRow]) -> Result<()> {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    write_header(ws, COMMENT_COLUMNS)?;
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        ws.write(r, 0, row.id.as_str())?;
        ws.write(r, 1, row.subreddit.as_str())?;
        ws.write(r, 2, row.body.as_str())?;
        ws.write(r, 3, row.score)?;
        ws.write(r, 4, row.author.as_deref().unwrap_or(""))?;
        ws.write(r, 5, row.parent_id.as_str())?;
        ws.write(r, 6, row.created_utc.to_rfc3339())?;
        ws.write(r, 7, row.created_central.to_rfc3339())?;
    }
    wb.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn write_header(ws: &mut Worksheet, columns: &[&str]) -> Result<()> {
    for (c, name) in columns.iter().enumerate() {
        ws.write(0, c as u16, *name)?;
    }
    Ok(())
}

/// Read a previously written posts file back into rows. A missing `id` or
/// `created_utc` column is a precondition violation and fails the run.
pub fn read_posts(path: &Path) -> Result<Vec<PostRow>> {
    let sheet = Sheet::open(path)?;
    let id_c = sheet.column("id")?;
    let created_c = sheet.column("created_utc")?;
    let title_c = sheet.column("title")?;
    let sub_c = sheet.column("subreddit")?;
    let self_c = sheet.column("selftext")?;
    let score_c = sheet.column("score")?;
    let author_c = sheet.column("author")?;
    let ncom_c = sheet.column("num_comments")?;
    let url_c = sheet.column("url")?;

    let mut out = vec![];
    for row in sheet.body() {
        let id = cell(row, id_c);
        if id.is_empty() {
            continue;
        }
        let created_utc = parse_instant(&cell(row, created_c), path)?;
        out.push(PostRow {
            id,
            title: cell(row, title_c),
            subreddit: cell(row, sub_c),
            selftext: non_empty(cell(row, self_c)),
            score: parse_int(&cell(row, score_c), "score", path)?,
            author: non_empty(cell(row, author_c)),
            num_comments: parse_int(&cell(row, ncom_c), "num_comments", path)?,
            url: cell(row, url_c),
            created_utc,
            created_central: created_utc.with_timezone(&times::TARGET_TZ),
        });
    }
    Ok(out)
}

pub fn read_comments(path: &Path) -> Result<Vec<CommentRow>> {
    let sheet = Sheet::open(path)?;
    let id_c = sheet.column("id")?;
    let created_c = sheet.column("created_utc")?;
    let sub_c = sheet.column("subreddit")?;
    let body_c = sheet.column("body")?;
    let score_c = sheet.column("score")?;
    let author_c = sheet.column("author")?;
    let parent_c = sheet.column("parent_id")?;

    let mut out = vec![];
    for row in sheet.body() {
        let id = cell(row, id_c);
        if id.is_empty() {
            continue;
        }
        let created_utc = parse_instant(&cell(row, created_c), path)?;
        out.push(CommentRow {
            id,
            subreddit: cell(row, sub_c),
            body: cell(row, body_c),
            score: parse_int(&cell(row, score_c), "score", path)?,
            author: non_empty(cell(row, author_c)),
            parent_id: cell(row, parent_c),
            created_utc,
            created_central: created_utc.with_timezone(&times::TARGET_TZ),
        });
    }
    Ok(out)
}

struct Sheet {
    path: PathBuf,
    header: Vec<String>,
    rows: Vec<Vec<calamine::Data>>,
}

impl Sheet {
    fn open(path: &Path) -> Result<Self> {
        let mut wb: Xlsx<_> = open_workbook(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let first = wb
            .sheet_names()
            .first()
            .ok_or_else(|| anyhow!("{}: empty workbook", path.display()))?
            .to_string();
        let range = wb.worksheet_range(&first)?;
        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| anyhow!("{}: missing header row", path.display()))?
            .iter()
            .map(|c| c.to_string().trim().to_lowercase())
            .collect();
        let rows = rows.map(|r| r.to_vec()).collect();
        Ok(Self { path: path.to_path_buf(), header, rows })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("{}: required column `{name}` is missing", self.path.display()))
    }

    fn body(&self) -> impl Iterator<Item = &[calamine::Data]> {
        self.rows.iter().map(|r| r.as_slice())
    }
}

fn cell(row: &[calamine::Data], idx: usize) -> String {
    row.get(idx).map(|c| c.to_string()).unwrap_or_default()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn parse_int(s: &str, column: &str, path: &Path) -> Result<i64> {
    s.parse()
        .with_context(|| format!("{}: bad {column} value {s:?}", path.display()))
}

fn parse_instant(s: &str, path: &Path) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("{}: bad created_utc value {s:?}", path.display()))?
        .with_timezone(&Utc))
}
