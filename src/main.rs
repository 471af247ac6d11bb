use anyhow::Result;
use clap::Parser;

use daytop::cli::Args;
use daytop::config::Settings;
use daytop::harvest::{Harvester, Mode};
use daytop::reddit::RedditClient;
use daytop::retry::{self, TokioSleep};
use daytop::store::Layout;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::from_env()?;

    let subreddit = args
        .subreddit
        .clone()
        .unwrap_or_else(|| settings.target_subreddit.clone());
    let mode = match args.mode.as_str() {
        "incremental" => Mode::Incremental,
        _ => Mode::Snapshot,
    };

    let client = RedditClient::connect(&settings).await?;

    let mut job = Harvester {
        source: &client,
        subreddit: subreddit.clone(),
        layout: Layout::new(args.results.as_str()),
        mode,
    };

    eprintln!("[START] r/{subreddit} — {} mode", args.mode);
    retry::drive(&mut job, &TokioSleep).await?;
    Ok(())
}
