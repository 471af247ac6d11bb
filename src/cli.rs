use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Collects a subreddit's top posts of the day and their comments into xlsx files")]
pub struct Args {

    /// snapshot wipes results/ and writes one comments file per post;
    /// incremental merges into cumulative posts.xlsx / comments.xlsx.
    #[arg(long, default_value = "snapshot", value_parser = ["snapshot", "incremental"])]
    pub mode: String,


    #[arg(long, default_value = "./results")]
    pub results: String,


    /// Overrides TARGET_SUBREDDIT from the environment.
    #[arg(long)]
    pub subreddit: Option<String>,
}
