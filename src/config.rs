use std::env;

use anyhow::{Context, Result};

/// Runtime settings, sourced from the environment (a .env file is honored
/// when present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    /// Seconds the API client may absorb on its own when the server asks
    /// for a wait; anything above this surfaces as a rate-limit signal.
    pub rate_limit_secs: u64,
    pub target_subreddit: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            user_agent: required("USER_AGENT")?,
            rate_limit_secs: env::var("RATE_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("RATE_LIMIT must be a whole number of seconds")?,
            target_subreddit: required("TARGET_SUBREDDIT")?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} environment variable is required"))
}
