use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::harvest::Harvest;
use crate::reddit::SourceError;

/// Injectable sleep so the backoff loop is testable without real delays.
#[async_trait]
pub trait Sleep {
    async fn sleep(&self, d: Duration);
}

pub struct TokioSleep;

#[async_trait]
impl Sleep for TokioSleep {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// Re-run the job from the top until it completes. Only an exhausted-quota
/// signal is recovered, and the wait is twice what the API asked for; any
/// other error propagates and kills the process. Deliberately unbounded:
/// this is an offline batch job, eventual completion beats fast-fail.
pub async fn drive<H, S>(job: &mut H, sleeper: &S) -> Result<()>
where
    H: Harvest + Send,
    S: Sleep + Sync,
{
    loop {
        match job.run_once().await {
            Ok(()) => return Ok(()),
            Err(err) => match err.downcast_ref::<SourceError>() {
                Some(SourceError::RateLimited { retry_after_secs }) => {
                    let wait = retry_after_secs.saturating_mul(2);
                    eprintln!(
                        "[RATELIMIT] quota exhausted, api advises {retry_after_secs}s — sleeping {wait}s, then restarting the run"
                    );
                    sleeper.sleep(Duration::from_secs(wait)).await;
                }
                _ => return Err(err),
            },
        }
    }
}
