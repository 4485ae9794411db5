use std::{future::Future, time::Duration};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::FetchError;

/// Deadline shared by every request of a batch.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// Starts the clock. The zero duration means no deadline.
    pub(crate) fn after(timeout: Duration) -> Self {
        if timeout.is_zero() {
            Self(None)
        } else {
            Self(Some(Instant::now() + timeout))
        }
    }

    /// Runs `fut` to completion or until the deadline passes, whichever is
    /// first. A future cut off by the deadline is dropped, releasing
    /// everything it holds.
    pub(crate) async fn run<T, F>(self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        match self.0 {
            None => fut.await,
            Some(at) => time::timeout_at(at, fut)
                .await
                .unwrap_or_else(|_| Err(FetchError::Timeout)),
        }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error or
/// `retries` additional attempts have been spent.
pub(crate) async fn retrying<T, F, Fut>(
    retries: u8,
    backoff: Duration,
    mut attempt: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut spent = 0;
    loop {
        match attempt().await {
            Err(e) if spent < retries && e.is_retryable() => {
                spent += 1;
                debug!(attempt = spent, error = %e, "retrying request");
                time::sleep(backoff).await;
            }
            res => return res,
        }
    }
}

/// Progress bar for a batch of `len` requests.
pub fn progress_bar(len: usize, label: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}")
            .context("invalid progress bar template")?
            .progress_chars("##-"),
    );
    pb.set_message(label);
    Ok(pb)
}
