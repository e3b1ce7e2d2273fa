use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use rand::Rng;
use reqwest::blocking::Client;

const USER_AGENT: &str = "gridiron-data/0.1";
const BACKOFF_STEP_MS: u64 = 500;

static CLIENT: OnceCell<Client> = OnceCell::new();
static BULK_CLIENT: OnceCell<Client> = OnceCell::new();

/// Client for small page/API requests. The timeout is fixed by the first caller.
pub fn http_client(timeout: Duration) -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| build_client(timeout))
}

/// Client for large release assets, with a longer timeout.
pub fn bulk_client(timeout: Duration) -> Result<&'static Client> {
    BULK_CLIENT.get_or_try_init(|| build_client(timeout))
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

/// Runs `op` up to `attempts` times with linear backoff plus jitter between tries.
pub fn with_retries<T>(
    label: &str,
    attempts: u32,
    mut op: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let attempts = attempts.max(1);
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(%label, attempt, error = %err, "attempt failed");
                last_err = Some(err);
                if attempt < attempts {
                    thread::sleep(backoff(attempt));
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("{label}: no attempts made")))
}

fn backoff(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_STEP_MS / 2);
    Duration::from_millis(BACKOFF_STEP_MS.saturating_mul(attempt as u64) + jitter)
}
