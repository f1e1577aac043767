use crate::github::RemoteError;
use log::warn;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How long to wait after hitting a rate limit before trying again.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared flag telling every remote call to give up as soon as possible.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), RemoteError> {
        if self.is_cancelled() {
            Err(RemoteError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration`, waking up early if the token gets cancelled.
    pub fn sleep(&self, duration: Duration) -> Result<(), RemoteError> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Runs `op` until it succeeds or fails with something other than a rate
/// limit, waiting `backoff` between attempts.
pub fn retry_rate_limited<T, F>(
    token: &CancellationToken,
    backoff: Duration,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> anyhow::Result<T>,
{
    loop {
        token.check()?;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => match err.downcast_ref::<RemoteError>() {
                Some(RemoteError::RateLimited) => {
                    warn!("hit the API rate limit, retrying in {}s", backoff.as_secs());
                }
                Some(RemoteError::SecondaryRateLimited) => {
                    warn!(
                        "hit the secondary API rate limit, retrying in {}s",
                        backoff.as_secs()
                    );
                }
                _ => return Err(err),
            },
        }
        token.sleep(backoff)?;
    }
}
