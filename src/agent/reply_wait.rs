//! Polling-based wait for an external reply.
//!
//! A deferred tool hands the orchestrator a [`PendingReply`]. The functions
//! here suspend the round until the external slot is filled or a deadline
//! passes, sleeping between checks rather than spinning.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::executor::PendingReply;

/// Default finalize keyword.
pub const DEFAULT_SENTINEL: &str = "SEND";

/// How replies end a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPolicy {
    /// Collect replies until one matches the sentinel (trimmed,
    /// case-insensitive) or the deadline passes.
    UntilSentinel {
        /// Finalize keyword.
        sentinel: String,
    },
    /// The first reply ends the wait.
    FirstReply,
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self::UntilSentinel {
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

impl ReplyPolicy {
    /// The finalize keyword, if this policy has one.
    #[must_use]
    pub fn sentinel(&self) -> Option<&str> {
        match self {
            Self::UntilSentinel { sentinel } => Some(sentinel.as_str()),
            Self::FirstReply => None,
        }
    }

    /// Returns `true` if `value` is this policy's finalize signal.
    #[must_use]
    pub fn is_sentinel(&self, value: &str) -> bool {
        match self {
            Self::UntilSentinel { sentinel } => value.trim().eq_ignore_ascii_case(sentinel.trim()),
            Self::FirstReply => false,
        }
    }
}

/// Timing and termination settings for a reply wait.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Sleep between checks.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
    /// Termination rule.
    pub policy: ReplyPolicy,
}

/// Result of [`collect_replies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// At least one non-sentinel reply arrived.
    Replied {
        /// Replies in arrival order.
        replies: Vec<String>,
        /// Whether the sentinel ended the wait.
        finalized: bool,
    },
    /// Nothing usable arrived before the wait ended.
    NoReply {
        /// Whether a bare sentinel ended the wait.
        finalized: bool,
    },
}

/// Repeatedly awaits `check` until it yields a value or `timeout` elapses.
///
/// `check` runs once immediately, then after every `interval`. Returns
/// `None` once the elapsed time reaches `timeout`.
pub async fn poll<T, F, Fut>(mut check: F, interval: Duration, timeout: Duration) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        sleep(interval).await;
    }
}

/// Waits on `reply` according to `options`, gathering every reply seen.
///
/// Each consumed value (sentinel included) is cleared from the slot so the
/// next check observes the next independent reply. Check failures count as
/// "nothing yet" and are logged.
pub async fn collect_replies(reply: &dyn PendingReply, options: &WaitOptions) -> ReplyOutcome {
    let collected = Mutex::new(Vec::new());

    let finalized = poll(
        || async {
            let value = match reply.check().await {
                Ok(Some(value)) => value,
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "reply check failed");
                    return None;
                }
            };

            if let Err(e) = reply.clear().await {
                warn!(error = %e, "failed to clear consumed reply");
            }

            if options.policy.is_sentinel(&value) {
                debug!("finalize signal received");
                return Some(true);
            }

            debug!(len = value.len(), "reply received");
            collected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(value);
            (options.policy == ReplyPolicy::FirstReply).then_some(false)
        },
        options.interval,
        options.timeout,
    )
    .await
    .unwrap_or(false);

    let replies = collected.into_inner().unwrap_or_else(PoisonError::into_inner);
    if replies.is_empty() {
        ReplyOutcome::NoReply { finalized }
    } else {
        ReplyOutcome::Replied { replies, finalized }
    }
}
