use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_CHANNEL_STAMP: AtomicU64 = AtomicU64::new(0);

pub fn remove_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Fresh change-feed channel name, e.g. `orders_changes_1717171717171`.
///
/// The suffix is the current unix time in milliseconds, bumped when needed so
/// that two names handed out within the same millisecond never collide.
pub fn channel_name(prefix: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let prev = LAST_CHANNEL_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    format!("{}_{}", prefix, now.max(prev + 1))
}

pub async fn retry<T, E, F, Fut>(mut retries: u32, base_delay_ms: u64, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if retries == 0 => return Err(e),
            Err(e) => {
                // Exponential backoff: base_delay * 2^attempt, capped at 30s
                let delay = (base_delay_ms * (1u64 << attempt.min(5))).min(30_000);
                tracing::warn!(attempt = attempt + 1, delay_ms = delay, "request failed, retrying: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                retries -= 1;
                attempt += 1;
            }
        }
    }
}
