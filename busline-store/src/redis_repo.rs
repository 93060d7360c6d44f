use chrono::Utc;
use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns `true` while `key` is under `limit`
    /// within the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let window_key = window_key(key, Utc::now().timestamp(), window_seconds);

        // Each window has its own key, so re-arming the expiry never extends a window.
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(&window_key, 1)
            .expire(&window_key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// Counter key for the window containing `now` (unix seconds).
fn window_key(key: &str, now: i64, window_seconds: i64) -> String {
    format!("{}:{}", key, now.div_euclid(window_seconds.max(1)))
}
