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

    /// Fixed-window counter. Returns whether this hit is within `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = window_hit(key, window_seconds).query_async(&mut conn).await?;

        Ok(count <= limit)
    }
}

/// The TTL is set only when the counter is created, so later hits never
/// extend the window.
fn window_hit(key: &str, window_seconds: i64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("NX")
        .arg("EX")
        .arg(window_seconds)
        .ignore()
        .incr(key, 1);
    pipe
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_ttl_is_only_set_on_creation() {
        let packed = window_hit("rate:status:10.0.0.1", 60).get_packed_pipeline();
        let command = String::from_utf8_lossy(&packed);

        assert!(command.contains("MULTI"));
        assert!(command.contains("NX"));
        assert!(command.contains("INCR"));
        assert!(!command.contains("EXPIRE"));
    }
}
