use redis::aio::ConnectionManager;
use redis::AsyncCommands;

#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { conn })
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.sadd(key, member).await
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.srem(key, member).await
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member).await
    }

    pub async fn incr(&self, key: &str) -> Result<i64, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1i64).await
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.expire(key, ttl_secs).await
    }

    pub async fn lpush(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.lpush(key, value).await
    }

    /// Blocking pop from the tail of a list. Returns `None` when the
    /// timeout elapses with nothing to pop.
    pub async fn brpop(
        &self,
        key: &str,
        timeout_secs: usize,
    ) -> Result<Option<(String, String)>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.brpop(key, timeout_secs as f64).await
    }

    /// Fixed-window counter: INCR, set the expiry when the window opens,
    /// allow while the post-increment count stays at or under the limit.
    pub async fn rate_limit_check(
        &self,
        key: &str,
        limit: i64,
        window_secs: i64,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(key, 1i64).await?;
        if count == 1 {
            conn.expire::<_, ()>(key, window_secs).await?;
        }
        Ok(count <= limit)
    }
}
