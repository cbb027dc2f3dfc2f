//! Redis counter store.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use secrecy::{ExposeSecret, SecretString};

use super::store::{CounterStore, StoreError, StoreResult, StoreResultExt};

/// Connection settings for [`RedisCounterStore`].
#[derive(Clone)]
pub struct RedisStoreConfig {
    /// Store address, e.g. `redis://localhost:6379`. Never logged.
    pub url: SecretString,
    /// Budget for establishing the initial connection, including the PING.
    pub connect_timeout: Duration,
    /// Budget for each counter operation round-trip.
    pub response_timeout: Duration,
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: SecretString::from(url.into()),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_millis(2_000),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for RedisStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStoreConfig")
            .field("url", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

/// Counter store on a shared Redis connection.
///
/// One [`ConnectionManager`] is established up front, verified with a
/// PING so a dead store fails the process at startup rather than on the
/// first request, then cloned per operation; the manager reconnects on
/// its own after a dropped link. `INCRBY` and the TTL refresh run inside
/// one `MULTI`/`EXEC` pipeline so the pair is indivisible. Every call is
/// bounded by `response_timeout` and never retried here; a failure
/// surfaces as [`StoreError`] and the caller decides.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    response_timeout: Duration,
}

impl RedisCounterStore {
    /// Connect and verify reachability.
    pub async fn connect(config: RedisStoreConfig) -> StoreResult<Self> {
        let client =
            redis::Client::open(config.url.expose_secret()).store_err_ctx("invalid store URL")?;

        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout))?
            .store_err_ctx("store connection failed")?;

        let store = Self {
            conn,
            response_timeout: config.response_timeout,
        };
        store.ping().await?;
        tracing::info!(backend = store.name(), "counter store connected");
        Ok(store)
    }

    async fn timed<T>(
        &self,
        op: impl Future<Output = redis::RedisResult<T>>,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.response_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.response_timeout))?
            .store_err()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        // EXPIRE 0 would delete the key outright; clamp sub-second TTLs up.
        let ttl_secs = ttl.as_secs().max(1);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("INCRBY").arg(key).arg(delta);
        pipe.cmd("EXPIRE").arg(key).arg(ttl_secs).ignore();

        let (total,): (i64,) = self.timed(pipe.query_async(&mut conn)).await?;
        Ok(total)
    }

    async fn fetch(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let total: Option<i64> = self.timed(conn.get(key)).await?;
        Ok(total.unwrap_or(0))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self.timed(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }
}
