//! Redis-backed status store (`HGET` / `HSET`).

use crate::status::StatusStore;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::pin::Pin;
use tracing::debug;

/// Status store on a Redis server, over one multiplexed connection
#[derive(Clone)]
pub struct RedisStatusStore {
    conn: MultiplexedConnection,
    url: String,
}

impl RedisStatusStore {
    /// Connect to `redis://host:port/`
    pub async fn connect(host: &str, port: u16) -> IoResult<Self> {
        let url = format!("redis://{}:{}/", host, port);
        let client = redis::Client::open(url.as_str()).map_err(Self::map_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(Self::map_error)?;
        debug!(%url, "connected to status store");
        Ok(RedisStatusStore { conn, url })
    }

    /// Convert redis errors to IoError
    fn map_error(err: redis::RedisError) -> IoError {
        let kind = if err.is_connection_refusal() {
            ErrorKind::ConnectionRefused
        } else if err.is_timeout() {
            ErrorKind::TimedOut
        } else {
            ErrorKind::Other
        };
        IoError::new(kind, err.to_string())
    }
}

impl std::fmt::Debug for RedisStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStatusStore")
            .field("url", &self.url)
            .finish()
    }
}

impl StatusStore for RedisStatusStore {
    fn hget<'a>(
        &'a self,
        hash: &'a str,
        field: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<String> = redis::cmd("HGET")
                .arg(hash)
                .arg(field)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_error)?;
            Ok(value)
        })
    }

    fn hset<'a>(
        &'a self,
        hash: &'a str,
        field: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: i64 = redis::cmd("HSET")
                .arg(hash)
                .arg(field)
                .arg(value)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_error)?;
            Ok(())
        })
    }
}
