//! Redis-backed [`SharedStore`], used by multi-gateway deployments so
//! channel membership, presence, and the MUD roster are visible to every
//! gateway instance (§4.2, §6.3). Command traffic goes over a shared
//! `ConnectionManager`; each `subscribe()` call opens its own dedicated
//! pub/sub connection, since Redis multiplexes subscriptions over a
//! connection that can no longer issue regular commands.

use std::{sync::Arc, time::Duration};

use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::{PubSubMessage, Result, SharedStore, StoreError};

pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    reconciled_tx: watch::Sender<u64>,
    reconciled_rx: watch::Receiver<u64>,
    generation: std::sync::atomic::AtomicU64,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`). A single
    /// [`ConnectionManager`] backs request/response commands; each
    /// [`SharedStore::subscribe`] call opens its own dedicated pub/sub
    /// connection, per §4.2.
    pub async fn connect(url: &str) -> Result<Arc<Self>> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Backend(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let (tx, rx) = watch::channel(0);
        Ok(Arc::new(Self {
            client,
            conn,
            reconciled_tx: tx,
            reconciled_rx: rx,
            generation: std::sync::atomic::AtomicU64::new(0),
        }))
    }

    fn map_err(&self, err: redis::RedisError) -> StoreError {
        if err.is_connection_dropped() || err.is_io_error() {
            let gen = self
                .generation
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                + 1;
            let _ = self.reconciled_tx.send(gen);
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| self.map_err(e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(d) => conn
                .set_ex::<_, _, ()>(key, value, d.as_secs().max(1))
                .await
                .map_err(|e| self.map_err(e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| self.map_err(e)),
        }
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(|e| self.map_err(e))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(|e| self.map_err(e))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn lpush_capped(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        // lpush then ltrim in the same call so the list never grows past cap.
        conn.lpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| self.map_err(e))?;
        conn.ltrim::<_, ()>(key, 0, cap as isize - 1)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, limit as isize - 1)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<PubSubMessage>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| self.map_err(e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| self.map_err(e))?;

        let (tx, rx) = mpsc::channel(256);
        let channel_name = channel.to_string();
        tokio::spawn(async move {
            use futures::StreamExt;
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(channel = %channel_name, error = %e, "dropping undecodable pub/sub payload");
                        continue;
                    },
                };
                if tx
                    .send(PubSubMessage {
                        channel: channel_name.clone(),
                        payload,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn reconciled(&self) -> watch::Receiver<u64> {
        self.reconciled_rx.clone()
    }
}
