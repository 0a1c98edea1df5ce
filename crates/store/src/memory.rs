//! In-process [`SharedStore`] backend: a single-instance deployment's
//! system of record, and the default in tests. Never returns
//! `Unavailable` — there's no network hop to fail.

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, watch};

use crate::{PubSubMessage, Result, SharedStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct InMemoryStore {
    strings: DashMap<String, Entry>,
    sets: DashMap<String, HashSet<String>>,
    lists: DashMap<String, VecDeque<String>>,
    subscribers: DashMap<String, Vec<mpsc::Sender<PubSubMessage>>>,
    reconciled: Mutex<watch::Sender<u64>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(0);
        Arc::new(Self {
            strings: DashMap::new(),
            sets: DashMap::new(),
            lists: DashMap::new(),
            subscribers: DashMap::new(),
            reconciled: Mutex::new(tx),
        })
    }

    fn expired(entry: &Entry) -> bool {
        entry.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.strings.get(key) {
            Some(e) if !Self::expired(&e) => Ok(Some(e.value.clone())),
            Some(_) => {
                self.strings.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.strings.insert(key.to_string(), Entry {
            value: value.to_string(),
            expires_at: ttl.map(|d| Instant::now() + d),
        });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.strings.remove(key);
        self.sets.remove(key);
        self.lists.remove(key);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.sets.get(key).is_some_and(|s| s.contains(member)))
    }

    async fn lpush_capped(&self, key: &str, value: &str, cap: usize) -> Result<()> {
        let mut list = self.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        list.truncate(cap);
        Ok(())
    }

    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .lists
            .get(key)
            .map(|l| l.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        if let Some(mut subs) = self.subscribers.get_mut(channel) {
            let message = PubSubMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            };
            subs.retain(|tx| tx.try_send(message.clone()).is_ok() || !tx.is_closed());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<PubSubMessage>> {
        let (tx, rx) = mpsc::channel(256);
        self.subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn reconciled(&self) -> watch::Receiver<u64> {
        self.reconciled.lock().await.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn ttl_expires_the_key() {
        let store = InMemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sadd_srem_smembers() {
        let store = InMemoryStore::new();
        store.sadd("s", "a").await.unwrap();
        store.sadd("s", "b").await.unwrap();
        let mut members = store.smembers("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
        store.srem("s", "a").await.unwrap();
        assert!(!store.sismember("s", "a").await.unwrap());
        assert!(store.sismember("s", "b").await.unwrap());
    }

    #[tokio::test]
    async fn lpush_capped_trims_after_push() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .lpush_capped("l", &i.to_string(), 3)
                .await
                .unwrap();
        }
        let items = store.lrange("l", 10).await.unwrap();
        assert_eq!(items, vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let store = InMemoryStore::new();
        let mut rx = store.subscribe("chan").await.unwrap();
        store.publish("chan", "hello").await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.payload, "hello");
    }
}
