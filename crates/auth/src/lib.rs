//! Authentication service (§4.3): long-lived, admin-issued API keys bound to
//! a MUD name, and short-lived opaque bearer session tokens handed out in
//! exchange for one.
//!
//! Registration (binding a MUD name to an API key) happens out of band —
//! an operator-facing surface outside this crate's scope — but must agree
//! with [`mudvault_store::keys::apikey`] on layout, so [`AuthService::register`]
//! lives here too rather than being reimplemented by every caller.
//!
//! The wire-visible `auth` envelope only ever carries a bearer token, never
//! the API key itself; [`AuthService::authenticate`] is what the connection
//! manager calls when one arrives.

mod error;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use mudvault_store::{SharedStore, keys};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub use error::{AuthError, Result};

#[cfg(feature = "metrics")]
use mudvault_metrics::{auth as auth_metrics, counter, gauge};

/// Session metadata stored at `session:<token>`, TTL-backed so expiry is
/// enforced by the store even if nothing ever calls [`AuthService::revoke`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub mud: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued bearer token and the session it opens.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub record: SessionRecord,
}

pub struct AuthService {
    store: Arc<dyn SharedStore>,
    session_ttl: Duration,
    registration_secret: Option<String>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        session_ttl: Duration,
        registration_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            session_ttl,
            registration_secret,
        }
    }

    /// Bind `mud_name` to `api_key`, gated on `provided_secret` matching the
    /// configured out-of-band registration secret. The key is hashed with
    /// SHA-256 before it ever reaches the store — only the hash is kept.
    pub async fn register(
        &self,
        mud_name: &str,
        api_key: &str,
        provided_secret: &str,
    ) -> Result<()> {
        let expected = self
            .registration_secret
            .as_deref()
            .ok_or(AuthError::BadRegistrationSecret)?;
        if provided_secret != expected {
            return Err(AuthError::BadRegistrationSecret);
        }

        let key = keys::apikey(mud_name);
        if self.store.get(&key).await?.is_some() {
            return Err(AuthError::AlreadyRegistered(mud_name.to_string()));
        }

        self.store.set(&key, &hash_api_key(api_key), None).await?;
        Ok(())
    }

    /// Re-issue a new API key for an already-registered MUD, e.g. after a
    /// suspected leak. Still gated on the registration secret.
    pub async fn rotate_api_key(
        &self,
        mud_name: &str,
        new_api_key: &str,
        provided_secret: &str,
    ) -> Result<()> {
        let expected = self
            .registration_secret
            .as_deref()
            .ok_or(AuthError::BadRegistrationSecret)?;
        if provided_secret != expected {
            return Err(AuthError::BadRegistrationSecret);
        }

        let key = keys::apikey(mud_name);
        if self.store.get(&key).await?.is_none() {
            return Err(AuthError::UnknownMud(mud_name.to_string()));
        }
        self.store
            .set(&key, &hash_api_key(new_api_key), None)
            .await?;
        Ok(())
    }

    /// Exchange a `(mud_name, api_key)` pair for a fresh bearer session
    /// token. Called by the registration surface, not by the wire protocol.
    pub async fn issue_token(&self, mud_name: &str, api_key: &str) -> Result<IssuedSession> {
        let stored_hash = self
            .store
            .get(&keys::apikey(mud_name))
            .await?
            .ok_or_else(|| AuthError::UnknownMud(mud_name.to_string()))?;

        if stored_hash != hash_api_key(api_key) {
            return Err(AuthError::BadApiKey);
        }

        let token = generate_token();
        let issued_at = Utc::now();
        let record = SessionRecord {
            mud: mud_name.to_string(),
            issued_at,
            expires_at: issued_at + self.session_ttl,
        };
        let json = serde_json::to_string(&record)?;
        self.store
            .set(&keys::session(&token), &json, Some(self.session_ttl))
            .await?;

        #[cfg(feature = "metrics")]
        gauge!(auth_metrics::ACTIVE_SESSIONS).increment(1.0);

        Ok(IssuedSession { token, record })
    }

    /// Validate a bearer token presented on an inbound `auth` envelope.
    /// Returns the MUD name the session belongs to on success.
    pub async fn authenticate(&self, mud_name: &str, token: &str) -> Result<String> {
        #[cfg(feature = "metrics")]
        counter!(auth_metrics::ATTEMPTS_TOTAL).increment(1);

        let result = self.authenticate_inner(mud_name, token).await;

        #[cfg(feature = "metrics")]
        match &result {
            Ok(_) => counter!(auth_metrics::SUCCESS_TOTAL).increment(1),
            Err(_) => counter!(auth_metrics::FAILURES_TOTAL).increment(1),
        }

        result
    }

    async fn authenticate_inner(&self, mud_name: &str, token: &str) -> Result<String> {
        let Some(json) = self.store.get(&keys::session(token)).await? else {
            return Err(AuthError::BadToken);
        };
        let record: SessionRecord = serde_json::from_str(&json)?;

        if record.expires_at <= Utc::now() {
            self.store.del(&keys::session(token)).await?;
            return Err(AuthError::BadToken);
        }
        if record.mud != mud_name {
            return Err(AuthError::BadToken);
        }

        Ok(record.mud)
    }

    /// Revoke a session before its TTL naturally expires it.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.store.del(&keys::session(token)).await?;

        #[cfg(feature = "metrics")]
        gauge!(auth_metrics::ACTIVE_SESSIONS).decrement(1.0);

        Ok(())
    }
}

fn hash_api_key(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)
}

/// 256 bits of entropy, hex-encoded. Two UUIDv4s rather than a raw RNG call
/// so the crate doesn't need to pick an RNG API to trust for CSPRNG output.
fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use mudvault_store::memory::InMemoryStore;

    use super::*;

    fn service() -> AuthService {
        AuthService::new(
            InMemoryStore::new(),
            Duration::from_secs(3600),
            Some("shhh".to_string()),
        )
    }

    #[tokio::test]
    async fn register_then_issue_then_authenticate() {
        let svc = service();
        svc.register("Alpha", "apikey-123", "shhh").await.unwrap();

        let issued = svc.issue_token("Alpha", "apikey-123").await.unwrap();
        let mud = svc.authenticate("Alpha", &issued.token).await.unwrap();
        assert_eq!(mud, "Alpha");
    }

    #[tokio::test]
    async fn register_rejects_wrong_secret() {
        let svc = service();
        let err = svc
            .register("Alpha", "apikey-123", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadRegistrationSecret));
    }

    #[tokio::test]
    async fn register_rejects_duplicate() {
        let svc = service();
        svc.register("Alpha", "apikey-123", "shhh").await.unwrap();
        let err = svc
            .register("Alpha", "apikey-456", "shhh")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn issue_token_rejects_wrong_api_key() {
        let svc = service();
        svc.register("Alpha", "apikey-123", "shhh").await.unwrap();
        let err = svc.issue_token("Alpha", "wrong-key").await.unwrap_err();
        assert!(matches!(err, AuthError::BadApiKey));
    }

    #[tokio::test]
    async fn issue_token_rejects_unknown_mud() {
        let svc = service();
        let err = svc.issue_token("Ghost", "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownMud(_)));
    }

    #[tokio::test]
    async fn authenticate_rejects_mud_name_mismatch() {
        let svc = service();
        svc.register("Alpha", "apikey-123", "shhh").await.unwrap();
        let issued = svc.issue_token("Alpha", "apikey-123").await.unwrap();

        let err = svc.authenticate("Beta", &issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::BadToken));
    }

    #[tokio::test]
    async fn revoke_invalidates_session() {
        let svc = service();
        svc.register("Alpha", "apikey-123", "shhh").await.unwrap();
        let issued = svc.issue_token("Alpha", "apikey-123").await.unwrap();

        svc.revoke(&issued.token).await.unwrap();

        let err = svc.authenticate("Alpha", &issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::BadToken));
    }

    #[tokio::test]
    async fn rotate_api_key_replaces_old_key() {
        let svc = service();
        svc.register("Alpha", "apikey-123", "shhh").await.unwrap();
        svc.rotate_api_key("Alpha", "apikey-456", "shhh")
            .await
            .unwrap();

        assert!(matches!(
            svc.issue_token("Alpha", "apikey-123").await.unwrap_err(),
            AuthError::BadApiKey
        ));
        assert!(svc.issue_token("Alpha", "apikey-456").await.is_ok());
    }
}
