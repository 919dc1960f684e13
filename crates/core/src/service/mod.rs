//! Snippet lifecycle orchestration.
//!
//! [`SnippetService`] binds the store, the cache-aside layer, the encryption
//! envelope and the password scheme into create/read/update/delete:
//!
//! - reads go cache → replica, and only non-expired rows are cached
//! - updates and deletes decide on rows fetched from the primary, never the
//!   cache, and delete the cache entry once the write has been issued
//! - content is decrypted only after every gate has passed
//!
//! Gates run in a fixed order: expiry, then edit token, then password.

pub mod rules;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::{SnippetCache, snippet_key};
use crate::config::AppConfig;
use crate::crypto::Envelope;
use crate::password::{Argon2Scheme, PasswordScheme};
use crate::store::{
    DEFAULT_CONTENT_TYPE, NewSnippet, SnippetRow, Store, UpdateSnippetContentParams, UpdateSnippetParams,
};

use rules::{generate_edit_token, non_empty, parse_expires_in, tokens_match};

/// Input for [`SnippetService::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSnippet {
    pub content: String,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub password: Option<String>,
    /// Humantime duration; defaults to 365 days.
    pub expires_in: Option<String>,
}

/// Returned once at creation. The edit token is never shown again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSnippet {
    pub public_id: String,
    pub edit_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input for [`SnippetService::update`].
///
/// Title and expiry are replaced, not merged: an absent title clears it and
/// an absent `expires_in` re-applies the default lifetime. An absent content
/// type keeps the current one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSnippet {
    pub content: String,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub expires_in: Option<String>,
}

/// Decrypted snippet as returned by read and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetView {
    pub public_id: String,
    pub title: Option<String>,
    pub content: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_edited_at: Option<DateTime<Utc>>,
}

/// The business-rule layer over store, cache and crypto.
#[derive(Debug, Clone)]
pub struct SnippetService {
    store: Arc<Store>,
    cache: SnippetCache,
    envelope: Arc<Envelope>,
    passwords: Arc<dyn PasswordScheme>,
}

impl SnippetService {
    pub fn new(store: Arc<Store>, cache: SnippetCache, envelope: Envelope, passwords: Arc<dyn PasswordScheme>) -> Self {
        Self { store, cache, envelope: Arc::new(envelope), passwords }
    }

    /// Build every collaborator from configuration.
    ///
    /// # Errors
    ///
    /// Fails on a missing or malformed key or an unreachable database. An
    /// unreachable cache only disables caching.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let envelope = Envelope::from_base64_key(config.require_encryption_key()?)?;
        let store = Store::open(&config.db).await?;
        let cache = SnippetCache::connect(&config.cache).await;

        Ok(Self::new(Arc::new(store), cache, envelope, Arc::new(Argon2Scheme::new())))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cache(&self) -> &SnippetCache {
        &self.cache
    }

    /// Store new content and hand back its id and edit token.
    ///
    /// # Errors
    ///
    /// `Error::Validation` for a bad `expires_in`; storage and crypto errors
    /// propagate unchanged.
    pub async fn create(&self, req: CreateSnippet) -> Result<CreatedSnippet, Error> {
        let now = Utc::now();
        let expires_at = parse_expires_in(non_empty(req.expires_in).as_deref(), now)?;

        let password_hash = match non_empty(req.password) {
            Some(password) => Some(self.hash_password(password).await?),
            None => None,
        };
        let encrypted_content = self.envelope.encrypt(req.content.as_bytes())?;

        let row = self
            .store
            .primary()
            .create_snippet(NewSnippet {
                title: non_empty(req.title),
                content_type: non_empty(req.content_type).unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                encrypted_content,
                password_hash,
                edit_token: generate_edit_token(),
                created_at: now,
                expires_at: Some(expires_at),
            })
            .await?;

        tracing::info!(public_id = %row.public_id, protected = row.password_hash.is_some(), "snippet created");

        Ok(CreatedSnippet { public_id: row.public_id, edit_token: row.edit_token, expires_at: row.expires_at })
    }

    /// Fetch and decrypt a snippet.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the snippet does not exist or has expired
    /// - `Error::Forbidden` if it is password protected and `password` is
    ///   absent or wrong
    pub async fn read(&self, public_id: &str, password: Option<&str>) -> Result<SnippetView, Error> {
        let key = snippet_key(public_id);

        let row = match self.cache.get::<SnippetRow>(&key).await {
            Some(row) => {
                tracing::debug!(public_id, "cache hit");
                if row.is_expired_at(Utc::now()) {
                    self.cache.delete(&key).await;
                    return Err(Error::NotFound(format!("snippet {public_id}")));
                }
                row
            }
            None => {
                let replica = self.store.replica();
                tracing::debug!(public_id, pool = replica.pool_name(), "cache miss");
                let row = replica.get_snippet_by_public_id(public_id).await?;
                if row.is_expired_at(Utc::now()) {
                    return Err(Error::NotFound(format!("snippet {public_id}")));
                }
                self.cache.set(&key, &row).await;
                row
            }
        };

        self.check_password(&row, password).await?;
        self.view(row)
    }

    /// Replace a snippet's content and metadata.
    ///
    /// # Errors
    ///
    /// `NotFound` (missing or expired), `Unauthorized` (edit token),
    /// `Forbidden` (password), `Validation` (bad `expires_in`), in that order.
    pub async fn update(
        &self, public_id: &str, edit_token: &str, password: Option<&str>, req: UpdateSnippet,
    ) -> Result<SnippetView, Error> {
        let current = self.authorize(public_id, edit_token).await?;
        self.check_password(&current, password).await?;

        let now = Utc::now();
        let expires_at = parse_expires_in(non_empty(req.expires_in).as_deref(), now)?;
        let encrypted_content = self.envelope.encrypt(req.content.as_bytes())?;

        let meta = UpdateSnippetParams {
            id: current.id,
            title: non_empty(req.title),
            expires_at: Some(expires_at),
            last_edited_at: now,
        };
        let content = UpdateSnippetContentParams {
            snippet_id: current.id,
            content_type: non_empty(req.content_type).unwrap_or(current.content_type),
            encrypted_content,
        };

        let committed = self
            .store
            .with_transaction(move |q| {
                q.update_snippet(&meta)?;
                q.update_snippet_content(&content)
            })
            .await;

        // A timed-out transaction may still have committed.
        self.cache.delete(&snippet_key(public_id)).await;
        committed?;
        tracing::info!(public_id, "snippet updated");

        let updated = self.store.primary().get_snippet_by_public_id(public_id).await?;
        self.view(updated)
    }

    /// Remove a snippet.
    ///
    /// # Errors
    ///
    /// `NotFound` (missing, expired, or removed concurrently) or
    /// `Unauthorized` (edit token).
    pub async fn delete(&self, public_id: &str, edit_token: &str) -> Result<(), Error> {
        let current = self.authorize(public_id, edit_token).await?;

        let deleted = self.store.primary().delete_snippet_by_id(current.id).await;
        self.cache.delete(&snippet_key(public_id)).await;

        match deleted? {
            0 => Err(Error::NotFound(format!("snippet {public_id}"))),
            _ => {
                tracing::info!(public_id, "snippet deleted");
                Ok(())
            }
        }
    }

    /// Primary fetch plus the expiry and edit-token gates shared by mutations.
    async fn authorize(&self, public_id: &str, edit_token: &str) -> Result<SnippetRow, Error> {
        let row = self.store.primary().get_snippet_by_public_id(public_id).await?;
        if row.is_expired_at(Utc::now()) {
            return Err(Error::NotFound(format!("snippet {public_id}")));
        }
        if !tokens_match(edit_token, &row.edit_token) {
            tracing::debug!(public_id, "edit token mismatch");
            return Err(Error::Unauthorized("invalid edit token".into()));
        }
        Ok(row)
    }

    async fn check_password(&self, row: &SnippetRow, supplied: Option<&str>) -> Result<(), Error> {
        let Some(hash) = row.password_hash.clone() else {
            return Ok(());
        };
        let Some(password) = supplied.map(str::to_string) else {
            return Err(Error::Forbidden("password required".into()));
        };

        let scheme = self.passwords.clone();
        let verified = tokio::task::spawn_blocking(move || scheme.verify(&password, &hash))
            .await
            .map_err(|e| Error::Password(e.to_string()))?;

        if verified { Ok(()) } else { Err(Error::Forbidden("invalid password".into())) }
    }

    async fn hash_password(&self, password: String) -> Result<String, Error> {
        let scheme = self.passwords.clone();
        tokio::task::spawn_blocking(move || scheme.hash(&password))
            .await
            .map_err(|e| Error::Password(e.to_string()))?
    }

    fn view(&self, row: SnippetRow) -> Result<SnippetView, Error> {
        let plaintext = self.envelope.decrypt(&row.encrypted_content)?;
        let content =
            String::from_utf8(plaintext).map_err(|e| Error::CorruptRow(format!("content is not UTF-8: {e}")))?;

        Ok(SnippetView {
            public_id: row.public_id,
            title: row.title,
            content,
            content_type: row.content_type,
            created_at: row.created_at,
            expires_at: row.expires_at,
            last_edited_at: row.last_edited_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SqliteCacheBackend;
    use std::time::Duration;

    const KEY: [u8; 32] = [7; 32];

    async fn service() -> SnippetService {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let backend = Arc::new(SqliteCacheBackend::open_in_memory().await.unwrap());
        let cache = SnippetCache::new(backend, Duration::from_secs(60), Duration::from_secs(1));
        let passwords = Arc::new(Argon2Scheme::with_params(argon2::Params::new(1024, 1, 1, None).unwrap()));
        SnippetService::new(store, cache, Envelope::from_key_bytes(&KEY).unwrap(), passwords)
    }

    fn plain(content: &str) -> CreateSnippet {
        CreateSnippet { content: content.into(), ..Default::default() }
    }

    async fn cached(svc: &SnippetService, public_id: &str) -> Option<SnippetRow> {
        svc.cache().get::<SnippetRow>(&snippet_key(public_id)).await
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let svc = service().await;
        let before = Utc::now();
        let created = svc
            .create(CreateSnippet { title: Some(String::new()), content_type: Some(String::new()), ..plain("hi") })
            .await
            .unwrap();

        assert_eq!(created.public_id.len(), 10);
        assert_eq!(created.edit_token.len(), 64);
        // stored with millisecond precision
        let expires_at = created.expires_at.unwrap();
        assert!(expires_at > before + chrono::Duration::days(364));

        let view = svc.read(&created.public_id, None).await.unwrap();
        assert_eq!(view.content, "hi");
        assert_eq!(view.content_type, DEFAULT_CONTENT_TYPE);
        assert!(view.title.is_none());
        assert!(view.last_edited_at.is_none());
    }

    #[tokio::test]
    async fn test_content_is_stored_encrypted() {
        let svc = service().await;
        let created = svc.create(plain("top secret")).await.unwrap();
        let row = svc.store().primary().get_snippet_by_public_id(&created.public_id).await.unwrap();
        assert!(!row.encrypted_content.windows(10).any(|w| w == b"top secret"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_expiry_before_writing() {
        let svc = service().await;
        let err = svc.create(CreateSnippet { expires_in: Some("whenever".into()), ..plain("x") }).await;
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_read_populates_cache() {
        let svc = service().await;
        let created = svc.create(plain("hello")).await.unwrap();
        assert!(cached(&svc, &created.public_id).await.is_none());

        svc.read(&created.public_id, None).await.unwrap();
        let row = cached(&svc, &created.public_id).await.unwrap();
        assert_eq!(row.public_id, created.public_id);
    }

    #[tokio::test]
    async fn test_read_unknown_is_not_found() {
        let svc = service().await;
        assert!(matches!(svc.read("nope", None).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_snippet_is_not_found_and_not_cached() {
        let svc = service().await;
        let row = svc
            .store()
            .primary()
            .create_snippet(NewSnippet {
                title: None,
                content_type: DEFAULT_CONTENT_TYPE.into(),
                encrypted_content: Envelope::from_key_bytes(&KEY).unwrap().encrypt(b"old").unwrap(),
                password_hash: None,
                edit_token: generate_edit_token(),
                created_at: Utc::now() - chrono::Duration::hours(2),
                expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            })
            .await
            .unwrap();

        assert!(matches!(svc.read(&row.public_id, None).await, Err(Error::NotFound(_))));
        assert!(cached(&svc, &row.public_id).await.is_none());

        let err = svc.delete(&row.public_id, &row.edit_token).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_cache_hit_is_evicted() {
        let svc = service().await;
        let created = svc.create(plain("soon gone")).await.unwrap();
        svc.read(&created.public_id, None).await.unwrap();

        let mut row = cached(&svc, &created.public_id).await.unwrap();
        row.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        svc.cache().set(&snippet_key(&created.public_id), &row).await;

        assert!(matches!(svc.read(&created.public_id, None).await, Err(Error::NotFound(_))));
        assert!(cached(&svc, &created.public_id).await.is_none());
    }

    #[tokio::test]
    async fn test_password_gate_on_read() {
        let svc = service().await;
        let created = svc.create(CreateSnippet { password: Some("pw".into()), ..plain("guarded") }).await.unwrap();

        assert!(matches!(svc.read(&created.public_id, None).await, Err(Error::Forbidden(_))));
        assert!(matches!(svc.read(&created.public_id, Some("bad")).await, Err(Error::Forbidden(_))));
        assert_eq!(svc.read(&created.public_id, Some("pw")).await.unwrap().content, "guarded");
        // served from the cache the second time; the gate still applies
        assert!(matches!(svc.read(&created.public_id, Some("bad")).await, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_empty_password_means_unprotected() {
        let svc = service().await;
        let created = svc.create(CreateSnippet { password: Some(String::new()), ..plain("open") }).await.unwrap();
        assert_eq!(svc.read(&created.public_id, None).await.unwrap().content, "open");
    }

    #[tokio::test]
    async fn test_update_replaces_and_invalidates() {
        let svc = service().await;
        let created = svc
            .create(CreateSnippet {
                title: Some("first".into()),
                content_type: Some("text/x-rust".into()),
                ..plain("v1")
            })
            .await
            .unwrap();
        svc.read(&created.public_id, None).await.unwrap();
        assert!(cached(&svc, &created.public_id).await.is_some());

        let updated = svc
            .update(
                &created.public_id,
                &created.edit_token,
                None,
                UpdateSnippet { content: "v2".into(), expires_in: Some("2h".into()), ..Default::default() },
            )
            .await
            .unwrap();

        assert_eq!(updated.content, "v2");
        assert!(updated.title.is_none());
        assert_eq!(updated.content_type, "text/x-rust");
        assert!(updated.last_edited_at.is_some());
        assert!(updated.expires_at.unwrap() < Utc::now() + chrono::Duration::hours(3));
        assert!(cached(&svc, &created.public_id).await.is_none());

        assert_eq!(svc.read(&created.public_id, None).await.unwrap().content, "v2");
    }

    #[tokio::test]
    async fn test_update_gates_in_order() {
        let svc = service().await;
        let created = svc.create(CreateSnippet { password: Some("pw".into()), ..plain("v1") }).await.unwrap();
        let req = || UpdateSnippet { content: "v2".into(), ..Default::default() };

        let err = svc.update("missing", &created.edit_token, Some("pw"), req()).await;
        assert!(matches!(err, Err(Error::NotFound(_))));

        let err = svc.update(&created.public_id, "wrong", None, req()).await;
        assert!(matches!(err, Err(Error::Unauthorized(_))));

        let err = svc.update(&created.public_id, &created.edit_token, None, req()).await;
        assert!(matches!(err, Err(Error::Forbidden(_))));

        let bad_expiry = UpdateSnippet { expires_in: Some("never".into()), ..req() };
        let err = svc.update(&created.public_id, &created.edit_token, Some("pw"), bad_expiry).await;
        assert!(matches!(err, Err(Error::Validation(_))));

        assert_eq!(svc.read(&created.public_id, Some("pw")).await.unwrap().content, "v1");
    }

    #[tokio::test]
    async fn test_delete_requires_token_and_evicts() {
        let svc = service().await;
        let created = svc.create(plain("bye")).await.unwrap();
        svc.read(&created.public_id, None).await.unwrap();

        let err = svc.delete(&created.public_id, "wrong").await;
        assert!(matches!(err, Err(Error::Unauthorized(_))));
        assert!(cached(&svc, &created.public_id).await.is_some());

        svc.delete(&created.public_id, &created.edit_token).await.unwrap();
        assert!(cached(&svc, &created.public_id).await.is_none());
        assert!(matches!(svc.read(&created.public_id, None).await, Err(Error::NotFound(_))));
        assert!(matches!(svc.delete(&created.public_id, &created.edit_token).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_works_without_cache() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let passwords = Arc::new(Argon2Scheme::with_params(argon2::Params::new(1024, 1, 1, None).unwrap()));
        let envelope = Envelope::from_key_bytes(&KEY).unwrap();
        let svc = SnippetService::new(store, SnippetCache::disabled(), envelope, passwords);

        let created = svc.create(plain("no cache")).await.unwrap();
        assert_eq!(svc.read(&created.public_id, None).await.unwrap().content, "no cache");
        svc.delete(&created.public_id, &created.edit_token).await.unwrap();
    }
}
