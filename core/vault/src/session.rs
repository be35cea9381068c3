//! Vault session state machine.
//!
//! A [`VaultSession`] owns the only decrypted copy of the vault and the key
//! that re-encrypts it. Every transition runs under one async mutex, so an
//! unlock, a mutation with its encrypt-and-save, a manual lock and an idle
//! lock never interleave.
//!
//! ```text
//! Uninitialized --initialize--> Locked --unlock--> Unlocked
//!                                  ^                  |
//!                                  +--lock / idle-----+
//! ```

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::SessionConfig;
use crate::engine::CryptoEngine;
use crate::idle::{is_idle, IdleTimer};
use crate::model::{CredentialEntry, EntryFields, EntryUpdate, Vault};
use pearanoid_common::{EntryId, Error, Result};
use pearanoid_crypto::{EncryptedVault, SessionKey};
use pearanoid_storage::StorageProvider;

/// Coarse session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// Storage has not been checked yet.
    Uninitialized,
    Locked,
    Unlocked,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStatus::Uninitialized => write!(f, "uninitialized"),
            LockStatus::Locked => write!(f, "locked"),
            LockStatus::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// Why the session last left the unlocked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Manual,
    IdleTimeout,
}

/// Published view of the session. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: LockStatus,
    pub vault_exists: bool,
    pub loading: bool,
    pub last_error: Option<String>,
    pub last_lock: Option<LockReason>,
    pub sections: Vec<String>,
    pub entry_count: usize,
}

impl SessionSnapshot {
    pub fn is_initialized(&self) -> bool {
        self.status != LockStatus::Uninitialized
    }
}

struct Unlocked {
    vault: Vault,
    key: SessionKey,
    last_activity: Instant,
    sections: Vec<String>,
    timer: IdleTimer,
}

impl Unlocked {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn refresh_sections(&mut self) {
        self.sections = self.vault.sections();
    }
}

enum State {
    Uninitialized,
    Locked { exists: bool },
    Unlocked(Box<Unlocked>),
}

struct Inner {
    state: State,
    loading: bool,
    last_error: Option<String>,
    last_lock: Option<LockReason>,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        let (status, vault_exists, sections, entry_count) = match &self.state {
            State::Uninitialized => (LockStatus::Uninitialized, false, Vec::new(), 0),
            State::Locked { exists } => (LockStatus::Locked, *exists, Vec::new(), 0),
            State::Unlocked(u) => (
                LockStatus::Unlocked,
                true,
                u.sections.clone(),
                u.vault.len(),
            ),
        };

        SessionSnapshot {
            status,
            vault_exists,
            loading: self.loading,
            last_error: self.last_error.clone(),
            last_lock: self.last_lock,
            sections,
            entry_count,
        }
    }

    fn unlocked(&self) -> Option<&Unlocked> {
        match &self.state {
            State::Unlocked(u) => Some(&**u),
            _ => None,
        }
    }

    fn unlocked_mut(&mut self) -> Option<&mut Unlocked> {
        match &mut self.state {
            State::Unlocked(u) => Some(&mut **u),
            _ => None,
        }
    }
}

struct Shared {
    engine: CryptoEngine,
    provider: Arc<dyn StorageProvider>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    events: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.events.send_replace(inner.snapshot());
    }

    /// Mark the start of a storage round trip.
    fn begin(&self, inner: &mut Inner) {
        inner.loading = true;
        inner.last_error = None;
        self.publish(inner);
    }

    /// Mark the end of a storage round trip, recording any error.
    fn finish<T>(&self, inner: &mut Inner, result: &Result<T>) {
        inner.loading = false;
        if let Err(e) = result {
            inner.last_error = Some(e.to_string());
        }
        self.publish(inner);
    }

    /// Drop the decrypted vault and key. Returns whether anything was locked.
    fn lock(&self, inner: &mut Inner, reason: LockReason) -> bool {
        if !matches!(inner.state, State::Unlocked(_)) {
            return false;
        }
        // Replacing the state drops the vault, the key and the timer.
        inner.state = State::Locked { exists: true };
        inner.last_lock = Some(reason);
        info!(reason = ?reason, "Vault locked");
        self.publish(inner);
        true
    }

    /// Lock if the session has been inactive for longer than the timeout.
    fn expire_if_idle(&self, inner: &mut Inner, now: Instant) -> bool {
        let idle = match inner.unlocked() {
            Some(u) => is_idle(u.last_activity, now, self.config.idle_timeout()),
            None => return false,
        };
        idle && self.lock(inner, LockReason::IdleTimeout)
    }

    /// Re-encrypt the current vault with the held key and save it.
    async fn save(&self, inner: &Inner) -> Result<()> {
        let Some(unlocked) = inner.unlocked() else {
            return Ok(());
        };
        let engine = self.engine.clone();
        let vault = unlocked.vault.clone();
        let key = unlocked.key.clone();
        let blob = blocking(move || engine.encrypt_with_key(&vault, &key)).await?;
        self.provider.save_encrypted_vault(blob.into_bytes()).await
    }

    /// Persist after a mutation. The in-memory change stays on failure.
    async fn persist(&self, inner: &mut Inner) -> Result<()> {
        inner.loading = true;
        self.publish(inner);

        let result = self.save(inner).await;
        match &result {
            Ok(()) => {
                inner.last_error = None;
                debug!(provider = %self.provider.name(), "Vault saved");
            }
            Err(e) => warn!(
                error = %e,
                retryable = e.is_retryable(),
                "Failed to save vault"
            ),
        }
        self.finish(inner, &result);
        result
    }
}

/// Run CPU-bound crypto on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Crypto(format!("Crypto task failed: {}", e)))?
}

/// Handle to the client's vault session.
///
/// Cloning is cheap; all clones share one state.
#[derive(Clone)]
pub struct VaultSession {
    shared: Arc<Shared>,
}

impl VaultSession {
    /// Create an uninitialized session over `provider`.
    ///
    /// # Errors
    /// - `InvalidInput` or `Crypto` if `config` fails validation
    pub fn new(provider: Arc<dyn StorageProvider>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let engine = CryptoEngine::new(config.kdf.clone())?;

        let inner = Inner {
            state: State::Uninitialized,
            loading: false,
            last_error: None,
            last_lock: None,
        };
        let (events, _) = watch::channel(inner.snapshot());

        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                provider,
                config,
                inner: Mutex::new(inner),
                events,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Check storage for an existing vault.
    ///
    /// # Postconditions
    /// - `Locked { exists }` on success, where `exists` reflects storage
    /// - State unchanged on a transport failure
    /// - No-op while unlocked
    pub async fn initialize(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if inner.unlocked().is_some() {
            debug!("Session already unlocked, skipping initialize");
            return Ok(());
        }

        self.shared.begin(&mut inner);
        let result = match self.shared.provider.fetch_encrypted_vault().await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        };

        match &result {
            Ok(exists) => {
                inner.state = State::Locked { exists: *exists };
                info!(
                    provider = %self.shared.provider.name(),
                    exists = *exists,
                    "Session initialized"
                );
            }
            Err(e) => warn!(error = %e, "Failed to check storage"),
        }
        self.shared.finish(&mut inner, &result);
        result.map(|_| ())
    }

    /// Unlock with the master password, creating an empty vault if storage
    /// holds none.
    ///
    /// # Preconditions
    /// - Session is `Locked` (call [`Self::initialize`] first)
    ///
    /// # Postconditions
    /// - On success the vault and its key are installed together and the
    ///   idle timer is armed
    /// - On failure the session stays locked with no key material
    ///
    /// # Errors
    /// - `NotPermitted` if uninitialized or already unlocked
    /// - `Authentication` for a wrong password or corrupt blob
    /// - `Transport` if storage is unreachable
    pub async fn unlock(&self, password: &[u8]) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        match inner.state {
            State::Uninitialized => {
                return Err(Error::NotPermitted(
                    "Session is not initialized".to_string(),
                ))
            }
            State::Unlocked(_) => {
                return Err(Error::NotPermitted("Vault is already unlocked".to_string()))
            }
            State::Locked { .. } => {}
        }

        self.shared.begin(&mut inner);
        let password = Zeroizing::new(password.to_vec());
        let result = self.open_or_create(&mut inner, password).await;

        match &result {
            Ok(()) => info!(
                entries = inner.unlocked().map(|u| u.vault.len()).unwrap_or(0),
                "Vault unlocked"
            ),
            Err(e) => warn!(error = %e, "Unlock failed"),
        }
        self.shared.finish(&mut inner, &result);
        result
    }

    async fn open_or_create(&self, inner: &mut Inner, password: Zeroizing<Vec<u8>>) -> Result<()> {
        let fetched = match self.shared.provider.fetch_encrypted_vault().await {
            Ok(bytes) => Some(bytes),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        inner.state = State::Locked {
            exists: fetched.is_some(),
        };

        let engine = self.shared.engine.clone();
        let (vault, key) = match fetched {
            Some(bytes) => {
                let blob = EncryptedVault::from_bytes(bytes)?;
                blocking(move || engine.decrypt(&blob, &password)).await?
            }
            None => {
                let (vault, key, blob) = blocking(move || {
                    let vault = Vault::new();
                    let key = engine.new_session_key(&password)?;
                    let blob = engine.encrypt_with_key(&vault, &key)?;
                    Ok((vault, key, blob))
                })
                .await?;
                self.shared
                    .provider
                    .save_encrypted_vault(blob.into_bytes())
                    .await?;
                info!(provider = %self.shared.provider.name(), "Created new vault");
                (vault, key)
            }
        };

        let sections = vault.sections();
        inner.state = State::Unlocked(Box::new(Unlocked {
            vault,
            key,
            last_activity: Instant::now(),
            sections,
            timer: self.arm_idle_timer(),
        }));
        inner.last_lock = None;
        Ok(())
    }

    fn arm_idle_timer(&self) -> IdleTimer {
        let weak = Arc::downgrade(&self.shared);
        IdleTimer::arm(self.shared.config.check_interval(), move |token| {
            let weak = weak.clone();
            async move {
                let Some(shared) = weak.upgrade() else {
                    return true;
                };
                let mut inner = shared.inner.lock().await;
                // A lock may have won the mutex while this tick waited.
                if token.is_cancelled() || inner.unlocked().is_none() {
                    return true;
                }
                shared.expire_if_idle(&mut inner, Instant::now())
            }
        })
    }

    /// Lock immediately. No-op unless unlocked.
    pub async fn lock(&self) {
        let mut inner = self.shared.inner.lock().await;
        self.shared.lock(&mut inner, LockReason::Manual);
    }

    /// Lock if the idle timeout has elapsed. Returns whether it locked.
    pub async fn lock_if_idle(&self) -> bool {
        let mut inner = self.shared.inner.lock().await;
        self.shared.expire_if_idle(&mut inner, Instant::now())
    }

    /// Record user activity, postponing the idle lock.
    pub async fn touch_activity(&self) {
        let mut inner = self.shared.inner.lock().await;
        if let Some(unlocked) = inner.unlocked_mut() {
            unlocked.touch();
        }
    }

    /// Add an entry and persist the vault.
    ///
    /// Returns `Ok(None)` without doing anything while locked.
    ///
    /// # Errors
    /// - `Validation` if name or password is blank (nothing changes)
    /// - storage errors from the save; the entry stays in memory
    pub async fn add_entry(&self, fields: EntryFields) -> Result<Option<EntryId>> {
        let mut inner = self.shared.inner.lock().await;
        let Some(unlocked) = inner.unlocked_mut() else {
            debug!("Vault locked, ignoring add");
            return Ok(None);
        };

        let id = unlocked.vault.add(&fields, Utc::now())?;
        unlocked.touch();
        unlocked.refresh_sections();
        debug!(entry_id = %id, "Entry added");

        self.shared.persist(&mut inner).await?;
        Ok(Some(id))
    }

    /// Merge `update` into an entry and persist the vault.
    ///
    /// An unknown id changes nothing but the vault is still saved.
    pub async fn update_entry(&self, id: &EntryId, update: EntryUpdate) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let Some(unlocked) = inner.unlocked_mut() else {
            debug!("Vault locked, ignoring update");
            return Ok(());
        };

        let found = unlocked.vault.update(id, &update, Utc::now())?;
        unlocked.touch();
        unlocked.refresh_sections();
        debug!(entry_id = %id, found, "Entry updated");

        self.shared.persist(&mut inner).await
    }

    /// Remove an entry and persist the vault.
    pub async fn delete_entry(&self, id: &EntryId) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let Some(unlocked) = inner.unlocked_mut() else {
            debug!("Vault locked, ignoring delete");
            return Ok(());
        };

        let found = unlocked.vault.remove(id);
        unlocked.touch();
        unlocked.refresh_sections();
        debug!(entry_id = %id, found, "Entry deleted");

        self.shared.persist(&mut inner).await
    }

    /// Owned copies of all entries, or `None` while locked.
    pub async fn entries(&self) -> Option<Vec<CredentialEntry>> {
        self.with_entries(|entries| entries.to_vec()).await
    }

    /// Run `f` over the entries without copying them out.
    pub async fn with_entries<R>(&self, f: impl FnOnce(&[CredentialEntry]) -> R) -> Option<R> {
        let inner = self.shared.inner.lock().await;
        inner.unlocked().map(|u| f(u.vault.entries()))
    }

    pub async fn entry(&self, id: &EntryId) -> Option<CredentialEntry> {
        let inner = self.shared.inner.lock().await;
        inner.unlocked().and_then(|u| u.vault.get(id).cloned())
    }

    /// Entries matching `query` in any non-secret field. Counts as activity.
    pub async fn search(&self, query: &str) -> Option<Vec<CredentialEntry>> {
        let mut inner = self.shared.inner.lock().await;
        let unlocked = inner.unlocked_mut()?;
        unlocked.touch();
        Some(unlocked.vault.search(query))
    }

    /// Whether a vault and key are currently held in memory.
    pub async fn has_key_material(&self) -> bool {
        self.shared.inner.lock().await.unlocked().is_some()
    }

    /// Whether an idle timer is currently running.
    pub async fn idle_timer_armed(&self) -> bool {
        let inner = self.shared.inner.lock().await;
        inner.unlocked().map(|u| u.timer.is_armed()).unwrap_or(false)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.events.borrow().clone()
    }

    /// Receive a new snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.events.subscribe()
    }

    pub fn status(&self) -> LockStatus {
        self.shared.events.borrow().status
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.events.borrow().is_initialized()
    }

    pub fn vault_exists(&self) -> bool {
        self.shared.events.borrow().vault_exists
    }

    /// Distinct non-empty sections of the unlocked vault, sorted.
    pub fn sections(&self) -> Vec<String> {
        self.shared.events.borrow().sections.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.events.borrow().last_error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.events.borrow().loading
    }
}

impl fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSession")
            .field("provider", &self.shared.provider.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sections_of;
    use pearanoid_crypto::KdfParams;
    use pearanoid_storage::MemoryProvider;
    use std::time::Duration;

    const PASSWORD: &[u8] = b"correct horse";

    fn test_config() -> SessionConfig {
        SessionConfig {
            kdf: KdfParams::minimum(),
            ..SessionConfig::default()
        }
    }

    fn new_session() -> (VaultSession, Arc<MemoryProvider>) {
        let provider = Arc::new(MemoryProvider::new());
        let session = VaultSession::new(provider.clone(), test_config()).unwrap();
        (session, provider)
    }

    async fn unlocked_session() -> (VaultSession, Arc<MemoryProvider>) {
        let (session, provider) = new_session();
        session.initialize().await.unwrap();
        session.unlock(PASSWORD).await.unwrap();
        (session, provider)
    }

    async fn stored_vault(provider: &MemoryProvider) -> Vault {
        let bytes = provider.snapshot().await.unwrap();
        let blob = EncryptedVault::from_bytes(bytes).unwrap();
        let engine = CryptoEngine::new(KdfParams::minimum()).unwrap();
        engine.decrypt(&blob, PASSWORD).unwrap().0
    }

    #[tokio::test]
    async fn test_initialize_empty_storage() {
        let (session, _) = new_session();
        assert_eq!(session.status(), LockStatus::Uninitialized);
        assert!(!session.is_initialized());

        session.initialize().await.unwrap();

        assert_eq!(session.status(), LockStatus::Locked);
        assert!(session.is_initialized());
        assert!(!session.vault_exists());
    }

    #[tokio::test]
    async fn test_initialize_transport_failure_keeps_state() {
        let (session, provider) = new_session();
        provider.set_fail_fetches(true);

        let result = session.initialize().await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(session.status(), LockStatus::Uninitialized);
        assert!(session.last_error().is_some());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_unlock_requires_initialize() {
        let (session, _) = new_session();
        assert!(matches!(
            session.unlock(PASSWORD).await,
            Err(Error::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn test_first_unlock_creates_vault() {
        let (session, provider) = unlocked_session().await;

        assert_eq!(session.status(), LockStatus::Unlocked);
        assert!(session.vault_exists());
        assert!(session.has_key_material().await);
        assert!(session.idle_timer_armed().await);
        assert_eq!(session.entries().await.unwrap().len(), 0);
        assert_eq!(provider.save_count(), 1);

        let stored = stored_vault(&provider).await;
        assert_eq!(stored.version, 1);
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_unlock_twice_not_permitted() {
        let (session, _) = unlocked_session().await;
        assert!(matches!(
            session.unlock(PASSWORD).await,
            Err(Error::NotPermitted(_))
        ));
        assert_eq!(session.status(), LockStatus::Unlocked);
    }

    #[tokio::test]
    async fn test_unlock_existing_vault() {
        let (session, provider) = unlocked_session().await;
        session
            .add_entry(EntryFields::new("Bank", "pw").with_section("Finance"))
            .await
            .unwrap();
        session.lock().await;

        let reopened = VaultSession::new(provider.clone(), test_config()).unwrap();
        reopened.initialize().await.unwrap();
        assert!(reopened.vault_exists());

        reopened.unlock(PASSWORD).await.unwrap();
        let entries = reopened.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "Bank");
        assert_eq!(reopened.sections(), vec!["Finance"]);
    }

    #[tokio::test]
    async fn test_wrong_password_stays_locked() {
        let (session, provider) = unlocked_session().await;
        session.lock().await;
        let saves = provider.save_count();

        let result = session.unlock(b"wrong password").await;

        assert!(matches!(result, Err(Error::Authentication)));
        assert_eq!(session.status(), LockStatus::Locked);
        assert_eq!(
            session.last_error().as_deref(),
            Some("Invalid master password")
        );
        assert!(!session.has_key_material().await);
        assert!(session.entries().await.is_none());
        assert_eq!(provider.save_count(), saves);
    }

    #[tokio::test]
    async fn test_empty_password_is_invalid_master_password() {
        let (session, provider) = unlocked_session().await;
        session.lock().await;
        let saves = provider.save_count();

        let result = session.unlock(b"").await;

        assert!(matches!(result, Err(Error::Authentication)));
        assert_eq!(session.status(), LockStatus::Locked);
        assert_eq!(
            session.last_error().as_deref(),
            Some("Invalid master password")
        );
        assert_eq!(provider.save_count(), saves);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_authentication_error() {
        let provider = Arc::new(MemoryProvider::with_blob(vec![7u8; 20]));
        let session = VaultSession::new(provider, test_config()).unwrap();
        session.initialize().await.unwrap();

        assert!(matches!(
            session.unlock(PASSWORD).await,
            Err(Error::Authentication)
        ));
        assert_eq!(session.status(), LockStatus::Locked);
    }

    #[tokio::test]
    async fn test_unlock_refetches_storage() {
        let (session, provider) = unlocked_session().await;
        session.lock().await;

        // Another writer replaced the vault under a different password.
        let engine = CryptoEngine::new(KdfParams::minimum()).unwrap();
        let foreign = engine.encrypt(&Vault::new(), b"someone else").unwrap();
        provider.replace(foreign.into_bytes()).await;

        assert!(matches!(
            session.unlock(PASSWORD).await,
            Err(Error::Authentication)
        ));
        assert!(session.unlock(b"someone else").await.is_ok());
    }

    #[tokio::test]
    async fn test_unlock_transport_failure() {
        let (session, provider) = new_session();
        session.initialize().await.unwrap();
        provider.set_fail_fetches(true);

        assert!(matches!(
            session.unlock(PASSWORD).await,
            Err(Error::Transport(_))
        ));
        assert_eq!(session.status(), LockStatus::Locked);
        assert!(!session.has_key_material().await);
    }

    #[tokio::test]
    async fn test_add_entry_persists() {
        let (session, provider) = unlocked_session().await;

        let id = session
            .add_entry(EntryFields::new("GitHub", "pw").with_username("octo"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(provider.save_count(), 2);
        let stored = stored_vault(&provider).await;
        let entry = stored.get(&id).unwrap();
        assert_eq!(entry.username(), Some("octo"));
        assert_eq!(entry.created_at(), entry.updated_at());
    }

    #[tokio::test]
    async fn test_add_invalid_entry_changes_nothing() {
        let (session, provider) = unlocked_session().await;

        let result = session.add_entry(EntryFields::new("", "pw")).await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(session.entries().await.unwrap().len(), 0);
        assert_eq!(provider.save_count(), 1);
    }

    #[tokio::test]
    async fn test_update_entry() {
        let (session, provider) = unlocked_session().await;
        let id = session
            .add_entry(EntryFields::new("GitHub", "old"))
            .await
            .unwrap()
            .unwrap();
        let created = session.entry(&id).await.unwrap().created_at();

        session
            .update_entry(&id, EntryUpdate::new().with_password("new"))
            .await
            .unwrap();

        let entry = session.entry(&id).await.unwrap();
        assert_eq!(entry.password(), "new");
        assert_eq!(entry.name(), "GitHub");
        assert_eq!(entry.created_at(), created);
        assert!(entry.updated_at() > created);

        let stored = stored_vault(&provider).await;
        assert_eq!(stored.get(&id).unwrap().password(), "new");
    }

    #[tokio::test]
    async fn test_unknown_id_still_persists() {
        let (session, provider) = unlocked_session().await;
        session
            .add_entry(EntryFields::new("GitHub", "pw"))
            .await
            .unwrap();
        let before = session.entries().await.unwrap();
        let saves = provider.save_count();

        let missing = EntryId::generate();
        session.delete_entry(&missing).await.unwrap();
        session
            .update_entry(&missing, EntryUpdate::new().with_name("x"))
            .await
            .unwrap();

        assert_eq!(session.entries().await.unwrap(), before);
        assert_eq!(provider.save_count(), saves + 2);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let (session, provider) = unlocked_session().await;
        let id = session
            .add_entry(EntryFields::new("GitHub", "pw").with_section("Dev"))
            .await
            .unwrap()
            .unwrap();

        session.delete_entry(&id).await.unwrap();

        assert!(session.entry(&id).await.is_none());
        assert!(session.sections().is_empty());
        assert!(stored_vault(&provider).await.is_empty());
    }

    #[tokio::test]
    async fn test_name_only_entry_lifecycle() {
        let (session, provider) = unlocked_session().await;

        let id = session
            .add_entry(EntryFields::named("Bank"))
            .await
            .unwrap()
            .unwrap();
        let created = session.entry(&id).await.unwrap().created_at();

        session
            .update_entry(&id, EntryUpdate::new().with_username("alice"))
            .await
            .unwrap();

        let entries = session.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username(), Some("alice"));
        assert_eq!(entries[0].password(), "");
        assert_eq!(entries[0].created_at(), created);
        assert!(entries[0].updated_at() > created);

        session.delete_entry(&id).await.unwrap();

        assert!(session.entries().await.unwrap().is_empty());
        assert!(stored_vault(&provider).await.is_empty());
    }

    #[tokio::test]
    async fn test_mutations_ignored_while_locked() {
        let (session, provider) = unlocked_session().await;
        session.lock().await;
        let saves = provider.save_count();

        let added = session
            .add_entry(EntryFields::new("GitHub", "pw"))
            .await
            .unwrap();
        let id = EntryId::generate();
        session
            .update_entry(&id, EntryUpdate::new().with_name("x"))
            .await
            .unwrap();
        session.delete_entry(&id).await.unwrap();

        assert!(added.is_none());
        assert_eq!(provider.save_count(), saves);
    }

    #[tokio::test]
    async fn test_save_failure_keeps_mutation() {
        let (session, provider) = unlocked_session().await;
        provider.set_fail_saves(true);

        let result = session.add_entry(EntryFields::new("GitHub", "pw")).await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(session.entries().await.unwrap().len(), 1);
        assert!(session.last_error().is_some());
        assert!(!session.is_loading());
        assert!(stored_vault(&provider).await.is_empty());

        // The next successful save carries the earlier change too.
        provider.set_fail_saves(false);
        session
            .add_entry(EntryFields::new("Bank", "pw"))
            .await
            .unwrap();
        assert_eq!(stored_vault(&provider).await.len(), 2);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_sections_derived() {
        let (session, _) = unlocked_session().await;
        for section in ["Work", "", "Work", "Home"] {
            session
                .add_entry(EntryFields::new("e", "pw").with_section(section))
                .await
                .unwrap();
        }

        assert_eq!(session.sections(), vec!["Home", "Work"]);
        assert_eq!(
            session.with_entries(sections_of).await.unwrap(),
            vec!["Home", "Work"]
        );
    }

    #[tokio::test]
    async fn test_lock_clears_everything() {
        let (session, _) = unlocked_session().await;
        session
            .add_entry(EntryFields::new("GitHub", "pw").with_section("Dev"))
            .await
            .unwrap();

        session.lock().await;

        assert_eq!(session.status(), LockStatus::Locked);
        assert!(session.vault_exists());
        assert!(session.sections().is_empty());
        assert!(!session.has_key_material().await);
        assert!(!session.idle_timer_armed().await);
        assert!(session.entries().await.is_none());
        assert_eq!(session.snapshot().last_lock, Some(LockReason::Manual));
    }

    #[tokio::test]
    async fn test_lock_noop_when_not_unlocked() {
        let (session, _) = new_session();
        session.lock().await;
        assert_eq!(session.status(), LockStatus::Uninitialized);
        assert_eq!(session.snapshot().last_lock, None);
    }

    #[tokio::test]
    async fn test_search() {
        let (session, _) = unlocked_session().await;
        session
            .add_entry(EntryFields::new("GitHub", "pw").with_username("octo"))
            .await
            .unwrap();
        session
            .add_entry(EntryFields::new("Bank", "pw"))
            .await
            .unwrap();

        let hits = session.search("OCTO").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name(), "GitHub");

        session.lock().await;
        assert!(session.search("octo").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_mutations_serialized() {
        let (session, provider) = unlocked_session().await;

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let session = session.clone();
                tokio::spawn(async move {
                    session
                        .add_entry(EntryFields::new(format!("entry-{}", i), "pw"))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(provider.save_count(), 9);
        assert_eq!(stored_vault(&provider).await.len(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saves_on_multi_thread_runtime() {
        let (session, provider) = unlocked_session().await;

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let session = session.clone();
                tokio::spawn(async move {
                    session
                        .add_entry(EntryFields::named(format!("entry-{}", i)))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        // Observers are not held up by a save in flight.
        assert_eq!(session.status(), LockStatus::Unlocked);

        assert_eq!(provider.save_count(), 5);
        assert_eq!(stored_vault(&provider).await.len(), 4);
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let (session, _) = new_session();
        let mut events = session.subscribe();
        session.initialize().await.unwrap();
        session.unlock(PASSWORD).await.unwrap();

        assert!(events.has_changed().unwrap());
        let snapshot = events.borrow_and_update().clone();
        assert_eq!(snapshot.status, LockStatus::Unlocked);
        assert!(!snapshot.loading);

        session
            .add_entry(EntryFields::new("GitHub", "hunter2"))
            .await
            .unwrap();
        events.changed().await.unwrap();
        let snapshot = events.borrow_and_update().clone();
        assert_eq!(snapshot.entry_count, 1);
        assert!(!format!("{:?}", snapshot).contains("hunter2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_lock_after_timeout() {
        let (session, _) = unlocked_session().await;

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert_eq!(session.status(), LockStatus::Unlocked);

        tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
        assert_eq!(session.status(), LockStatus::Locked);
        assert_eq!(session.snapshot().last_lock, Some(LockReason::IdleTimeout));
        assert!(!session.has_key_material().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_idle_lock() {
        let (session, _) = unlocked_session().await;

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        session.touch_activity().await;
        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert_eq!(session.status(), LockStatus::Unlocked);

        tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
        assert_eq!(session.status(), LockStatus::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_if_idle() {
        let (session, _) = unlocked_session().await;

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert!(!session.lock_if_idle().await);
        assert_eq!(session.status(), LockStatus::Unlocked);

        session.lock().await;
        assert!(!session.lock_if_idle().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reunlock_arms_fresh_timer() {
        let (session, _) = unlocked_session().await;

        tokio::time::sleep(Duration::from_secs(11 * 60 + 1)).await;
        assert_eq!(session.status(), LockStatus::Locked);
        assert!(!session.idle_timer_armed().await);

        session.unlock(PASSWORD).await.unwrap();
        assert!(session.idle_timer_armed().await);
        assert_eq!(session.snapshot().last_lock, None);

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert_eq!(session.status(), LockStatus::Unlocked);

        tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
        assert_eq!(session.status(), LockStatus::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_lock_then_unlock_keeps_single_timer() {
        let (session, _) = unlocked_session().await;

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        session.lock().await;
        session.unlock(PASSWORD).await.unwrap();

        // The first timer would have expired at eleven minutes.
        tokio::time::sleep(Duration::from_secs(7 * 60)).await;
        assert_eq!(session.status(), LockStatus::Unlocked);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let provider = Arc::new(MemoryProvider::new());
        let config = SessionConfig {
            check_interval_secs: 0,
            ..test_config()
        };
        assert!(matches!(
            VaultSession::new(provider, config),
            Err(Error::InvalidInput(_))
        ));
    }
}
