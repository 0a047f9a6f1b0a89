//! Bearer credential storage
//!
//! Handles:
//! - In-memory credential shared by every live request (many readers)
//! - Mutation only through authentication and logout (single writer)
//! - Persistence of the token and its issuance time under one OS keyring key

use chrono::{DateTime, Utc};
use keyring::Entry;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Opaque bearer token and the time it was issued
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Vault entry layout
#[derive(Serialize, Deserialize)]
struct PersistedCredential {
    token: String,
    issued_at: DateTime<Utc>,
}

impl Credential {
    fn to_persisted(&self) -> Result<String, String> {
        serde_json::to_string(&PersistedCredential {
            token: self.token.clone(),
            issued_at: self.issued_at,
        })
        .map_err(|e| e.to_string())
    }

    /// Entries written before issuance times were persisted hold the bare
    /// token; those restore with `issued_at` set to the restore time.
    fn from_persisted(entry: &str) -> Self {
        match serde_json::from_str::<PersistedCredential>(entry) {
            Ok(p) => Self {
                token: p.token,
                issued_at: p.issued_at,
            },
            Err(_) => Self::new(entry),
        }
    }
}

/// Persistence backend for the single credential key
pub trait TokenVault: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, entry: &str) -> Result<(), String>;
    fn delete(&self) -> Result<(), String>;
}

impl<V: TokenVault + ?Sized> TokenVault for Arc<V> {
    fn load(&self) -> Option<String> {
        (**self).load()
    }

    fn save(&self, entry: &str) -> Result<(), String> {
        (**self).save(entry)
    }

    fn delete(&self) -> Result<(), String> {
        (**self).delete()
    }
}

/// Token persisted in the OS keyring
pub struct KeyringVault {
    service: String,
    key: String,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
        }
    }

    fn entry(&self) -> Result<Entry, String> {
        Entry::new(&self.service, &self.key).map_err(|e| e.to_string())
    }
}

impl TokenVault for KeyringVault {
    fn load(&self) -> Option<String> {
        self.entry().ok()?.get_password().ok()
    }

    fn save(&self, entry: &str) -> Result<(), String> {
        self.entry()?.set_password(entry).map_err(|e| e.to_string())
    }

    fn delete(&self) -> Result<(), String> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Process-local vault (tests, or persistence disabled)
#[derive(Default)]
pub struct MemoryVault {
    slot: Mutex<Option<String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenVault for MemoryVault {
    fn load(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    fn save(&self, entry: &str) -> Result<(), String> {
        *self.slot.lock() = Some(entry.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), String> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// Owner of the bearer credential; share it as `Arc<CredentialStore>`
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    vault: Box<dyn TokenVault>,
}

impl CredentialStore {
    pub fn new(vault: Box<dyn TokenVault>) -> Self {
        Self {
            current: RwLock::new(None),
            vault,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryVault::new()))
    }

    /// Load a previously persisted credential, if any
    pub fn restore(&self) -> bool {
        match self.vault.load() {
            Some(entry) if !entry.trim().is_empty() => {
                *self.current.write() = Some(Credential::from_persisted(&entry));
                info!("Restored persisted credential");
                true
            }
            _ => {
                debug!("No persisted credential to restore");
                false
            }
        }
    }

    /// Store a fresh credential, overwriting the previous one
    pub fn set(&self, token: impl Into<String>) -> Credential {
        let credential = Credential::new(token);
        if let Err(e) = credential
            .to_persisted()
            .and_then(|entry| self.vault.save(&entry))
        {
            warn!("Failed to persist credential: {}", e);
        }
        *self.current.write() = Some(credential.clone());
        credential
    }

    pub fn current(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    pub fn bearer(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Drop the credential from memory and from the vault
    pub fn clear(&self) {
        let had_credential = self.current.write().take().is_some();
        if let Err(e) = self.vault.delete() {
            warn!("Failed to delete persisted credential: {}", e);
        }
        if had_credential {
            info!("Credential cleared");
        }
    }

    /// Clear the credential only if it still holds `token`
    ///
    /// A rejection of a request sent with an older token must not drop a
    /// credential installed after that request went out.
    pub fn invalidate(&self, token: &str) -> bool {
        let mut current = self.current.write();
        if current.as_ref().map(|c| c.token.as_str()) != Some(token) {
            return false;
        }
        *current = None;
        if let Err(e) = self.vault.delete() {
            warn!("Failed to delete persisted credential: {}", e);
        }
        info!("Credential invalidated");
        true
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let store = CredentialStore::in_memory();
        assert!(store.bearer().is_none());

        store.set("abc123");
        assert_eq!(store.bearer().as_deref(), Some("abc123"));
        assert!(store.is_authenticated());

        store.clear();
        assert!(store.bearer().is_none());
    }

    #[test]
    fn test_new_login_overwrites_token() {
        let store = CredentialStore::in_memory();
        store.set("first");
        store.set("second");
        assert_eq!(store.bearer().as_deref(), Some("second"));
    }

    #[test]
    fn test_restore_from_vault() {
        let store = CredentialStore::new(Box::new(MemoryVault::with_token("persisted")));
        assert!(!store.is_authenticated());
        assert!(store.restore());
        assert_eq!(store.bearer().as_deref(), Some("persisted"));

        store.clear();
        // the vault entry is gone too
        assert!(!store.restore());
    }

    #[test]
    fn test_restore_keeps_issuance_time() {
        let vault = Arc::new(MemoryVault::new());
        let first = CredentialStore::new(Box::new(vault.clone()));
        let issued = first.set("persisted");

        let second = CredentialStore::new(Box::new(vault));
        assert!(second.restore());
        let restored = second.current().unwrap();
        assert_eq!(restored.token(), "persisted");
        assert_eq!(restored.issued_at(), issued.issued_at());
    }

    #[test]
    fn test_vault_entry_does_not_hold_bare_token() {
        let vault = Arc::new(MemoryVault::new());
        let store = CredentialStore::new(Box::new(vault.clone()));
        store.set("abc123");
        let entry = vault.load().unwrap();
        assert_ne!(entry, "abc123");
        assert!(entry.contains("issued_at"));
    }

    #[test]
    fn test_invalidate_ignores_stale_token() {
        let store = CredentialStore::in_memory();
        store.set("old");
        store.set("new");
        assert!(!store.invalidate("old"));
        assert_eq!(store.bearer().as_deref(), Some("new"));

        assert!(store.invalidate("new"));
        assert!(!store.is_authenticated());
        assert!(!store.invalidate("new"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("super-secret");
        assert!(!format!("{:?}", credential).contains("super-secret"));
    }

    #[test]
    fn test_concurrent_readers() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set("shared");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.bearer())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("shared"));
        }
    }
}
