//! Tenant key management.
//!
//! Each organization has an ordered key list. The first key is current: it
//! encrypts all new content and is the key used for every decryption.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chanstore_core::OrgId;

use crate::cipher::OrgKey;
use crate::error::{AccessError, Result};

/// Resolves an organization's current encryption key.
#[async_trait]
pub trait KeyManager: Send + Sync {
    async fn current_key(&self, org_id: &OrgId) -> Result<OrgKey>;
}

/// In-memory key manager.
#[derive(Debug, Default)]
pub struct OrgKeyring {
    keys: RwLock<HashMap<OrgId, Vec<OrgKey>>>,
}

impl OrgKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an organization with a freshly generated key.
    pub fn add_org(&self, org_id: OrgId) -> OrgKey {
        let key = OrgKey::generate();
        self.set_keys(org_id, vec![key.clone()]);
        key
    }

    /// Replace an organization's key list.
    pub fn set_keys(&self, org_id: OrgId, keys: Vec<OrgKey>) {
        if let Ok(mut map) = self.keys.write() {
            map.insert(org_id, keys);
        }
    }

    /// Put a new key at the front of the list, making it current.
    ///
    /// Content written under the previous key can no longer be decrypted.
    pub fn rotate(&self, org_id: &OrgId, key: OrgKey) -> Result<()> {
        let mut map = self
            .keys
            .write()
            .map_err(|_| AccessError::UnknownOrganization(org_id.clone()))?;
        let keys = map
            .get_mut(org_id)
            .ok_or_else(|| AccessError::UnknownOrganization(org_id.clone()))?;
        keys.insert(0, key);
        tracing::info!(org = %org_id, key_count = keys.len(), "rotated organization key");
        Ok(())
    }

    /// Snapshot of an organization's key list.
    pub fn keys(&self, org_id: &OrgId) -> Vec<OrgKey> {
        self.keys
            .read()
            .ok()
            .and_then(|map| map.get(org_id).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl KeyManager for OrgKeyring {
    async fn current_key(&self, org_id: &OrgId) -> Result<OrgKey> {
        let map = self
            .keys
            .read()
            .map_err(|_| AccessError::UnknownOrganization(org_id.clone()))?;
        let keys = map
            .get(org_id)
            .ok_or_else(|| AccessError::UnknownOrganization(org_id.clone()))?;
        keys.first()
            .cloned()
            .ok_or_else(|| AccessError::NoKeys(org_id.clone()))
    }
}
