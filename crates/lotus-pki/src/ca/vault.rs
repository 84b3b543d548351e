//! CA private key custody
//!
//! CA signing keys are held behind the [`CaKeyVault`] trait so an HSM or
//! external KMS can replace the in-memory reference implementation without
//! touching the engine.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use lotus_crypto::MlDsaKeyPair;
use uuid::Uuid;

use crate::error::{PkiError, Result};

/// Storage for CA signing keys, addressed by CA id
pub trait CaKeyVault: Send + Sync {
    /// Store a key pair as a PKCS#8 PEM document
    fn store(&self, id: Uuid, key_pem: &str) -> Result<()>;

    /// Load and decode the key pair for a CA
    fn load(&self, id: Uuid) -> Result<MlDsaKeyPair>;

    /// Remove a key; absent keys are not an error
    fn remove(&self, id: Uuid) -> Result<()>;
}

/// In-memory vault used by tests and single-process deployments
#[derive(Default)]
pub struct MemoryKeyVault {
    keys: RwLock<HashMap<Uuid, String>>,
}

impl MemoryKeyVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaKeyVault for MemoryKeyVault {
    fn store(&self, id: Uuid, key_pem: &str) -> Result<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| PkiError::StoreError("key vault lock poisoned".to_string()))?;
        keys.insert(id, key_pem.to_string());
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<MlDsaKeyPair> {
        let keys = self
            .keys
            .read()
            .map_err(|_| PkiError::StoreError("key vault lock poisoned".to_string()))?;
        let pem = keys.get(&id).ok_or(PkiError::KeyUnavailable(id))?;
        Ok(MlDsaKeyPair::from_pkcs8_pem(pem)?)
    }

    fn remove(&self, id: Uuid) -> Result<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| PkiError::StoreError("key vault lock poisoned".to_string()))?;
        keys.remove(&id);
        Ok(())
    }
}
