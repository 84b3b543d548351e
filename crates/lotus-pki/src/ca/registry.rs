//! In-memory hierarchy registry
//!
//! Owned arena of CA and certificate records behind a single `RwLock`.
//! Compound engine operations run inside one lock scope, so readers never
//! observe a partially applied cascade and serial allocation stays atomic.
//! Serials pack the CA ordinal into the high 32 bits and a per-CA counter
//! into the low 32, which makes them monotonic per CA and globally unique.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use uuid::Uuid;

use crate::{
    ca::types::{CaLevel, CaStatus, CertificateAuthority, IssuedCertificate},
    error::{PkiError, Result},
};

/// A CA record with its allocation counters
pub(crate) struct CaRecord {
    pub authority: CertificateAuthority,
    /// Creation order, also the serial-number namespace
    pub ordinal: u32,
    /// Next per-CA serial counter value
    pub next_serial: u32,
    /// Next CRL number for this CA
    pub next_crl_number: u64,
}

/// Registry state guarded by the lock
#[derive(Default)]
pub(crate) struct RegistryInner {
    pub cas: HashMap<Uuid, CaRecord>,
    pub certs: HashMap<Uuid, IssuedCertificate>,
    /// Serial -> certificate id, for revocation-status queries
    pub serial_index: HashMap<u64, Uuid>,
    next_ordinal: u32,
}

/// Pack an ordinal and per-CA counter into a serial. Ordinals are offset by
/// one so no serial has a zero high word.
pub(crate) fn pack_serial(ordinal: u32, counter: u32) -> u64 {
    (u64::from(ordinal) + 1) << 32 | u64::from(counter)
}

impl RegistryInner {
    /// Ordinal the next registered CA will receive
    pub fn next_ordinal(&self) -> u32 {
        self.next_ordinal
    }

    /// Register a CA, assigning its creation ordinal
    pub fn insert_ca(&mut self, authority: CertificateAuthority) -> u32 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.cas.insert(
            authority.id,
            CaRecord {
                authority,
                ordinal,
                next_serial: 1,
                next_crl_number: 1,
            },
        );
        ordinal
    }

    /// Allocate the next serial for the given CA
    pub fn allocate_serial(&mut self, ca_id: Uuid) -> Result<u64> {
        let record = self.cas.get_mut(&ca_id).ok_or(PkiError::CaNotFound(ca_id))?;
        let counter = record.next_serial;
        record.next_serial += 1;
        Ok(pack_serial(record.ordinal, counter))
    }

    /// Allocate the next CRL number for the given CA
    pub fn allocate_crl_number(&mut self, ca_id: Uuid) -> Result<u64> {
        let record = self.cas.get_mut(&ca_id).ok_or(PkiError::CaNotFound(ca_id))?;
        let number = record.next_crl_number;
        record.next_crl_number += 1;
        Ok(number)
    }

    /// Record an issued certificate and index its serial
    pub fn insert_cert(&mut self, cert: IssuedCertificate) {
        self.serial_index.insert(cert.serial, cert.id);
        self.certs.insert(cert.id, cert);
    }

    /// Ids of the direct subordinate CAs of a parent
    pub fn subordinate_ids(&self, parent: Uuid) -> Vec<Uuid> {
        self.cas
            .values()
            .filter(|r| r.authority.parent_id == Some(parent))
            .map(|r| r.authority.id)
            .collect()
    }

    /// The active CA at the given level created earliest, creation order
    /// breaking ties
    pub fn earliest_active_at(&self, level: CaLevel) -> Option<&CertificateAuthority> {
        self.cas
            .values()
            .filter(|r| r.authority.level == level && r.authority.status == CaStatus::Active)
            .min_by_key(|r| (r.authority.created_at, r.ordinal))
            .map(|r| &r.authority)
    }
}

/// Lock-guarded registry handle
#[derive(Default)]
pub struct CaRegistry {
    inner: RwLock<RegistryInner>,
}

impl CaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&RegistryInner) -> R) -> Result<R> {
        let inner = self
            .inner
            .read()
            .map_err(|_| PkiError::StoreError("registry lock poisoned".to_string()))?;
        Ok(f(&inner))
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut RegistryInner) -> R) -> Result<R> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| PkiError::StoreError("registry lock poisoned".to_string()))?;
        Ok(f(&mut inner))
    }

    /// Snapshot of a CA record
    pub fn get_ca(&self, id: Uuid) -> Result<CertificateAuthority> {
        self.read(|inner| inner.cas.get(&id).map(|r| r.authority.clone()))?
            .ok_or(PkiError::CaNotFound(id))
    }

    /// Snapshot of an issued certificate
    pub fn get_certificate(&self, id: Uuid) -> Result<IssuedCertificate> {
        self.read(|inner| inner.certs.get(&id).cloned())?
            .ok_or_else(|| PkiError::CertificateNotFound(id.to_string()))
    }

    /// Snapshot of an issued certificate looked up by serial
    pub fn get_certificate_by_serial(&self, serial: u64) -> Result<IssuedCertificate> {
        self.read(|inner| {
            inner
                .serial_index
                .get(&serial)
                .and_then(|id| inner.certs.get(id))
                .cloned()
        })?
        .ok_or_else(|| PkiError::CertificateNotFound(serial.to_string()))
    }

    /// All CAs, optionally filtered by level, in creation order
    pub fn list_cas(&self, level: Option<CaLevel>) -> Result<Vec<CertificateAuthority>> {
        self.read(|inner| {
            let mut records: Vec<_> = inner
                .cas
                .values()
                .filter(|r| level.map_or(true, |l| r.authority.level == l))
                .collect();
            records.sort_by_key(|r| r.ordinal);
            records.iter().map(|r| r.authority.clone()).collect()
        })
    }

    /// Direct subordinates of a CA, in creation order
    pub fn subordinates(&self, parent: Uuid) -> Result<Vec<CertificateAuthority>> {
        self.read(|inner| {
            let mut records: Vec<_> = inner
                .cas
                .values()
                .filter(|r| r.authority.parent_id == Some(parent))
                .collect();
            records.sort_by_key(|r| r.ordinal);
            records.iter().map(|r| r.authority.clone()).collect()
        })
    }

    /// Certificates issued by a CA, in serial order
    pub fn certificates_of(&self, ca_id: Uuid) -> Result<Vec<IssuedCertificate>> {
        self.read(|inner| {
            let mut certs: Vec<_> = inner
                .certs
                .values()
                .filter(|c| c.issuing_ca == ca_id)
                .cloned()
                .collect();
            certs.sort_by_key(|c| c.serial);
            certs
        })
    }
}
