//! CA hierarchy engine
//!
//! Orchestrates root initialization, subordinate creation, end-entity
//! issuance, revocation (including the cascade), chain assembly, and CRL
//! publication over the registry and key vault.
//!
//! Key generation and signing are slow, so creation paths generate keys
//! outside the registry lock and re-validate the parent's status once the
//! write lock is held. The revocation cascade runs entirely inside one write
//! scope; a reader sees either the pre-cascade or the post-cascade ledger,
//! never a partial one.

use std::sync::Arc;

use lotus_crypto::MlDsaKeyPair;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    ca::{
        registry::{self, CaRegistry},
        types::{
            CaLevel, CaStatus, CascadeOutcome, CertStatus, CertificateAuthority,
            IssuedCertificate, RevocationInfo,
        },
        vault::CaKeyVault,
    },
    cert::{self, CertProfile, CertificateInfo, IssuanceParams},
    crl::{self, CrlEntry},
    csr::Csr,
    dn::DnSubject,
    error::{PkiError, Result},
};

/// Engine behavior switches
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    /// Refuse to create a second active root instead of returning the
    /// existing one
    pub strict_single_root: bool,
    /// Lifetime of end-entity certificates
    pub user_cert_validity_days: u32,
    /// CRL distribution point written into issued certificates
    pub crl_url: Option<String>,
    /// AIA caIssuers URI written into issued certificates
    pub aia_url: Option<String>,
    /// Organization component of CA subject DNs
    pub organization: String,
    /// Country component of CA subject DNs
    pub country: String,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            strict_single_root: false,
            user_cert_validity_days: 365,
            crl_url: None,
            aia_url: None,
            organization: "Lotus National PKI".to_string(),
            country: "VN".to_string(),
        }
    }
}

/// Request to issue an end-entity certificate
pub struct IssueRequest {
    pub username: String,
    pub csr_pem: String,
    /// Caller-authoritative subject; when absent the CSR subject is the
    /// fallback. Either way the DN is re-derived and sanitized server side.
    pub subject: Option<DnSubject>,
    /// Pin a specific issuing CA instead of automatic selection
    pub issuing_ca: Option<Uuid>,
}

/// The hierarchy engine
pub struct CaEngine {
    registry: CaRegistry,
    vault: Arc<dyn CaKeyVault>,
    policy: EnginePolicy,
}

impl CaEngine {
    pub fn new(vault: Arc<dyn CaKeyVault>) -> Self {
        Self::with_policy(vault, EnginePolicy::default())
    }

    pub fn with_policy(vault: Arc<dyn CaKeyVault>, policy: EnginePolicy) -> Self {
        Self {
            registry: CaRegistry::new(),
            vault,
            policy,
        }
    }

    /// Read access to the underlying registry
    pub fn registry(&self) -> &CaRegistry {
        &self.registry
    }

    /// Initialize the root CA (ML-DSA-87, self-signed)
    ///
    /// When an active root already exists it is returned as-is, unless the
    /// policy demands strict single-root creation.
    pub fn initialize_root(&self, name: &str) -> Result<CertificateAuthority> {
        if let Some(existing) = self.active_root()? {
            if self.policy.strict_single_root {
                return Err(PkiError::RootAlreadyExists);
            }
            info!(root = %existing.id, "root CA already initialized");
            return Ok(existing);
        }

        let keypair = MlDsaKeyPair::generate(CaLevel::Root.algorithm());
        let subject = self.ca_subject(name);

        let created = self.registry.write(|inner| -> Result<CertificateAuthority> {
            // Re-check under the write lock; a concurrent call may have won
            if let Some(existing) = inner.earliest_active_at(CaLevel::Root) {
                if self.policy.strict_single_root {
                    return Err(PkiError::RootAlreadyExists);
                }
                return Ok(existing.clone());
            }

            // Build everything fallible before touching the ledger, so a
            // failed construction leaves no record behind. The serial is
            // derived from the ordinal the insertion below will assign; the
            // write lock keeps it stable.
            let id = Uuid::new_v4();
            let serial = registry::pack_serial(inner.next_ordinal(), 1);
            let pem = cert::build_self_signed(
                &keypair,
                &subject,
                serial,
                CaLevel::Root.validity_days(),
            )?;
            let info = CertificateInfo::from_pem(&pem)?;
            self.vault.store(id, &keypair.to_pkcs8_pem()?)?;

            let mut authority = self.blank_authority(id, name, CaLevel::Root, None, &subject);
            authority.certificate_pem = pem;
            authority.not_after = info.not_after;
            inner.insert_ca(authority.clone());
            // Consume the counter the self-signed certificate used
            inner.allocate_serial(id)?;
            Ok(authority)
        })??;

        info!(root = %created.id, name = %created.name, algorithm = %created.algorithm, "root CA initialized");
        Ok(created)
    }

    /// Create a subordinate CA under an active parent
    pub fn create_subordinate(
        &self,
        parent_id: Uuid,
        name: &str,
        level: CaLevel,
    ) -> Result<CertificateAuthority> {
        if level == CaLevel::Root {
            return Err(PkiError::InvalidHierarchy(
                "Root CAs are created with initialize_root".to_string(),
            ));
        }

        // Preliminary parent check before paying for key generation
        let parent = self.lookup_parent(parent_id)?;
        if !level.valid_under(parent.level) {
            return Err(PkiError::InvalidHierarchy(format!(
                "{level:?} may not be created under {:?}",
                parent.level
            )));
        }

        let keypair = MlDsaKeyPair::generate(level.algorithm());
        let parent_key = self
            .vault
            .load(parent_id)
            .map_err(|_| PkiError::KeyUnavailable(parent_id))?;
        let subject = self.ca_subject(name);
        let spki_der = lotus_crypto::pem::public_key_to_der(
            keypair.algorithm(),
            &keypair.verifying_key_bytes(),
        )?;

        let created = self.registry.write(|inner| -> Result<CertificateAuthority> {
            // The parent may have been revoked while we generated keys
            let parent_record = inner
                .cas
                .get(&parent_id)
                .ok_or(PkiError::ParentNotFound(parent_id))?;
            if parent_record.authority.status != CaStatus::Active {
                return Err(PkiError::ParentNotActive(parent_id));
            }
            let parent_cert_pem = parent_record.authority.certificate_pem.clone();

            // Certificate and vault key first; the ledger record is only
            // inserted once construction has succeeded. A failure after
            // allocate_serial leaves a gap in the parent's counter, which is
            // harmless.
            let id = Uuid::new_v4();
            let serial = inner.allocate_serial(parent_id)?;
            let pem = cert::issue(
                &parent_cert_pem,
                &parent_key,
                &IssuanceParams {
                    subject: &subject,
                    subject_spki_der: &spki_der,
                    serial,
                    validity_days: level.validity_days(),
                    profile: CertProfile::Ca { path_len: Some(0) },
                    crl_url: self.policy.crl_url.as_deref(),
                    aia_url: self.policy.aia_url.as_deref(),
                },
            )?;
            let info = CertificateInfo::from_pem(&pem)?;
            self.vault.store(id, &keypair.to_pkcs8_pem()?)?;

            let mut authority =
                self.blank_authority(id, name, level, Some(parent_id), &subject);
            authority.certificate_pem = pem;
            authority.not_after = info.not_after;
            inner.insert_ca(authority.clone());
            Ok(authority)
        })??;

        info!(
            ca = %created.id,
            parent = %parent_id,
            level = ?created.level,
            algorithm = %created.algorithm,
            "subordinate CA created"
        );
        Ok(created)
    }

    /// Issue an end-entity certificate from a CSR
    ///
    /// The recorded subject is the caller-supplied one when present, the CSR
    /// subject otherwise; both pass through server-side re-derivation so a
    /// spoofed CSR DN never reaches a certificate.
    pub fn issue_user_certificate(&self, request: IssueRequest) -> Result<IssuedCertificate> {
        let csr = Csr::from_pem(&request.csr_pem)?;
        csr.verify_signature()?;
        let spki_der = csr.spki_der()?;

        let subject = match request.subject {
            Some(subject) => subject.sanitized(),
            None => csr.subject()?.sanitized(),
        };
        if subject.common_name.is_empty() {
            return Err(PkiError::DnError(
                "Subject CN is empty after sanitization".to_string(),
            ));
        }

        let issuer = match request.issuing_ca {
            Some(id) => self.registry.get_ca(id)?,
            None => self.select_issuing_authority()?,
        };
        let issuer_key = self
            .vault
            .load(issuer.id)
            .map_err(|_| PkiError::KeyUnavailable(issuer.id))?;

        let issued = self.registry.write(|inner| -> Result<IssuedCertificate> {
            let issuer_record = inner
                .cas
                .get(&issuer.id)
                .ok_or(PkiError::CaNotFound(issuer.id))?;
            if issuer_record.authority.status != CaStatus::Active {
                return Err(PkiError::ParentNotActive(issuer.id));
            }
            let issuer_cert_pem = issuer_record.authority.certificate_pem.clone();

            let serial = inner.allocate_serial(issuer.id)?;
            let pem = cert::issue(
                &issuer_cert_pem,
                &issuer_key,
                &IssuanceParams {
                    subject: &subject,
                    subject_spki_der: &spki_der,
                    serial,
                    validity_days: self.policy.user_cert_validity_days,
                    profile: CertProfile::Leaf,
                    crl_url: self.policy.crl_url.as_deref(),
                    aia_url: self.policy.aia_url.as_deref(),
                },
            )?;
            let info = CertificateInfo::from_pem(&pem)?;

            let issued = IssuedCertificate {
                id: Uuid::new_v4(),
                issuing_ca: issuer.id,
                username: request.username.clone(),
                subject_dn: subject.to_string(),
                serial,
                certificate_pem: pem,
                public_key_pem: lotus_crypto::pem::public_key_to_pem(
                    info.algorithm,
                    &info.public_key,
                )?,
                valid_from: info.not_before,
                valid_until: info.not_after,
                status: CertStatus::Active,
                revoked_at: None,
                revocation_reason: None,
            };
            inner.insert_cert(issued.clone());
            Ok(issued)
        })??;

        info!(
            certificate = %issued.id,
            issuer = %issued.issuing_ca,
            serial = issued.serial,
            username = %issued.username,
            "certificate issued"
        );
        Ok(issued)
    }

    /// Revoke a single certificate; repeated calls keep the first revocation
    pub fn revoke_certificate(&self, cert_id: Uuid, reason: &str) -> Result<IssuedCertificate> {
        let revoked = self.registry.write(|inner| -> Result<IssuedCertificate> {
            let cert = inner
                .certs
                .get_mut(&cert_id)
                .ok_or_else(|| PkiError::CertificateNotFound(cert_id.to_string()))?;

            if cert.status != CertStatus::Revoked {
                cert.status = CertStatus::Revoked;
                cert.revoked_at = Some(OffsetDateTime::now_utc());
                cert.revocation_reason = Some(reason.to_string());
            }
            Ok(cert.clone())
        })??;

        info!(certificate = %cert_id, serial = revoked.serial, "certificate revoked");
        Ok(revoked)
    }

    /// Revoke a CA and cascade over every subordinate CA and issued
    /// certificate beneath it
    ///
    /// Runs as one atomic ledger transition. Already-revoked entries are
    /// left untouched, which makes re-revocation idempotent.
    pub fn revoke_ca(&self, ca_id: Uuid, reason: &str) -> Result<CascadeOutcome> {
        let outcome = self.registry.write(|inner| -> Result<CascadeOutcome> {
            if !inner.cas.contains_key(&ca_id) {
                return Err(PkiError::CaNotFound(ca_id));
            }

            let now = OffsetDateTime::now_utc();
            let cascade_reason = format!("Parent CA revoked: {reason}");
            let mut outcome = CascadeOutcome {
                cas_revoked: 0,
                certificates_revoked: 0,
            };

            // Worklist instead of recursion; each entry carries the reason
            // recorded for that node
            let mut worklist: Vec<(Uuid, String)> = vec![(ca_id, reason.to_string())];
            while let Some((current, current_reason)) = worklist.pop() {
                let record = match inner.cas.get_mut(&current) {
                    Some(record) => record,
                    None => continue,
                };
                if record.authority.status == CaStatus::Revoked {
                    continue;
                }
                record.authority.status = CaStatus::Revoked;
                record.authority.revoked_at = Some(now);
                record.authority.revocation_reason = Some(current_reason.clone());
                outcome.cas_revoked += 1;

                for cert in inner.certs.values_mut() {
                    if cert.issuing_ca == current && cert.status != CertStatus::Revoked {
                        cert.status = CertStatus::Revoked;
                        cert.revoked_at = Some(now);
                        cert.revocation_reason = Some(current_reason.clone());
                        outcome.certificates_revoked += 1;
                    }
                }

                for child in inner.subordinate_ids(current) {
                    worklist.push((child, cascade_reason.clone()));
                }
            }
            Ok(outcome)
        })??;

        info!(
            ca = %ca_id,
            cas_revoked = outcome.cas_revoked,
            certificates_revoked = outcome.certificates_revoked,
            "CA revoked with cascade"
        );
        Ok(outcome)
    }

    /// Pick the issuing authority for end-entity certificates:
    /// District first, then Provincial, then Root; earliest created wins
    pub fn select_issuing_authority(&self) -> Result<CertificateAuthority> {
        self.registry.read(|inner| {
            for level in [CaLevel::District, CaLevel::Provincial, CaLevel::Root] {
                if let Some(authority) = inner.earliest_active_at(level) {
                    return Ok(authority.clone());
                }
            }
            Err(PkiError::NoIssuerAvailable)
        })?
    }

    /// Certificate chain from the given CA up to its root, leaf first
    pub fn get_chain(&self, ca_id: Uuid) -> Result<Vec<String>> {
        self.registry.read(|inner| {
            let mut chain = Vec::new();
            let mut current = inner
                .cas
                .get(&ca_id)
                .ok_or(PkiError::CaNotFound(ca_id))?;

            loop {
                chain.push(current.authority.certificate_pem.clone());
                match current.authority.parent_id {
                    None => return Ok(chain),
                    Some(parent) => {
                        current = inner.cas.get(&parent).ok_or(PkiError::BrokenChain(parent))?;
                    }
                }
                // A chain longer than the CA count means a cycle
                if chain.len() > inner.cas.len() {
                    return Err(PkiError::BrokenChain(current.authority.id));
                }
            }
        })?
    }

    /// Revocation status of a certificate by serial
    pub fn revocation_status(&self, serial: u64) -> Result<RevocationInfo> {
        let cert = self.registry.get_certificate_by_serial(serial)?;
        Ok(RevocationInfo {
            status: cert.status,
            reason: cert.revocation_reason,
            revoked_at: cert.revoked_at,
        })
    }

    /// Flip every past-due ACTIVE record to EXPIRED; returns how many changed
    pub fn expire_overdue(&self) -> Result<usize> {
        let now = OffsetDateTime::now_utc();
        let flipped = self.registry.write(|inner| {
            let mut flipped = 0;
            for record in inner.cas.values_mut() {
                if record.authority.status == CaStatus::Active && record.authority.not_after < now
                {
                    record.authority.status = CaStatus::Expired;
                    flipped += 1;
                }
            }
            for cert in inner.certs.values_mut() {
                if cert.status == CertStatus::Active && cert.valid_until < now {
                    cert.status = CertStatus::Expired;
                    flipped += 1;
                }
            }
            flipped
        })?;

        if flipped > 0 {
            info!(records = flipped, "expired overdue records");
        }
        Ok(flipped)
    }

    /// Produce a signed CRL for the given CA, PEM encoded
    pub fn generate_crl(&self, ca_id: Uuid) -> Result<String> {
        let key = self
            .vault
            .load(ca_id)
            .map_err(|_| PkiError::KeyUnavailable(ca_id))?;

        let (issuer_pem, entries, crl_number) =
            self.registry
                .write(|inner| -> Result<(String, Vec<CrlEntry>, u64)> {
                    let entries = inner
                        .certs
                        .values()
                        .filter(|c| c.issuing_ca == ca_id && c.status == CertStatus::Revoked)
                        .map(|c| CrlEntry {
                            serial: c.serial,
                            revoked_at: c.revoked_at.unwrap_or(OffsetDateTime::UNIX_EPOCH),
                        })
                        .collect();
                    let crl_number = inner.allocate_crl_number(ca_id)?;
                    let issuer = inner.cas.get(&ca_id).ok_or(PkiError::CaNotFound(ca_id))?;
                    Ok((issuer.authority.certificate_pem.clone(), entries, crl_number))
                })??;

        crl::build_crl(&issuer_pem, &key, &entries, crl_number)
    }

    fn active_root(&self) -> Result<Option<CertificateAuthority>> {
        self.registry
            .read(|inner| inner.earliest_active_at(CaLevel::Root).cloned())
    }

    fn lookup_parent(&self, parent_id: Uuid) -> Result<CertificateAuthority> {
        let parent = self
            .registry
            .get_ca(parent_id)
            .map_err(|_| PkiError::ParentNotFound(parent_id))?;
        if parent.status != CaStatus::Active {
            warn!(parent = %parent_id, status = ?parent.status, "rejected issuance under inactive parent");
            return Err(PkiError::ParentNotActive(parent_id));
        }
        Ok(parent)
    }

    fn ca_subject(&self, name: &str) -> DnSubject {
        DnSubject {
            common_name: name.to_string(),
            organization: Some(self.policy.organization.clone()),
            organizational_unit: None,
            country: Some(self.policy.country.clone()),
            state: None,
            locality: None,
        }
        .sanitized()
    }

    fn blank_authority(
        &self,
        id: Uuid,
        name: &str,
        level: CaLevel,
        parent_id: Option<Uuid>,
        subject: &DnSubject,
    ) -> CertificateAuthority {
        let now = OffsetDateTime::now_utc();
        CertificateAuthority {
            id,
            name: name.to_string(),
            level,
            parent_id,
            algorithm: level.algorithm(),
            subject_dn: subject.to_string(),
            certificate_pem: String::new(),
            status: CaStatus::Active,
            created_at: now,
            not_after: now,
            revoked_at: None,
            revocation_reason: None,
        }
    }
}
