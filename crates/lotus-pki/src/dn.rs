//! Distinguished name handling
//!
//! Structured subject representation with conversion to and from X.509
//! `Name` sequences and the string form used in ledger records. The engine
//! always re-derives the subject on the server side, so every component
//! passes through [`DnSubject::sanitized`] before it reaches a certificate.

use der::asn1::{SetOfVec, Utf8StringRef};
use serde::{Deserialize, Serialize};
use x509_cert::{
    attr::AttributeTypeAndValue,
    name::{Name, RdnSequence, RelativeDistinguishedName},
};

use crate::error::{PkiError, Result};

/// Subject distinguished name components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnSubject {
    /// Common Name (CN)
    pub common_name: String,
    /// Organization (O)
    pub organization: Option<String>,
    /// Organizational Unit (OU)
    pub organizational_unit: Option<String>,
    /// Country (C)
    pub country: Option<String>,
    /// State or Province (ST)
    pub state: Option<String>,
    /// Locality (L)
    pub locality: Option<String>,
}

impl DnSubject {
    /// A subject with only a common name
    pub fn common_name(cn: impl Into<String>) -> Self {
        Self {
            common_name: cn.into(),
            organization: None,
            organizational_unit: None,
            country: None,
            state: None,
            locality: None,
        }
    }

    /// Copy with every component stripped of DN metacharacters and control
    /// characters
    ///
    /// Applied by the engine before a caller-supplied subject is recorded or
    /// written into a certificate.
    pub fn sanitized(&self) -> Self {
        let clean_opt = |v: &Option<String>| {
            v.as_deref()
                .map(sanitize_component)
                .filter(|s| !s.is_empty())
        };
        Self {
            common_name: sanitize_component(&self.common_name),
            organization: clean_opt(&self.organization),
            organizational_unit: clean_opt(&self.organizational_unit),
            country: clean_opt(&self.country),
            state: clean_opt(&self.state),
            locality: clean_opt(&self.locality),
        }
    }

    /// Build an X.509 `Name` from the components
    pub fn to_name(&self) -> Result<Name> {
        if self.common_name.is_empty() {
            return Err(PkiError::DnError("Common Name (CN) is required".to_string()));
        }

        let mut rdns = Vec::new();
        rdns.push(rdn(const_oid::db::rfc4519::CN, &self.common_name)?);

        if let Some(ref org) = self.organization {
            rdns.push(rdn(const_oid::db::rfc4519::O, org)?);
        }
        if let Some(ref ou) = self.organizational_unit {
            rdns.push(rdn(const_oid::db::rfc4519::OU, ou)?);
        }
        if let Some(ref country) = self.country {
            rdns.push(rdn(const_oid::db::rfc4519::C, country)?);
        }
        if let Some(ref state) = self.state {
            rdns.push(rdn(const_oid::db::rfc4519::ST, state)?);
        }
        if let Some(ref locality) = self.locality {
            rdns.push(rdn(const_oid::db::rfc4519::L, locality)?);
        }

        Ok(Name::from(RdnSequence::from(rdns)))
    }

    /// Extract components from an X.509 `Name`
    ///
    /// Attributes outside the supported set are dropped, which is what makes
    /// the server-side re-derivation a spoofing defense.
    pub fn from_name(name: &Name) -> Result<Self> {
        let mut subject = DnSubject::common_name("");

        for rdn in name.0.iter() {
            for attr in rdn.0.iter() {
                let value = match Utf8StringRef::try_from(&attr.value) {
                    Ok(utf8) => utf8.as_str().to_string(),
                    Err(_) => continue,
                };

                if attr.oid == const_oid::db::rfc4519::CN {
                    subject.common_name = value;
                } else if attr.oid == const_oid::db::rfc4519::O {
                    subject.organization = Some(value);
                } else if attr.oid == const_oid::db::rfc4519::OU {
                    subject.organizational_unit = Some(value);
                } else if attr.oid == const_oid::db::rfc4519::C {
                    subject.country = Some(value);
                } else if attr.oid == const_oid::db::rfc4519::ST {
                    subject.state = Some(value);
                } else if attr.oid == const_oid::db::rfc4519::L {
                    subject.locality = Some(value);
                }
            }
        }

        if subject.common_name.is_empty() {
            return Err(PkiError::DnError(
                "Distinguished name missing required CN".to_string(),
            ));
        }
        Ok(subject)
    }

    /// Parse the comma-separated string form, e.g. `CN=Test User,O=Citizen,C=VN`
    pub fn parse(dn: &str) -> Result<Self> {
        let mut subject = DnSubject::common_name("");

        for part in dn.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                PkiError::DnError(format!("Malformed DN component: {part}"))
            })?;
            let value = value.trim().to_string();

            match key.trim().to_ascii_uppercase().as_str() {
                "CN" => subject.common_name = value,
                "O" => subject.organization = Some(value),
                "OU" => subject.organizational_unit = Some(value),
                "C" => subject.country = Some(value),
                "ST" => subject.state = Some(value),
                "L" => subject.locality = Some(value),
                other => {
                    return Err(PkiError::DnError(format!(
                        "Unsupported DN attribute: {other}"
                    )))
                }
            }
        }

        if subject.common_name.is_empty() {
            return Err(PkiError::DnError("DN string missing CN".to_string()));
        }
        Ok(subject)
    }
}

impl std::fmt::Display for DnSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CN={}", self.common_name)?;
        if let Some(ref org) = self.organization {
            write!(f, ",O={org}")?;
        }
        if let Some(ref ou) = self.organizational_unit {
            write!(f, ",OU={ou}")?;
        }
        if let Some(ref country) = self.country {
            write!(f, ",C={country}")?;
        }
        if let Some(ref state) = self.state {
            write!(f, ",ST={state}")?;
        }
        if let Some(ref locality) = self.locality {
            write!(f, ",L={locality}")?;
        }
        Ok(())
    }
}

fn rdn(oid: der::asn1::ObjectIdentifier, value: &str) -> Result<RelativeDistinguishedName> {
    let value = Utf8StringRef::new(value)
        .map_err(|e| PkiError::DnError(format!("Invalid attribute value: {e}")))?;
    let mut set = SetOfVec::new();
    set.insert(AttributeTypeAndValue {
        oid,
        value: der::Any::from(value),
    })
    .map_err(|e| PkiError::DnError(format!("Failed to build RDN: {e}")))?;
    Ok(RelativeDistinguishedName(set))
}

/// Strip DN metacharacters and control characters from one component
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ',' | '=' | '+' | '<' | '>' | '#' | ';' | '\\' | '"'))
        .collect::<String>()
        .trim()
        .to_string()
}
