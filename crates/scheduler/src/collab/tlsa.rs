//! TLSA material derived from PEM certificates.
//!
//! Records are published as `3 1 1`: DANE-EE usage, SubjectPublicKeyInfo
//! selector, SHA-256 matching.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;
use x509_parser::time::ASN1Time;

use super::Fingerprint;
use crate::error::CollaboratorError;

/// SHA-256 over the certificate's DER SubjectPublicKeyInfo, hex encoded
pub fn spki_sha256(cert_pem: &str) -> Result<Fingerprint, CollaboratorError> {
    with_certificate(cert_pem, |cert| {
        let digest = Sha256::digest(cert.public_key().raw);
        Ok(Fingerprint::new(hex::encode(digest)))
    })
}

/// `notBefore` and `notAfter` of a PEM certificate
pub fn validity(cert_pem: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), CollaboratorError> {
    with_certificate(cert_pem, |cert| {
        let validity = cert.validity();
        Ok((
            to_datetime(&validity.not_before)?,
            to_datetime(&validity.not_after)?,
        ))
    })
}

fn with_certificate<T>(
    cert_pem: &str,
    f: impl FnOnce(&X509Certificate<'_>) -> Result<T, CollaboratorError>,
) -> Result<T, CollaboratorError> {
    let pem = pem::parse(cert_pem)
        .map_err(|e| CollaboratorError::InvalidCertificate(format!("bad PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(CollaboratorError::InvalidCertificate(format!(
            "expected CERTIFICATE block, found {}",
            pem.tag()
        )));
    }

    let (_, cert) = x509_parser::parse_x509_certificate(pem.contents())
        .map_err(|e| CollaboratorError::InvalidCertificate(format!("bad X509: {}", e)))?;

    f(&cert)
}

fn to_datetime(time: &ASN1Time) -> Result<DateTime<Utc>, CollaboratorError> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| CollaboratorError::InvalidCertificate(format!("time out of range: {}", time)))
}
