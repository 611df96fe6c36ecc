//! Leaf certificates minted during the TLS handshake.
//!
//! A single RSA-4096 key pair is generated when the [`LeafIssuer`] is built and reused for
//! every leaf it signs. Each leaf differs only in subject, serial number and signature, which
//! keeps per-handshake work down to one signature with the CA key.

use crate::ca::{CertificateAuthority, RSA_KEY_BITS, VALIDITY_DAYS};
use crate::error::Error;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::{CertifiedKey, SigningKey};
use rustls::ServerConfig;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error};

const SERIAL_BITS: i32 = 63;
/// Longest value X.509 allows for a common name.
const MAX_COMMON_NAME_LEN: usize = 64;

/// Signs leaf certificates for arbitrary host names with the root [`CertificateAuthority`].
pub struct LeafIssuer {
    ca: Arc<CertificateAuthority>,
    key: PKey<Private>,
    signing_key: Arc<dyn SigningKey>,
    ca_cert: rustls::Certificate,
}

impl fmt::Debug for LeafIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafIssuer")
            .field("ca", &self.ca)
            .finish_non_exhaustive()
    }
}

impl LeafIssuer {
    /// Build an issuer for `ca`, generating the shared leaf key pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaUnavailable`] if the leaf key can't be generated or converted for
    /// TLS use.
    pub fn new(ca: Arc<CertificateAuthority>) -> Result<Self, Error> {
        let rsa =
            Rsa::generate(RSA_KEY_BITS).map_err(|e| Error::ca("failed to generate leaf key", e))?;
        let key = PKey::from_rsa(rsa).map_err(|e| Error::ca("failed to wrap leaf key", e))?;
        let pkcs8 = key
            .private_key_to_pkcs8()
            .map_err(|e| Error::ca("failed to encode leaf key", e))?;
        let signing_key = rustls::sign::any_supported_type(&rustls::PrivateKey(pkcs8))
            .map_err(|e| Error::ca("unusable leaf key", e))?;
        let ca_cert = ca
            .certificate()
            .to_der()
            .map_err(|e| Error::ca("failed to encode CA certificate", e))?;
        Ok(LeafIssuer {
            ca,
            key,
            signing_key,
            ca_cert: rustls::Certificate(ca_cert),
        })
    }

    pub fn ca(&self) -> &CertificateAuthority {
        &self.ca
    }

    /// Sign a fresh leaf certificate for `host` and pair it with the shared leaf key, ready to
    /// present in a handshake. The chain is `[leaf, root]`.
    ///
    /// An empty `host` (no SNI) is signed with an empty subject. Every call produces a new
    /// certificate with a new random serial, even for a host signed before.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the certificate can't be built or signed.
    pub fn sign_for(&self, host: &str) -> Result<CertifiedKey, Error> {
        let leaf = self
            .build_leaf(host)
            .and_then(|cert| cert.to_der())
            .map_err(|e| Error::Signing(format!("{host:?}: {e}")))?;
        Ok(CertifiedKey::new(
            vec![rustls::Certificate(leaf), self.ca_cert.clone()],
            Arc::clone(&self.signing_key),
        ))
    }

    fn build_leaf(&self, host: &str) -> Result<X509, ErrorStack> {
        let ca_cert = self.ca.certificate();

        let mut name = X509Name::builder()?;
        if !host.is_empty() && host.len() <= MAX_COMMON_NAME_LEN {
            name.append_entry_by_nid(Nid::COMMONNAME, host)?;
        }
        let name = name.build();

        let mut serial = BigNum::new()?;
        serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        let serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(ca_cert.subject_name())?;
        builder.set_pubkey(&self.key)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;

        builder.append_extension(KeyUsage::new().critical().digital_signature().build()?)?;
        builder.append_extension(ExtendedKeyUsage::new().client_auth().server_auth().build()?)?;
        let ski =
            SubjectKeyIdentifier::new().build(&builder.x509v3_context(Some(ca_cert), None))?;
        builder.append_extension(ski)?;
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(ca_cert), None))?;
        builder.append_extension(aki)?;
        if !host.is_empty() {
            let mut san = SubjectAlternativeName::new();
            if host.parse::<IpAddr>().is_ok() {
                san.ip(host);
            } else {
                san.dns(host);
            }
            let san = san.build(&builder.x509v3_context(Some(ca_cert), None))?;
            builder.append_extension(san)?;
        }

        builder.sign(self.ca.private_key(), MessageDigest::sha256())?;
        Ok(builder.build())
    }
}

/// Selects the certificate for each incoming `ClientHello` by signing one for its SNI.
pub struct SniResolver {
    issuer: Arc<LeafIssuer>,
}

impl SniResolver {
    pub fn new(issuer: Arc<LeafIssuer>) -> Self {
        SniResolver { issuer }
    }
}

impl fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniResolver").finish_non_exhaustive()
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let sni = client_hello.server_name().unwrap_or_default();
        debug!("signing certificate for SNI {sni:?}");
        match self.issuer.sign_for(sni) {
            Ok(key) => Some(Arc::new(key)),
            Err(err) => {
                // Returning nothing aborts this handshake only.
                error!("{err}");
                None
            }
        }
    }
}

/// A TLS server configuration that mints its certificate per handshake via [`SniResolver`].
pub fn server_config(issuer: Arc<LeafIssuer>) -> Arc<ServerConfig> {
    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniResolver::new(issuer)));
    Arc::new(config)
}
