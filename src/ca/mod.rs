//! Root certificate authority.
//!
//! Every HTTPS connection is answered with a leaf certificate minted on the fly for the
//! server name the client asked for (see [`issuer`]). All of those leaves chain to a single
//! self-signed root that is created once per installation and persisted next to the
//! running engine:
//!
//! * `ca.p12`: a PKCS#12 bundle holding the root certificate and its RSA-4096 private key,
//!   protected with the fixed passphrase [`PKCS12_PASSWORD`]. The passphrase is not a
//!   security boundary, netsim is not a production CA.
//! * `ca.crt`: the raw DER encoding of the root certificate, for export.
//!
//! Installing the root into a client's trust store (see [`export_public_certificate_pem`])
//! makes the client accept every leaf netsim presents.

use crate::error::Error;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509Ref, X509};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub mod issuer;

pub use issuer::{LeafIssuer, SniResolver};

pub const PKCS12_FILE: &str = "ca.p12";
pub const CERT_FILE: &str = "ca.crt";
/// The passphrase protecting [`PKCS12_FILE`].
pub const PKCS12_PASSWORD: &str = "changeit";

pub(crate) const RSA_KEY_BITS: u32 = 4096;
pub(crate) const VALIDITY_DAYS: u32 = 3650;
const X509_VERSION_3: i32 = 2;
const ROOT_SERIAL: u32 = 2019;
const FRIENDLY_NAME: &str = "netsim";

/// The self-signed root used to sign every leaf certificate. Immutable once loaded or
/// generated and safe to share between concurrent handshakes.
pub struct CertificateAuthority {
    cert: X509,
    key: PKey<Private>,
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority").finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Load the root CA persisted in `storage_dir`, or generate and persist a new one if
    /// there is none yet.
    ///
    /// Generating the RSA-4096 key takes a while; call this from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaUnavailable`] if the bundle can't be read or decrypted, or if a new
    /// CA can't be generated or written.
    pub fn load_or_create(storage_dir: impl AsRef<Path>) -> Result<Self, Error> {
        let storage_dir = storage_dir.as_ref();
        let p12_path = storage_dir.join(PKCS12_FILE);
        match fs::read(&p12_path) {
            Ok(der) => {
                let ca = Self::from_pkcs12(&der)?;
                tracing::info!("loaded CA from {}", p12_path.display());
                let cert_path = storage_dir.join(CERT_FILE);
                if !cert_path.exists() {
                    tracing::info!("{} missing, writing it again", cert_path.display());
                    ca.write_certificate(&cert_path)?;
                }
                Ok(ca)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!("no CA at {}, generating one", p12_path.display());
                let ca = Self::generate()?;
                ca.persist(storage_dir)?;
                Ok(ca)
            }
            Err(err) => Err(Error::ca("failed to read CA bundle", err)),
        }
    }

    /// Generate a new self-signed root without persisting it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaUnavailable`] if key generation or signing fails.
    pub fn generate() -> Result<Self, Error> {
        let rsa =
            Rsa::generate(RSA_KEY_BITS).map_err(|e| Error::ca("failed to generate key", e))?;
        let key = PKey::from_rsa(rsa).map_err(|e| Error::ca("failed to wrap key", e))?;
        let cert = Self::self_signed(&key).map_err(|e| Error::ca("failed to sign root", e))?;
        Ok(CertificateAuthority { cert, key })
    }

    fn self_signed(key: &PKeyRef<Private>) -> Result<X509, openssl::error::ErrorStack> {
        let mut name = X509Name::builder()?;
        name.append_entry_by_nid(Nid::COMMONNAME, "Netsim Root CA")?;
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Netsim")?;
        name.append_entry_by_nid(Nid::COUNTRYNAME, "CH")?;
        name.append_entry_by_nid(Nid::LOCALITYNAME, "Zurich")?;
        name.append_entry_by_nid(Nid::STREETADDRESS, "Paradeplatz")?;
        name.append_entry_by_nid(Nid::POSTALCODE, "8000")?;
        let name = name.build();

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        let serial = BigNum::from_u32(ROOT_SERIAL)?.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(key)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;

        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_cert_sign()
                .build()?,
        )?;
        builder.append_extension(ExtendedKeyUsage::new().client_auth().server_auth().build()?)?;
        let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
        builder.append_extension(ski)?;

        builder.sign(key, MessageDigest::sha256())?;
        Ok(builder.build())
    }

    fn from_pkcs12(der: &[u8]) -> Result<Self, Error> {
        let parsed = Pkcs12::from_der(der)
            .and_then(|p12| p12.parse2(PKCS12_PASSWORD))
            .map_err(|e| Error::ca("failed to decode CA bundle", e))?;
        match (parsed.cert, parsed.pkey) {
            (Some(cert), Some(key)) => Ok(CertificateAuthority { cert, key }),
            _ => Err(Error::CaUnavailable(
                "CA bundle is missing the certificate or key".to_string(),
            )),
        }
    }

    /// Write `ca.p12` and `ca.crt` into `storage_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaUnavailable`] if encoding or writing either file fails.
    pub fn persist(&self, storage_dir: impl AsRef<Path>) -> Result<(), Error> {
        let storage_dir = storage_dir.as_ref();
        fs::create_dir_all(storage_dir)
            .map_err(|e| Error::ca("failed to create storage directory", e))?;

        let bundle = Pkcs12::builder()
            .name(FRIENDLY_NAME)
            .pkey(&self.key)
            .cert(&self.cert)
            .build2(PKCS12_PASSWORD)
            .and_then(|p12| p12.to_der())
            .map_err(|e| Error::ca("failed to encode CA bundle", e))?;
        write_file(&storage_dir.join(PKCS12_FILE), &bundle)?;
        self.write_certificate(&storage_dir.join(CERT_FILE))
    }

    fn write_certificate(&self, path: &Path) -> Result<(), Error> {
        let cert_der = self
            .cert
            .to_der()
            .map_err(|e| Error::ca("failed to encode CA certificate", e))?;
        write_file(path, &cert_der)
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.cert
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.key
    }

    /// The root certificate in PEM format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaUnavailable`] if the certificate can't be encoded.
    pub fn certificate_pem(&self) -> Result<Vec<u8>, Error> {
        self.cert
            .to_pem()
            .map_err(|e| Error::ca("failed to encode CA certificate", e))
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), Error> {
    fs::write(path, content)
        .map_err(|e| Error::ca(&format!("failed to write {}", path.display()), e))?;
    tracing::debug!("wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

/// Read the root certificate persisted in `storage_dir` and return it PEM encoded, ready to
/// be installed into a client trust store.
///
/// # Errors
///
/// Returns [`Error::CaNotFound`] if no CA has been generated in `storage_dir` yet, i.e. the
/// HTTPS server was never started there.
///
/// Returns [`Error::CaUnavailable`] if the stored certificate can't be read or parsed.
pub fn export_public_certificate_pem(storage_dir: impl AsRef<Path>) -> Result<Vec<u8>, Error> {
    let path = storage_dir.as_ref().join(CERT_FILE);
    let der = match fs::read(&path) {
        Ok(der) => der,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(Error::CaNotFound),
        Err(err) => return Err(Error::ca("failed to read CA certificate", err)),
    };
    X509::from_der(&der)
        .and_then(|cert| cert.to_pem())
        .map_err(|e| Error::ca("failed to parse CA certificate", e))
}
