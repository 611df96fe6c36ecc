//! Error types.

use std::fmt;
use std::net::SocketAddr;
use trust_dns_proto::error::ProtoError;

/// Names each of the four listeners the engine brings up, so a bind failure can say which
/// one never came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    DnsUdp,
    DnsTcp,
    Http,
    Https,
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Listener::DnsUdp => "DNS/UDP",
            Listener::DnsTcp => "DNS/TCP",
            Listener::Http => "HTTP",
            Listener::Https => "HTTPS",
        };
        f.write_str(name)
    }
}

/// Error enumerates the possible netsim error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when the root CA can't be generated, signed, encoded, decoded or written.
    /// Without a CA the HTTPS listener can't be provided, so this aborts startup.
    #[error("CA unavailable: {0}")]
    CaUnavailable(String),

    /// Returned by [`export_public_certificate_pem`][crate::ca::export_public_certificate_pem]
    /// when no CA has been generated or loaded into the storage directory yet.
    #[error("CA certificate not found, start the HTTPS server first")]
    CaNotFound,

    /// Returned when one of the listeners can't bind its socket, e.g. the port is in use or
    /// binding a low port needs more privilege.
    #[error("{listener} listener failed to bind {addr}")]
    Bind {
        listener: Listener,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Returned when signing a leaf certificate for a single TLS handshake fails.
    #[error("failed to sign leaf certificate: {0}")]
    Signing(String),

    /// Returned when `start` is called on a component that is already running.
    #[error("{0} is already running, stop it first")]
    AlreadyRunning(&'static str),

    /// Returned when an incoming HTTP request body can't be read.
    #[error("failed to read request body")]
    BodyRead(#[from] hyper::Error),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when [trying to load a `Config`][crate::config::Config::try_from_file] fails
    /// due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when the netsim DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}

impl Error {
    pub(crate) fn ca(context: &str, err: impl fmt::Display) -> Self {
        Error::CaUnavailable(format!("{context}: {err}"))
    }

    pub(crate) fn bind(listener: Listener, addr: SocketAddr, source: std::io::Error) -> Self {
        Error::Bind {
            listener,
            addr,
            source,
        }
    }
}
