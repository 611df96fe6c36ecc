//! The engine: one DNS responder and one capture server, started and stopped together.

use crate::ca::{self, CertificateAuthority};
use crate::capture::CaptureServer;
use crate::config::Config;
use crate::dns::DnsResponder;
use crate::error::Error;
use crate::event::{DynQueryObserver, DynRequestObserver};
use crate::response::DynResponseProvider;
use std::net::SocketAddr;
use std::sync::Arc;

/// The addresses actually bound by a running engine. Useful when the configured ports are
/// `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundPorts {
    pub dns_udp: Option<SocketAddr>,
    pub dns_tcp: Option<SocketAddr>,
    pub http: Option<SocketAddr>,
    pub https: Option<SocketAddr>,
}

#[derive(Default)]
pub struct Engine {
    config: Config,
    dns: DnsResponder,
    capture: CaptureServer,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            dns: DnsResponder::new(),
            capture: CaptureServer::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Changes take effect on the next [`Engine::start`].
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Whether any listener is up.
    pub fn is_running(&self) -> bool {
        self.dns.is_running() || self.capture.is_running()
    }

    /// Load (or create on first use) the root CA from the storage directory, then start the
    /// DNS responder and the capture server.
    ///
    /// `query_observer` sees every answered `A` question, `request_observer` every captured
    /// HTTP or HTTPS request, and `responses` is asked for the canned response on each request.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Components started before it keep running until
    /// [`Engine::stop`] is called.
    ///
    /// Returns [`Error::AlreadyRunning`] if any component is still running from an earlier
    /// start.
    pub async fn start(
        &mut self,
        query_observer: DynQueryObserver,
        request_observer: DynRequestObserver,
        responses: DynResponseProvider,
    ) -> Result<BoundPorts, Error> {
        if self.is_running() {
            return Err(Error::AlreadyRunning("engine"));
        }

        let storage_dir = self.config.storage_dir.clone();
        let load = move || CertificateAuthority::load_or_create(storage_dir);
        let ca = tokio::task::spawn_blocking(load)
            .await
            .map_err(|e| Error::ca("CA loading aborted", e))??;

        self.dns.start(&self.config, query_observer).await?;
        self.capture
            .start(&self.config, Arc::new(ca), request_observer, responses)
            .await?;

        let ports = self.bound_ports();
        tracing::info!("engine started");
        Ok(ports)
    }

    /// Stop whatever is running. Safe to call on a stopped or partially started engine.
    pub async fn stop(&mut self) {
        self.capture.stop().await;
        self.dns.stop().await;
    }

    pub fn bound_ports(&self) -> BoundPorts {
        let (dns_udp, dns_tcp) = self.dns.local_addrs().unzip();
        let (http, https) = self.capture.local_addrs().unzip();
        BoundPorts {
            dns_udp,
            dns_tcp,
            http,
            https,
        }
    }

    /// The root CA certificate in PEM form, for installing into a client's trust store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaNotFound`] if the engine has never been started with this storage
    /// directory.
    pub fn export_ca_pem(&self) -> Result<Vec<u8>, Error> {
        ca::export_public_certificate_pem(&self.config.storage_dir)
    }
}
