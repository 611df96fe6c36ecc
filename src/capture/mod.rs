//! HTTP and HTTPS capture server.
//!
//! Two listeners, one plaintext and one TLS, answer every request on every path with the
//! response currently held by the [`ResponseProvider`][crate::response::ResponseProvider],
//! then report the request to the [`RequestObserver`][crate::event::RequestObserver].
//!
//! The TLS listener has no certificate of its own. For each handshake it signs a leaf for
//! the server name in the `ClientHello` with the root CA (see [`crate::ca::issuer`]), so a
//! client trusting the root accepts a connection to any host name.
//!
//! E.g. with the response `(200, "text/html", "hello")`:
//!
//! ```bash
//! ❯ curl -s http://127.0.0.1:8080/any/path
//! hello
//! ❯ curl -s --cacert ca.pem --resolve example.test:8443:127.0.0.1 https://example.test:8443/
//! hello
//! ```
//!
//! The first request is reported as `http://127.0.0.1:8080/any/path`, the second as
//! `https://example.test:8443/`, each together with the raw request text and an equivalent
//! `curl` command.

mod capture_error;
mod render;
mod routes;

use crate::ca::issuer::{self, LeafIssuer};
use crate::ca::CertificateAuthority;
use crate::config::Config;
use crate::error::{Error, Listener};
use crate::event::DynRequestObserver;
use crate::response::DynResponseProvider;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use routes::CaptureState;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Served {
    addr: SocketAddr,
    handle: Handle,
    task: JoinHandle<io::Result<()>>,
}

impl Served {
    async fn shutdown(self, grace: Duration) {
        self.handle.graceful_shutdown(Some(grace));
        match self.task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("server on {} exited: {err}", self.addr),
            Err(err) => tracing::error!("server task on {} failed: {err}", self.addr),
        }
    }
}

struct Running {
    http: Served,
    https: Served,
    grace: Duration,
}

/// The capture server, either stopped or running with its HTTP and HTTPS listeners bound.
#[derive(Default)]
pub struct CaptureServer {
    running: Option<Running>,
}

impl CaptureServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the HTTP and HTTPS listeners and start serving. A fresh leaf key pair is
    /// generated for this run and every TLS handshake gets a leaf signed by `ca`. Returns the
    /// bound HTTP and HTTPS addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] naming the listener that couldn't bind; nothing is left running.
    ///
    /// Returns [`Error::CaUnavailable`] if the leaf key pair can't be generated.
    ///
    /// Returns [`Error::AlreadyRunning`] if the server hasn't been stopped since it was last
    /// started.
    pub async fn start(
        &mut self,
        config: &Config,
        ca: Arc<CertificateAuthority>,
        observer: DynRequestObserver,
        responses: DynResponseProvider,
    ) -> Result<(SocketAddr, SocketAddr), Error> {
        if self.running.is_some() {
            return Err(Error::AlreadyRunning("capture server"));
        }

        let http_listener = bind(Listener::Http, config.http_bind_addr())?;
        let https_listener = bind(Listener::Https, config.https_bind_addr())?;

        let issuer = tokio::task::spawn_blocking(move || LeafIssuer::new(ca))
            .await
            .map_err(|e| Error::ca("leaf key generation aborted", e))??;
        let tls_config = RustlsConfig::from_config(issuer::server_config(Arc::new(issuer)));

        let state = |scheme| CaptureState {
            scheme,
            observer: Arc::clone(&observer),
            responses: Arc::clone(&responses),
        };

        let http_addr = http_listener.local_addr()?;
        let http_handle = Handle::new();
        let http_server = axum_server::from_tcp(http_listener)
            .handle(http_handle.clone())
            .serve(routes::new(state("http")).into_make_service());
        tracing::info!("HTTP listening on {http_addr}");

        let https_addr = https_listener.local_addr()?;
        let https_handle = Handle::new();
        let https_server = axum_server::from_tcp_rustls(https_listener, tls_config)
            .handle(https_handle.clone())
            .serve(routes::new(state("https")).into_make_service());
        tracing::info!("HTTPS listening on {https_addr}");

        self.running = Some(Running {
            http: Served {
                addr: http_addr,
                handle: http_handle,
                task: tokio::spawn(http_server),
            },
            https: Served {
                addr: https_addr,
                handle: https_handle,
                task: tokio::spawn(https_server),
            },
            grace: config.shutdown_grace,
        });
        Ok((http_addr, https_addr))
    }

    /// Stop both listeners, giving in-flight connections the configured grace period before
    /// they are closed. Does nothing when the server isn't running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        tracing::info!("stopping HTTP and HTTPS servers");
        tokio::join!(
            running.http.shutdown(running.grace),
            running.https.shutdown(running.grace)
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The bound HTTP and HTTPS addresses while running.
    pub fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.running.as_ref().map(|r| (r.http.addr, r.https.addr))
    }
}

fn bind(listener: Listener, addr: SocketAddr) -> Result<TcpListener, Error> {
    let tcp = TcpListener::bind(addr).map_err(|e| Error::bind(listener, addr, e))?;
    tcp.set_nonblocking(true)?;
    Ok(tcp)
}
