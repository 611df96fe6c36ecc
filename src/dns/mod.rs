//! Catch-all DNS responder.
//!
//! Answers every `A` question, for any name, with the single configured
//! [`Config::answer_addr`][`crate::config::Config::answer_addr`] (`127.0.0.1` by default), over
//! both UDP and TCP on the same port. Questions of any other type, and messages with an opcode
//! other than `Query`, get a reply without answers. Nothing is ever resolved upstream.
//!
//! E.g. with the responder listening on port 5354:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5354 +short example.test A
//! 127.0.0.1
//! ❯ dig @127.0.0.1 -p 5354 +tcp +short anything.at.all A
//! 127.0.0.1
//! ❯ dig @127.0.0.1 -p 5354 +short example.test AAAA
//! ```
//!
//! Each answered `A` question is reported to the
//! [`QueryObserver`][crate::event::QueryObserver] as the lowercased, fully qualified name
//! (`example.test.`) before the reply is built.

mod handlers;
pub(crate) mod server;

use crate::config::Config;
use crate::error::Error;
use crate::event::DynQueryObserver;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use trust_dns_proto::error::ProtoError;

struct Running {
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    task: JoinHandle<Result<(), ProtoError>>,
}

/// The DNS responder, either stopped or running with its UDP and TCP listeners bound.
#[derive(Default)]
pub struct DnsResponder {
    running: Option<Running>,
}

impl DnsResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the UDP and TCP listeners on
    /// [`Config::dns_bind_addr`][crate::config::Config::dns_bind_addr] and start answering.
    /// Returns the bound UDP and TCP addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] naming the listener that couldn't bind; nothing is left running.
    ///
    /// Returns [`Error::AlreadyRunning`] if the responder hasn't been stopped since it was last
    /// started.
    pub async fn start(
        &mut self,
        config: &Config,
        observer: DynQueryObserver,
    ) -> Result<(SocketAddr, SocketAddr), Error> {
        if self.running.is_some() {
            return Err(Error::AlreadyRunning("DNS responder"));
        }

        let bound = server::new(config, observer).await?;
        let (udp_addr, tcp_addr) = (bound.udp_addr, bound.tcp_addr);
        tracing::info!("DNS listening on UDP {udp_addr}");
        tracing::info!("DNS listening on TCP {tcp_addr}");

        let task = tokio::spawn(async move {
            let res = bound.server.block_until_done().await;
            if let Err(err) = &res {
                tracing::error!("DNS server exited: {err}");
            }
            res
        });
        self.running = Some(Running {
            udp_addr,
            tcp_addr,
            task,
        });
        Ok((udp_addr, tcp_addr))
    }

    /// Stop both listeners. Does nothing when the responder isn't running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        tracing::info!("stopping DNS server");
        // Dropping the server future drops its listener tasks and closes their sockets.
        running.task.abort();
        if let Err(err) = running.task.await {
            if !err.is_cancelled() {
                tracing::error!("DNS server task failed: {err}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The bound UDP and TCP addresses while running.
    pub fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.running.as_ref().map(|r| (r.udp_addr, r.tcp_addr))
    }
}
