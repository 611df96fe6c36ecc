use crate::config::Config;
use crate::dns::handlers::Handler;
use crate::error::{Error, Listener};
use crate::event::DynQueryObserver;
use std::net::SocketAddr;
use tokio::net::{TcpListener, UdpSocket};
use trust_dns_server::ServerFuture;

/// A DNS server with its UDP socket and TCP listener bound, plus the addresses they ended up
/// on.
pub(crate) struct Bound {
    pub server: ServerFuture<Handler>,
    pub udp_addr: SocketAddr,
    pub tcp_addr: SocketAddr,
}

pub(crate) async fn new(config: &Config, observer: DynQueryObserver) -> Result<Bound, Error> {
    let addr = config.dns_bind_addr();
    let udp = UdpSocket::bind(addr)
        .await
        .map_err(|e| Error::bind(Listener::DnsUdp, addr, e))?;
    let udp_addr = udp.local_addr()?;

    // TCP shares the UDP port, including the one picked for a configured port of 0.
    let addr = SocketAddr::new(addr.ip(), udp_addr.port());
    let tcp = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::bind(Listener::DnsTcp, addr, e))?;
    let tcp_addr = tcp.local_addr()?;

    let dns_handler = Handler::new(config.answer_addr, observer);
    let mut server = ServerFuture::new(dns_handler);
    server.register_socket(udp);
    server.register_listener(tcp, config.dns_tcp_timeout);
    Ok(Bound {
        server,
        udp_addr,
        tcp_addr,
    })
}
