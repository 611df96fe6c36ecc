use netsim::error::Listener;
use netsim::{
    Config, DnsQueryEvent, Engine, Error, HttpCaptureEvent, ResponseConfig, SharedResponse,
};
use openssl::x509::X509;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::rustls::{self, ServerName};
use tokio_rustls::TlsConnector;
use trust_dns_client::client::{AsyncClient, ClientHandle};
use trust_dns_client::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_client::proto::serialize::binary::BinEncodable;
use trust_dns_client::proto::iocompat::AsyncIoTokioAsStd;
use trust_dns_client::rr::{DNSClass, Name, RecordType};
use trust_dns_client::tcp::TcpClientStream;
use trust_dns_client::udp::UdpClientStream;

struct Harness {
    engine: Engine,
    queries: Arc<Mutex<Vec<DnsQueryEvent>>>,
    requests: Arc<Mutex<Vec<HttpCaptureEvent>>>,
    responses: SharedResponse,
    request_delay: Duration,
    _storage: TempDir,
}

fn local_config(storage: &TempDir) -> Config {
    Config {
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        dns_port: 0,
        http_port: 0,
        https_port: 0,
        storage_dir: storage.path().to_path_buf(),
        ..Config::default()
    }
}

impl Harness {
    fn new() -> Self {
        let storage = tempfile::tempdir().unwrap();
        Harness {
            engine: Engine::new(local_config(&storage)),
            queries: Arc::default(),
            requests: Arc::default(),
            responses: SharedResponse::new(ResponseConfig::new(200, "text/html", "hello")),
            request_delay: Duration::ZERO,
            _storage: storage,
        }
    }

    async fn start(&mut self) -> Result<netsim::BoundPorts, Error> {
        let queries = Arc::clone(&self.queries);
        let requests = Arc::clone(&self.requests);
        let delay = self.request_delay;
        self.engine
            .start(
                Arc::new(move |e: DnsQueryEvent| queries.lock().unwrap().push(e)),
                Arc::new(move |e: HttpCaptureEvent| {
                    std::thread::sleep(delay);
                    requests.lock().unwrap().push(e);
                }),
                Arc::new(self.responses.clone()),
            )
            .await
    }

    /// Request events are delivered after the response is written, so they may trail the
    /// reply a little.
    async fn captured(&self, count: usize) -> Vec<HttpCaptureEvent> {
        for _ in 0..500 {
            let requests = self.requests.lock().unwrap().clone();
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} captured requests");
    }
}

async fn exchange<S>(mut stream: S, request: &str) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    // A TLS peer may close without close_notify; whatever arrived is still in `buf`.
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

fn get(host: &str) -> String {
    format!("GET / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

#[tokio::test]
async fn dns_answers_a_queries_over_udp_and_tcp() {
    let mut harness = Harness::new();
    let ports = harness.start().await.unwrap();
    assert_eq!(ports.dns_udp.unwrap().port(), ports.dns_tcp.unwrap().port());

    let stream = UdpClientStream::<UdpSocket>::new(ports.dns_udp.unwrap());
    let (mut udp_client, bg) = AsyncClient::connect(stream).await.unwrap();
    tokio::spawn(bg);
    let name = Name::from_str("Example.TEST.").unwrap();
    let response = udp_client
        .query(name.clone(), DNSClass::IN, RecordType::A)
        .await
        .unwrap();
    assert_eq!(response.answers().len(), 1);
    assert!(response.answers()[0].to_string().ends_with("A 127.0.0.1"));

    let (stream, sender) =
        TcpClientStream::<AsyncIoTokioAsStd<TcpStream>>::new(ports.dns_tcp.unwrap());
    let (mut tcp_client, bg) = AsyncClient::new(stream, sender, None).await.unwrap();
    tokio::spawn(bg);
    let response = tcp_client
        .query(Name::from_str("anything.at.all.").unwrap(), DNSClass::IN, RecordType::A)
        .await
        .unwrap();
    assert_eq!(response.answers().len(), 1);

    let response = udp_client
        .query(name, DNSClass::IN, RecordType::AAAA)
        .await
        .unwrap();
    assert!(response.answers().is_empty());

    let domains: Vec<String> = harness
        .queries
        .lock()
        .unwrap()
        .iter()
        .map(|q| q.domain.clone())
        .collect();
    assert_eq!(domains, vec!["example.test.", "anything.at.all."]);

    harness.engine.stop().await;
}

#[tokio::test]
async fn http_requests_get_the_current_response() {
    let mut harness = Harness::new();
    let ports = harness.start().await.unwrap();
    let http = ports.http.unwrap();

    let reply = exchange(TcpStream::connect(http).await.unwrap(), &get("example.test")).await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
    assert!(reply.to_ascii_lowercase().contains("content-type: text/html\r\n"));
    assert!(reply.ends_with("hello"));

    harness
        .responses
        .set(ResponseConfig::new(503, "text/plain", "later"));
    let reply = exchange(TcpStream::connect(http).await.unwrap(), &get("other.test")).await;
    assert!(reply.starts_with("HTTP/1.1 503 Service Unavailable\r\n"), "{reply}");
    assert!(reply.ends_with("later"));

    let requests = harness.captured(2).await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url, "http://example.test/");
    assert_eq!(requests[0].uri, "GET http://example.test/ HTTP/1.1");
    assert_eq!(requests[1].url, "http://other.test/");

    harness.engine.stop().await;
}

#[tokio::test]
async fn https_leaf_is_trusted_through_the_exported_root() {
    let mut harness = Harness::new();
    let ports = harness.start().await.unwrap();

    let pem = harness.engine.export_ca_pem().unwrap();
    let root = X509::from_pem(&pem).unwrap().to_der().unwrap();
    let mut roots = rustls::RootCertStore::empty();
    roots.add(&rustls::Certificate(root)).unwrap();
    let tls_config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    for host in ["example.test", "another.example"] {
        let tcp = TcpStream::connect(ports.https.unwrap()).await.unwrap();
        let server_name = ServerName::try_from(host).unwrap();
        let tls = connector.connect(server_name, tcp).await.unwrap();
        let reply = exchange(tls, &get(host)).await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
        assert!(reply.ends_with("hello"));
    }

    let urls: Vec<String> = harness
        .captured(2)
        .await
        .iter()
        .map(|r| r.url.clone())
        .collect();
    assert_eq!(urls, vec!["https://example.test/", "https://another.example/"]);

    harness.engine.stop().await;
}

#[tokio::test]
async fn lifecycle() {
    let mut harness = Harness::new();
    assert!(matches!(harness.engine.export_ca_pem(), Err(Error::CaNotFound)));

    // Stopping an engine that never started is a no-op.
    harness.engine.stop().await;
    assert!(!harness.engine.is_running());

    let first = harness.start().await.unwrap();
    assert!(harness.engine.is_running());
    assert_eq!(harness.engine.bound_ports(), first);
    assert!(matches!(
        harness.start().await,
        Err(Error::AlreadyRunning(_))
    ));
    let root = harness.engine.export_ca_pem().unwrap();

    harness.engine.stop().await;
    harness.engine.stop().await;
    assert!(!harness.engine.is_running());
    assert_eq!(harness.engine.bound_ports(), netsim::BoundPorts::default());

    let second = harness.start().await.unwrap();
    assert!(second.http.is_some() && second.https.is_some());
    assert_eq!(harness.engine.export_ca_pem().unwrap(), root);

    let reply = exchange(
        TcpStream::connect(second.http.unwrap()).await.unwrap(),
        &get("again.test"),
    )
    .await;
    assert!(reply.ends_with("hello"));

    harness.engine.stop().await;
}

#[tokio::test]
async fn bind_failure_names_the_listener() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken_addr: SocketAddr = taken.local_addr().unwrap();

    let mut harness = Harness::new();
    harness.engine.config_mut().http_port = taken_addr.port();

    match harness.start().await {
        Err(Error::Bind { listener, addr, .. }) => {
            assert_eq!(listener, Listener::Http);
            assert_eq!(addr, taken_addr);
        }
        other => panic!("expected a bind error, got {other:?}"),
    }

    // The DNS responder came up before the failure and is torn down by stop.
    assert!(harness.engine.bound_ports().dns_udp.is_some());
    harness.engine.stop().await;
    assert!(!harness.engine.is_running());
}

#[tokio::test]
async fn slow_request_observer_does_not_delay_the_reply() {
    let mut harness = Harness::new();
    harness.request_delay = Duration::from_millis(1500);
    let ports = harness.start().await.unwrap();

    let mut stream = TcpStream::connect(ports.http.unwrap()).await.unwrap();
    let started = Instant::now();
    stream.write_all(get("slow.test").as_bytes()).await.unwrap();
    let mut first = [0u8; 1];
    stream.read_exact(&mut first).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(&first, b"H");

    let requests = harness.captured(1).await;
    assert_eq!(requests[0].url, "http://slow.test/");

    harness.engine.stop().await;
}

#[tokio::test]
async fn message_with_two_questions_is_a_format_error() {
    let mut harness = Harness::new();
    let ports = harness.start().await.unwrap();

    let mut message = Message::new();
    message
        .set_id(4242)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .add_query(Query::query(Name::from_str("one.test.").unwrap(), RecordType::A))
        .add_query(Query::query(Name::from_str("two.test.").unwrap(), RecordType::A));

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(&message.to_bytes().unwrap(), ports.dns_udp.unwrap())
        .await
        .unwrap();
    let mut buf = [0u8; 512];
    let len = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let reply = Message::from_vec(&buf[..len]).unwrap();
    assert_eq!(reply.id(), 4242);
    assert_eq!(reply.response_code(), ResponseCode::FormErr);
    assert!(reply.answers().is_empty());
    assert!(harness.queries.lock().unwrap().is_empty());

    harness.engine.stop().await;
}
