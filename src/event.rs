//! Capture events and the observers they are reported to.
//!
//! Calls arrive concurrently from the DNS UDP, DNS TCP, HTTP and HTTPS listeners, so
//! implementations do their own synchronization. A query observer runs inside the DNS handler
//! and should return quickly. A request observer runs on the blocking pool once the response
//! has been written, so it may take its time without holding up the client.

use std::sync::Arc;
use time::OffsetDateTime;

/// A type-A DNS question seen by the [DNS responder][crate::dns].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQueryEvent {
    /// The queried name as a fully qualified, lowercased name, e.g. `example.test.`.
    pub domain: String,
    pub received: OffsetDateTime,
}

/// An HTTP(S) request answered by the [capture server][crate::capture].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCaptureEvent {
    /// The absolute URL of the request, e.g. `http://example.test/`.
    pub url: String,
    /// `METHOD absolute-url PROTO`, e.g. `GET http://example.test/ HTTP/1.1`.
    pub uri: String,
    /// The reconstructed raw request text.
    pub content: String,
    /// A `curl` invocation reproducing the request.
    pub curl_command: String,
    pub received: OffsetDateTime,
}

pub type DynQueryObserver = Arc<dyn QueryObserver + Send + Sync>;
pub type DynRequestObserver = Arc<dyn RequestObserver + Send + Sync>;

pub trait QueryObserver {
    fn on_query(&self, event: DnsQueryEvent);
}

pub trait RequestObserver {
    fn on_request(&self, event: HttpCaptureEvent);
}

impl<F> QueryObserver for F
where
    F: Fn(DnsQueryEvent),
{
    fn on_query(&self, event: DnsQueryEvent) {
        self(event);
    }
}

impl<F> RequestObserver for F
where
    F: Fn(HttpCaptureEvent),
{
    fn on_request(&self, event: HttpCaptureEvent) {
        self(event);
    }
}
