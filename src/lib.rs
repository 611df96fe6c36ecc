//! netsim
//!
//! A network-traffic simulator for watching what a client does when every host it talks to
//! is answered locally.
//!
//! Point the client's resolver at the [catch-all DNS responder][dns] and every `A` lookup
//! resolves to one fixed address. Whatever it then sends over HTTP or HTTPS lands in the
//! [capture server][capture], which answers with a configurable canned response and reports
//! the request. HTTPS works for any host name without provisioning: each TLS handshake gets
//! a leaf certificate signed on the fly by a [self-issued root CA][ca]. Install the exported
//! root into the client's trust store once.
//!
//! The [`Engine`] starts and stops all of it together. Captured queries and requests are
//! delivered to caller-supplied [observers][event]; nothing is stored.
//!
#![warn(clippy::pedantic)]

pub mod ca;
pub mod capture;
pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod event;
pub mod response;

pub use config::Config;
pub use engine::{BoundPorts, Engine};
pub use error::Error;
pub use event::{DnsQueryEvent, HttpCaptureEvent, QueryObserver, RequestObserver};
pub use response::{FixedResponse, ResponseConfig, ResponseProvider, SharedResponse};
