//! Canned HTTP(S) responses.
//!
//! Every captured request is answered with the [`ResponseConfig`] returned by a
//! [`ResponseProvider`]. The provider is asked once per request and its answer is never
//! cached, so a caller can change the response while the servers are running.
//!
//! Two implementations are provided, [`fixed::FixedResponse`] and [`shared::SharedResponse`].
//! The former never changes. The latter can be updated at any time through
//! [`SharedResponse::set`][shared::SharedResponse::set].

use serde::Deserialize;
use std::sync::Arc;

pub mod fixed;
pub mod shared;

pub use fixed::FixedResponse;
pub use shared::SharedResponse;

/// `DynResponseProvider` is a type alias for a [`ResponseProvider`] shared between the HTTP
/// and HTTPS listeners and every connection they accept.
#[allow(clippy::module_name_repetitions)]
pub type DynResponseProvider = Arc<dyn ResponseProvider + Send + Sync>;

/// A "current response" capability. Called once for every incoming HTTP(S) request.
#[allow(clippy::module_name_repetitions)]
pub trait ResponseProvider {
    fn current(&self) -> ResponseConfig;
}

/// The status line, `Content-Type` and entity written back for a captured request.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct ResponseConfig {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        ResponseConfig {
            status: 200,
            content_type: "text/html".to_string(),
            body: "@_@".to_string(),
        }
    }
}

impl ResponseConfig {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        ResponseConfig {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Build a response from a status code given as text, as a UI entry would hold it. An
    /// unparseable status falls back to `200`.
    pub fn from_strs(status: &str, content_type: &str, body: &str) -> Self {
        let status = status.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("invalid status code \"{status}\", using 200");
            200
        });
        ResponseConfig::new(status, content_type, body)
    }
}
