//! A live, caller-mutable implementation of the [`ResponseProvider`][super::ResponseProvider]
//! trait.
use crate::response::{ResponseConfig, ResponseProvider};
use std::sync::{Arc, PoisonError, RwLock};

/// A response that can be changed while the servers are running. Clones share the same
/// underlying value: keep one clone to [`set`][SharedResponse::set] from, hand another to
/// the engine.
#[derive(Default, Debug, Clone)]
pub struct SharedResponse {
    inner: Arc<RwLock<ResponseConfig>>,
}

impl SharedResponse {
    pub fn new(response: ResponseConfig) -> Self {
        SharedResponse {
            inner: Arc::new(RwLock::new(response)),
        }
    }

    /// Replace the response served to every subsequent request.
    pub fn set(&self, response: ResponseConfig) {
        // A poisoned lock still holds a complete value; keep serving it.
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = response;
    }
}

impl ResponseProvider for SharedResponse {
    fn current(&self) -> ResponseConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_visible_through_clones() {
        let shared = SharedResponse::new(ResponseConfig::new(200, "text/html", "hello"));
        let handed_out = shared.clone();
        assert_eq!(handed_out.current().body, "hello");

        shared.set(ResponseConfig::new(500, "application/json", "{}"));
        let now = handed_out.current();
        assert_eq!(now.status, 500);
        assert_eq!(now.content_type, "application/json");
    }
}
