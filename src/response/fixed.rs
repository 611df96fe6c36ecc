use crate::response::{ResponseConfig, ResponseProvider};

/// A provider that answers every request with the same response.
#[derive(Default, Debug, Clone)]
pub struct FixedResponse {
    response: ResponseConfig,
}

impl FixedResponse {
    pub fn new(response: ResponseConfig) -> Self {
        FixedResponse { response }
    }
}

impl ResponseProvider for FixedResponse {
    fn current(&self) -> ResponseConfig {
        self.response.clone()
    }
}
