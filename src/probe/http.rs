//! Probes that GET a health endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use super::predicate::BodyPredicate;
use super::Probe;
use crate::error::ProbeError;
use crate::http::HttpClient;

/// One GET against a fixed URL, judged by a [`BodyPredicate`]
pub struct HttpProbe {
    client: Arc<dyn HttpClient>,
    url: String,
    predicate: BodyPredicate,
}

impl HttpProbe {
    /// Probe `url` with the given policy
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>, predicate: BodyPredicate) -> Self {
        Self {
            client,
            url: url.into(),
            predicate,
        }
    }

    /// `/healthz` style endpoint answering a bare `ok`
    pub fn healthz(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self::new(client, url, BodyPredicate::Equals("ok".to_string()))
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn target(&self) -> String {
        self.url.clone()
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let response = self.client.get(&self.url).await?;
        self.predicate.evaluate(&response)
    }
}
