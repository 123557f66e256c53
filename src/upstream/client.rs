//! HTTP client for the upstream API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use url::Url;

use crate::config::UpstreamConfig;
use crate::upstream::{SignalHeaders, Upstream, UpstreamFailure, UpstreamResponse};

/// Upstream reached over HTTP(S) with a bearer token.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    signals: SignalHeaders,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamFailure> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            UpstreamFailure::NotConfigured(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamFailure::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            signals: signal_headers(config),
            timeout,
        })
    }

    /// Join a forwarded path and raw query onto the base URL.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base_path, path.trim_start_matches('/')));
        url.set_query(query.filter(|q| !q.is_empty()));
        url
    }
}

pub fn signal_headers(config: &UpstreamConfig) -> SignalHeaders {
    SignalHeaders {
        blocked: config.blocked_header.clone(),
        remaining: config.remaining_header.clone(),
        limit: config.limit_header.clone(),
        reset: config.reset_header.clone(),
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, path: &str, query: Option<&str>) -> Result<UpstreamResponse, UpstreamFailure> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| UpstreamFailure::NotConfigured("API token not configured".to_string()))?;
        let url = self.target_url(path, query);

        tracing::debug!(url = %url, "Calling upstream");

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(UpstreamResponse {
            status,
            blocked: self.signals.is_blocked(&headers),
            quota: self.signals.quota(&headers),
            headers,
            body,
        })
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}

impl HttpUpstream {
    fn classify(&self, e: reqwest::Error) -> UpstreamFailure {
        if e.is_timeout() {
            UpstreamFailure::Timeout(self.timeout)
        } else {
            UpstreamFailure::Transport(e.to_string())
        }
    }
}
