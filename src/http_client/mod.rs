//! HTTP client used by the fetcher and link checker.

mod response;
mod user_agent;

pub use response::{header_map, parse_content_length, HeadResponse, HttpResponse};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};
use thiserror::Error;
use url::Url;

/// Redirects followed before a request fails with "too many redirects".
pub const MAX_REDIRECTS: usize = 30;

/// Connection settings shared by every request of one client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub verify_https: bool,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            verify_https: true,
            proxy: None,
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Invalid proxy '{url}': {source}")]
    Proxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// HTTP client with streaming GET and redirect-free HEAD.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    no_redirect: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Build a client from settings.
    pub fn new(settings: &HttpSettings) -> Result<Self, HttpClientError> {
        let client = Self::builder(settings)?
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(HttpClientError::Build)?;
        let no_redirect = Self::builder(settings)?
            .redirect(Policy::none())
            .build()
            .map_err(HttpClientError::Build)?;

        Ok(Self {
            client,
            no_redirect,
            timeout: settings.timeout,
        })
    }

    fn builder(settings: &HttpSettings) -> Result<ClientBuilder, HttpClientError> {
        let user_agent = resolve_user_agent(settings.user_agent.as_deref());
        let mut builder = Client::builder()
            .user_agent(&user_agent)
            .timeout(settings.timeout)
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(!settings.verify_https);

        if let Some(proxy_url) = settings.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = Proxy::all(proxy_url).map_err(|source| HttpClientError::Proxy {
                url: proxy_url.to_string(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }
        Ok(builder)
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a GET and return once headers arrive; the body is read by the caller.
    pub async fn get(&self, url: &Url) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?;
        Ok(HttpResponse::new(response))
    }

    /// Send a HEAD without following redirects.
    pub async fn head(&self, url: &Url) -> Result<HeadResponse, reqwest::Error> {
        let response = self.no_redirect.head(url.clone()).send().await?;
        Ok(HeadResponse::new(&response))
    }
}
