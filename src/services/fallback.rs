//! Retry failing resources as OGC GetCapabilities requests.
//!
//! Catalog URLs for map services often point at an endpoint that only
//! answers properly when asked for its capabilities document.

use tracing::{debug, info};

use super::download::{DownloadError, DownloadResult, Downloader, RequestStyle};

/// Capability requests tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRequest {
    Wms13,
    Wms111,
    Wfs20,
}

impl ApiRequest {
    pub const ALL: [ApiRequest; 3] = [Self::Wms13, Self::Wms111, Self::Wfs20];

    pub fn service(&self) -> &'static str {
        match self {
            Self::Wms13 | Self::Wms111 => "WMS",
            Self::Wfs20 => "WFS",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Self::Wms13 => "1.3",
            Self::Wms111 => "1.1.1",
            Self::Wfs20 => "2.0",
        }
    }

    /// Stored as the archival's request type.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Wms13 => "WMS 1.3",
            Self::Wms111 => "WMS 1.1.1",
            Self::Wfs20 => "WFS 2.0",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label() == label)
    }

    /// The capabilities URL: the original query is dropped.
    pub fn capabilities_url(&self, url: &str) -> String {
        let base = url.split('?').next().unwrap_or(url);
        format!(
            "{}?service={}&request=GetCapabilities&version={}",
            base,
            self.service(),
            self.version()
        )
    }
}

/// Tries each [`ApiRequest`] until one downloads.
#[derive(Clone)]
pub struct ApiFallbackProber {
    downloader: Downloader,
}

impl ApiFallbackProber {
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }

    /// First successful capabilities download, or `None`.
    pub async fn probe(&self, url: &str, previous_etag: Option<&str>) -> Option<DownloadResult> {
        for request in ApiRequest::ALL {
            let api_url = request.capabilities_url(url);
            debug!("Trying {} request: {}", request.label(), api_url);

            match self.downloader.download(&api_url, previous_etag).await {
                Ok(mut result) => {
                    info!("{} request succeeded for {}", request.label(), url);
                    result.request_style = RequestStyle::Api(request);
                    return Some(result);
                }
                Err(e) => log_failure(request, &e),
            }
        }
        None
    }
}

fn log_failure(request: ApiRequest, err: &DownloadError) {
    info!("{} request failed: {}", request.label(), err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpClient, HttpSettings};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_capabilities_url_drops_query() {
        assert_eq!(
            ApiRequest::Wms13.capabilities_url("http://maps.example.com/wms?layer=x&foo=1"),
            "http://maps.example.com/wms?service=WMS&request=GetCapabilities&version=1.3"
        );
        assert_eq!(
            ApiRequest::Wfs20.capabilities_url("http://maps.example.com/wfs"),
            "http://maps.example.com/wfs?service=WFS&request=GetCapabilities&version=2.0"
        );
    }

    #[test]
    fn test_labels_round_trip() {
        for request in ApiRequest::ALL {
            assert_eq!(ApiRequest::from_label(request.label()), Some(request));
        }
        assert_eq!(ApiRequest::from_label("GET"), None);
    }

    #[tokio::test]
    async fn test_probe_uses_first_working_variant() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wms"))
            .and(query_param("version", "1.3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wms"))
            .and(query_param("version", "1.1.1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<WMT_MS_Capabilities/>"),
            )
            .mount(&server)
            .await;

        let http = HttpClient::new(&HttpSettings::default()).unwrap();
        let prober = ApiFallbackProber::new(Downloader::new(http, 10_000));

        let result = prober
            .probe(&format!("{}/wms?layer=1", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(result.request_style, RequestStyle::Api(ApiRequest::Wms111));
        assert_eq!(result.request_style.label(), "WMS 1.1.1");
    }

    #[tokio::test]
    async fn test_probe_returns_none_when_all_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&server)
            .await;

        let http = HttpClient::new(&HttpSettings::default()).unwrap();
        let prober = ApiFallbackProber::new(Downloader::new(http, 10_000));
        assert!(prober.probe(&server.uri(), None).await.is_none());
    }
}
