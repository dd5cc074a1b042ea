//! HTTP collaborator
//!
//! The pipeline only needs one thing from HTTP: given a canonical URL, the
//! status code, the raw body bytes and the character encoding the server
//! declared. Anything other than 200 is reported as a `FetchError`; retrying
//! is the task dispatcher's job, never the fetcher's.

use crate::config::FetcherConfig;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the HTTP collaborator
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with something other than 200
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Connection refused, timeout, TLS failure, truncated body...
    #[error("transport failure fetching {url}: {message}")]
    Transport { url: String, message: String },
}

/// A successful (HTTP 200) response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
    /// `charset` parameter of the Content-Type header, if any
    pub declared_encoding: Option<String>,
}

/// Retrieves the content behind a URL
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use moebius::config::FetcherConfig;
/// use moebius::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `HttpFetcher` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared_encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_of);

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, &e))?;

        Ok(FetchResponse {
            status_code: status.as_u16(),
            body: body.to_vec(),
            declared_encoding,
        })
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> FetchError {
    let message = if err.is_timeout() {
        "request timeout".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    };

    FetchError::Transport {
        url: url.to_string(),
        message,
    }
}

/// Extracts the `charset` parameter from a Content-Type header value
fn charset_of(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&FetcherConfig::default()).is_ok());
    }

    #[test]
    fn test_charset_of() {
        assert_eq!(
            charset_of("text/html; charset=UTF-8").as_deref(),
            Some("utf-8")
        );
        assert_eq!(
            charset_of("text/html;Charset=\"ISO-8859-1\"").as_deref(),
            Some("iso-8859-1")
        );
        assert_eq!(charset_of("text/html"), None);
        assert_eq!(charset_of("text/html; charset="), None);
    }

    #[tokio::test]
    async fn test_fetch_ok_returns_raw_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain; charset=utf-8")
                    .set_body_bytes(b"foobarbuzz".to_vec()),
            )
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(&FetcherConfig::default()).unwrap();
        let response = fetcher
            .fetch(&format!("{}/page", server.uri()))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, b"foobarbuzz");
        assert_eq!(response.declared_encoding.as_deref(), Some("utf-8"));
    }

    #[tokio::test]
    async fn test_fetch_non_200_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(&FetcherConfig::default()).unwrap();
        let result = fetcher.fetch(&format!("{}/missing", server.uri())).await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_fetch_other_success_codes_are_not_got() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new(&FetcherConfig::default()).unwrap();
        let result = fetcher.fetch(&server.uri()).await;

        assert!(matches!(result, Err(FetchError::Status { status: 204, .. })));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let fetcher = ReqwestFetcher::new(&FetcherConfig::default()).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:1/").await;

        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }
}
