//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests bounded by a per-request timeout
//! - Redirect handling
//! - Rejecting responses that are not HTML
//! - Error classification
//!
//! There are no retries at this layer. A failed fetch is reported once and
//! the caller decides what to do with it.

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::url::is_crawlable_scheme;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on establishing a connection, independent of the fetch timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ways a fetch can fail
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, TLS failure, or timeout
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The server answered outside the 2xx range
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// The response started but the body could not be read
    #[error("failed to read body of {url}: {message}")]
    BodyRead { url: String, message: String },

    /// The server answered with something other than an HTML document
    #[error("skipping {url}: content type '{content_type}' is not HTML")]
    NotHtml { url: String, content_type: String },

    /// The URL is not http(s)
    #[error("refusing to fetch {url}: unsupported scheme '{scheme}'")]
    UnsupportedScheme { url: String, scheme: String },
}

impl FetchError {
    /// The HTTP status, for `Http` failures
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A successfully fetched response
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code (always 2xx)
    pub status: u16,

    /// Last-Modified header value, verbatim
    pub last_modified: Option<String>,

    /// Raw body bytes
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `crawler` - Redirect limit for the client
/// * `user_agent` - Identity sent with every request
///
/// # Example
///
/// ```no_run
/// use skein::config::{CrawlerConfig, UserAgentConfig};
/// use skein::crawler::build_http_client;
///
/// let crawler = CrawlerConfig {
///     workers: 4,
///     max_pages: 100,
///     max_depth: Some(2),
///     politeness_delay_ms: 1000,
///     fetch_timeout_secs: 10,
///     max_redirects: 10,
/// };
/// let user_agent = UserAgentConfig {
///     crawler_name: "Skein".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client = build_http_client(&crawler, &user_agent).unwrap();
/// ```
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    let redirect = if crawler.max_redirects == 0 {
        Policy::none()
    } else {
        Policy::limited(crawler.max_redirects)
    };

    Client::builder()
        .user_agent(user_agent.header_value())
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(redirect)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs one GET of `url`, bounded by `timeout`
///
/// Only 2xx responses succeed, and only when the body is HTML: a response
/// without a Content-Type is assumed to be HTML, anything else is refused
/// before the body is read. The timeout covers the whole exchange,
/// including reading the body; running out of time at any point is a
/// network error.
pub async fn fetch_url(
    client: &Client,
    url: &Url,
    timeout: Duration,
) -> Result<FetchedPage, FetchError> {
    if !is_crawlable_scheme(url) {
        return Err(FetchError::UnsupportedScheme {
            url: url.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| network_error(url, &e))?;

    let status = response.status();
    let final_url = response.url().clone();

    if !status.is_success() {
        return Err(FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    if let Some(content_type) = header_value(response.headers(), CONTENT_TYPE) {
        if !is_html(&content_type) {
            return Err(FetchError::NotHtml {
                url: url.to_string(),
                content_type,
            });
        }
    }
    let last_modified = header_value(response.headers(), LAST_MODIFIED);

    let body = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            network_error(url, &e)
        } else {
            FetchError::BodyRead {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    })?;

    if final_url != *url {
        tracing::debug!("{} redirected to {}", url, final_url);
    }

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        last_modified,
        body: body.to_vec(),
    })
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Whether a Content-Type names an HTML media type, ignoring parameters
fn is_html(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "text/html" || media_type == "application/xhtml+xml"
}

fn network_error(url: &Url, error: &reqwest::Error) -> FetchError {
    let message = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else if error.is_redirect() {
        format!("redirect error: {}", error)
    } else {
        error.to_string()
    };

    FetchError::Network {
        url: url.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn crawler_config() -> CrawlerConfig {
        CrawlerConfig {
            workers: 1,
            max_pages: 10,
            max_depth: None,
            politeness_delay_ms: 0,
            fetch_timeout_secs: 5,
            max_redirects: 10,
        }
    }

    fn user_agent_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn client() -> Client {
        build_http_client(&crawler_config(), &user_agent_config()).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&crawler_config(), &user_agent_config()).is_ok());

        let mut no_redirects = crawler_config();
        no_redirects.max_redirects = 0;
        assert!(build_http_client(&no_redirects, &user_agent_config()).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                    .set_body_raw("<html><title>Hi</title></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let page = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.final_url, url);
        assert_eq!(
            page.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(page.text(), "<html><title>Hi</title></html>");
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/broken", server.uri())).unwrap();
        let err = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Http { status: 500, .. }));
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_not_found_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_redirect_reports_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("moved", "text/html"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let page = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(page.final_url.path(), "/new");
        assert_eq!(page.text(), "moved");
        assert_eq!(page.last_modified, None);
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("TEXT/HTML"));
        assert!(is_html("application/xhtml+xml"));

        assert!(!is_html("text/plain"));
        assert!(!is_html("image/png"));
        assert!(!is_html("application/pdf"));
        assert!(!is_html(""));
    }

    #[tokio::test]
    async fn test_non_html_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/logo.png", server.uri())).unwrap();
        let err = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::NotHtml { ref content_type, .. } if content_type == "image/png"
        ));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_missing_content_type_treated_as_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/bare", server.uri())).unwrap();
        let page = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(page.body.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = fetch_url(&client(), &url, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop a listener to get a port nothing is serving
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let err = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_unsupported_scheme_rejected() {
        let url = Url::parse("ftp://example.com/file").unwrap();
        let err = fetch_url(&client(), &url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::UnsupportedScheme { .. }));
    }
}
