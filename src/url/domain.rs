use url::Url;

/// Extracts the lower-cased host of a URL
///
/// Pages are grouped by this value in storage. It is not used for
/// deduplication, which works on the full URL string.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use skein::url::extract_domain;
///
/// let url = Url::parse("https://Sub.Example.COM:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("sub.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
