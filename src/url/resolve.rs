use crate::{UrlError, UrlResult};
use url::Url;

/// Returns true for the schemes the crawler is willing to fetch
pub fn is_crawlable_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Resolves a raw link target against an already-parsed base URL
///
/// Resolution follows the WHATWG URL standard: relative paths, dot segments,
/// protocol-relative references and fragments are all handled by
/// [`Url::join`]. The fragment is kept, so `/c#frag` and `/c` are distinct.
///
/// # Returns
///
/// * `Some(Url)` - The absolute `http`/`https` URL
/// * `None` - The target could not be parsed or uses another scheme
///
/// # Examples
///
/// ```
/// use skein::url::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/a").unwrap();
/// assert_eq!(resolve_link(&base, "../b").unwrap().as_str(), "https://example.com/b");
/// assert!(resolve_link(&base, "mailto:x@y.com").is_none());
/// ```
pub fn resolve_link(base: &Url, raw_target: &str) -> Option<Url> {
    match base.join(raw_target) {
        Ok(resolved) if is_crawlable_scheme(&resolved) => Some(resolved),
        Ok(resolved) => {
            tracing::trace!(
                "Rejecting {} (scheme {}) found on {}",
                raw_target,
                resolved.scheme(),
                base
            );
            None
        }
        Err(e) => {
            tracing::trace!("Rejecting unparsable link {:?} on {}: {}", raw_target, base, e);
            None
        }
    }
}

/// Resolves a raw link target against a base URL given as a string
///
/// Rejects when the base fails to parse, the target fails to parse, or the
/// resolved scheme is neither `http` nor `https`.
pub fn resolve(base_url: &str, raw_target: &str) -> Option<Url> {
    let base = Url::parse(base_url).ok()?;
    resolve_link(&base, raw_target)
}

/// Validates a seed URL before it is admitted to the frontier
///
/// Seeds must be absolute `http` or `https` URLs with a host.
pub fn validate_seed(seed: &str) -> UrlResult<Url> {
    let url = Url::parse(seed.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", seed, e)))?;

    if !is_crawlable_scheme(&url) {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS seeds are supported, got {} in {}",
            url.scheme(),
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost(seed.to_string()));
    }

    Ok(url)
}
