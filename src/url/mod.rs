//! URL handling module for Skein
//!
//! This module turns raw link targets into absolute, crawlable URLs and
//! extracts the host used to group pages by domain.
//!
//! No canonicalization is applied beyond standard relative-reference
//! resolution: two URLs that differ only by a trailing slash, host case in
//! the raw input, or query-parameter order are distinct crawl targets.

mod domain;
mod resolve;

pub use domain::extract_domain;
pub use resolve::{is_crawlable_scheme, resolve, resolve_link, validate_seed};
