//! URL Normalizer (L1): canonicalize a URL and gate it for crawl validity.
//! Grounded on `src/crawler/frontier.rs::normalize_url` (trailing-slash
//! handling) generalized with `original_source/app/utils/url_normalizer.py`'s
//! query-param sort and extension blocklist, which the teacher's version
//! lacked.

use url::Url;

const BLOCKED_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "zip", "mp4", "avi", "mp3",
];

/// Canonicalize `raw` into its normalized form: lowercase scheme and host,
/// path case preserved, trailing slash removed except at root, query
/// parameters sorted stably (blank values kept), fragment stripped.
///
/// Returns `None` if `raw` does not parse as an absolute URL.
pub fn normalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;

    let scheme = url.scheme().to_lowercase();
    url.set_scheme(&scheme).ok()?;

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        url.set_host(Some(&lower)).ok()?;
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// Two URLs are "the same page" iff their normalized forms are byte-equal.
pub fn same_page(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(na), Some(nb)) => na == nb,
        _ => false,
    }
}

/// Scheme must be http/https, host non-empty, extension not in the blocked
/// media/archive list.
pub fn is_valid(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }
    if url.host_str().map(|h| h.is_empty()).unwrap_or(true) {
        return false;
    }

    let path = url.path().to_lowercase();
    if let Some(ext) = path.rsplit('.').next() {
        if path.contains('.') && BLOCKED_EXTENSIONS.contains(&ext) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host_preserves_path_case() {
        assert_eq!(
            normalize("HTTPS://Example.COM/Path").as_deref(),
            Some("https://example.com/Path")
        );
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(normalize("https://example.com/a/").as_deref(), Some("https://example.com/a"));
        assert_eq!(normalize("https://example.com/").as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn sorts_query_params_including_blank_values() {
        let normalized = normalize("https://example.com/?b=2&a=&c=3").unwrap();
        assert_eq!(normalized, "https://example.com/?a=&b=2&c=3");
    }

    #[test]
    fn strips_fragment() {
        assert_eq!(
            normalize("https://example.com/page#section").as_deref(),
            Some("https://example.com/page")
        );
    }

    #[test]
    fn is_idempotent() {
        let once = normalize("HTTPS://Example.com/A/?z=1&y=2#frag").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(!is_valid("ftp://example.com/file.txt"));
        assert!(!is_valid("mailto:[email protected]"));
    }

    #[test]
    fn rejects_blocked_extensions() {
        assert!(!is_valid("https://example.com/doc.pdf"));
        assert!(!is_valid("https://example.com/image.JPG"));
        assert!(is_valid("https://example.com/page.html"));
    }

    #[test]
    fn rejects_empty_host() {
        assert!(!is_valid("file:///etc/passwd"));
    }

    #[test]
    fn same_page_compares_normalized_forms() {
        assert!(same_page("https://example.com/a/", "HTTPS://EXAMPLE.com/a"));
        assert!(!same_page("https://example.com/a", "https://example.com/b"));
    }
}
