//! Favicon resolution (L3): prefer `<link rel>` candidates found in the
//! document head; fall back to probing a fixed list of common paths.
//! Grounded on `original_source/app/utils/favicon_fetcher.py`'s probe order,
//! adapted to the extension-priority tie-break the page spec calls for.

use std::time::Duration;

pub const COMMON_FAVICON_PATHS: &[&str] = &[
    "/favicon.ico",
    "/favicon.png",
    "/favicon.svg",
    "/apple-touch-icon.png",
    "/favicon.jpg",
    "/favicon.jpeg",
    "/assets/favicon.ico",
    "/images/favicon.ico",
];

/// Extension priority when more than one favicon candidate is available:
/// png beats svg beats ico beats everything else (jpg included).
fn extension_rank(url: &str) -> u8 {
    let lower = url.to_lowercase();
    if lower.ends_with(".png") {
        0
    } else if lower.ends_with(".svg") {
        1
    } else if lower.ends_with(".ico") {
        2
    } else {
        3
    }
}

/// Pick the best favicon among candidates by extension priority, keeping the
/// first occurrence among ties (stable).
pub fn pick_best(candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(idx, url)| (extension_rank(url), *idx))
        .map(|(_, url)| url.clone())
}

/// Probe the fixed list of common favicon paths under `base_url`'s origin.
/// Returns every path that responds with a successful status.
pub async fn probe_common_paths(client: &reqwest::Client, base_url: &str) -> Vec<String> {
    let Ok(base) = url::Url::parse(base_url) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for path in COMMON_FAVICON_PATHS {
        let Ok(candidate) = base.join(path) else {
            continue;
        };
        let candidate_str = candidate.to_string();
        let Ok(resp) = client
            .head(&candidate_str)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        else {
            continue;
        };
        if resp.status().is_success() {
            found.push(candidate_str);
        }
    }
    found
}

/// Resolve a favicon URL for a page: HTML `<link>` candidates win outright
/// (picked by extension priority among themselves); only when the HTML had
/// none do we fall back to probing common paths.
pub async fn resolve(
    client: &reqwest::Client,
    base_url: &str,
    html_candidates: &[String],
) -> Option<String> {
    if !html_candidates.is_empty() {
        return pick_best(html_candidates);
    }
    let probed = probe_common_paths(client, base_url).await;
    pick_best(&probed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_png_over_ico() {
        let candidates = vec![
            "https://example.com/favicon.ico".to_string(),
            "https://example.com/favicon.png".to_string(),
        ];
        assert_eq!(pick_best(&candidates).as_deref(), Some("https://example.com/favicon.png"));
    }

    #[test]
    fn svg_beats_ico_but_not_png() {
        let candidates = vec![
            "https://example.com/a.ico".to_string(),
            "https://example.com/b.svg".to_string(),
        ];
        assert_eq!(pick_best(&candidates).as_deref(), Some("https://example.com/b.svg"));
    }

    #[test]
    fn ties_keep_first_occurrence() {
        let candidates = vec![
            "https://example.com/first.jpg".to_string(),
            "https://example.com/second.jpg".to_string(),
        ];
        assert_eq!(pick_best(&candidates).as_deref(), Some("https://example.com/first.jpg"));
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert_eq!(pick_best(&[]), None);
    }
}
