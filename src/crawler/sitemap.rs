use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Sitemap index recursion is bounded to prevent self-referential loops.
pub const MAX_SITEMAP_RECURSION_DEPTH: u32 = 10;
pub const DEFAULT_URL_CAP: usize = 5_000;

pub const COMMON_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap-index.xml",
    "/sitemap_index.xml",
    "/sitemap1.xml",
    "/sitemaps/sitemap.xml",
    "/sitemap/sitemap.xml",
    "/rss.xml",
    "/feed.xml",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct SitemapResult {
    pub urls: Vec<SitemapEntry>,
    pub total_count: u32,
    pub detected_sitemaps: Vec<String>,
}

enum ParsedSitemap {
    UrlSet(Vec<SitemapEntry>),
    Index(Vec<String>),
}

fn local_name(name: QName) -> String {
    let full = String::from_utf8_lossy(name.as_ref()).into_owned();
    full.rsplit(':').next().unwrap_or(&full).to_lowercase()
}

/// Parse sitemap XML, recognizing `<urlset>` and `<sitemapindex>` roots.
/// Returns `Err` on malformed XML or an unrecognized root element, signaling
/// the caller to fall back to regex `<loc>` extraction.
fn parse_sitemap_xml(xml: &str) -> Result<ParsedSitemap, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root_seen = false;
    let mut root_is_index = false;
    let mut entries = Vec::new();
    let mut child_urls = Vec::new();
    let mut in_item = false;
    let mut current_tag: Option<String> = None;
    let mut cur_loc: Option<String> = None;
    let mut cur_lastmod: Option<String> = None;
    let mut cur_changefreq: Option<String> = None;
    let mut cur_priority: Option<f32> = None;

    loop {
        match reader.read_event() {
            Err(e) => return Err(e.to_string()),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => match local_name(e.name()).as_str() {
                "urlset" => root_seen = true,
                "sitemapindex" => {
                    root_seen = true;
                    root_is_index = true;
                }
                "url" | "sitemap" => {
                    in_item = true;
                    cur_loc = None;
                    cur_lastmod = None;
                    cur_changefreq = None;
                    cur_priority = None;
                }
                other if in_item => current_tag = Some(other.to_string()),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_item {
                    if let Some(tag) = &current_tag {
                        let text = t.unescape().unwrap_or_default().trim().to_string();
                        match tag.as_str() {
                            "loc" => cur_loc = Some(text),
                            "lastmod" => cur_lastmod = Some(text),
                            "changefreq" => cur_changefreq = Some(text),
                            "priority" => cur_priority = text.parse::<f32>().ok(),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name());
                if name == "url" || name == "sitemap" {
                    in_item = false;
                    if let Some(loc) = cur_loc.take() {
                        if root_is_index {
                            child_urls.push(loc);
                        } else {
                            entries.push(SitemapEntry {
                                loc,
                                lastmod: cur_lastmod.take(),
                                changefreq: cur_changefreq.take(),
                                priority: cur_priority.take(),
                            });
                        }
                    }
                } else if in_item && current_tag.as_deref() == Some(name.as_str()) {
                    current_tag = None;
                }
            }
            _ => {}
        }
    }

    if !root_seen {
        return Err("no urlset/sitemapindex root element".to_string());
    }

    if root_is_index {
        Ok(ParsedSitemap::Index(child_urls))
    } else {
        Ok(ParsedSitemap::UrlSet(entries))
    }
}

/// Regex fallback: extract every `<loc>` value regardless of surrounding structure.
fn regex_locs(xml: &str) -> Vec<String> {
    let re = Regex::new(r"<loc>\s*(.*?)\s*</loc>").expect("valid regex");
    re.captures_iter(xml)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

async fn fetch_xml(client: &reqwest::Client, url: &str) -> Option<String> {
    let resp = client.get(url).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.text().await.ok()
}

/// Probe the robots-declared sitemaps plus a fixed list of common paths,
/// returning the deduplicated set of sitemap URLs that respond successfully.
pub async fn discover_sitemaps(domain: &str, robots_sitemaps: &[String]) -> Vec<String> {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
    {
        Ok(c) => c,
        Err(_) => return robots_sitemaps.to_vec(),
    };

    let mut found: HashSet<String> = robots_sitemaps.iter().cloned().collect();
    for path in COMMON_SITEMAP_PATHS {
        let url = format!("https://{domain}{path}");
        if let Ok(resp) = client.head(&url).send().await {
            if resp.status().is_success() {
                found.insert(url);
            }
        }
    }
    found.into_iter().collect()
}

/// Fetch and parse sitemaps, recursing into `sitemapindex` children up to
/// [`MAX_SITEMAP_RECURSION_DEPTH`], capping total discovered URLs at `url_cap`,
/// and filtering the result to `seed_domain` (exact host or its `www.` form).
pub async fn fetch_sitemap_urls(
    sitemap_urls: &[String],
    seed_domain: &str,
    url_cap: usize,
) -> SitemapResult {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
    {
        Ok(c) => c,
        Err(_) => return SitemapResult::default(),
    };

    let mut all_entries: Vec<SitemapEntry> = Vec::new();
    let mut detected: HashSet<String> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: Vec<(String, u32)> = sitemap_urls.iter().map(|u| (u.clone(), 0)).collect();

    while let Some((url, depth)) = queue.pop() {
        if depth > MAX_SITEMAP_RECURSION_DEPTH || all_entries.len() >= url_cap {
            continue;
        }
        if !visited.insert(url.clone()) {
            continue;
        }

        let Some(xml) = fetch_xml(&client, &url).await else {
            continue;
        };
        detected.insert(url);

        match parse_sitemap_xml(&xml) {
            Ok(ParsedSitemap::Index(children)) => {
                for child in children {
                    queue.push((child, depth + 1));
                }
            }
            Ok(ParsedSitemap::UrlSet(entries)) => all_entries.extend(entries),
            Err(_) => {
                for loc in regex_locs(&xml) {
                    all_entries.push(SitemapEntry {
                        loc,
                        ..Default::default()
                    });
                }
            }
        }
    }

    let total_count = all_entries.len() as u32;
    let seed_lower = seed_domain.to_lowercase();
    let mut seen = HashSet::new();
    let urls: Vec<SitemapEntry> = all_entries
        .into_iter()
        .filter(|e| {
            Url::parse(&e.loc)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
                .map(|h| h == seed_lower || h == format!("www.{seed_lower}"))
                .unwrap_or(false)
        })
        .filter(|e| seen.insert(e.loc.clone()))
        .take(url_cap)
        .collect();

    SitemapResult {
        urls,
        total_count,
        detected_sitemaps: detected.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc>https://example.com/about</loc><priority>0.8</priority></url>
</urlset>"#;
        match parse_sitemap_xml(xml).unwrap() {
            ParsedSitemap::UrlSet(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].loc, "https://example.com/");
                assert_eq!(entries[0].lastmod.as_deref(), Some("2024-01-01"));
                assert_eq!(entries[1].priority, Some(0.8));
            }
            ParsedSitemap::Index(_) => panic!("expected urlset"),
        }
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
  <sitemap><loc>https://example.com/sitemap-2.xml</loc></sitemap>
</sitemapindex>"#;
        match parse_sitemap_xml(xml).unwrap() {
            ParsedSitemap::Index(urls) => {
                assert_eq!(
                    urls,
                    vec![
                        "https://example.com/sitemap-1.xml",
                        "https://example.com/sitemap-2.xml"
                    ]
                );
            }
            ParsedSitemap::UrlSet(_) => panic!("expected index"),
        }
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_sitemap_xml("this is not xml at all").is_err());
        assert!(parse_sitemap_xml("<urlset><url><loc>unterminated").is_err());
    }

    #[test]
    fn regex_fallback_extracts_locs() {
        let locs = regex_locs("garbage <loc>https://example.com/a</loc> more <loc>https://example.com/b</loc>");
        assert_eq!(locs, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[tokio::test]
    async fn fetch_sitemap_urls_unreachable_host_returns_empty() {
        let result = fetch_sitemap_urls(
            &["https://nonexistent.invalid/sitemap.xml".to_string()],
            "example.com",
            DEFAULT_URL_CAP,
        )
        .await;
        assert!(result.urls.is_empty());
        assert_eq!(result.total_count, 0);
    }
}
