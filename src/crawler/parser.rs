use scraper::{Html, Selector};
use std::collections::HashMap;
use url::Url;

/// Robots directives parsed from `<meta name="robots">`. Each defaults to
/// permissive (`true`) absent an explicit negative directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotsDirectives {
    pub index: bool,
    pub follow: bool,
    pub archive: bool,
    pub snippet: bool,
}

impl Default for RobotsDirectives {
    fn default() -> Self {
        RobotsDirectives {
            index: true,
            follow: true,
            archive: true,
            snippet: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub h4: Vec<String>,
    pub h5: Vec<String>,
    pub h6: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub position: u32,
    pub src: String,
    pub alt: Option<String>,
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub responsive: bool,
}

/// Complete parsed representation of an HTML page, covering the Metadata
/// and Images extractors. Favicon resolution lives in [`crate::favicon`]
/// since its fallback path requires network probes.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub language: Option<String>,
    pub headings: Headings,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub images: Vec<ExtractedImage>,
    pub schema_json_ld: Vec<serde_json::Value>,
    pub structured_data_types: Vec<String>,
    pub og_tags: HashMap<String, String>,
    pub twitter_tags: HashMap<String, String>,
    pub robots_directives: RobotsDirectives,
    pub has_robots_meta: bool,
    pub publish_date: Option<String>,
    pub modified_date: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
    pub word_count: u32,
    pub text_content: String,
    pub html_favicon_candidates: Vec<String>,
}

pub struct Parser;

impl Parser {
    /// Parse an HTML document and extract all page-analysis-relevant data.
    pub fn parse(html_content: &str, base_url: &str) -> ParsedPage {
        let document = Html::parse_document(html_content);
        let base = Url::parse(base_url).ok();

        let json_ld = Self::extract_json_ld(&document);
        let og_tags = Self::extract_meta_map(&document, "property", "og:");
        let twitter_tags = Self::extract_meta_map(&document, "name", "twitter:");
        let headings = Self::extract_headings(&document);

        let title = Self::resolve_title(&document, &og_tags, &headings, base_url);
        let meta_description = Self::extract_named_meta(&document, "description")
            .or_else(|| og_tags.get("description").cloned());
        let canonical_url = Self::extract_canonical(&document);
        let language = Self::extract_language(&document);
        let (internal_links, external_links) = Self::extract_links(&document, &base);
        let images = Self::extract_images(&document);
        let (has_robots_meta, robots_directives) = Self::extract_robots_meta(&document);
        let structured_data_types = Self::structured_data_types(&json_ld);

        let publish_date = og_tags
            .get("published_time")
            .cloned()
            .or_else(|| Self::extract_named_meta(&document, "article:published_time"))
            .or_else(|| Self::first_json_ld_string(&json_ld, "datePublished"));
        let modified_date = og_tags
            .get("modified_time")
            .cloned()
            .or_else(|| Self::extract_named_meta(&document, "article:modified_time"))
            .or_else(|| Self::first_json_ld_string(&json_ld, "dateModified"));
        let author = og_tags
            .get("author")
            .cloned()
            .or_else(|| Self::extract_named_meta(&document, "author"))
            .or_else(|| Self::extract_named_meta(&document, "article:author"))
            .or_else(|| Self::first_json_ld_author(&json_ld));
        let keywords = Self::extract_keywords(&document);
        let text_content = Self::get_all_text(&document);
        let word_count = text_content.split_whitespace().count() as u32;
        let html_favicon_candidates = Self::extract_favicon_links(&document, &base);

        ParsedPage {
            title,
            meta_description,
            canonical_url,
            language,
            headings,
            internal_links,
            external_links,
            images,
            schema_json_ld: json_ld,
            structured_data_types,
            og_tags,
            twitter_tags,
            robots_directives,
            has_robots_meta,
            publish_date,
            modified_date,
            author,
            keywords,
            word_count,
            text_content,
            html_favicon_candidates,
        }
    }

    fn get_all_text(document: &Html) -> String {
        let body_sel = Selector::parse("body").unwrap();
        let mut text = String::new();
        if let Some(body) = document.select(&body_sel).next() {
            collect_text_excluding(&body, &mut text);
        }
        text
    }

    /// `og:title` > `<title>` > first `h1` > last non-empty URL path segment.
    fn resolve_title(
        document: &Html,
        og_tags: &HashMap<String, String>,
        headings: &Headings,
        base_url: &str,
    ) -> Option<String> {
        if let Some(og_title) = og_tags.get("title").filter(|s| !s.is_empty()) {
            return Some(og_title.clone());
        }

        let sel = Selector::parse("title").unwrap();
        if let Some(title) = document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
        {
            return Some(title);
        }

        if let Some(h1) = headings.h1.first() {
            return Some(h1.clone());
        }

        Url::parse(base_url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segs| segs.next_back().map(|s| s.to_string()))
            })
            .filter(|s| !s.is_empty())
            .map(|segment| segment.replace(['-', '_'], " "))
    }

    fn extract_named_meta(document: &Html, name: &str) -> Option<String> {
        let selector_str = format!(r#"meta[name="{name}"]"#);
        let sel = Selector::parse(&selector_str).ok()?;
        document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content").map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
    }

    fn extract_canonical(document: &Html) -> Option<String> {
        let sel = Selector::parse(r#"link[rel="canonical"]"#).unwrap();
        document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("href").map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
    }

    fn extract_language(document: &Html) -> Option<String> {
        let html_sel = Selector::parse("html[lang]").unwrap();
        if let Some(lang) = document
            .select(&html_sel)
            .next()
            .and_then(|el| el.value().attr("lang"))
            .filter(|s| !s.is_empty())
        {
            return Some(lang.to_string());
        }
        Self::extract_named_meta(document, "language")
    }

    fn extract_headings(document: &Html) -> Headings {
        let mut headings = Headings::default();
        for (tag, vec) in [
            ("h1", &mut headings.h1),
            ("h2", &mut headings.h2),
            ("h3", &mut headings.h3),
            ("h4", &mut headings.h4),
            ("h5", &mut headings.h5),
            ("h6", &mut headings.h6),
        ] {
            let sel = Selector::parse(tag).unwrap();
            for el in document.select(&sel) {
                let text = el.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    vec.push(text);
                }
            }
        }
        headings
    }

    /// Partitions anchors into internal/external by exact host equality with
    /// the base URL. The stricter registered-domain filter used when
    /// deciding which links to re-queue as child Jobs lives in
    /// [`crate::crawler::same_registered_host`].
    fn extract_links(document: &Html, base: &Option<Url>) -> (Vec<String>, Vec<String>) {
        let sel = Selector::parse("a[href]").unwrap();
        let mut internal = Vec::new();
        let mut external = Vec::new();

        let base_host = base
            .as_ref()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()));

        for el in document.select(&sel) {
            if let Some(href) = el.value().attr("href") {
                let resolved = if let Some(base) = base {
                    base.join(href).ok()
                } else {
                    Url::parse(href).ok()
                };

                if let Some(resolved_url) = resolved {
                    if resolved_url.scheme() != "http" && resolved_url.scheme() != "https" {
                        continue;
                    }
                    let link_host = resolved_url.host_str().map(|h| h.to_lowercase());
                    let url_str = resolved_url.to_string();

                    if link_host == base_host {
                        internal.push(url_str);
                    } else {
                        external.push(url_str);
                    }
                }
            }
        }

        (internal, external)
    }

    fn extract_images(document: &Html) -> Vec<ExtractedImage> {
        let sel = Selector::parse("img").unwrap();
        let mut images = Vec::new();
        let mut position = 0u32;

        for el in document.select(&sel) {
            let src = el.value().attr("src").unwrap_or("").trim();
            if src.is_empty() || src.starts_with("data:") {
                continue;
            }

            let srcset = el.value().attr("srcset").unwrap_or("");
            let sizes = el.value().attr("sizes").unwrap_or("");
            let class = el.value().attr("class").unwrap_or("");
            let responsive = !srcset.is_empty() || !sizes.is_empty() || class.contains("responsive");

            images.push(ExtractedImage {
                position,
                src: src.to_string(),
                alt: el.value().attr("alt").map(|s| s.to_string()).filter(|s| !s.is_empty()),
                title: el.value().attr("title").map(|s| s.to_string()).filter(|s| !s.is_empty()),
                width: el.value().attr("width").and_then(|w| w.parse().ok()),
                height: el.value().attr("height").and_then(|h| h.parse().ok()),
                responsive,
            });
            position += 1;
        }

        images
    }

    fn extract_json_ld(document: &Html) -> Vec<serde_json::Value> {
        let sel = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
        document
            .select(&sel)
            .filter_map(|el| {
                let text = el.text().collect::<String>();
                serde_json::from_str::<serde_json::Value>(text.trim()).ok()
            })
            .collect()
    }

    fn structured_data_types(json_ld: &[serde_json::Value]) -> Vec<String> {
        const KNOWN: &[&str] = &[
            "Article",
            "BlogPosting",
            "NewsArticle",
            "Product",
            "Offer",
            "Event",
            "Organization",
            "LocalBusiness",
            "Person",
            "BreadcrumbList",
            "FAQPage",
            "HowTo",
            "VideoObject",
        ];

        let mut found = Vec::new();
        for value in json_ld {
            if let Some(type_str) = value.get("@type").and_then(|v| v.as_str()) {
                if KNOWN.contains(&type_str) && !found.contains(&type_str.to_string()) {
                    found.push(type_str.to_string());
                }
            }
        }
        found
    }

    fn first_json_ld_string(json_ld: &[serde_json::Value], field: &str) -> Option<String> {
        json_ld
            .iter()
            .find_map(|v| v.get(field).and_then(|f| f.as_str()).map(|s| s.to_string()))
    }

    fn first_json_ld_author(json_ld: &[serde_json::Value]) -> Option<String> {
        json_ld.iter().find_map(|v| {
            let author = v.get("author")?;
            author
                .as_str()
                .map(|s| s.to_string())
                .or_else(|| author.get("name")?.as_str().map(|s| s.to_string()))
        })
    }

    fn extract_meta_map(document: &Html, attr: &str, prefix: &str) -> HashMap<String, String> {
        let selector_str = format!(r#"meta[{attr}]"#);
        let sel = Selector::parse(&selector_str).unwrap();
        let mut map = HashMap::new();
        for el in document.select(&sel) {
            let Some(key) = el.value().attr(attr) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(content) = el.value().attr("content") {
                if !content.is_empty() {
                    map.insert(key[prefix.len()..].to_string(), content.to_string());
                }
            }
        }
        map
    }

    fn extract_robots_meta(document: &Html) -> (bool, RobotsDirectives) {
        let sel = Selector::parse(r#"meta[name="robots"]"#).unwrap();
        let mut directives = RobotsDirectives::default();
        let mut found = false;

        for el in document.select(&sel) {
            found = true;
            if let Some(content) = el.value().attr("content") {
                let lower = content.to_lowercase();
                if lower.contains("noindex") {
                    directives.index = false;
                }
                if lower.contains("nofollow") {
                    directives.follow = false;
                }
                if lower.contains("noarchive") {
                    directives.archive = false;
                }
                if lower.contains("nosnippet") {
                    directives.snippet = false;
                }
            }
        }

        (found, directives)
    }

    fn extract_keywords(document: &Html) -> Vec<String> {
        let mut keywords = Vec::new();
        if let Some(meta_keywords) = Self::extract_named_meta(document, "keywords") {
            keywords.extend(meta_keywords.split(',').map(|k| k.trim().to_string()).filter(|k| !k.is_empty()));
        }
        let sel = Selector::parse(r#"meta[property="article:tag"]"#).unwrap();
        for el in document.select(&sel) {
            if let Some(tag) = el.value().attr("content").filter(|s| !s.is_empty()) {
                keywords.push(tag.to_string());
            }
        }
        keywords
    }

    /// `<link>` tags inside `<head>` whose `rel` mentions icon/shortcut/apple-touch,
    /// resolved against the base URL, in document order.
    fn extract_favicon_links(document: &Html, base: &Option<Url>) -> Vec<String> {
        let sel = Selector::parse("head link[rel][href]").unwrap();
        let mut candidates = Vec::new();
        for el in document.select(&sel) {
            let rel = el.value().attr("rel").unwrap_or("").to_lowercase();
            if !(rel.contains("icon") || rel.contains("shortcut") || rel.contains("apple-touch")) {
                continue;
            }
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let resolved = match base {
                Some(b) => b.join(href).ok().map(|u| u.to_string()),
                None => Some(href.to_string()),
            };
            if let Some(url) = resolved {
                candidates.push(url);
            }
        }
        candidates
    }
}

fn collect_text_excluding(node: &scraper::ElementRef, out: &mut String) {
    for child in node.children() {
        if let Some(text) = child.value().as_text() {
            out.push(' ');
            out.push_str(text);
        } else if let Some(el) = scraper::ElementRef::wrap(child) {
            let tag = el.value().name();
            if tag != "script" && tag != "style" {
                collect_text_excluding(&el, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Test Page Title</title>
    <meta name="description" content="A test page for parsing">
    <link rel="canonical" href="https://example.com/test">
    <meta name="robots" content="noindex, follow">
    <meta property="og:title" content="OG Test Title">
    <meta property="og:description" content="OG description">
    <meta property="og:image" content="https://example.com/image.png">
    <meta property="og:type" content="article">
    <meta name="twitter:card" content="summary">
    <meta name="author" content="Jane Doe">
    <link rel="icon" href="/favicon.png">
    <link rel="apple-touch-icon" href="/apple-touch-icon.png">
    <script type="application/ld+json">{"@type": "Article", "datePublished": "2024-01-01", "author": {"name": "Jane Doe"}}</script>
</head>
<body>
    <h1>Main Heading</h1>
    <h2>Sub Heading One</h2>
    <h2>Sub Heading Two</h2>
    <h3>Third Level</h3>
    <p>This is some body text with several words for counting purposes.</p>
    <a href="/internal-page">Internal Link</a>
    <a href="https://other.com/page">External Link</a>
    <a href="https://example.com/another">Another Internal</a>
    <img src="img1.png" alt="Has alt text">
    <img src="img2.png">
    <img src="img3.png" alt="" srcset="img3-2x.png 2x">
    <script>var x = 1; do not count these words at all;</script>
    <style>.hidden { display: none; } also not counted</style>
</body>
</html>"#;

    #[test]
    fn title_prefers_og_title() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert_eq!(page.title.as_deref(), Some("OG Test Title"));
    }

    #[test]
    fn title_falls_back_through_tag_then_h1_then_url() {
        let no_og = "<html><head><title>Plain Title</title></head><body></body></html>";
        assert_eq!(
            Parser::parse(no_og, "https://example.com/x").title.as_deref(),
            Some("Plain Title")
        );

        let only_h1 = "<html><body><h1>Heading Only</h1></body></html>";
        assert_eq!(
            Parser::parse(only_h1, "https://example.com/x").title.as_deref(),
            Some("Heading Only")
        );

        let neither = "<html><body><p>nothing</p></body></html>";
        assert_eq!(
            Parser::parse(neither, "https://example.com/my-cool-post").title.as_deref(),
            Some("my cool post")
        );
    }

    #[test]
    fn meta_description_and_canonical() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert_eq!(page.meta_description.as_deref(), Some("A test page for parsing"));
        assert_eq!(page.canonical_url.as_deref(), Some("https://example.com/test"));
    }

    #[test]
    fn headings_collected_per_level() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert_eq!(page.headings.h1, vec!["Main Heading"]);
        assert_eq!(page.headings.h2, vec!["Sub Heading One", "Sub Heading Two"]);
        assert_eq!(page.headings.h3, vec!["Third Level"]);
        assert!(page.headings.h4.is_empty());
    }

    #[test]
    fn links_partitioned_by_host() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert!(page.internal_links.iter().any(|l| l.contains("internal-page")));
        assert!(page.internal_links.iter().any(|l| l.contains("another")));
        assert_eq!(page.external_links.len(), 1);
        assert!(page.external_links[0].contains("other.com"));
    }

    #[test]
    fn images_with_responsive_flag() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert_eq!(page.images.len(), 3);
        assert!(page.images[0].alt.is_some());
        assert!(page.images[1].alt.is_none());
        assert!(page.images[2].responsive);
    }

    #[test]
    fn json_ld_decoded_and_typed() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert_eq!(page.schema_json_ld.len(), 1);
        assert_eq!(page.structured_data_types, vec!["Article"]);
        assert_eq!(page.publish_date.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn malformed_json_ld_is_skipped_not_fatal() {
        let html = r#"<html><head><script type="application/ld+json">{not valid json</script></head><body></body></html>"#;
        let page = Parser::parse(html, "https://example.com");
        assert!(page.schema_json_ld.is_empty());
    }

    #[test]
    fn og_and_twitter_maps() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert_eq!(page.og_tags.get("type").unwrap(), "article");
        assert_eq!(page.twitter_tags.get("card").unwrap(), "summary");
    }

    #[test]
    fn robots_meta_noindex_parsed() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert!(page.has_robots_meta);
        assert!(!page.robots_directives.index);
        assert!(page.robots_directives.follow);
    }

    #[test]
    fn author_resolved_from_meta() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert_eq!(page.author.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn favicon_link_candidates_resolved_against_base() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert!(page.html_favicon_candidates.contains(&"https://example.com/favicon.png".to_string()));
        assert!(page.html_favicon_candidates.contains(&"https://example.com/apple-touch-icon.png".to_string()));
    }

    #[test]
    fn word_count_excludes_script_and_style() {
        let page = Parser::parse(TEST_HTML, "https://example.com/test");
        assert!(page.word_count > 10);
        assert!(page.word_count < 50);
    }

    #[test]
    fn empty_html_yields_no_title_and_zero_words() {
        let page = Parser::parse("", "https://example.com");
        assert!(page.title.is_none());
        assert_eq!(page.word_count, 0);
    }
}
