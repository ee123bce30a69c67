//! Metadata Analyzer (L5): assembles the unified `PageMetadataBundle` the
//! scorer, spam detector, classifier, and indexer all consume, from the L3
//! extraction output. Grounded on
//! `original_source/app/utils/metadata_analyzer.py` for the bundle shape and
//! the schema.org type vocabulary. Performs no independent HTML parsing.

use crate::crawler::parser::ParsedPage;
use crate::models::QueryIntent;

/// Structured-data types the Metadata Analyzer recognizes; anything else
/// extracted by L3 is dropped from `structured_data_types` here (L3 itself
/// already filters to this vocabulary, this is a defensive re-check).
pub const KNOWN_SCHEMA_TYPES: &[&str] = &[
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

#[derive(Debug, Clone)]
pub struct PageMetadataBundle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical_url: Option<String>,
    pub language: Option<String>,
    pub structured_data_types: Vec<String>,
    pub is_article: bool,
    pub has_structured_data: bool,
    pub has_publish_date: bool,
    pub has_author: bool,
    pub has_og_tags: bool,
    pub has_meta_description: bool,
    pub query_intent: QueryIntent,
}

const COMMERCE_PATH_KEYWORDS: &[&str] = &["/product", "/shop", "/cart", "/checkout", "/buy", "/pricing"];
const NAV_PATH_KEYWORDS: &[&str] = &["/home", "/about", "/contact", "/login", "/sitemap"];
const INFO_PATH_KEYWORDS: &[&str] = &["/blog", "/article", "/news", "/guide", "/how-to", "/docs"];

fn infer_query_intent(url: &str, structured_types: &[String], og_type: Option<&str>) -> QueryIntent {
    let lower = url.to_lowercase();
    let has_commerce_schema = structured_types.iter().any(|t| t == "Product" || t == "Offer")
        || og_type == Some("product");
    if has_commerce_schema || COMMERCE_PATH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return QueryIntent::Transactional;
    }
    if NAV_PATH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return QueryIntent::Navigational;
    }
    if INFO_PATH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return QueryIntent::Informational;
    }
    QueryIntent::Unknown
}

/// Assemble the metadata bundle from L3's parsed page, cross-validating and
/// normalizing fields rather than leaving a lower-priority fallback unused.
pub fn analyze(parsed: &ParsedPage, url: &str) -> PageMetadataBundle {
    let structured_data_types: Vec<String> = parsed
        .structured_data_types
        .iter()
        .filter(|t| KNOWN_SCHEMA_TYPES.contains(&t.as_str()))
        .cloned()
        .collect();

    let is_article = structured_data_types
        .iter()
        .any(|t| t == "Article" || t == "BlogPosting" || t == "NewsArticle")
        || parsed.og_tags.get("type").map(|t| t == "article").unwrap_or(false);

    let has_structured_data = !structured_data_types.is_empty();
    let has_publish_date = parsed.publish_date.is_some();
    let has_author = parsed.author.is_some();
    let has_og_tags = !parsed.og_tags.is_empty();
    let has_meta_description = parsed.meta_description.is_some();

    let query_intent = infer_query_intent(url, &structured_data_types, parsed.og_tags.get("type").map(|s| s.as_str()));

    PageMetadataBundle {
        title: parsed.title.clone(),
        description: parsed.meta_description.clone(),
        canonical_url: parsed.canonical_url.clone(),
        language: parsed.language.clone(),
        structured_data_types,
        is_article,
        has_structured_data,
        has_publish_date,
        has_author,
        has_og_tags,
        has_meta_description,
        query_intent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::parser::Parser;

    #[test]
    fn article_schema_marks_is_article() {
        let html = r#"<html><head><script type="application/ld+json">{"@type":"Article"}</script></head><body></body></html>"#;
        let parsed = Parser::parse(html, "https://example.com/post");
        let bundle = analyze(&parsed, "https://example.com/post");
        assert!(bundle.is_article);
        assert!(bundle.has_structured_data);
    }

    #[test]
    fn product_path_infers_transactional_intent() {
        let parsed = Parser::parse("<html></html>", "https://example.com/product/shoes");
        let bundle = analyze(&parsed, "https://example.com/product/shoes");
        assert_eq!(bundle.query_intent, QueryIntent::Transactional);
    }

    #[test]
    fn blog_path_infers_informational_intent() {
        let parsed = Parser::parse("<html></html>", "https://example.com/blog/post-1");
        let bundle = analyze(&parsed, "https://example.com/blog/post-1");
        assert_eq!(bundle.query_intent, QueryIntent::Informational);
    }

    #[test]
    fn unrecognized_path_is_unknown_intent() {
        let parsed = Parser::parse("<html></html>", "https://example.com/xyz123");
        let bundle = analyze(&parsed, "https://example.com/xyz123");
        assert_eq!(bundle.query_intent, QueryIntent::Unknown);
    }
}
