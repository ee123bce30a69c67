//! Page Value Scorer (L6): multi-factor 0-100 crawl priority score.
//! Grounded on `original_source/app/utils/page_value_scorer.py` — weights,
//! piecewise functions, and priority bands are ported as-is.

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkMetrics {
    pub depth_from_root: u32,
    pub internal_link_count: u32,
    pub external_backlink_estimate: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ContentMetrics {
    pub has_structured_data: bool,
    pub is_article: bool,
    pub has_publish_date: bool,
    pub has_author: bool,
    pub has_og_tags: bool,
    pub word_count: u32,
    pub headings_count: u32,
    pub has_meta_description: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPriority {
    CrawlNow,
    CrawlSoon,
    CrawlLater,
    LowValue,
}

impl CrawlPriority {
    pub fn numeric(self) -> u8 {
        match self {
            CrawlPriority::CrawlNow => 1,
            CrawlPriority::CrawlSoon => 3,
            CrawlPriority::CrawlLater => 6,
            CrawlPriority::LowValue => 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageValueScore {
    pub total_score: f64,
    pub link_score: f64,
    pub content_score: f64,
    pub metadata_score: f64,
    pub freshness_score: f64,
    pub uniqueness_score: f64,
    pub priority: CrawlPriority,
    pub factors: [(&'static str, f64); 7],
    pub reasoning: Vec<String>,
}

const WEIGHT_DEPTH: f64 = 0.15;
const WEIGHT_INTERNAL_LINKS: f64 = 0.15;
const WEIGHT_BACKLINKS: f64 = 0.15;
const WEIGHT_CONTENT: f64 = 0.20;
const WEIGHT_METADATA: f64 = 0.15;
const WEIGHT_FRESHNESS: f64 = 0.10;
const WEIGHT_UNIQUENESS: f64 = 0.10;

fn depth_score(depth: u32) -> f64 {
    match depth {
        0 | 1 => 100.0,
        2 => 85.0,
        3 => 70.0,
        4 => 55.0,
        5 => 40.0,
        d => (40.0 * (-0.2 * (d as f64 - 5.0)).exp()).max(10.0),
    }
}

fn internal_link_score(n: u32) -> f64 {
    match n {
        0 => 20.0,
        1 => 40.0,
        2..=3 => 60.0,
        4..=10 => 75.0,
        11..=50 => 85.0,
        n => (85.0 + (n as f64).ln() / 100f64.ln()).min(100.0),
    }
}

fn backlink_score(n: u32) -> f64 {
    match n {
        0 => 30.0,
        1..=5 => 50.0,
        6..=20 => 70.0,
        21..=100 => 85.0,
        n => (85.0 + (n as f64).ln() / 1000f64.ln()).min(100.0),
    }
}

fn content_quality_score(content: &ContentMetrics) -> f64 {
    let mut score = 50.0;
    if content.is_article {
        score += 15.0;
    }
    if content.has_structured_data {
        score += 5.0;
    }
    if content.has_publish_date {
        score += 5.0;
    }
    if content.has_author {
        score += 5.0;
    }
    if content.has_og_tags {
        score += 5.0;
    }
    if content.has_meta_description {
        score += 5.0;
    }
    if content.word_count >= 500 {
        score += 10.0;
    } else if content.word_count >= 300 {
        score += 7.0;
    } else if content.word_count >= 100 {
        score += 3.0;
    }
    if content.headings_count >= 5 {
        score += 5.0;
    } else if content.headings_count >= 3 {
        score += 3.0;
    }
    score.min(100.0)
}

fn metadata_score(content: &ContentMetrics) -> f64 {
    let present = [
        content.has_structured_data,
        content.has_publish_date,
        content.has_author,
        content.has_og_tags,
        content.has_meta_description,
    ];
    let count = present.iter().filter(|p| **p).count() as f64;
    (count / 5.0) * 100.0
}

fn uniqueness_score(url: &str, is_article: bool) -> f64 {
    let mut score = if is_article { 80.0 } else { 50.0 };
    let lower = url.to_lowercase();
    if lower.contains("archive") || lower.contains("category") || lower.contains("tag") || lower.contains("author") {
        score -= 15.0;
    }
    if lower.matches('?').count() > 1 {
        score -= 10.0;
    }
    score.max(10.0)
}

fn freshness_score(recently_crawled: bool) -> f64 {
    if recently_crawled {
        25.0
    } else {
        50.0
    }
}

fn priority_for(total: f64) -> CrawlPriority {
    if total >= 75.0 {
        CrawlPriority::CrawlNow
    } else if total >= 55.0 {
        CrawlPriority::CrawlSoon
    } else if total >= 35.0 {
        CrawlPriority::CrawlLater
    } else {
        CrawlPriority::LowValue
    }
}

fn build_reasoning(
    depth_s: f64,
    internal_s: f64,
    backlink_s: f64,
    content_s: f64,
    is_article: bool,
    total: f64,
) -> Vec<String> {
    let mut reasoning = Vec::new();
    if depth_s >= 80.0 {
        reasoning.push("shallow depth boosts crawl priority".to_string());
    }
    if internal_s >= 75.0 {
        reasoning.push("strong internal link count".to_string());
    }
    if backlink_s >= 75.0 {
        reasoning.push("strong backlink profile".to_string());
    }
    if content_s >= 80.0 {
        reasoning.push("high content quality".to_string());
    } else if content_s <= 50.0 {
        reasoning.push("low content quality".to_string());
    }
    if is_article {
        reasoning.push("article-like content".to_string());
    }
    if depth_s <= 40.0 {
        reasoning.push("deep in the site hierarchy".to_string());
    }
    if internal_s <= 40.0 {
        reasoning.push("few internal links".to_string());
    }
    if reasoning.is_empty() {
        reasoning.push(format!("overall score: {total:.1}"));
    }
    reasoning
}

/// Compute the 0-100 page value score and derive a crawl priority band.
pub fn score(url: &str, links: LinkMetrics, content: &ContentMetrics, recently_crawled: bool) -> PageValueScore {
    let depth_s = depth_score(links.depth_from_root);
    let internal_s = internal_link_score(links.internal_link_count);
    let backlink_s = backlink_score(links.external_backlink_estimate);
    let content_s = content_quality_score(content);
    let metadata_s = metadata_score(content);
    let unique_s = uniqueness_score(url, content.is_article);
    let fresh_s = freshness_score(recently_crawled);

    let total = depth_s * WEIGHT_DEPTH
        + internal_s * WEIGHT_INTERNAL_LINKS
        + backlink_s * WEIGHT_BACKLINKS
        + content_s * WEIGHT_CONTENT
        + metadata_s * WEIGHT_METADATA
        + fresh_s * WEIGHT_FRESHNESS
        + unique_s * WEIGHT_UNIQUENESS;

    let reasoning = build_reasoning(depth_s, internal_s, backlink_s, content_s, content.is_article, total);

    PageValueScore {
        total_score: total,
        link_score: internal_s * 0.5 + backlink_s * 0.5,
        content_score: content_s,
        metadata_score: metadata_s,
        freshness_score: fresh_s,
        uniqueness_score: unique_s,
        priority: priority_for(total),
        factors: [
            ("depth", depth_s),
            ("internal_links", internal_s),
            ("external_backlinks", backlink_s),
            ("content_quality", content_s),
            ("metadata", metadata_s),
            ("freshness", fresh_s),
            ("uniqueness", unique_s),
        ],
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_with_strong_signals_scores_crawl_now() {
        let links = LinkMetrics {
            depth_from_root: 0,
            internal_link_count: 50,
            external_backlink_estimate: 0,
        };
        let content = ContentMetrics {
            has_structured_data: false,
            is_article: true,
            has_publish_date: true,
            has_author: true,
            has_og_tags: true,
            word_count: 600,
            headings_count: 6,
            has_meta_description: true,
        };
        let result = score("https://example.com/article", links, &content, false);
        assert!(result.total_score >= 75.0, "got {}", result.total_score);
        assert_eq!(result.priority, CrawlPriority::CrawlNow);
    }

    #[test]
    fn deep_thin_page_is_low_value() {
        let links = LinkMetrics {
            depth_from_root: 8,
            internal_link_count: 0,
            external_backlink_estimate: 0,
        };
        let content = ContentMetrics::default();
        let result = score("https://example.com/a/b/c?x=1&y=2", links, &content, true);
        assert_eq!(result.priority, CrawlPriority::LowValue);
    }

    #[test]
    fn recent_crawl_halves_freshness() {
        let links = LinkMetrics::default();
        let content = ContentMetrics::default();
        let fresh = score("https://example.com/x", links, &content, false);
        let recrawled = score("https://example.com/x", links, &content, true);
        assert_eq!(fresh.freshness_score, 50.0);
        assert_eq!(recrawled.freshness_score, 25.0);
    }

    #[test]
    fn archive_path_penalizes_uniqueness() {
        assert!(uniqueness_score("https://example.com/archive/2020", false) < uniqueness_score("https://example.com/post", false));
    }

    #[test]
    fn priority_numeric_bands() {
        assert_eq!(CrawlPriority::CrawlNow.numeric(), 1);
        assert_eq!(CrawlPriority::CrawlSoon.numeric(), 3);
        assert_eq!(CrawlPriority::CrawlLater.numeric(), 6);
        assert_eq!(CrawlPriority::LowValue.numeric(), 10);
    }

    #[test]
    fn empty_reasoning_falls_back_to_overall_score() {
        let links = LinkMetrics { depth_from_root: 3, internal_link_count: 5, external_backlink_estimate: 2 };
        let content = ContentMetrics { word_count: 50, ..Default::default() };
        let result = score("https://example.com/mid", links, &content, false);
        assert!(!result.reasoning.is_empty());
    }
}
