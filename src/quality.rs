//! Quality Gate (L9): content-type-aware weighted score that decides whether
//! a crawled page is worth indexing. Grounded on
//! `original_source/app/services/indexer.py::ContentTypeEvaluator` and
//! `QualityScoreCalculator`.

use serde::Serialize;

use crate::classifier::ContentType;

#[derive(Debug, Clone, Copy)]
struct Weights {
    length: f64,
    title: f64,
    metadata: f64,
    url: f64,
    analysis: f64,
    value: f64,
    min: f64,
}

fn weights_for(content_type: ContentType) -> Weights {
    match content_type {
        ContentType::Blog => Weights { length: 0.25, title: 0.20, metadata: 0.20, url: 0.15, analysis: 0.12, value: 0.08, min: 0.50 },
        ContentType::Video => Weights { length: 0.15, title: 0.25, metadata: 0.25, url: 0.15, analysis: 0.12, value: 0.08, min: 0.45 },
        ContentType::Manga => Weights { length: 0.10, title: 0.25, metadata: 0.30, url: 0.15, analysis: 0.12, value: 0.08, min: 0.48 },
        ContentType::Image => Weights { length: 0.08, title: 0.20, metadata: 0.35, url: 0.15, analysis: 0.12, value: 0.10, min: 0.40 },
        ContentType::Pdf => Weights { length: 0.25, title: 0.20, metadata: 0.20, url: 0.15, analysis: 0.12, value: 0.08, min: 0.52 },
        ContentType::Official => Weights { length: 0.20, title: 0.15, metadata: 0.25, url: 0.20, analysis: 0.12, value: 0.08, min: 0.55 },
        ContentType::Code => Weights { length: 0.30, title: 0.15, metadata: 0.20, url: 0.15, analysis: 0.12, value: 0.08, min: 0.60 },
        ContentType::Social => Weights { length: 0.20, title: 0.15, metadata: 0.15, url: 0.20, analysis: 0.20, value: 0.10, min: 0.35 },
    }
}

/// Minimum word count a type-specific content length ramp is anchored to.
fn min_word_count(content_type: ContentType) -> u32 {
    match content_type {
        ContentType::Blog => 150,
        ContentType::Video => 40,
        ContentType::Manga => 20,
        ContentType::Image => 15,
        ContentType::Pdf => 150,
        ContentType::Official => 80,
        ContentType::Code => 100,
        ContentType::Social => 20,
    }
}

const SPAM_URL_PATTERNS: &[&str] = &["/tag/", "/tags/", "/author/", "?replytocom=", "/wp-json/", "/feed/"];
const CURATED_QUALITY_DOMAINS: &[&str] = &["wikipedia.org", "github.com", "gov", "edu"];

#[derive(Debug, Clone, Default)]
pub struct QualityInput<'a> {
    pub url: &'a str,
    pub title: Option<&'a str>,
    pub word_count: u32,
    pub has_meta_description: bool,
    pub has_og_title: bool,
    pub has_og_description: bool,
    pub has_og_image: bool,
    pub heading_count: u32,
    pub has_structured_data: bool,
    pub body_sample: &'a str,
    pub images_with_alt: u32,
    pub total_images: u32,
    pub analysis_score: Option<f64>,
    pub page_value_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityFactors {
    pub content_length: f64,
    pub title_quality: f64,
    pub metadata_quality: f64,
    pub analysis_score: f64,
    pub page_value_score: f64,
    pub url_quality: f64,
}

#[derive(Debug, Clone)]
pub struct QualityVerdict {
    pub content_type: ContentType,
    pub weighted_score: f64,
    pub factors: QualityFactors,
    pub accepted: bool,
    pub reject_reason: Option<String>,
}

fn content_length_factor(word_count: u32, min_words: u32) -> f64 {
    if min_words == 0 {
        return 1.0;
    }
    (word_count as f64 / (min_words as f64 * 10.0)).min(1.0)
}

fn title_quality_factor(title: Option<&str>) -> f64 {
    match title {
        None => 0.1,
        Some(t) if t.chars().count() < 5 => 0.1,
        Some(t) if t.chars().count() > 200 => 0.6,
        Some(_) => 0.95,
    }
}

fn metadata_quality_factor(input: &QualityInput, content_type: ContentType) -> f64 {
    let mut score = 0.0;
    if input.has_meta_description {
        score += 0.15;
    }
    if input.has_og_title {
        score += 0.15;
    }
    if input.has_og_description {
        score += 0.10;
    }
    if input.has_og_image {
        score += 0.10;
    }

    match content_type {
        ContentType::Blog => {
            if input.heading_count >= 3 {
                score += 0.15;
            } else if input.heading_count >= 1 {
                score += 0.07;
            }
        }
        ContentType::Video => {
            if input.has_og_description && input.body_sample.len() > 300 {
                score += 0.15;
            }
        }
        ContentType::Image => {
            if input.total_images > 0 {
                let alt_ratio = input.images_with_alt as f64 / input.total_images as f64;
                score += alt_ratio * 0.2;
            }
        }
        ContentType::Official => {
            if input.has_structured_data {
                score += 0.15;
            }
        }
        ContentType::Code => {
            if input.body_sample.to_lowercase().contains("readme") {
                score += 0.15;
            }
        }
        _ => {}
    }

    score.min(1.0)
}

fn url_quality_factor(url: &str) -> f64 {
    let lower = url.to_lowercase();
    let mut score: f64 = 1.0;
    for pattern in SPAM_URL_PATTERNS {
        if lower.contains(pattern) {
            score -= 0.15;
        }
    }
    if CURATED_QUALITY_DOMAINS.iter().any(|d| lower.contains(d)) {
        score += 0.15;
    }
    score.clamp(0.0, 1.2)
}

/// Evaluate the Quality Gate for a crawled page. `content_type` comes from
/// L8; `analysis_score`/`page_value_score` are normalized from their 0-100
/// scales if present, defaulting to a neutral 0.5 when absent.
pub fn evaluate(content_type: ContentType, input: &QualityInput) -> QualityVerdict {
    let weights = weights_for(content_type);

    let content_length = content_length_factor(input.word_count, min_word_count(content_type));
    let title_quality = title_quality_factor(input.title);
    let metadata_quality = metadata_quality_factor(input, content_type);
    let analysis_score = input.analysis_score.map(|s| (s / 100.0).clamp(0.0, 1.0)).unwrap_or(0.5);
    let page_value_score = input.page_value_score.map(|s| (s / 100.0).clamp(0.0, 1.0)).unwrap_or(0.5);
    let url_quality = url_quality_factor(input.url);

    let weighted_score = content_length * weights.length
        + title_quality * weights.title
        + metadata_quality * weights.metadata
        + url_quality * weights.url
        + analysis_score * weights.analysis
        + page_value_score * weights.value;

    let accepted = weighted_score >= weights.min;

    let mut reasons = Vec::new();
    if content_length < 0.3 {
        reasons.push("insufficient_content".to_string());
    }
    if title_quality < 0.5 {
        reasons.push("poor_title".to_string());
    }
    if metadata_quality < 0.2 {
        reasons.push("sparse_metadata".to_string());
    }
    if url_quality < 0.7 {
        reasons.push("low_quality_url_pattern".to_string());
    }

    let reject_reason = if accepted {
        None
    } else if reasons.is_empty() {
        Some(format!("below_threshold(score={weighted_score:.3} < min={:.3})", weights.min))
    } else {
        Some(reasons.into_iter().take(3).collect::<Vec<_>>().join(", "))
    };

    QualityVerdict {
        content_type,
        weighted_score,
        factors: QualityFactors {
            content_length,
            title_quality,
            metadata_quality,
            analysis_score,
            page_value_score,
            url_quality,
        },
        accepted,
        reject_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_blog_body_is_rejected_for_insufficient_content() {
        let input = QualityInput {
            url: "https://example.com/post",
            title: Some("A short post"),
            word_count: 12,
            body_sample: "short body text here that is eighty characters long in total for this test case",
            ..Default::default()
        };
        let verdict = evaluate(ContentType::Blog, &input);
        assert!(!verdict.accepted);
        assert!(verdict.reject_reason.as_deref().unwrap().contains("insufficient_content"));
    }

    #[test]
    fn rich_blog_post_is_accepted() {
        let input = QualityInput {
            url: "https://example.com/post",
            title: Some("A Well Written Blog Post About Rust"),
            word_count: 2000,
            has_meta_description: true,
            has_og_title: true,
            has_og_description: true,
            has_og_image: true,
            heading_count: 5,
            has_structured_data: true,
            body_sample: "a".repeat(3000).leak(),
            analysis_score: Some(80.0),
            page_value_score: Some(80.0),
            ..Default::default()
        };
        let verdict = evaluate(ContentType::Blog, &input);
        assert!(verdict.accepted, "score: {}", verdict.weighted_score);
    }

    #[test]
    fn title_below_five_chars_scores_poorly() {
        assert_eq!(title_quality_factor(Some("Hi")), 0.1);
        assert_eq!(title_quality_factor(Some(&"x".repeat(250))), 0.6);
        assert_eq!(title_quality_factor(Some("A reasonable title")), 0.95);
    }

    #[test]
    fn spam_path_pattern_reduces_url_quality() {
        assert!(url_quality_factor("https://example.com/tag/rust") < url_quality_factor("https://example.com/post"));
    }

    #[test]
    fn curated_domain_boosts_url_quality() {
        assert!(url_quality_factor("https://en.wikipedia.org/wiki/Rust") > url_quality_factor("https://randomblog.com/post"));
    }

    #[test]
    fn is_deterministic_given_same_inputs() {
        let input = QualityInput {
            url: "https://example.com/a",
            title: Some("Title"),
            word_count: 400,
            ..Default::default()
        };
        let a = evaluate(ContentType::Blog, &input);
        let b = evaluate(ContentType::Blog, &input);
        assert_eq!(a.weighted_score, b.weighted_score);
        assert_eq!(a.accepted, b.accepted);
    }
}
