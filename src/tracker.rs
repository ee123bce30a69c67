//! Tracker Detector (L4): identify known tracking endpoints in a page and
//! compute an aggregate risk score. Grounded on
//! `original_source/app/utils/tracker_detector.py::TrackerDetector`.

use scraper::{Html, Selector};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerCategory {
    Analytics,
    Advertising,
    HeatmapSessionReplay,
    Social,
}

#[derive(Debug, Clone)]
pub struct TrackerHit {
    pub domain: String,
    pub name: String,
    pub category: TrackerCategory,
    pub risk: u8,
    pub method: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskProfile {
    Clean,
    MinimalTrackers,
    ModerateTrackers,
    HeavyTrackers,
    SevereTrackingRisk,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Clean => "clean",
            RiskProfile::MinimalTrackers => "minimal",
            RiskProfile::ModerateTrackers => "moderate",
            RiskProfile::HeavyTrackers => "heavy",
            RiskProfile::SevereTrackingRisk => "severe",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerReport {
    pub trackers: Vec<TrackerHit>,
    pub risk: f64,
    pub profile: RiskProfile,
}

struct KnownTracker {
    domain: &'static str,
    name: &'static str,
    category: TrackerCategory,
    risk: u8,
}

const KNOWN_TRACKERS: &[KnownTracker] = &[
    KnownTracker { domain: "google-analytics.com", name: "Google Analytics", category: TrackerCategory::Analytics, risk: 2 },
    KnownTracker { domain: "googletagmanager.com", name: "Google Tag Manager", category: TrackerCategory::Analytics, risk: 2 },
    KnownTracker { domain: "segment.com", name: "Segment", category: TrackerCategory::Analytics, risk: 3 },
    KnownTracker { domain: "amplitude.com", name: "Amplitude", category: TrackerCategory::Analytics, risk: 3 },
    KnownTracker { domain: "mixpanel.com", name: "Mixpanel", category: TrackerCategory::Analytics, risk: 3 },
    KnownTracker { domain: "doubleclick.net", name: "DoubleClick", category: TrackerCategory::Advertising, risk: 4 },
    KnownTracker { domain: "facebook.com", name: "Facebook Pixel", category: TrackerCategory::Advertising, risk: 4 },
    KnownTracker { domain: "criteo.com", name: "Criteo", category: TrackerCategory::Advertising, risk: 4 },
    KnownTracker { domain: "amazon-adsystem.com", name: "Amazon Ads", category: TrackerCategory::Advertising, risk: 4 },
    KnownTracker { domain: "hotjar.com", name: "Hotjar", category: TrackerCategory::HeatmapSessionReplay, risk: 5 },
    KnownTracker { domain: "fullstory.com", name: "FullStory", category: TrackerCategory::HeatmapSessionReplay, risk: 5 },
    KnownTracker { domain: "mouseflow.com", name: "Mouseflow", category: TrackerCategory::HeatmapSessionReplay, risk: 5 },
    KnownTracker { domain: "sessioncam.com", name: "SessionCam", category: TrackerCategory::HeatmapSessionReplay, risk: 5 },
    KnownTracker { domain: "facebook.net", name: "Facebook SDK", category: TrackerCategory::Social, risk: 2 },
    KnownTracker { domain: "twitter.com", name: "Twitter", category: TrackerCategory::Social, risk: 2 },
    KnownTracker { domain: "linkedin.com", name: "LinkedIn", category: TrackerCategory::Social, risk: 2 },
];

fn matches_tracker(host: &str, tracker_domain: &str) -> bool {
    host == tracker_domain || host.ends_with(&format!(".{tracker_domain}"))
}

fn find_tracker(url: &str) -> Option<&'static KnownTracker> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_lowercase();
    KNOWN_TRACKERS.iter().find(|t| matches_tracker(&host, t.domain))
}

fn risk_profile(risk: f64) -> RiskProfile {
    if risk >= 0.9 {
        RiskProfile::Clean
    } else if risk >= 0.7 {
        RiskProfile::MinimalTrackers
    } else if risk >= 0.5 {
        RiskProfile::ModerateTrackers
    } else if risk >= 0.3 {
        RiskProfile::HeavyTrackers
    } else {
        RiskProfile::SevereTrackingRisk
    }
}

/// Scan the document for known tracker signatures in script/image/iframe
/// sources and inline script text, then compute an aggregate risk score.
pub fn detect(document: &Html, base_url: &str) -> TrackerReport {
    let base = url::Url::parse(base_url).ok();
    let resolve = |href: &str| -> Option<String> {
        match &base {
            Some(b) => b.join(href).ok().map(|u| u.to_string()),
            None => url::Url::parse(href).ok().map(|u| u.to_string()),
        }
    };

    let mut hits: Vec<TrackerHit> = Vec::new();
    let mut seen_domains: HashSet<String> = HashSet::new();

    let mut push_hit = |url: &str, method: &'static str| {
        if let Some(tracker) = find_tracker(url) {
            if seen_domains.insert(tracker.domain.to_string()) {
                hits.push(TrackerHit {
                    domain: tracker.domain.to_string(),
                    name: tracker.name.to_string(),
                    category: tracker.category,
                    risk: tracker.risk,
                    method,
                });
            }
        }
    };

    let script_sel = Selector::parse("script[src]").unwrap();
    for el in document.select(&script_sel) {
        if let Some(src) = el.value().attr("src").and_then(|s| resolve(s)) {
            push_hit(&src, "script_src");
        }
    }

    let img_sel = Selector::parse("img[src]").unwrap();
    for el in document.select(&img_sel) {
        if let Some(src) = el.value().attr("src") {
            let lower = src.to_lowercase();
            if lower.contains("pixel") || lower.contains("beacon") {
                if let Some(resolved) = resolve(src) {
                    push_hit(&resolved, "tracking_pixel");
                }
            }
        }
    }

    let iframe_sel = Selector::parse("iframe[src]").unwrap();
    for el in document.select(&iframe_sel) {
        if let Some(src) = el.value().attr("src").and_then(|s| resolve(s)) {
            push_hit(&src, "iframe_src");
        }
    }

    let inline_script_sel = Selector::parse("script:not([src])").unwrap();
    for el in document.select(&inline_script_sel) {
        let text = el.text().collect::<String>();
        if text.contains("ga(") || text.contains("gtag(") {
            push_hit("https://google-analytics.com/", "inline_script");
        }
        if text.contains("fbq(") {
            push_hit("https://facebook.com/", "inline_script");
        }
    }

    let risk = if hits.is_empty() {
        1.0
    } else {
        let avg_risk = hits.iter().map(|h| h.risk as f64).sum::<f64>() / hits.len() as f64;
        (1.0 - avg_risk / 5.0 - (hits.len() as f64 * 0.05).min(0.2)).max(0.1)
    };

    TrackerReport {
        trackers: hits,
        risk,
        profile: risk_profile(risk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trackers_is_clean() {
        let doc = Html::parse_document("<html><body><p>hi</p></body></html>");
        let report = detect(&doc, "https://example.com");
        assert!(report.trackers.is_empty());
        assert_eq!(report.risk, 1.0);
        assert_eq!(report.profile, RiskProfile::Clean);
    }

    #[test]
    fn gtm_and_inline_fbq_detected_with_expected_risk() {
        let html = r#"<html><body>
            <script src="https://www.googletagmanager.com/gtag/js?id=GA"></script>
            <script>fbq('track', 'PageView');</script>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let report = detect(&doc, "https://example.com");
        assert_eq!(report.trackers.len(), 2);
        assert!((report.risk - 0.30).abs() < 0.01);
        assert_eq!(report.profile, RiskProfile::HeavyTrackers);
    }

    #[test]
    fn duplicate_domain_hits_are_deduplicated() {
        let html = r#"<html><body>
            <script src="https://www.google-analytics.com/a.js"></script>
            <script src="https://www.google-analytics.com/b.js"></script>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let report = detect(&doc, "https://example.com");
        assert_eq!(report.trackers.len(), 1);
    }

    #[test]
    fn subdomain_of_known_tracker_matches() {
        let html = r#"<html><body><iframe src="https://connect.facebook.com/embed"></iframe></body></html>"#;
        let doc = Html::parse_document(html);
        let report = detect(&doc, "https://example.com");
        assert_eq!(report.trackers.len(), 1);
        assert_eq!(report.trackers[0].domain, "facebook.com");
    }

    #[test]
    fn heatmap_tracker_has_risk_five() {
        let html = r#"<html><body><script src="https://static.hotjar.com/c/hotjar-123.js"></script></body></html>"#;
        let doc = Html::parse_document(html);
        let report = detect(&doc, "https://example.com");
        assert_eq!(report.trackers[0].risk, 5);
    }
}
