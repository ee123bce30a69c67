//! Spam Detector (L7): link-farm, duplication, reciprocal-linking, CMS
//! anomaly, and IP-reputation signals over a materialized snapshot of a
//! domain's crawled pages. Grounded on
//! `original_source/app/utils/spam_detector.py` (signal detectors, CMS
//! fingerprints, severity weighting). Anchor-text analysis is intentionally
//! left unimplemented — see DESIGN.md.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::models::{SpamReport, SpamRiskLevel, SpamSignal};

#[derive(Debug, Clone)]
pub struct PageSummary {
    pub url: String,
    pub content_hash: String,
    pub internal_link_count: u32,
    pub external_link_count: u32,
    pub raw_content_sample: String,
}

/// Normalized-content hash: lowercased, whitespace-collapsed, then SHA-256.
/// Stable across runs (unlike the source's `hash()` builtin).
pub fn normalized_content_hash(content: &str) -> String {
    let collapsed: String = content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(collapsed.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    fn weight(self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.8,
            Severity::Medium => 0.5,
            Severity::Low => 0.2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

fn link_farm_signal(pages: &[PageSummary]) -> Option<SpamSignal> {
    if pages.is_empty() {
        return None;
    }

    let mut score = 0.0;
    let mut details = Vec::new();

    let avg_outbound = pages
        .iter()
        .map(|p| (p.internal_link_count + p.external_link_count) as f64)
        .sum::<f64>()
        / pages.len() as f64;
    if avg_outbound > 200.0 {
        score += 0.4;
        details.push(format!("avg outbound links {avg_outbound:.0} > 200"));
    }

    if pages.iter().any(|p| {
        let total = (p.internal_link_count + p.external_link_count) as f64;
        total > 0.0 && p.external_link_count as f64 / total > 0.4
    }) {
        score += 0.3;
        details.push("link density > 0.4 on at least one page".to_string());
    }

    let imbalanced = pages
        .iter()
        .filter(|p| p.external_link_count as f64 > 2.0 * p.internal_link_count as f64)
        .count();
    if imbalanced as f64 / pages.len() as f64 > 0.5 {
        score += 0.3;
        details.push("over half of pages skew external-heavy".to_string());
    }

    if score >= 0.5 {
        let severity = if score >= 0.7 { Severity::High } else { Severity::Medium };
        Some(SpamSignal {
            kind: "link_farm".to_string(),
            confidence: score.min(1.0),
            severity: severity.label().to_string(),
            detail: details.join("; "),
        })
    } else {
        None
    }
}

fn content_duplication_signal(pages: &[PageSummary]) -> Option<SpamSignal> {
    if pages.is_empty() {
        return None;
    }

    let mut groups: HashMap<&str, usize> = HashMap::new();
    for p in pages {
        *groups.entry(p.content_hash.as_str()).or_insert(0) += 1;
    }

    let duplicated: usize = groups.values().filter(|c| **c > 1).map(|c| c - 1).sum();
    let ratio = duplicated as f64 / pages.len() as f64;

    if ratio >= 0.2 {
        let severity = if ratio >= 0.5 { Severity::High } else { Severity::Medium };
        Some(SpamSignal {
            kind: "content_duplication".to_string(),
            confidence: ratio.min(1.0),
            severity: severity.label().to_string(),
            detail: format!("duplication ratio {ratio:.2}"),
        })
    } else {
        None
    }
}

/// A directed edge `from -> to` in the inter-page link graph.
#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub from: String,
    pub to: String,
}

fn reciprocal_linking_signal(edges: &[LinkEdge]) -> Option<SpamSignal> {
    if edges.is_empty() {
        return None;
    }

    let edge_set: HashSet<(String, String)> = edges
        .iter()
        .map(|e| (e.from.clone(), e.to.clone()))
        .collect();

    let reciprocal = edges
        .iter()
        .filter(|e| edge_set.contains(&(e.to.clone(), e.from.clone())))
        .count();
    let ratio = reciprocal as f64 / edges.len() as f64;

    if ratio >= 0.6 {
        let severity = if ratio >= 0.8 { Severity::High } else { Severity::Medium };
        Some(SpamSignal {
            kind: "reciprocal_linking".to_string(),
            confidence: ratio.min(1.0),
            severity: severity.label().to_string(),
            detail: format!("reciprocal edge ratio {ratio:.2}"),
        })
    } else {
        None
    }
}

struct CmsFingerprint {
    name: &'static str,
    markers: &'static [&'static str],
}

const CMS_FINGERPRINTS: &[CmsFingerprint] = &[
    CmsFingerprint {
        name: "wordpress",
        markers: &["/wp-content/", "/wp-admin/", "wp-json", "generator\" content=\"wordpress"],
    },
    CmsFingerprint {
        name: "drupal",
        markers: &["/sites/default/", "drupal.settings", "generator\" content=\"drupal"],
    },
    CmsFingerprint {
        name: "joomla",
        markers: &["/components/", "/modules/", "generator\" content=\"joomla"],
    },
    CmsFingerprint {
        name: "wix",
        markers: &["wixclient.js", "wixapi.js"],
    },
];

fn cms_anomaly_signal(pages: &[PageSummary]) -> Option<SpamSignal> {
    let mut detected: HashSet<&'static str> = HashSet::new();
    for page in pages {
        let lower = page.raw_content_sample.to_lowercase();
        for fp in CMS_FINGERPRINTS {
            if fp.markers.iter().any(|m| lower.contains(m)) {
                detected.insert(fp.name);
            }
        }
    }

    if detected.len() >= 2 {
        let mut names: Vec<&str> = detected.into_iter().collect();
        names.sort();
        Some(SpamSignal {
            kind: "cms_anomaly".to_string(),
            confidence: 0.7,
            severity: Severity::Medium.label().to_string(),
            detail: format!("co-present CMS fingerprints: {}", names.join(", ")),
        })
    } else {
        None
    }
}

fn ip_reputation_signal(ipv4_last_octet: Option<u8>) -> Option<SpamSignal> {
    let octet = ipv4_last_octet?;
    if octet <= 240 {
        return None;
    }
    Some(SpamSignal {
        kind: "ip_reputation".to_string(),
        confidence: 0.15,
        severity: Severity::Medium.label().to_string(),
        detail: format!("resolved IPv4 last octet {octet} exceeds 240"),
    })
}

fn severity_weight(label: &str) -> f64 {
    match label {
        "critical" => Severity::Critical.weight(),
        "high" => Severity::High.weight(),
        "medium" => Severity::Medium.weight(),
        _ => Severity::Low.weight(),
    }
}

fn risk_level(score: f64) -> SpamRiskLevel {
    if score >= 75.0 {
        SpamRiskLevel::Spam
    } else if score >= 45.0 {
        SpamRiskLevel::Suspicious
    } else {
        SpamRiskLevel::Clean
    }
}

/// Run every implemented signal over the domain snapshot and aggregate into
/// a final spam score and risk level.
pub fn detect(
    pages: &[PageSummary],
    edges: &[LinkEdge],
    ipv4_last_octet: Option<u8>,
) -> SpamReport {
    let signals: Vec<SpamSignal> = [
        link_farm_signal(pages),
        content_duplication_signal(pages),
        reciprocal_linking_signal(edges),
        cms_anomaly_signal(pages),
        ip_reputation_signal(ipv4_last_octet),
    ]
    .into_iter()
    .flatten()
    .collect();

    let spam_score = if signals.is_empty() {
        0.0
    } else {
        let mean = signals
            .iter()
            .map(|s| s.confidence * severity_weight(&s.severity) * 100.0)
            .sum::<f64>()
            / signals.len() as f64;
        mean.clamp(0.0, 100.0)
    };

    SpamReport {
        spam_score,
        risk_level: risk_level(spam_score),
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, hash: &str, internal: u32, external: u32) -> PageSummary {
        PageSummary {
            url: url.to_string(),
            content_hash: hash.to_string(),
            internal_link_count: internal,
            external_link_count: external,
            raw_content_sample: String::new(),
        }
    }

    #[test]
    fn duplication_and_reciprocal_linking_fire_together() {
        let pages = vec![
            page("https://example.com/a", "h1", 5, 2),
            page("https://example.com/b", "h1", 5, 2),
            page("https://example.com/c", "h1", 5, 2),
            page("https://example.com/d", "h2", 5, 2),
            page("https://example.com/e", "h3", 5, 2),
            page("https://example.com/f", "h4", 5, 2),
            page("https://example.com/g", "h5", 5, 2),
            page("https://example.com/h", "h6", 5, 2),
            page("https://example.com/i", "h7", 5, 2),
            page("https://example.com/j", "h8", 5, 2),
        ];

        let mut edges = Vec::new();
        for i in 0..8 {
            let a = format!("https://example.com/{i}");
            let b = format!("https://other.com/{i}");
            edges.push(LinkEdge { from: a.clone(), to: b.clone() });
            edges.push(LinkEdge { from: b, to: a });
        }
        for i in 8..10 {
            edges.push(LinkEdge {
                from: format!("https://example.com/{i}"),
                to: format!("https://other.com/{i}"),
            });
        }

        let report = detect(&pages, &edges, None);
        let kinds: Vec<&str> = report.signals.iter().map(|s| s.kind.as_str()).collect();
        assert!(kinds.contains(&"content_duplication"));
        assert!(kinds.contains(&"reciprocal_linking"));
        assert!(matches!(
            report.risk_level,
            SpamRiskLevel::Suspicious | SpamRiskLevel::Spam
        ));
    }

    #[test]
    fn clean_site_has_no_signals() {
        let pages = vec![
            page("https://example.com/a", "h1", 10, 2),
            page("https://example.com/b", "h2", 8, 1),
        ];
        let report = detect(&pages, &[], Some(50));
        assert!(report.signals.is_empty());
        assert_eq!(report.risk_level, SpamRiskLevel::Clean);
    }

    #[test]
    fn two_cms_fingerprints_co_present_fires() {
        let pages = vec![
            page("https://example.com/a", "h1", 1, 1).with_content("<link href=\"/wp-content/themes/x.css\">"),
            page("https://example.com/b", "h2", 1, 1).with_content("drupal.settings = {};"),
        ];
        let report = detect(&pages, &[], None);
        assert!(report.signals.iter().any(|s| s.kind == "cms_anomaly"));
    }

    #[test]
    fn ip_reputation_only_fires_above_threshold() {
        assert!(ip_reputation_signal(Some(200)).is_none());
        assert!(ip_reputation_signal(Some(250)).is_some());
    }

    impl PageSummary {
        fn with_content(mut self, content: &str) -> Self {
            self.raw_content_sample = content.to_string();
            self
        }
    }
}
