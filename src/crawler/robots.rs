use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum RobotsError {
    #[error("failed to fetch robots.txt: {0}")]
    Fetch(#[from] reqwest::Error),
}

/// Parsed robots.txt directives for the wildcard (`*`) user-agent group only.
///
/// Directives attributed to any other user-agent are ignored; this mirrors
/// the scope the reader is specified to cover.
#[derive(Debug, Clone, Default)]
pub struct RobotsChecker {
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<f64>,
    sitemaps: Vec<String>,
    pub loaded: bool,
}

impl RobotsChecker {
    /// Fetch and parse `/robots.txt` for the given domain.
    ///
    /// Any network failure or non-2xx response is treated as "no rules" —
    /// everything is allowed in that case.
    pub async fn fetch(domain: &str, timeout_secs: u64) -> Result<Self, RobotsError> {
        let robots_url = format!("https://{domain}/robots.txt");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let response = match client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return Ok(RobotsChecker::default()),
        };

        let body = response.text().await.unwrap_or_default();
        Ok(Self::from_content(&body))
    }

    /// Parse a `RobotsChecker` from raw robots.txt content (used directly in tests).
    pub fn from_content(content: &str) -> Self {
        let mut checker = RobotsChecker {
            loaded: true,
            ..Default::default()
        };

        let mut current_agents: Vec<String> = Vec::new();
        let mut in_wildcard_group = false;

        for raw_line in content.lines() {
            let line = match raw_line.find('#') {
                Some(idx) => raw_line[..idx].trim(),
                None => raw_line.trim(),
            };

            if line.is_empty() {
                current_agents.clear();
                in_wildcard_group = false;
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    current_agents.push(value.to_lowercase());
                    in_wildcard_group = current_agents.iter().any(|a| a == "*");
                }
                "allow" if in_wildcard_group && !value.is_empty() => {
                    checker.allow.push(value.to_string());
                }
                "disallow" if in_wildcard_group && !value.is_empty() => {
                    checker.disallow.push(value.to_string());
                }
                "crawl-delay" if in_wildcard_group => {
                    checker.crawl_delay = value.parse::<f64>().ok();
                }
                "sitemap" => {
                    checker.sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        checker
    }

    /// Is `url` allowed by the wildcard group? Longest matching prefix wins
    /// between Allow and Disallow; an Allow of equal length beats a Disallow
    /// of the same length. No matching rule at all means allowed.
    pub fn is_allowed(&self, url: &str) -> bool {
        let path = match Url::parse(url) {
            Ok(u) => u.path().to_string(),
            Err(_) => return true,
        };

        let longest_match = |patterns: &[String]| -> Option<usize> {
            patterns
                .iter()
                .filter(|p| path.starts_with(p.as_str()))
                .map(|p| p.len())
                .max()
        };

        let allow_len = longest_match(&self.allow);
        let disallow_len = longest_match(&self.disallow);

        match (allow_len, disallow_len) {
            (None, None) => true,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }

    pub fn crawl_delay(&self) -> Option<f64> {
        self.crawl_delay
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ROBOTS: &str = r#"
User-agent: *
Disallow: /admin/
Disallow: /private/
Allow: /private/public-notice.html
Crawl-delay: 2
Sitemap: https://example.com/sitemap.xml
"#;

    #[test]
    fn wildcard_disallow_blocks() {
        let checker = RobotsChecker::from_content(SAMPLE_ROBOTS);
        assert!(checker.loaded);
        assert!(!checker.is_allowed("https://example.com/admin/page"));
        assert!(!checker.is_allowed("https://example.com/private/data"));
        assert!(checker.is_allowed("https://example.com/public"));
    }

    #[test]
    fn longer_allow_overrides_shorter_disallow() {
        let checker = RobotsChecker::from_content(SAMPLE_ROBOTS);
        assert!(checker.is_allowed("https://example.com/private/public-notice.html"));
    }

    #[test]
    fn equal_length_allow_wins_over_disallow() {
        let content = "User-agent: *\nDisallow: /a\nAllow: /a\n";
        let checker = RobotsChecker::from_content(content);
        assert!(checker.is_allowed("https://example.com/a"));
    }

    #[test]
    fn crawl_delay_and_sitemap_parsed() {
        let checker = RobotsChecker::from_content(SAMPLE_ROBOTS);
        assert_eq!(checker.crawl_delay(), Some(2.0));
        assert_eq!(checker.sitemaps(), &["https://example.com/sitemap.xml"]);
    }

    #[test]
    fn non_wildcard_group_is_ignored() {
        let content = "User-agent: GPTBot\nDisallow: /\n";
        let checker = RobotsChecker::from_content(content);
        assert!(checker.is_allowed("https://example.com/anything"));
    }

    #[test]
    fn empty_robots_allows_everything() {
        let checker = RobotsChecker::from_content("");
        assert!(checker.is_allowed("https://example.com/anything"));
    }

    #[test]
    fn disallow_with_empty_value_allows_all() {
        let content = "User-agent: *\nDisallow:\n";
        let checker = RobotsChecker::from_content(content);
        assert!(checker.is_allowed("https://example.com/anything"));
    }
}
