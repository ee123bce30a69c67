//! Content Classifier (L8): URL-pattern → content type tag. Grounded on
//! `original_source/app/services/indexer.py::ContentClassifier.classify_by_url`.
//! No tag is inherently preferred; only the Quality Gate's per-type weights
//! differ (§4.9).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Video,
    Manga,
    Image,
    Pdf,
    Code,
    Social,
    Official,
    Blog,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Manga => "manga",
            ContentType::Image => "image",
            ContentType::Pdf => "pdf",
            ContentType::Code => "code",
            ContentType::Social => "social",
            ContentType::Official => "official",
            ContentType::Blog => "blog",
        }
    }
}

const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com", "twitch.tv", "dailymotion.com"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi", ".mkv"];
const MANGA_PATTERNS: &[&str] = &["/manga/", "/chapter/", "/read/"];
const IMAGE_GALLERY_PATTERNS: &[&str] = &["/gallery/", "/photos/", "/album/"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];
const CODE_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org", "sourcehut.org"];
const SOCIAL_HOSTS: &[&str] = &["twitter.com", "x.com", "facebook.com", "instagram.com", "linkedin.com", "tiktok.com"];
const OFFICIAL_PATTERNS: &[&str] = &["/about", "/products", "/pricing", "/contact", "/company", "/team"];

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok()?.host_str().map(|h| h.to_lowercase())
}

fn host_matches(host: &str, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .any(|c| host == *c || host.ends_with(&format!(".{c}")))
}

/// Ordered checks: video → manga → image gallery → pdf → code repository →
/// social media → official site → blog (default).
pub fn classify(url: &str) -> ContentType {
    let lower = url.to_lowercase();
    let host = host_of(url).unwrap_or_default();

    if host_matches(&host, VIDEO_HOSTS) || lower.contains("/video") || VIDEO_EXTENSIONS.iter().any(|e| lower.ends_with(e)) {
        return ContentType::Video;
    }
    if MANGA_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ContentType::Manga;
    }
    if IMAGE_GALLERY_PATTERNS.iter().any(|p| lower.contains(p)) || IMAGE_EXTENSIONS.iter().any(|e| lower.ends_with(e)) {
        return ContentType::Image;
    }
    if lower.ends_with(".pdf") {
        return ContentType::Pdf;
    }
    if host_matches(&host, CODE_HOSTS) {
        return ContentType::Code;
    }
    if host_matches(&host, SOCIAL_HOSTS) {
        return ContentType::Social;
    }
    // Coarse by design (§9): matches any URL containing a generic path segment.
    if OFFICIAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ContentType::Official;
    }
    ContentType::Blog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_host_is_video() {
        assert_eq!(classify("https://www.youtube.com/watch?v=abc"), ContentType::Video);
    }

    #[test]
    fn mp4_extension_is_video() {
        assert_eq!(classify("https://example.com/clip.mp4"), ContentType::Video);
    }

    #[test]
    fn manga_path_classified() {
        assert_eq!(classify("https://example.com/manga/one-piece/chapter/1"), ContentType::Manga);
    }

    #[test]
    fn github_host_is_code() {
        assert_eq!(classify("https://github.com/rust-lang/rust"), ContentType::Code);
    }

    #[test]
    fn about_path_is_official() {
        assert_eq!(classify("https://example.com/about"), ContentType::Official);
    }

    #[test]
    fn default_is_blog() {
        assert_eq!(classify("https://example.com/2024/01/my-post"), ContentType::Blog);
    }

    #[test]
    fn pdf_extension_wins_over_official_pattern() {
        assert_eq!(classify("https://example.com/about/report.pdf"), ContentType::Pdf);
    }
}
