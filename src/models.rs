//! Data model (§3): Session, Job, PageAnalysis, PageMetadata, SearchRecord,
//! Image, Favicon, and the enums that constrain their lifecycles. Grounded
//! on `original_source/app/db/models.py` for field shapes, restructured as
//! explicit Rust structs per SPEC_FULL §9 ("Dynamic records... replaced with
//! explicit records/structs").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Session ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_depth: u32,
    pub page_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        // Open question (SPEC_FULL §9): one explicit default used everywhere
        // a session is created without an override.
        SessionConfig {
            max_depth: 3,
            page_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub domain: String,
    pub status: SessionStatus,
    pub total_pages: u32,
    pub crawled_pages: u32,
    pub failed_pages: u32,
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(domain: impl Into<String>, config: SessionConfig) -> Self {
        Session {
            id: Uuid::new_v4().to_string(),
            domain: domain.into(),
            status: SessionStatus::Pending,
            total_pages: 0,
            crawled_pages: 0,
            failed_pages: 0,
            config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

// --- Job ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// Policy rejection (robots disallow, duplicate URL, depth exceeded):
    /// logged as a skip, never counted against `failed_pages` (§7).
    Skipped,
}

/// Annotation written by the Indexer (M4) onto a completed Job. Either the
/// accept shape or the reject shape, never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobAnnotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_factors: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_source: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rejected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub session_id: String,
    pub domain: String,
    pub url: String,
    pub status: JobStatus,
    pub priority: i32,
    pub depth: u32,
    pub max_depth: u32,
    pub enable_js_rendering: bool,
    pub page_value_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub children: Vec<String>,
    pub failure_reason: Option<String>,
    pub annotation: Option<JobAnnotation>,
}

impl Job {
    pub fn new_seed(
        session_id: impl Into<String>,
        domain: impl Into<String>,
        url: impl Into<String>,
        max_depth: u32,
        enable_js_rendering: bool,
    ) -> Self {
        Job {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            domain: domain.into(),
            url: url.into(),
            status: JobStatus::Pending,
            priority: 5,
            depth: 0,
            max_depth,
            enable_js_rendering,
            page_value_score: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            children: Vec::new(),
            failure_reason: None,
            annotation: None,
        }
    }

    pub fn new_child(parent: &Job, url: impl Into<String>, priority: i32) -> Self {
        Job {
            id: Uuid::new_v4().to_string(),
            session_id: parent.session_id.clone(),
            domain: parent.domain.clone(),
            url: url.into(),
            status: JobStatus::Pending,
            priority,
            depth: parent.depth + 1,
            max_depth: parent.max_depth,
            enable_js_rendering: parent.enable_js_rendering,
            page_value_score: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            children: Vec::new(),
            failure_reason: None,
            annotation: None,
        }
    }
}

// --- PageAnalysis ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Informational,
    Navigational,
    Transactional,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamRiskLevel {
    Clean,
    Suspicious,
    Spam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamSignal {
    pub kind: String,
    pub confidence: f64,
    pub severity: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamReport {
    pub spam_score: f64,
    pub risk_level: SpamRiskLevel,
    pub signals: Vec<SpamSignal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub job_id: String,
    pub url: String,
    pub total_score: f64,
    pub crawl_priority: u8,
    pub recommendation: String,
    pub spam_report: SpamReport,
    pub query_intent: QueryIntent,
    pub tracker_risk: f64,
    pub tracker_profile: String,
    pub tracker_count: u32,
    pub created_at: DateTime<Utc>,
}

// --- PageMetadata ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub job_id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical_url: Option<String>,
    pub language: Option<String>,
    pub og_tags: HashMap<String, String>,
    pub twitter_tags: HashMap<String, String>,
    pub robots_index: bool,
    pub robots_follow: bool,
    pub robots_archive: bool,
    pub robots_snippet: bool,
    pub publish_date: Option<String>,
    pub modified_date: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
    pub structured_data_types: Vec<String>,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub images: Vec<PageImageRef>,
    pub word_count: u32,
    pub text_content: String,
    pub favicon_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImageRef {
    pub position: u32,
    pub src: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub responsive: bool,
}

// --- SearchRecord ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub description: Option<String>,
    pub h1: Option<String>,
    pub h2: Vec<String>,
    pub body: String,
    pub content_type: String,
    pub quality_score: f64,
    pub og_tags: HashMap<String, String>,
    pub favicon_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body is truncated to this many bytes before storage.
pub const SEARCH_BODY_MAX_BYTES: usize = 20_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub record_url: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub responsive: bool,
    pub position: u32,
}

/// Maximum number of images persisted per SearchRecord.
pub const MAX_IMAGES_PER_RECORD: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favicon {
    pub domain: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
}
