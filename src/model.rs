use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter over the tri-state `has_processed` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessedFilter {
    Any,
    Unset,
    Processed,
    Failed,
}

impl ProcessedFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessedFilter::Any => "",
            ProcessedFilter::Unset => "null",
            ProcessedFilter::Processed => "true",
            ProcessedFilter::Failed => "false",
        }
    }

    pub fn parse(s: &str) -> Option<ProcessedFilter> {
        match s {
            "" => Some(ProcessedFilter::Any),
            "null" => Some(ProcessedFilter::Unset),
            "true" => Some(ProcessedFilter::Processed),
            "false" => Some(ProcessedFilter::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepostRequest {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub parent_id: Option<i64>,
    pub level: i64,
    pub has_processed: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepostLink {
    pub id: i64,
    pub repost_id: i64,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

/// JSON projection of a request and its links, URL hosts annotated for
/// display.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub domain: String,
    pub error: Option<String>,
    pub has_processed: Option<bool>,
    pub count_repost: usize,
    pub links: Vec<LinkView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkView {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

impl RequestView {
    pub fn project(request: &RepostRequest, links: &[RepostLink]) -> RequestView {
        let links: Vec<LinkView> = links
            .iter()
            .map(|link| LinkView {
                id: link.id,
                url: link.url.clone(),
                domain: host_of(&link.url),
                published_at: link.published_at,
                title: link.title.clone(),
            })
            .collect();
        RequestView {
            id: request.id,
            created_at: request.created_at,
            updated_at: request.updated_at,
            url: request.url.clone(),
            domain: host_of(&request.url),
            error: request.error.clone(),
            has_processed: request.has_processed,
            count_repost: links.len(),
            links,
        }
    }
}

fn host_of(raw: &str) -> String {
    reqwest::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default()
}

/// One row of a lineage export: a link joined to its owning request and
/// that request's parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub title: Option<String>,
    pub repost_url: String,
    pub parent_url: String,
    pub repost_level: i64,
    pub published_at: Option<DateTime<Utc>>,
}

/// Pagination metadata returned alongside listings.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Paginator {
    pub total_records: i64,
    pub total_pages: i64,
    pub per_page: u32,
    pub current_page: u32,
}

impl Paginator {
    pub fn new(total_records: i64, per_page: u32, current_page: u32) -> Paginator {
        let per = i64::from(per_page.max(1));
        Paginator {
            total_records,
            total_pages: (total_records + per - 1) / per,
            per_page,
            current_page,
        }
    }
}
