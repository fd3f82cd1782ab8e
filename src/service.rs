//! Typed operations exposed to the API boundary.
//!
//! Callers arrive with an already-authenticated account id; nothing here
//! authenticates. Every lineage read goes through the access gate before
//! any data is fetched.

use crate::db::{self, Pool};
use crate::error::RepostError;
use crate::model::{ExportRecord, Paginator, ProcessedFilter, RequestView};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

const DEFAULT_PER_PAGE: u32 = 10;

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub request: RequestView,
    pub created: bool,
}

/// Submit a URL for the account. Attaches the account to an existing
/// request when one matches the URL, creates a fresh root request
/// otherwise. A repeated submission by the same account is a conflict.
#[instrument(skip_all)]
pub async fn submit_or_attach(
    pool: &Pool,
    url: &str,
    account_id: i64,
) -> Result<SubmitOutcome, RepostError> {
    let url = url.trim();
    let existing = db::find_by_url(pool, url).await?;
    if let Some(found) = &existing {
        if found.account_ids.contains(&account_id) {
            return Err(RepostError::AlreadyExists);
        }
    }

    let created = existing.is_none();
    let request_id =
        db::create_and_assign(pool, existing.as_ref().map(|f| f.request.id), url, account_id)
            .await?;
    let found = db::get_request(pool, request_id).await?;
    info!(request_id, account_id, created, "repost request submitted");
    Ok(SubmitOutcome {
        request: RequestView::project(&found.request, &found.links),
        created,
    })
}

/// Request details and direct links for an authorized URL. A URL outside
/// the caller's lineage is indistinguishable from a missing one.
#[instrument(skip_all)]
pub async fn view_lineage(
    pool: &Pool,
    url: &str,
    account_id: i64,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
) -> Result<RequestView, RepostError> {
    let url = url.trim();
    if !db::has_access(pool, url, account_id).await? {
        warn!(account_id, "lineage view refused");
        return Err(RepostError::NotFound);
    }
    let found = db::get_by_url(pool, url, date_from, date_to)
        .await?
        .ok_or(RepostError::NotFound)?;
    Ok(RequestView::project(&found.request, &found.links))
}

/// Page of requests assigned to the account, with pagination metadata.
#[instrument(skip_all)]
pub async fn list_for_account(
    pool: &Pool,
    account_id: i64,
    page: u32,
    per_page: u32,
    max_level: i64,
    processed: ProcessedFilter,
) -> Result<(Vec<RequestView>, Paginator), RepostError> {
    let page = page.max(1);
    let per_page = if per_page == 0 {
        DEFAULT_PER_PAGE
    } else {
        per_page
    };
    let (items, total) =
        db::list_requests(pool, account_id, page, per_page, max_level, processed).await?;
    let views = items
        .iter()
        .map(|item| RequestView::project(&item.request, &item.links))
        .collect();
    Ok((views, Paginator::new(total, per_page, page)))
}

/// Export rows for the descendant closure of an authorized URL,
/// optionally restricted to links published within `[from, to)`.
#[instrument(skip_all)]
pub async fn export_lineage(
    pool: &Pool,
    url: &str,
    account_id: i64,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
) -> Result<Vec<ExportRecord>, RepostError> {
    let url = url.trim();
    if !db::has_access(pool, url, account_id).await? {
        warn!(account_id, "lineage export refused");
        return Err(RepostError::AccessDenied);
    }
    db::export_rows(pool, url, date_from, date_to).await
}
