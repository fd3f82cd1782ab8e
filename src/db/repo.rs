use super::model::{FoundRequest, RequestPatch, RequestWithLinks};
use crate::error::RepostError;
use crate::model::{ExportRecord, ProcessedFilter, RepostLink, RepostRequest};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

const REQUEST_COLS: &str = "id, created_at, updated_at, url, parent_id, level, has_processed, error";

pub async fn init_pool(database_url: &str) -> Result<Pool, RepostError> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<(), RepostError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn request_from_row(row: &SqliteRow) -> RepostRequest {
    RepostRequest {
        id: row.get("id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        url: row.get("url"),
        parent_id: row.get("parent_id"),
        level: row.get("level"),
        has_processed: row.get("has_processed"),
        error: row.get("error"),
    }
}

fn link_from_row(row: &SqliteRow) -> RepostLink {
    RepostLink {
        id: row.get("id"),
        repost_id: row.get("repost_id"),
        url: row.get("url"),
        published_at: row.get("published_at"),
        title: row.get("title"),
    }
}

/// Alternate percent-encoded lookup key for a URL. Stored rows match an
/// input in either raw or encoded form.
fn encoded_form(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

#[instrument(skip_all)]
pub async fn create_request(
    pool: &Pool,
    url: &str,
    parent_id: Option<i64>,
    level: i64,
) -> Result<i64, RepostError> {
    let rec = sqlx::query(
        "INSERT INTO repost_request (url, parent_id, level) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(url)
    .bind(parent_id)
    .bind(level)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn insert_link(
    pool: &Pool,
    repost_id: i64,
    url: &str,
    published_at: Option<DateTime<Utc>>,
    title: Option<&str>,
) -> Result<i64, RepostError> {
    let rec = sqlx::query(
        "INSERT INTO repost_link (repost_id, url, published_at, title) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(repost_id)
    .bind(url)
    .bind(published_at)
    .bind(title)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_request(pool: &Pool, id: i64) -> Result<RequestWithLinks, RepostError> {
    let sql = format!("SELECT {REQUEST_COLS} FROM repost_request WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    let Some(row) = row else {
        return Err(RepostError::NotFound);
    };
    let request = request_from_row(&row);
    let links = links_for_request(pool, id, None, None).await?;
    Ok(RequestWithLinks { request, links })
}

/// Look up a request by exact URL (raw or percent-encoded form), pulling
/// its assigned accounts and direct links. Returns `None` when no row
/// matches. If several rows share the URL the lowest id wins.
#[instrument(skip_all)]
pub async fn find_by_url(pool: &Pool, url: &str) -> Result<Option<FoundRequest>, RepostError> {
    let sql = format!(
        "SELECT {REQUEST_COLS} FROM repost_request WHERE url = ? OR url = ? ORDER BY id ASC LIMIT 1"
    );
    let encoded = encoded_form(url);
    let row = sqlx::query(&sql)
        .bind(url)
        .bind(&encoded)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let request = request_from_row(&row);
    let account_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT account_id FROM account_repost_request WHERE request_id = ? ORDER BY account_id ASC",
    )
    .bind(request.id)
    .fetch_all(pool)
    .await?;
    let links = links_for_request(pool, request.id, None, None).await?;
    Ok(Some(FoundRequest {
        request,
        account_ids,
        links,
    }))
}

/// Request by URL with direct links, date-filtered when bounds are given.
/// Bounds are `[from, to)`; a link without `published_at` is excluded
/// whenever any bound is supplied.
#[instrument(skip_all)]
pub async fn get_by_url(
    pool: &Pool,
    url: &str,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
) -> Result<Option<RequestWithLinks>, RepostError> {
    let sql = format!(
        "SELECT {REQUEST_COLS} FROM repost_request WHERE url = ? OR url = ? ORDER BY id ASC LIMIT 1"
    );
    let encoded = encoded_form(url);
    let row = sqlx::query(&sql)
        .bind(url)
        .bind(&encoded)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let request = request_from_row(&row);
    let links = links_for_request(pool, request.id, date_from, date_to).await?;
    Ok(Some(RequestWithLinks { request, links }))
}

async fn links_for_request(
    pool: &Pool,
    repost_id: i64,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
) -> Result<Vec<RepostLink>, RepostError> {
    let mut sql = String::from(
        "SELECT id, repost_id, url, published_at, title FROM repost_link WHERE repost_id = ?",
    );
    if date_from.is_some() || date_to.is_some() {
        sql.push_str(" AND published_at IS NOT NULL");
        if date_from.is_some() {
            sql.push_str(" AND published_at >= ?");
        }
        if date_to.is_some() {
            sql.push_str(" AND published_at < ?");
        }
    }
    sql.push_str(" ORDER BY id ASC");

    let mut query = sqlx::query(&sql).bind(repost_id);
    if let Some(from) = date_from {
        query = query.bind(from);
    }
    if let Some(to) = date_to {
        query = query.bind(to);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(link_from_row).collect())
}

fn processed_clause(filter: ProcessedFilter) -> &'static str {
    match filter {
        ProcessedFilter::Any => "",
        ProcessedFilter::Unset => " AND r.has_processed IS NULL",
        ProcessedFilter::Processed => " AND r.has_processed = 1",
        ProcessedFilter::Failed => " AND r.has_processed = 0",
    }
}

fn page_offset(page: u32, per_page: u32) -> u32 {
    if page > 1 {
        (page - 1) * per_page
    } else {
        0
    }
}

/// List requests assigned to an account, oldest first. The total count is
/// computed under the same filters as the page.
#[instrument(skip_all)]
pub async fn list_requests(
    pool: &Pool,
    account_id: i64,
    page: u32,
    per_page: u32,
    max_level: i64,
    processed: ProcessedFilter,
) -> Result<(Vec<RequestWithLinks>, i64), RepostError> {
    let mut sql = String::from(
        "SELECT r.id, r.created_at, r.updated_at, r.url, r.parent_id, r.level, r.has_processed, r.error \
         FROM repost_request r \
         JOIN account_repost_request arr ON arr.request_id = r.id AND arr.account_id = ? \
         WHERE r.level <= ?",
    );
    sql.push_str(processed_clause(processed));
    sql.push_str(" ORDER BY r.created_at ASC, r.id ASC LIMIT ? OFFSET ?");

    let rows = sqlx::query(&sql)
        .bind(account_id)
        .bind(max_level)
        .bind(per_page)
        .bind(page_offset(page, per_page))
        .fetch_all(pool)
        .await?;

    let mut count_sql = String::from(
        "SELECT COUNT(*) FROM repost_request r \
         JOIN account_repost_request arr ON arr.request_id = r.id AND arr.account_id = ? \
         WHERE r.level <= ?",
    );
    count_sql.push_str(processed_clause(processed));
    let count: i64 = sqlx::query_scalar(&count_sql)
        .bind(account_id)
        .bind(max_level)
        .fetch_one(pool)
        .await?;

    let items = attach_links(pool, rows).await?;
    Ok((items, count))
}

/// List requests for the parser service: no account filter, otherwise the
/// same shape as `list_requests`.
#[instrument(skip_all)]
pub async fn list_for_parser(
    pool: &Pool,
    page: u32,
    per_page: u32,
    max_level: i64,
    processed: ProcessedFilter,
) -> Result<(Vec<RequestWithLinks>, i64), RepostError> {
    let mut sql = String::from(
        "SELECT r.id, r.created_at, r.updated_at, r.url, r.parent_id, r.level, r.has_processed, r.error \
         FROM repost_request r WHERE r.level <= ?",
    );
    sql.push_str(processed_clause(processed));
    sql.push_str(" ORDER BY r.created_at ASC, r.id ASC LIMIT ? OFFSET ?");

    let rows = sqlx::query(&sql)
        .bind(max_level)
        .bind(per_page)
        .bind(page_offset(page, per_page))
        .fetch_all(pool)
        .await?;

    let mut count_sql = String::from("SELECT COUNT(*) FROM repost_request r WHERE r.level <= ?");
    count_sql.push_str(processed_clause(processed));
    let count: i64 = sqlx::query_scalar(&count_sql)
        .bind(max_level)
        .fetch_one(pool)
        .await?;

    let items = attach_links(pool, rows).await?;
    Ok((items, count))
}

async fn attach_links(
    pool: &Pool,
    rows: Vec<SqliteRow>,
) -> Result<Vec<RequestWithLinks>, RepostError> {
    let requests: Vec<RepostRequest> = rows.iter().map(request_from_row).collect();
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; requests.len()].join(", ");
    let sql = format!(
        "SELECT id, repost_id, url, published_at, title FROM repost_link \
         WHERE repost_id IN ({placeholders}) ORDER BY id ASC"
    );
    let mut query = sqlx::query(&sql);
    for request in &requests {
        query = query.bind(request.id);
    }
    let link_rows = query.fetch_all(pool).await?;

    let mut by_request: std::collections::HashMap<i64, Vec<RepostLink>> =
        std::collections::HashMap::new();
    for row in &link_rows {
        let link = link_from_row(row);
        by_request.entry(link.repost_id).or_default().push(link);
    }

    Ok(requests
        .into_iter()
        .map(|request| {
            let links = by_request.remove(&request.id).unwrap_or_default();
            RequestWithLinks { request, links }
        })
        .collect())
}

/// Oldest request the parse worker has not picked up yet.
#[instrument(skip_all)]
pub async fn next_unprocessed(
    pool: &Pool,
    max_level: i64,
) -> Result<Option<RepostRequest>, RepostError> {
    let sql = format!(
        "SELECT {REQUEST_COLS} FROM repost_request \
         WHERE has_processed IS NULL AND level <= ? \
         ORDER BY created_at ASC, id ASC LIMIT 1"
    );
    let row = sqlx::query(&sql).bind(max_level).fetch_optional(pool).await?;
    Ok(row.as_ref().map(request_from_row))
}

/// Patch request fields by id. Fails with `NotFound` when zero rows match.
#[instrument(skip_all)]
pub async fn update_request(pool: &Pool, id: i64, patch: RequestPatch) -> Result<(), RepostError> {
    let result = sqlx::query(
        "UPDATE repost_request SET \
            has_processed = COALESCE(?, has_processed), \
            error = COALESCE(?, error), \
            parent_id = COALESCE(?, parent_id), \
            level = COALESCE(?, level), \
            updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(patch.has_processed)
    .bind(patch.error)
    .bind(patch.parent_id)
    .bind(patch.level)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepostError::NotFound);
    }
    Ok(())
}

/// Attach an account to a request, creating the request first when
/// `request_id` is `None`. Both inserts run in one transaction; any
/// failure rolls the whole transaction back, so no request row exists
/// without an assignment and no assignment without its request.
#[instrument(skip_all)]
pub async fn create_and_assign(
    pool: &Pool,
    request_id: Option<i64>,
    url: &str,
    account_id: i64,
) -> Result<i64, RepostError> {
    let mut tx = pool.begin().await?;
    let id = match request_id {
        Some(id) => id,
        None => sqlx::query("INSERT INTO repost_request (url, level) VALUES (?, 1) RETURNING id")
            .bind(url)
            .fetch_one(&mut *tx)
            .await?
            .get("id"),
    };
    sqlx::query("INSERT INTO account_repost_request (account_id, request_id) VALUES (?, ?)")
        .bind(account_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn assign_account(pool: &Pool, account_id: i64, request_id: i64) -> Result<(), RepostError> {
    sqlx::query("INSERT INTO account_repost_request (account_id, request_id) VALUES (?, ?)")
        .bind(account_id)
        .bind(request_id)
        .execute(pool)
        .await?;
    Ok(())
}

// The lineage closure: starting rows matching the URL in raw or encoded
// form, everything reachable downward through parent_id, and everything
// reachable upward to the root. One recursive query, no per-node round
// trips.
const LINEAGE_CTE: &str = "WITH RECURSIVE \
    starting (id, parent_id) AS ( \
        SELECT id, parent_id FROM repost_request WHERE url = ? OR url = ? \
    ), \
    descendants (id, parent_id) AS ( \
        SELECT id, parent_id FROM starting \
        UNION \
        SELECT r.id, r.parent_id FROM repost_request r \
            JOIN descendants d ON r.parent_id = d.id \
    ), \
    ancestors (id, parent_id) AS ( \
        SELECT r.id, r.parent_id FROM repost_request r \
            WHERE r.id IN (SELECT parent_id FROM starting) \
        UNION \
        SELECT r.id, r.parent_id FROM repost_request r \
            JOIN ancestors a ON r.id = a.parent_id \
    ) ";

/// Ids of every request in the lineage of `url`: starting nodes,
/// descendants and ancestors. Empty when no request matches the URL.
#[instrument(skip_all)]
pub async fn lineage_ids(pool: &Pool, url: &str) -> Result<Vec<i64>, RepostError> {
    let sql = format!(
        "{LINEAGE_CTE} \
         SELECT id FROM descendants UNION SELECT id FROM ancestors ORDER BY id ASC"
    );
    let encoded = encoded_form(url);
    let ids = sqlx::query_scalar::<_, i64>(&sql)
        .bind(url)
        .bind(&encoded)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// True iff the account is assigned to at least one request in the
/// lineage of `url`. A URL matching no request yields `false`.
#[instrument(skip_all)]
pub async fn has_access(pool: &Pool, url: &str, account_id: i64) -> Result<bool, RepostError> {
    let sql = format!(
        "{LINEAGE_CTE} \
         SELECT arr.account_id \
         FROM (SELECT id FROM descendants UNION SELECT id FROM ancestors) lineage \
         JOIN account_repost_request arr ON arr.request_id = lineage.id \
         WHERE arr.account_id = ? LIMIT 1"
    );
    let encoded = encoded_form(url);
    let hit: Option<i64> = sqlx::query_scalar(&sql)
        .bind(url)
        .bind(&encoded)
        .bind(account_id)
        .fetch_optional(pool)
        .await?;
    Ok(hit.is_some())
}

/// Export rows for the descendant closure of `url`: every link joined to
/// its owning request and that request's parent. Ordered by owning
/// request id, then link id. Links owned by a root request carry no
/// parent and are not part of the export.
#[instrument(skip_all)]
pub async fn export_rows(
    pool: &Pool,
    url: &str,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
) -> Result<Vec<ExportRecord>, RepostError> {
    let mut sql = String::from(
        "WITH RECURSIVE nodes (id, parent_id) AS ( \
            SELECT id, parent_id FROM repost_request WHERE url = ? OR url = ? \
            UNION \
            SELECT r.id, r.parent_id FROM repost_request r JOIN nodes n ON r.parent_id = n.id \
        ) \
        SELECT l.title, l.url AS repost_url, p.url AS parent_url, \
               r.level AS repost_level, l.published_at \
        FROM nodes n \
            JOIN repost_link l ON l.repost_id = n.id \
            JOIN repost_request r ON r.id = n.id \
            JOIN repost_request p ON p.id = n.parent_id",
    );
    if date_from.is_some() || date_to.is_some() {
        sql.push_str(" WHERE l.published_at IS NOT NULL");
        if date_from.is_some() {
            sql.push_str(" AND l.published_at >= ?");
        }
        if date_to.is_some() {
            sql.push_str(" AND l.published_at < ?");
        }
    }
    sql.push_str(" ORDER BY n.id ASC, l.id ASC");

    let encoded = encoded_form(url);
    let mut query = sqlx::query(&sql).bind(url).bind(&encoded);
    if let Some(from) = date_from {
        query = query.bind(from);
    }
    if let Some(to) = date_to {
        query = query.bind(to);
    }
    let rows = query.fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| ExportRecord {
            title: row.get("title"),
            repost_url: row.get("repost_url"),
            parent_url: row.get("parent_url"),
            repost_level: row.get("repost_level"),
            published_at: row.get("published_at"),
        })
        .collect())
}
