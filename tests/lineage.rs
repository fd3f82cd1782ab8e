use chrono::{TimeZone, Utc};
use repost_watch::db;
use repost_watch::error::RepostError;
use repost_watch::service;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

const ROOT_URL: &str = "https://origin.example/post";
const CHILD_URL: &str = "https://mirror.example/copy";
const GRANDCHILD_URL: &str = "https://echo.example/recopy";

/// root (level 1) <- child (level 2) <- grandchild (level 3)
async fn seed_chain(pool: &sqlx::SqlitePool) -> (i64, i64, i64) {
    let root = db::create_request(pool, ROOT_URL, None, 1).await.unwrap();
    let child = db::create_request(pool, CHILD_URL, Some(root), 2)
        .await
        .unwrap();
    let grandchild = db::create_request(pool, GRANDCHILD_URL, Some(child), 3)
        .await
        .unwrap();
    (root, child, grandchild)
}

#[tokio::test]
async fn closure_spans_ancestors_and_descendants() {
    let pool = setup_pool().await;
    let (root, child, grandchild) = seed_chain(&pool).await;

    for url in [ROOT_URL, CHILD_URL, GRANDCHILD_URL] {
        let ids = db::lineage_ids(&pool, url).await.unwrap();
        assert_eq!(ids, vec![root, child, grandchild], "closure of {url}");
    }
}

#[tokio::test]
async fn access_reaches_any_node_in_lineage() {
    let pool = setup_pool().await;
    let (_root, _child, grandchild) = seed_chain(&pool).await;
    db::assign_account(&pool, 7, grandchild).await.unwrap();

    for url in [ROOT_URL, CHILD_URL, GRANDCHILD_URL] {
        assert!(db::has_access(&pool, url, 7).await.unwrap(), "acc 7, {url}");
        assert!(
            !db::has_access(&pool, url, 8).await.unwrap(),
            "acc 8, {url}"
        );
    }
}

#[tokio::test]
async fn unknown_url_resolves_empty_and_stays_hidden() {
    let pool = setup_pool().await;
    seed_chain(&pool).await;

    let ids = db::lineage_ids(&pool, "https://nowhere.example/").await.unwrap();
    assert!(ids.is_empty());
    assert!(!db::has_access(&pool, "https://nowhere.example/", 7)
        .await
        .unwrap());

    let err = service::view_lineage(&pool, "https://nowhere.example/", 7, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepostError::NotFound));
    assert_eq!(err.public_status(), 404);

    // Denied exports look exactly like missing ones from the outside.
    let err = service::export_lineage(&pool, "https://nowhere.example/", 7, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepostError::AccessDenied));
    assert_eq!(err.public_status(), 404);
}

#[tokio::test]
async fn encoded_and_raw_urls_are_equivalent_keys() {
    let pool = setup_pool().await;
    let raw = "https://origin.example/post?id=1&lang=ru";
    let stored = urlencoding::encode(raw).into_owned();
    let id = db::create_request(&pool, &stored, None, 1).await.unwrap();
    db::assign_account(&pool, 3, id).await.unwrap();

    let ids = db::lineage_ids(&pool, raw).await.unwrap();
    assert_eq!(ids, vec![id]);
    assert!(db::has_access(&pool, raw, 3).await.unwrap());

    let view = service::view_lineage(&pool, raw, 3, None, None).await.unwrap();
    assert_eq!(view.id, id);
}

#[tokio::test]
async fn export_joins_links_to_parent_and_level() {
    let pool = setup_pool().await;
    let (root, child, grandchild) = seed_chain(&pool).await;
    db::assign_account(&pool, 7, grandchild).await.unwrap();

    let may = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let june = Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap();

    // Root-owned links have no parent row to join and never appear.
    db::insert_link(&pool, root, "https://origin.example/amp", Some(may), Some("origin amp"))
        .await
        .unwrap();
    db::insert_link(&pool, child, "https://mirror.example/a", Some(may), Some("mirror a"))
        .await
        .unwrap();
    db::insert_link(&pool, child, "https://mirror.example/b", None, None)
        .await
        .unwrap();
    db::insert_link(&pool, grandchild, "https://echo.example/c", Some(june), Some("echo c"))
        .await
        .unwrap();

    let rows = service::export_lineage(&pool, ROOT_URL, 7, None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].repost_url, "https://mirror.example/a");
    assert_eq!(rows[0].parent_url, ROOT_URL);
    assert_eq!(rows[0].repost_level, 2);
    assert_eq!(rows[1].repost_url, "https://mirror.example/b");
    assert_eq!(rows[1].published_at, None);
    assert_eq!(rows[2].repost_url, "https://echo.example/c");
    assert_eq!(rows[2].parent_url, CHILD_URL);
    assert_eq!(rows[2].repost_level, 3);
}

#[tokio::test]
async fn export_date_bounds_are_from_inclusive_to_exclusive() {
    let pool = setup_pool().await;
    let (_root, child, grandchild) = seed_chain(&pool).await;
    db::assign_account(&pool, 7, child).await.unwrap();

    let may = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let june = Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap();

    db::insert_link(&pool, child, "https://mirror.example/a", Some(may), None)
        .await
        .unwrap();
    db::insert_link(&pool, child, "https://mirror.example/b", None, None)
        .await
        .unwrap();
    db::insert_link(&pool, grandchild, "https://echo.example/c", Some(june), None)
        .await
        .unwrap();

    // from == earliest publish instant: included; to == later instant: excluded.
    let rows = service::export_lineage(&pool, ROOT_URL, 7, Some(may), Some(june))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].repost_url, "https://mirror.example/a");

    // A bound alone still drops links without a publish date.
    let rows = service::export_lineage(&pool, ROOT_URL, 7, Some(may), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.published_at.is_some()));
}

#[tokio::test]
async fn view_returns_direct_links_only() {
    let pool = setup_pool().await;
    let (_root, child, grandchild) = seed_chain(&pool).await;
    db::assign_account(&pool, 7, grandchild).await.unwrap();

    let may = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    db::insert_link(&pool, child, "https://mirror.example/a", Some(may), Some("mirror a"))
        .await
        .unwrap();
    db::insert_link(&pool, child, "https://mirror.example/b", None, None)
        .await
        .unwrap();
    db::insert_link(&pool, grandchild, "https://echo.example/c", Some(may), None)
        .await
        .unwrap();

    let view = service::view_lineage(&pool, CHILD_URL, 7, None, None)
        .await
        .unwrap();
    assert_eq!(view.url, CHILD_URL);
    assert_eq!(view.domain, "mirror.example");
    assert_eq!(view.count_repost, 2);
    assert!(view.links.iter().all(|l| l.domain == "mirror.example"));

    // Date bound drops the undated link from the view.
    let view = service::view_lineage(&pool, CHILD_URL, 7, Some(may), None)
        .await
        .unwrap();
    assert_eq!(view.count_repost, 1);
    assert_eq!(view.links[0].title.as_deref(), Some("mirror a"));
}
