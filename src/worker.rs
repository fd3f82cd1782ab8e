use crate::backend::ParserService;
use crate::db::{self, Pool, RequestPatch};
use anyhow::Result;
use tracing::{info, instrument, warn};

/// Pick up the oldest unparsed repost request and run it through the
/// parser service. Outcome lands back on the row through the generic
/// update path: `has_processed = true` on success, `has_processed =
/// false` plus the error text on failure. Returns whether a request was
/// processed.
#[instrument(skip_all)]
pub async fn process_next_request(
    pool: &Pool,
    parser: &dyn ParserService,
    max_level: i64,
) -> Result<bool> {
    let Some(request) = db::next_unprocessed(pool, max_level).await? else {
        return Ok(false);
    };

    match parser.process_request(&request.url, request.level).await {
        Ok(outcome) => {
            db::update_request(
                pool,
                request.id,
                RequestPatch {
                    has_processed: Some(true),
                    ..Default::default()
                },
            )
            .await?;
            info!(
                id = request.id,
                links = outcome.links_found,
                "repost request parsed"
            );
        }
        Err(err) => {
            warn!(?err, id = request.id, "parse failed");
            db::update_request(
                pool,
                request.id,
                RequestPatch {
                    has_processed: Some(false),
                    error: Some(err.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        }
    }
    Ok(true)
}
