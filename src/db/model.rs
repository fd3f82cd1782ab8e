//! Database view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use crate::model::{RepostLink, RepostRequest};

/// Request plus everything the lifecycle check needs: which accounts are
/// already assigned and which links are attached.
#[derive(Debug, Clone)]
pub struct FoundRequest {
    pub request: RepostRequest,
    pub account_ids: Vec<i64>,
    pub links: Vec<RepostLink>,
}

/// Request with its directly attached links.
#[derive(Debug, Clone)]
pub struct RequestWithLinks {
    pub request: RepostRequest,
    pub links: Vec<RepostLink>,
}

/// Partial update applied through the generic update path. `None` fields
/// are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub has_processed: Option<bool>,
    pub error: Option<String>,
    pub parent_id: Option<i64>,
    pub level: Option<i64>,
}
