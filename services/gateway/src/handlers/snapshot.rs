use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use types::ids::TopicId;
use types::quote::QuoteSnapshot;

use crate::error::AppError;
use crate::state::AppState;

/// Read-through snapshot for one topic.
pub async fn topic_snapshot(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Result<Json<QuoteSnapshot>, AppError> {
    let topic = TopicId::try_new(topic)
        .ok_or_else(|| AppError::BadRequest("empty topic".to_string()))?;

    state
        .service
        .snapshot(&topic)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no snapshot for topic {topic}")))
}

/// Service counters, keyed and sorted for scraping.
pub async fn metrics(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.service.metrics().export())
}
