use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::sessions::service;
use crate::core::state::AppState;
use crate::services::ranking::{contest_ranking, RankingRow};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/contests/:contest_id/ranking", get(ranking))
}

async fn ranking(
    Path(contest_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<RankingRow>>, ApiError> {
    let live = state.settings().exam().live_ranking;
    let rows = contest_ranking(state.sessions(), &service(&state), &contest_id, live).await?;
    Ok(Json(rows))
}
