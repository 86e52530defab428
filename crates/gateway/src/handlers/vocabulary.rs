//! Vocabulary cache administration

use crate::AppState;
use acukg_common::cache::VocabularyInfo;
use acukg_common::errors::Result;
use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
pub struct RefreshResponse {
    pub categories: Vec<VocabularyInfo>,
}

/// POST /api/vocabulary/refresh - reload every category from the graph store
pub async fn refresh(State(state): State<AppState>) -> Result<Json<RefreshResponse>> {
    let categories = state.qa.vocabulary().refresh_all().await?;

    let total: usize = categories.iter().map(|c| c.count).sum();
    info!(categories = categories.len(), names = total, "Vocabulary refreshed");

    Ok(Json(RefreshResponse { categories }))
}
