//! Question answering handler

use crate::AppState;
use acukg_common::errors::{AppError, Result};
use acukg_common::metrics::RequestMetrics;
use acukg_common::qa::{QaRequest, QaResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

/// POST /api/qa
pub async fn ask(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QaRequest>, JsonRejection>,
) -> Result<Json<QaResponse>> {
    let metrics = RequestMetrics::start("POST", "/api/qa");

    let result = match payload {
        Ok(Json(request)) => state.qa.answer(request).await,
        Err(rejection) => Err(AppError::InvalidFormat {
            message: rejection.body_text(),
        }),
    };

    match result {
        Ok(response) => {
            metrics.finish(200);
            Ok(Json(response))
        }
        Err(e) => {
            metrics.finish(e.status_code().as_u16());
            Err(e)
        }
    }
}

