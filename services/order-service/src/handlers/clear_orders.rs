use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ClearOrdersResponse {
    pub status: &'static str,
    pub count: usize,
}

pub async fn handle(State(state): State<AppState>) -> Result<Json<ClearOrdersResponse>, ApiError> {
    state.service.clear_orders().await?;

    info!("all orders cleared via HTTP");

    Ok(Json(ClearOrdersResponse {
        status: "cleared",
        count: 0,
    }))
}
