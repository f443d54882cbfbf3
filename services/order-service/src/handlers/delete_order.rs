use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use application::ServiceError;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DeleteOrderResponse {
    pub status: &'static str,
    pub order_id: String,
}

pub async fn handle(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<DeleteOrderResponse>, ApiError> {
    state
        .service
        .delete_order(&order_uid)
        .await
        .map_err(|e| match e {
            ServiceError::NotFound => ApiError::not_found(&order_uid),
            other => other.into(),
        })?;

    info!(order_uid = %order_uid, "order deleted via HTTP");

    Ok(Json(DeleteOrderResponse {
        status: "deleted",
        order_id: order_uid,
    }))
}
