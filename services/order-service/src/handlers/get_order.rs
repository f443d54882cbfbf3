use axum::extract::{Path, State};
use axum::Json;

use application::ServiceError;
use domain::Order;

use crate::error::ApiError;
use crate::state::AppState;

/// Get a single order by its uid, cache first.
pub async fn handle(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .service
        .get_order(&order_uid)
        .await
        .map_err(|e| match e {
            ServiceError::NotFound => ApiError::not_found(&order_uid),
            other => other.into(),
        })?;

    Ok(Json(order))
}
