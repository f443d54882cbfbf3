use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use domain::Order;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub result: &'static str,
    pub status: &'static str,
}

/// Create or replace an order. Returns 201 for every accepted write; the
/// `result` field tells created, updated and exists apart.
pub async fn handle(
    State(state): State<AppState>,
    body: Result<Json<Order>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let Json(order) = body.map_err(ApiError::invalid_json)?;

    let outcome = state.service.save_order(&order).await?;

    info!(order_uid = %order.order_uid, result = outcome.as_str(), "order saved via HTTP");

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: order.order_uid,
            result: outcome.as_str(),
            status: "success",
        }),
    ))
}
