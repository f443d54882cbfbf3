use axum::extract::State;
use axum::Json;
use serde::Serialize;

use domain::Order;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<Order>,
    pub count: usize,
}

/// List the hot set of orders (cache contents, or one store page on a cold
/// cache).
pub async fn handle(State(state): State<AppState>) -> Result<Json<ListOrdersResponse>, ApiError> {
    let orders = state.service.get_all_orders().await?;
    Ok(Json(ListOrdersResponse {
        count: orders.len(),
        orders,
    }))
}
