use std::sync::Arc;

use application::OrderService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
}
