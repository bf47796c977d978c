use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::core::CoreState;

pub async fn health_handler(State(state): State<Arc<CoreState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "droppedEvents": state.events.dropped(),
    }))
}
