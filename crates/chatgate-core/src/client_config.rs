use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use http::HeaderMap;
use serde::Serialize;

use chatgate_storage::ResourceKind;

use crate::core::CoreState;

/// Feature switches the browser client needs; carries no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub need_code: bool,
    pub hide_user_api_key: bool,
    pub disable_premium: bool,
    pub hide_balance_query: bool,
    pub disable_fast_link: bool,
    pub custom_models: String,
}

pub async fn client_config_handler(
    State(state): State<Arc<CoreState>>,
    headers: HeaderMap,
) -> Json<ClientConfig> {
    let identity = state.identity.resolve(&headers);
    let premium_allowed = !state.config.features.hide_premium
        && state.quotas.peek(identity.as_ref(), ResourceKind::Premium).await > 0;

    Json(ClientConfig {
        need_code: state.access.need_code(),
        hide_user_api_key: state.access.hide_user_api_key(),
        disable_premium: !premium_allowed,
        hide_balance_query: state.config.features.hide_balance_query,
        disable_fast_link: state.config.features.disable_fast_link,
        custom_models: state.models.client_custom_models(premium_allowed),
    })
}
