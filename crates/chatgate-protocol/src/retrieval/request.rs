use serde::{Deserialize, Serialize};

/// Body of a retrieval backend `invoke` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalInvoke {
    pub input: String,
    pub config: InvokeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeConfig {
    pub configurable: Configurable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configurable {
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub search_kwargs: SearchKwargs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchKwargs {
    pub expr: String,
}
