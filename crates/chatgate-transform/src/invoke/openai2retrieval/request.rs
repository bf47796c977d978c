use chatgate_protocol::openai::create_chat_completions::ChatCompletionRequest;
use chatgate_protocol::retrieval::{
    Configurable, InvokeConfig, RetrievalInvoke, RetrievalScope, SearchKwargs,
};

use crate::TransformError;

/// Server-side knobs for the retrieval call; never taken from the caller.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub model_name: String,
    pub api_key: Option<String>,
    pub default_temperature: Option<f64>,
}

/// Convert a chat completion request into a retrieval `invoke` body that
/// asks the last message as the question, restricted to `scope`.
pub fn transform_request(
    request: &ChatCompletionRequest,
    params: RetrievalParams,
    scope: &RetrievalScope,
) -> Result<RetrievalInvoke, TransformError> {
    let last = request.last_message().ok_or(TransformError::NoMessages)?;
    let input = last.content.text();
    if input.trim().is_empty() {
        return Err(TransformError::EmptyQuestion);
    }

    Ok(RetrievalInvoke {
        input,
        config: InvokeConfig {
            configurable: Configurable {
                model_name: params.model_name,
                openai_api_key: params.api_key,
                temperature: request.temperature.or(params.default_temperature),
                search_kwargs: SearchKwargs {
                    expr: scope.filter_expr(),
                },
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use chatgate_protocol::retrieval::ScopeId;
    use serde_json::json;

    use super::*;

    fn params() -> RetrievalParams {
        RetrievalParams {
            model_name: "gpt-3.5-turbo-16k".to_string(),
            api_key: Some("sk-user".to_string()),
            default_temperature: Some(0.5),
        }
    }

    #[test]
    fn asks_last_message_within_scope() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": "what is in the report?"}
            ]
        }))
        .unwrap();
        let scope = RetrievalScope::new(
            ScopeId::parse("folder1").unwrap(),
            Some(ScopeId::parse("file9").unwrap()),
        );

        let invoke = transform_request(&request, params(), &scope).unwrap();
        assert_eq!(
            serde_json::to_value(&invoke).unwrap(),
            json!({
                "input": "what is in the report?",
                "config": {"configurable": {
                    "model_name": "gpt-3.5-turbo-16k",
                    "openai_api_key": "sk-user",
                    "temperature": 0.2,
                    "search_kwargs": {"expr": "folder == 'folder1' and file == 'file9'"}
                }}
            })
        );
    }

    #[test]
    fn falls_back_to_default_temperature() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "q"}]
        }))
        .unwrap();
        let scope = RetrievalScope::new(ScopeId::parse("f").unwrap(), None);
        let invoke = transform_request(&request, params(), &scope).unwrap();
        assert_eq!(invoke.config.configurable.temperature, Some(0.5));
    }

    #[test]
    fn rejects_requests_without_a_question() {
        let scope = RetrievalScope::new(ScopeId::parse("f").unwrap(), None);
        let empty: ChatCompletionRequest =
            serde_json::from_value(json!({"messages": []})).unwrap();
        assert_eq!(
            transform_request(&empty, params(), &scope),
            Err(TransformError::NoMessages)
        );

        let blank: ChatCompletionRequest =
            serde_json::from_value(json!({"messages": [{"role": "user", "content": "  "}]}))
                .unwrap();
        assert_eq!(
            transform_request(&blank, params(), &scope),
            Err(TransformError::EmptyQuestion)
        );
    }
}
