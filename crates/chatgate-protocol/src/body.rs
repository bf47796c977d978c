use serde_json::Value;

use crate::openai::create_chat_completions::ChatCompletionRequest;

/// Inbound proxy body as seen by the gate. Anything that is not a JSON
/// object shaped like a chat request stays opaque and is forwarded as-is.
/// An opaque JSON object still carries its top-level `model` string.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundBody {
    Empty,
    Chat(ChatCompletionRequest),
    Opaque {
        model: Option<String>,
        reason: String,
    },
}

impl InboundBody {
    pub fn parse(raw: &[u8]) -> Self {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Self::Empty;
        }
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(err) => {
                return Self::Opaque {
                    model: None,
                    reason: format!("invalid json: {err}"),
                };
            }
        };
        if !value.is_object() {
            return Self::Opaque {
                model: None,
                reason: "body is not a json object".to_string(),
            };
        }
        let model = value.get("model").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value::<ChatCompletionRequest>(value) {
            Ok(request) => Self::Chat(request),
            Err(err) => Self::Opaque {
                model,
                reason: format!("unrecognized body: {err}"),
            },
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Chat(request) => request.model.as_deref(),
            Self::Opaque { model, .. } => model.as_deref(),
            Self::Empty => None,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatCompletionRequest> {
        match self {
            Self::Chat(request) => Some(request),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bodies() {
        assert_eq!(InboundBody::parse(b""), InboundBody::Empty);
        assert_eq!(InboundBody::parse(b" \n"), InboundBody::Empty);

        let chat = InboundBody::parse(br#"{"model":"gpt-4","messages":[]}"#);
        assert_eq!(chat.model(), Some("gpt-4"));

        let no_model = InboundBody::parse(br#"{"input":"embed me"}"#);
        assert!(no_model.as_chat().is_some());
        assert_eq!(no_model.model(), None);

        assert!(matches!(
            InboundBody::parse(b"{not json"),
            InboundBody::Opaque { .. }
        ));
        assert!(matches!(
            InboundBody::parse(b"[1,2]"),
            InboundBody::Opaque { .. }
        ));
        let numeric = InboundBody::parse(br#"{"model":42}"#);
        assert!(matches!(numeric, InboundBody::Opaque { .. }));
        assert_eq!(numeric.model(), None);
    }

    #[test]
    fn model_survives_a_body_the_chat_schema_rejects() {
        for raw in [
            r#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}],"temperature":"0.7"}"#,
            r#"{"model":"gpt-4","messages":null}"#,
            r#"{"model":"gpt-4","messages":[{"content":"no role"}]}"#,
        ] {
            let body = InboundBody::parse(raw.as_bytes());
            assert!(body.as_chat().is_none(), "{raw}");
            assert_eq!(body.model(), Some("gpt-4"), "{raw}");
        }
    }
}
