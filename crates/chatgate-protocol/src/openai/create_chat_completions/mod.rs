pub mod request;

pub use request::{ChatCompletionRequest, ChatMessage, MessageContent};
