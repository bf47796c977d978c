pub mod invoke;
pub mod list_models;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("chat request has no messages to query with")]
    NoMessages,
    #[error("last message has no text content")]
    EmptyQuestion,
}
