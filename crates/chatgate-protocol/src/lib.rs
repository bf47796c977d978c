pub mod body;
pub mod openai;
pub mod retrieval;
pub mod upload;

pub use body::InboundBody;
