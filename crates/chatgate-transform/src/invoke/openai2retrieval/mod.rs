pub mod request;

pub use request::{RetrievalParams, transform_request};
