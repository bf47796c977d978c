pub mod request;
pub mod scope;

pub use request::{Configurable, InvokeConfig, RetrievalInvoke, SearchKwargs};
pub use scope::{RetrievalScope, ScopeId, ScopeIdError};
