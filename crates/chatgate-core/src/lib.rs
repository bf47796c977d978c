pub mod audit;
pub mod auth;
pub mod client_config;
pub mod config;
pub mod core;
pub mod error;
pub mod handler;
pub mod health;
pub mod policy;
pub mod presign;
pub mod quota;
pub mod storage_route;
pub mod upload;

pub use auth::{AccessPolicy, Anonymous, AuthGrant, IdentityResolver, JwtSessionResolver};
pub use config::GateConfig;
pub use core::{Collaborators, Core, CoreState};
pub use error::GateError;
pub use policy::{CatalogEntry, ModelAccess, ModelCatalog};
