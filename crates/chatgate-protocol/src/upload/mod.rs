pub mod request;
pub mod response;

pub use request::UploadRequest;
pub use response::UploadGrant;
