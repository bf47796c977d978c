use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Time-boxed browser POST credential for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadGrant {
    pub url: String,
    pub fields: BTreeMap<String, String>,
}
