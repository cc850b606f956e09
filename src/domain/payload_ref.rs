use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DocumentId, TrackingId};

/// Location of a part payload in the part store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(String);

impl PayloadRef {
    pub fn for_part(document_id: &DocumentId, tracking_id: &TrackingId, part_number: u32) -> Self {
        Self(format!(
            "parts/{}/{}/part_{:03}",
            document_id, tracking_id, part_number
        ))
    }

    pub fn for_source(document_id: &DocumentId, filename: &str) -> Self {
        Self(format!("sources/{}/{}", document_id, filename))
    }

    pub fn from_raw(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
