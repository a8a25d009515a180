//! Continuation cursors
//!
//! A cursor records, per source, the byte offset a paginated scan resumes
//! from. It travels to the client as URL-safe base64 of its JSON form, so no
//! session state is kept on the server.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::SortOrder;

const CURSOR_VERSION: u8 = 1;

/// Per-source resume offsets for one sort direction.
///
/// For ascending scans an offset is the first byte not yet delivered; for
/// descending scans it is the exclusive upper bound still to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "v")]
    version: u8,
    pub order: SortOrder,
    pub offsets: BTreeMap<String, u64>,
}

impl Cursor {
    pub fn new(order: SortOrder) -> Self {
        Self {
            version: CURSOR_VERSION,
            order,
            offsets: BTreeMap::new(),
        }
    }

    pub fn offset(&self, source: &str) -> Option<u64> {
        self.offsets.get(source).copied()
    }

    pub fn set_offset(&mut self, source: impl Into<String>, offset: u64) {
        self.offsets.insert(source.into(), offset);
    }

    /// Encode as an opaque token
    pub fn encode(&self) -> String {
        // Serializing a map of strings to integers cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token produced by [`Cursor::encode`]
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| Error::InvalidCursor(format!("not base64: {}", e)))?;
        let cursor: Cursor = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidCursor(format!("malformed: {}", e)))?;
        if cursor.version != CURSOR_VERSION {
            return Err(Error::InvalidCursor(format!(
                "unsupported version {}",
                cursor.version
            )));
        }
        Ok(cursor)
    }
}
