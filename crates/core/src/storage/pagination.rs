//! Opaque pagination tokens.
//!
//! A [`Cursor`] is whatever continuation state the store returned. Tokens are
//! URL-safe base64 of the cursor's JSON; this module never looks inside.
//!
//! Decoding fails open: a token that cannot be decoded yields `None`, which
//! the router treats as "start from the first page". A tampered or corrupted
//! token therefore restarts pagination instead of failing the request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::item::Item;

/// Store-native continuation state ("continue after this key").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(Item);

impl Cursor {
    pub fn new(item: Item) -> Self {
        Self(item)
    }

    pub fn as_item(&self) -> &Item {
        &self.0
    }

    pub fn into_item(self) -> Item {
        self.0
    }
}

/// Encode a cursor into a transport-safe token.
///
/// Returns `None` when there is no cursor, i.e. on the last page.
pub fn encode_pagination_token(cursor: Option<&Cursor>) -> Option<String> {
    let cursor = cursor?;
    match serde_json::to_vec(cursor) {
        Ok(json) => Some(URL_SAFE_NO_PAD.encode(json)),
        Err(err) => {
            // A JSON map always serializes; keep the failure visible anyway.
            tracing::error!(error = %err, "Failed to encode pagination cursor");
            None
        }
    }
}

/// Decode a token produced by [`encode_pagination_token`].
///
/// Malformed tokens return `None`.
pub fn decode_pagination_token(token: &str) -> Option<Cursor> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let bytes = match URL_SAFE_NO_PAD.decode(token) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring malformed pagination token");
            return None;
        }
    };

    match serde_json::from_slice::<Cursor>(&bytes) {
        Ok(cursor) => Some(cursor),
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring undecodable pagination token");
            None
        }
    }
}
