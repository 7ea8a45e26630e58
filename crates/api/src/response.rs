//! Shared response envelope for API handlers.
//!
//! Every successful response wraps its payload in `{ "data": ... }`.
//! Use [`DataResponse`] instead of ad-hoc `serde_json::json!` envelopes so
//! the shape stays consistent across handlers.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
