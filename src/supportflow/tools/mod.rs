//! Bundled in-process tool sets, one module per specialist domain.
//!
//! Every tool is a thin closure over the shared [`SupportStore`]
//! (crate::supportflow::store::SupportStore) returning the
//! `{success, data|error}` record shape specialists consume. The
//! user-interaction pair in [`interaction`] is the exception: it is built
//! per specialist invocation from an explicit capability handle instead of
//! living in the static provider.

pub mod alteration;
pub mod billing;
pub mod delivery;
pub mod general;
pub mod interaction;
pub mod measurement;
pub mod order;
pub mod refund;
pub mod technical;

use crate::supportflow::tool::ToolResult;
use serde_json::Value;

/// Pull a required string argument, failing in-band when absent.
pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    params[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolResult::failure(format!("missing required parameter: {}", key)))
}
