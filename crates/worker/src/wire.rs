//! The `{ "type": ..., ... }` worker wire protocol (§4.5, §6 "Worker HTTP"),
//! shared between the HTTP handler (server side) and [`crate::storage`]'s
//! outgoing `cache-put`/`cache-get` calls (client side) so both speak the
//! exact same envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::invocation::StageInvocation;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireRequest {
    LambdaCall { metadata: StageInvocation },
    CachePut { key: String, value: Value },
    CacheGet { key: String },
    CacheClear { prefix: String },
}
