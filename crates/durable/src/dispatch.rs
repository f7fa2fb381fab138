//! The seam between `durable` and whichever backend actually reaches a
//! stage. Kept as a narrow trait here (mirroring `dag::StageInvoker`, with
//! `tell` added) so this crate never depends on `backends` — `backends`
//! depends on `durable` and implements this for its `Backend` types.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DurableError;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, DurableError>;
    async fn tell(&self, stage: &str, params: Value) -> Result<(), DurableError>;
}
