//! `Invoker` — the controller's outbound call to a worker (§4.4, §7
//! *TransientTransport*).
//!
//! Grounded on `sending.py`'s `PostUntil200`: POST the invocation, and on
//! anything short of a 200 response — a non-200 status or a connection
//! failure — back off and retry, bounded by a wall-clock budget rather than
//! an attempt count, since a slow worker and a dead one look the same from
//! here.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;
use worker::{Address, StageInvocation, WireRequest};

use crate::error::InvokeError;

/// Dispatches one [`StageInvocation`] to the worker hosting its stage.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, address: &Address, invocation: StageInvocation) -> Result<(), InvokeError>;
}

/// HTTP `Invoker`, retrying `POST /` with exponential backoff until a 200
/// comes back or `retry_budget` elapses.
pub struct HttpInvoker {
    client: reqwest::Client,
    retry_budget: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl HttpInvoker {
    pub fn new(retry_budget: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry_budget,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, address: &Address, invocation: StageInvocation) -> Result<(), InvokeError> {
        let url = format!("http://{}:{}/", address.ip, address.port);
        let body = WireRequest::LambdaCall { metadata: invocation };
        let deadline = Instant::now() + self.retry_budget;
        let mut backoff = self.initial_backoff;

        loop {
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => return Ok(()),
                Ok(resp) => warn!(url, status = %resp.status(), "lambda-call got a non-200 response"),
                Err(err) => warn!(url, %err, "lambda-call POST failed"),
            }

            if Instant::now() >= deadline {
                return Err(InvokeError::Transient(format!(
                    "exhausted retry budget of {:?} posting lambda-call to {url}",
                    self.retry_budget
                )));
            }

            tokio::time::sleep(backoff.min(deadline.saturating_duration_since(Instant::now()))).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use worker::TransportMode;

    fn sample_invocation() -> StageInvocation {
        let mut inv = StageInvocation::new(
            "ns-1",
            "add",
            HashMap::new(),
            TransportMode::Auto,
            Value::Null,
            10.0,
            0.0,
        );
        inv.remote_call();
        inv
    }

    #[tokio::test]
    async fn gives_up_once_the_retry_budget_elapses_against_an_unreachable_address() {
        let invoker = HttpInvoker::new(Duration::from_millis(200));
        // port 0 never accepts a connection; every attempt fails immediately.
        let address = Address { ip: Ipv4Addr::new(127, 0, 0, 1), port: 1, cache_port: 2 };
        let result = invoker.invoke(&address, sample_invocation()).await;
        assert!(matches!(result, Err(InvokeError::Transient(_))));
    }
}
