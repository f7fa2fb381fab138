//! Vendor FaaS backend (§4.9) — aliyun / knative / aws function URLs.
//! No retry machinery, no polling: `call` is a plain HTTP POST awaited for
//! its JSON body; `tell` fires the same POST on a spawned task and never
//! looks at the response (§4.9 Open Questions: `aws` resolved as another
//! vendor variant rather than removed, since its call/tell shape is
//! identical to aliyun/knative's).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::BackendError;
use crate::traits::Backend;

/// One function-URL-per-stage vendor backend.
pub struct VendorBackend {
    function_urls: HashMap<String, String>,
    http: reqwest::Client,
}

impl VendorBackend {
    pub fn new(function_urls: HashMap<String, String>) -> Self {
        Self { function_urls, http: reqwest::Client::new() }
    }

    fn url_for(&self, stage: &str) -> Result<&str, BackendError> {
        self.function_urls
            .get(stage)
            .map(String::as_str)
            .ok_or_else(|| BackendError::UnknownStage(stage.to_string()))
    }
}

#[async_trait]
impl Backend for VendorBackend {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, BackendError> {
        let url = self.url_for(stage)?;
        let resp = self
            .http
            .post(url)
            .json(&params)
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        if !resp.status().is_success() {
            return Err(BackendError::StageFailed(format!(
                "vendor call to '{stage}' returned {}",
                resp.status()
            )));
        }

        resp.json::<Value>().await.map_err(|err| BackendError::Transport(err.to_string()))
    }

    async fn tell(&self, stage: &str, params: Value) -> Result<(), BackendError> {
        let url = self.url_for(stage)?.to_string();
        let http = self.http.clone();
        let stage_owned = stage.to_string();
        tokio::spawn(async move {
            if let Err(err) = http.post(&url).json(&params).send().await {
                warn!(stage = %stage_owned, %err, "vendor tell POST failed");
            }
        });
        Ok(())
    }
}
