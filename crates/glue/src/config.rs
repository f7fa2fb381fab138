//! Environment-variable configuration (§6 "Environment variables").

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use worker::{Address, TransportMode};

use crate::error::GlueError;

/// The provider named by `FAASIT_PROVIDER` (§6, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Cluster backend pointed at a locally-addressed worker schedule, used
    /// for development against the distributed code path without a real
    /// deployment.
    Local,
    /// In-process backend: no network hop, local-disk KV (§4.9).
    LocalOnce,
    Aliyun,
    Knative,
    Aws,
    /// Cluster backend against a real deployment (§4.4, §4.9).
    Pku,
}

impl Provider {
    pub(crate) fn parse(raw: &str) -> Result<Self, GlueError> {
        match raw {
            "local" => Ok(Provider::Local),
            "local-once" => Ok(Provider::LocalOnce),
            "aliyun" => Ok(Provider::Aliyun),
            "knative" => Ok(Provider::Knative),
            "aws" => Ok(Provider::Aws),
            "pku" => Ok(Provider::Pku),
            other => Err(GlueError::UnknownProvider(other.to_string())),
        }
    }

    pub fn is_cluster(self) -> bool {
        matches!(self, Provider::Local | Provider::Pku)
    }

    pub fn is_vendor(self) -> bool {
        matches!(self, Provider::Aliyun | Provider::Knative | Provider::Aws)
    }
}

/// Everything read off the environment at handler-factory time (§6).
#[derive(Debug, Clone)]
pub struct GlueConfig {
    pub provider: Provider,
    pub func_name: Option<String>,
    pub local_storage_dir: String,
    pub redis_host: Option<String>,
    pub redis_port: u16,
    pub namespace: String,
    pub schedule: HashMap<String, Address>,
    pub function_urls: HashMap<String, String>,
    pub trans_mode: TransportMode,
    pub remote_call_timeout: Duration,
    pub post_ratio: f64,
}

impl GlueConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// [`GlueError::UnknownProvider`] if `FAASIT_PROVIDER` is unset or holds
    /// a value outside the five recognized providers.
    pub fn from_env() -> Result<Self, GlueError> {
        let raw_provider = std::env::var("FAASIT_PROVIDER")
            .map_err(|_| GlueError::UnknownProvider(String::new()))?;
        let provider = Provider::parse(&raw_provider)?;

        let func_name = std::env::var("FAASIT_FUNC_NAME").ok();
        let local_storage_dir =
            std::env::var("LOCAL_STORAGE_DIR").unwrap_or_else(|_| "./.faasit-local".to_string());
        let redis_host = std::env::var("REDIS_HOST").ok();
        let redis_port = std::env::var("REDIS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(6379);
        let namespace =
            std::env::var("FAASIT_NAMESPACE").unwrap_or_else(|_| "faasit-default".to_string());

        let schedule = parse_json_env::<HashMap<String, Address>>("FAASIT_SCHEDULE")?
            .unwrap_or_default();
        let function_urls =
            parse_json_env::<HashMap<String, String>>("FAASIT_FUNCTION_URLS")?.unwrap_or_default();

        let trans_mode = match std::env::var("FAASIT_TRANSMODE").ok().as_deref() {
            Some("allRedis") => TransportMode::AllRedis,
            Some("allTCP") => TransportMode::AllTcp,
            _ => TransportMode::Auto,
        };
        let remote_call_timeout = Duration::from_secs_f64(
            std::env::var("FAASIT_REMOTE_CALL_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30.0),
        );
        let post_ratio = std::env::var("FAASIT_POST_RATIO")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);

        Ok(Self {
            provider,
            func_name,
            local_storage_dir,
            redis_host,
            redis_port,
            namespace,
            schedule,
            function_urls,
            trans_mode,
            remote_call_timeout,
            post_ratio,
        })
    }
}

fn parse_json_env<T: serde::de::DeserializeOwned>(var: &str) -> Result<Option<T>, GlueError> {
    match std::env::var(var) {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| GlueError::Config(format!("{var} is not valid JSON: {err}"))),
        Err(_) => Ok(None),
    }
}

/// Resolve `ip:port` pairs embedded in a schedule entry; kept separate so
/// tests can build an [`Address`] without round-tripping through JSON.
pub fn address(ip: Ipv4Addr, port: u16, cache_port: u16) -> Address {
    Address { ip, port, cache_port }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_an_unrecognized_provider_string_is_rejected() {
        let err = Provider::parse("ghost");
        assert!(matches!(err, Err(GlueError::UnknownProvider(p)) if p == "ghost"));
    }

    #[test]
    fn every_documented_provider_name_parses() {
        for name in ["local", "local-once", "aliyun", "knative", "aws", "pku"] {
            assert!(Provider::parse(name).is_ok(), "{name} should parse");
        }
    }
}
