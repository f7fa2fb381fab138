//! Deployment profile loader (§4.7, §6 "Profile file") — the YAML document
//! describing every stage's timing numbers, resource request, container
//! image/command, and port assignment, plus the workflow's dependency
//! graph and default parameters.
//!
//! Grounded on `controller_context.py`'s `setup()` (the `yaml.load` call and
//! the fields it pulls off the parsed document) and `deployment.py`'s
//! `DeploymentGenerator.__init__`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::DeployError;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResourceRequest {
    pub vcpu: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NodeResources {
    pub vcpu: u32,
    #[serde(default)]
    pub memory: u64,
}

/// One stage's entry under `stage_profiles` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct StageProfile {
    pub compute_time: f64,
    pub input_time: f64,
    pub output_time: f64,
    pub request: ResourceRequest,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    #[serde(rename = "codeDir")]
    pub code_dir: String,
    pub worker_port: u16,
    pub cache_server_port: u16,
    pub worker_external_port: u16,
    pub cache_server_external_port: u16,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_parallelism() -> u32 {
    1
}

/// The full deployment profile document.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub app_name: String,
    pub external_ip: String,
    pub template: String,
    #[serde(default)]
    pub knative_template: Option<String>,
    #[serde(default)]
    pub image_coldstart_latency: HashMap<String, f64>,
    #[serde(default)]
    pub default_params: HashMap<String, Value>,
    #[serde(default)]
    pub node_resources: HashMap<String, NodeResources>,
    #[serde(rename = "DAG")]
    pub dag: HashMap<String, Vec<String>>,
    pub stage_profiles: HashMap<String, StageProfile>,
}

impl Profile {
    /// Load and sanity-check a profile file. Every stage named on either
    /// side of a `DAG` edge must have a `stage_profiles` entry, and every
    /// stage must have a `default_params` entry (`controller_context.py`'s
    /// "params sanity check").
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let text = std::fs::read_to_string(path)?;
        let profile: Profile = serde_yaml::from_str(&text)?;

        for (dst, deps) in &profile.dag {
            if !profile.stage_profiles.contains_key(dst) {
                return Err(DeployError::UnknownStage(dst.clone()));
            }
            for src in deps {
                if !profile.stage_profiles.contains_key(src) {
                    return Err(DeployError::UnknownStage(src.clone()));
                }
            }
        }
        for stage in profile.stage_profiles.keys() {
            if !profile.default_params.contains_key(stage) {
                return Err(DeployError::UnknownStage(format!(
                    "{stage} has no default_params entry"
                )));
            }
        }

        Ok(profile)
    }

    pub fn stages(&self) -> Vec<&str> {
        self.stage_profiles.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
app_name: mlpipe
external_ip: "10.0.0.100"
template: template.yaml
image_coldstart_latency:
  worker-image: 1.5
default_params:
  split: {}
  count: {}
DAG:
  split: []
  count: [split]
stage_profiles:
  split:
    compute_time: 1.0
    input_time: 0.1
    output_time: 0.2
    request: { vcpu: 1 }
    image: worker-image
    command: ["python3"]
    args: ["split.py"]
    codeDir: ./split
    worker_port: 9000
    cache_server_port: 9001
    worker_external_port: 30000
    cache_server_external_port: 30001
    parallelism: 1
  count:
    compute_time: 2.0
    input_time: 0.1
    output_time: 0.1
    request: { vcpu: 1 }
    image: worker-image
    command: ["python3"]
    args: ["count.py"]
    codeDir: ./count
    worker_port: 9000
    cache_server_port: 9001
    worker_external_port: 30010
    cache_server_external_port: 30011
    parallelism: 1
"#
    }

    #[test]
    fn loads_a_well_formed_profile() {
        let dir = std::env::temp_dir().join(format!("profile-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profile.yaml");
        std::fs::write(&path, sample_yaml()).unwrap();

        let profile = Profile::load(&path).unwrap();
        assert_eq!(profile.app_name, "mlpipe");
        assert_eq!(profile.stages().len(), 2);
        assert_eq!(profile.dag["count"], vec!["split".to_string()]);
    }

    #[test]
    fn rejects_a_dag_edge_naming_an_unknown_stage() {
        let dir = std::env::temp_dir().join(format!("profile-test-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profile.yaml");
        let broken = sample_yaml().replace("count: [split]", "count: [split]\n  ghost: [split]");
        std::fs::write(&path, broken).unwrap();

        assert!(matches!(Profile::load(&path), Err(DeployError::UnknownStage(_))));
    }
}
