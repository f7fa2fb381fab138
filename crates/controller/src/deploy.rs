//! Placement and manifest rendering (§4.7 "Ditto", §6 "Deployment").
//!
//! Grounded on `deployment.py`'s `DeploymentGenerator`: `compute_placement`
//! mirrors its three placement branches (`local_placement`, the
//! round-robin `random_placement` default, and `DittoPlacer` behind
//! `--ditto_placement`); `ingress_schedule` mirrors `getIngress`;
//! `render_manifest` mirrors `_replace_stage_varibles`'s literal
//! `__token__` substitution; `prewarm_schedule` mirrors
//! `get_worker_start_point`.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use worker::Address;

use crate::error::DeployError;
use crate::profile::Profile;

/// Stage → node-name placement, used only to fill `__node-name__` in a
/// rendered manifest — every stage is always reached over
/// `profile.external_ip` regardless of which node it lands on
/// ([`ingress_schedule`]).
pub fn compute_placement(
    profile: &Profile,
    ditto_placement: bool,
    local_placement: bool,
) -> Result<HashMap<String, String>, DeployError> {
    if local_placement {
        return Ok(profile.stages().into_iter().map(|s| (s.to_string(), "127.0.0.1".to_string())).collect());
    }

    if !ditto_placement {
        let nodes: Vec<&String> = profile.node_resources.keys().collect();
        if nodes.is_empty() {
            return Ok(profile.stages().into_iter().map(|s| (s.to_string(), String::new())).collect());
        }
        return Ok(profile
            .stages()
            .into_iter()
            .enumerate()
            .map(|(idx, stage)| (stage.to_string(), nodes[idx % nodes.len()].clone()))
            .collect());
    }

    let node_resources = profile
        .node_resources
        .iter()
        .map(|(name, r)| (name.clone(), dag::NodeResources { vcpu: r.vcpu, memory_mb: r.memory }))
        .collect();
    let stage_profile = profile
        .stage_profiles
        .iter()
        .map(|(name, p)| {
            (
                name.clone(),
                dag::StageProfile {
                    compute_time: p.compute_time,
                    input_time: p.input_time,
                    output_time: p.output_time,
                    minimum_vcpu: p.request.vcpu,
                },
            )
        })
        .collect();

    let placer = dag::DittoPlacer::new(node_resources, profile.dag.clone(), stage_profile);
    Ok(placer.run_placement_algorithm()?)
}

/// The controller-facing addresses every stage is reached at: always
/// `profile.external_ip` plus the stage's `worker_external_port` and
/// `cache_server_external_port`, independent of node placement
/// (`deployment.py`'s `getIngress`).
pub fn ingress_schedule(profile: &Profile) -> Result<HashMap<String, Address>, DeployError> {
    let ip: Ipv4Addr = profile
        .external_ip
        .parse()
        .map_err(|_| DeployError::UnknownStage(format!("external_ip '{}' is not an IPv4 address", profile.external_ip)))?;

    Ok(profile
        .stage_profiles
        .iter()
        .map(|(stage, p)| {
            (
                stage.clone(),
                Address { ip, port: p.worker_external_port, cache_port: p.cache_server_external_port },
            )
        })
        .collect())
}

/// Render one stage's Kubernetes manifest from the profile's template by
/// literal token substitution — no templating engine, matching the
/// original's plain `str.replace` chain.
pub fn render_manifest(
    profile: &Profile,
    template: &str,
    stage: &str,
    placement: &HashMap<String, String>,
    cwd: &str,
) -> Result<String, DeployError> {
    let p = profile
        .stage_profiles
        .get(stage)
        .ok_or_else(|| DeployError::UnknownStage(stage.to_string()))?;
    let node = placement.get(stage).cloned().unwrap_or_default();

    Ok(template
        .replace("__app-name__", &profile.app_name)
        .replace("__stage-name__", stage)
        .replace("__node-name__", &node)
        .replace("__image__", &p.image)
        .replace("__command__", &p.command.join(" "))
        .replace("__args__", &p.args.join(" "))
        .replace("__worker-port__", &p.worker_port.to_string())
        .replace("__cache-server-port__", &p.cache_server_port.to_string())
        .replace("__worker-external-port__", &p.worker_external_port.to_string())
        .replace("__cache-server-external-port__", &p.cache_server_external_port.to_string())
        .replace("__parallelism__", &p.parallelism.to_string())
        .replace("__external-ip__", &profile.external_ip)
        .replace("__host-path__", &format!("{cwd}/{}", p.code_dir))
        .replace("__cwd__", cwd))
}

/// Every stage's pre-warm delay, in seconds from engine start
/// (`deployment.py`'s `get_worker_start_point`): a stage should start its
/// container early enough that it has finished cold-starting by the time
/// its predecessors' outputs are expected to arrive.
pub fn prewarm_schedule(profile: &Profile, timing_safe_guard: f64) -> HashMap<String, f64> {
    let topo_order: Vec<String> = {
        let edges: Vec<(String, String)> = profile
            .dag
            .iter()
            .flat_map(|(dst, deps)| deps.iter().map(move |src| (src.clone(), dst.clone())))
            .collect();
        let nodes: Vec<String> = profile.stages().into_iter().map(String::from).collect();
        dag::topo::topological_sort(&nodes, &edges).unwrap_or(nodes)
    };

    let response_latency: HashMap<&str, f64> = profile
        .stage_profiles
        .iter()
        .map(|(s, p)| (s.as_str(), p.input_time + p.compute_time + p.output_time))
        .collect();

    let mut time_to_work: HashMap<String, f64> = HashMap::new();
    let mut container_start: HashMap<String, f64> = HashMap::new();

    for stage in &topo_order {
        let deps = profile.dag.get(stage).cloned().unwrap_or_default();
        let ready_at = deps
            .iter()
            .map(|d| time_to_work.get(d).copied().unwrap_or(0.0) + response_latency.get(d.as_str()).copied().unwrap_or(0.0))
            .fold(0.0_f64, f64::max);
        time_to_work.insert(stage.clone(), ready_at);

        let image = &profile.stage_profiles[stage].image;
        let coldstart = profile.image_coldstart_latency.get(image).copied().unwrap_or(0.0);
        let mut start = ready_at - coldstart - timing_safe_guard;
        if start < 0.0 {
            time_to_work.insert(stage.clone(), ready_at - start);
            start = 0.0;
        }
        container_start.insert(stage.clone(), start);
    }

    container_start
}
