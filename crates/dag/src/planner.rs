//! The placement planner ("Ditto", §4.7) — decides which worker node each
//! stage runs on, merging stages along the dependency graph's critical path
//! as long as the merged group still fits a single node's declared vCPU
//! capacity.

use std::collections::{HashMap, HashSet};

use crate::error::PlannerError;

/// Per-stage timing profile used to weigh the dependency graph's edges and
/// to rank candidate merges by critical-path length.
#[derive(Debug, Clone, Copy)]
pub struct StageProfile {
    pub compute_time: f64,
    pub input_time: f64,
    pub output_time: f64,
    pub minimum_vcpu: u32,
}

/// Capacity a worker node offers. `memory_mb` mirrors what the original
/// placement data captures about a node but — like the source algorithm —
/// the feasibility check below only constrains on `vcpu`.
#[derive(Debug, Clone, Copy)]
pub struct NodeResources {
    pub vcpu: u32,
    pub memory_mb: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct Edge {
    src: String,
    dst: String,
    weight: f64,
}

/// Greedy critical-path stage merger.
///
/// `dependencies` maps every stage to the stages it directly depends on
/// (an entry with an empty list means "no dependencies", and every stage
/// that should be considered for placement needs an entry — a stage that
/// appears only as someone else's dependency but has no entry of its own
/// will not get an initial singleton group).
pub struct DittoPlacer {
    node_resources: HashMap<String, NodeResources>,
    dependencies: HashMap<String, Vec<String>>,
    stage_profile: HashMap<String, StageProfile>,
}

impl DittoPlacer {
    pub fn new(
        node_resources: HashMap<String, NodeResources>,
        dependencies: HashMap<String, Vec<String>>,
        stage_profile: HashMap<String, StageProfile>,
    ) -> Self {
        Self { node_resources, dependencies, stage_profile }
    }

    /// Run the algorithm, returning stage → node-name.
    ///
    /// # Errors
    /// [`PlannerError::Infeasible`] if even the no-binding placement (every
    /// stage isolated, no merging) cannot fit the available nodes.
    /// [`PlannerError::UnknownStage`] if a dependency names a stage absent
    /// from `stage_profile`.
    pub fn run_placement_algorithm(&self) -> Result<HashMap<String, String>, PlannerError> {
        for (dst, deps) in &self.dependencies {
            if !self.stage_profile.contains_key(dst) {
                return Err(PlannerError::UnknownStage(dst.clone()));
            }
            for src in deps {
                if !self.stage_profile.contains_key(src) {
                    return Err(PlannerError::UnknownStage(src.clone()));
                }
            }
        }

        let mut edge_list: Vec<Edge> = Vec::new();
        for (dst, deps) in &self.dependencies {
            for src in deps {
                let weight = self.stage_profile[src].output_time + self.stage_profile[dst].input_time;
                edge_list.push(Edge { src: src.clone(), dst: dst.clone(), weight });
            }
        }

        let mut groupings: Vec<HashSet<String>> =
            self.dependencies.keys().map(|s| HashSet::from([s.clone()])).collect();

        let mut placement = self
            .can_place(&groupings)
            .ok_or_else(|| PlannerError::Infeasible("no binding placement does not fit".into()))?;

        while !edge_list.is_empty() {
            let critical_path = self.critical_path(&edge_list)?;
            if critical_path.is_empty() {
                break;
            }

            let chosen = critical_path
                .iter()
                .max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap())
                .cloned()
                .expect("critical_path is non-empty");

            let pos = edge_list.iter().position(|e| *e == chosen).expect("chosen edge came from edge_list");
            edge_list.remove(pos);

            let src_idx = groupings.iter().position(|g| g.contains(&chosen.src)).expect("src is grouped");
            let dst_idx = groupings.iter().position(|g| g.contains(&chosen.dst)).expect("dst is grouped");

            if src_idx == dst_idx {
                continue;
            }

            let mut candidate = groupings.clone();
            let merged = candidate[dst_idx].clone();
            candidate[src_idx].extend(merged);
            candidate.remove(dst_idx);

            if let Some(new_placement) = self.can_place(&candidate) {
                placement = new_placement;
                groupings = candidate;
            }
        }

        Ok(placement)
    }

    fn can_place(&self, groups: &[HashSet<String>]) -> Option<HashMap<String, String>> {
        let cpu_needed: Vec<u32> = groups
            .iter()
            .map(|g| g.iter().map(|s| self.stage_profile[s].minimum_vcpu).sum())
            .collect();

        let nodes: Vec<&String> = self.node_resources.keys().collect();
        if nodes.is_empty() {
            return None;
        }

        let mut assignment = vec![0usize; groups.len()];
        loop {
            let mut load = vec![0u32; nodes.len()];
            for (group_idx, &node_idx) in assignment.iter().enumerate() {
                load[node_idx] += cpu_needed[group_idx];
            }
            let fits = nodes
                .iter()
                .enumerate()
                .all(|(idx, name)| load[idx] <= self.node_resources[name.as_str()].vcpu);

            if fits {
                let mut result = HashMap::new();
                for (group_idx, group) in groups.iter().enumerate() {
                    for stage in group {
                        result.insert(stage.clone(), nodes[assignment[group_idx]].clone());
                    }
                }
                return Some(result);
            }

            if !Self::advance(&mut assignment, nodes.len()) {
                return None;
            }
        }
    }

    /// Advance `assignment` (a mixed-radix counter, base `radix`) to the
    /// next combination. Returns `false` once every combination has been
    /// tried — the Cartesian-product search the source algorithm performs
    /// via `itertools.product`.
    fn advance(assignment: &mut [usize], radix: usize) -> bool {
        for slot in assignment.iter_mut() {
            *slot += 1;
            if *slot < radix {
                return true;
            }
            *slot = 0;
        }
        false
    }

    fn critical_path(&self, edge_list: &[Edge]) -> Result<Vec<Edge>, PlannerError> {
        if edge_list.is_empty() {
            return Ok(Vec::new());
        }

        let stages: Vec<String> = {
            let mut set = HashSet::new();
            for e in edge_list {
                set.insert(e.src.clone());
                set.insert(e.dst.clone());
            }
            set.into_iter().collect()
        };

        let pairs: Vec<(String, String)> = edge_list.iter().map(|e| (e.src.clone(), e.dst.clone())).collect();
        let topo = crate::topo::topological_sort(&stages, &pairs)
            .map_err(|_| PlannerError::CycleDetected)?;

        if topo.len() <= 1 {
            return Ok(Vec::new());
        }

        let mut critical_len: HashMap<String, f64> = HashMap::new();
        let mut critical_path: HashMap<String, Vec<Edge>> = HashMap::new();

        let last = topo.last().unwrap().clone();
        critical_len.insert(last.clone(), self.stage_profile[&last].compute_time);
        critical_path.insert(last, Vec::new());

        for cur in topo[..topo.len() - 1].iter().rev() {
            let best = edge_list
                .iter()
                .filter(|e| e.src == *cur)
                .max_by(|a, b| {
                    let score = |e: &Edge| critical_len[&e.dst] + e.weight;
                    score(a).partial_cmp(&score(b)).unwrap()
                });

            match best {
                None => {
                    critical_len.insert(cur.clone(), self.stage_profile[cur].compute_time);
                    critical_path.insert(cur.clone(), Vec::new());
                }
                Some(edge) => {
                    let len = critical_len[&edge.dst] + edge.weight + self.stage_profile[cur].compute_time;
                    let mut path = critical_path[&edge.dst].clone();
                    path.push(edge.clone());
                    critical_len.insert(cur.clone(), len);
                    critical_path.insert(cur.clone(), path);
                }
            }
        }

        let endpoint = critical_len
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(k, _)| k.clone())
            .expect("critical_len has at least one entry (topo.len() > 1)");

        let mut path = critical_path.remove(&endpoint).unwrap_or_default();
        path.reverse();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(compute: f64, input: f64, output: f64, vcpu: u32) -> StageProfile {
        StageProfile { compute_time: compute, input_time: input, output_time: output, minimum_vcpu: vcpu }
    }

    #[test]
    fn single_node_cluster_collapses_everything_onto_it() {
        let node_resources =
            HashMap::from([("n0".to_string(), NodeResources { vcpu: 16, memory_mb: 8192 })]);
        let dependencies = HashMap::from([
            ("split".to_string(), vec![]),
            ("count".to_string(), vec!["split".to_string()]),
            ("sort".to_string(), vec!["count".to_string()]),
        ]);
        let stage_profile = HashMap::from([
            ("split".to_string(), profile(1.0, 0.1, 0.1, 1)),
            ("count".to_string(), profile(1.0, 0.1, 0.1, 1)),
            ("sort".to_string(), profile(1.0, 0.1, 0.1, 1)),
        ]);

        let placer = DittoPlacer::new(node_resources, dependencies, stage_profile);
        let placement = placer.run_placement_algorithm().unwrap();

        assert_eq!(placement.len(), 3);
        let distinct: HashSet<&String> = placement.values().collect();
        assert_eq!(distinct.len(), 1);
    }

    #[test]
    fn infeasible_cluster_is_rejected() {
        let node_resources = HashMap::from([("n0".to_string(), NodeResources { vcpu: 1, memory_mb: 512 })]);
        let dependencies = HashMap::from([
            ("a".to_string(), vec![]),
            ("b".to_string(), vec!["a".to_string()]),
        ]);
        let stage_profile = HashMap::from([
            ("a".to_string(), profile(1.0, 0.0, 0.0, 4)),
            ("b".to_string(), profile(1.0, 0.0, 0.0, 4)),
        ]);

        let placer = DittoPlacer::new(node_resources, dependencies, stage_profile);
        assert!(matches!(placer.run_placement_algorithm(), Err(PlannerError::Infeasible(_))));
    }

    #[test]
    fn enough_nodes_keeps_stages_separate() {
        let node_resources = HashMap::from([
            ("n0".to_string(), NodeResources { vcpu: 1, memory_mb: 1024 }),
            ("n1".to_string(), NodeResources { vcpu: 1, memory_mb: 1024 }),
        ]);
        let dependencies = HashMap::from([
            ("a".to_string(), vec![]),
            ("b".to_string(), vec!["a".to_string()]),
        ]);
        let stage_profile = HashMap::from([
            ("a".to_string(), profile(5.0, 0.0, 5.0, 1)),
            ("b".to_string(), profile(5.0, 5.0, 0.0, 1)),
        ]);

        let placer = DittoPlacer::new(node_resources, dependencies, stage_profile);
        let placement = placer.run_placement_algorithm().unwrap();
        assert_eq!(placement.len(), 2);
    }
}
