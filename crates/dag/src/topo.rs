//! Generic topological sort (Kahn's algorithm), shared by the placement
//! planner's dependency-graph pass and by anything that wants an acyclicity
//! check over a plain node/edge list.
//!
//! The DAG `Evaluator` itself does not call this — a cycle in the
//! Lambda/DataNode graph cannot arise from the builder API (each combinator
//! can only wire a new control node to *existing* data nodes), so firing
//! order is discovered by the evaluator's ready-queue, not computed ahead of
//! time. This module exists for graphs described declaratively instead —
//! the planner's stage dependency graph (§4.7).

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Errors produced by [`topological_sort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopoError<T> {
    DuplicateNode(T),
    UnknownNode(T),
    Cycle,
}

/// Sort `nodes` so that every edge `(from, to)` places `from` before `to`.
///
/// # Errors
/// - [`TopoError::DuplicateNode`] if `nodes` repeats an id.
/// - [`TopoError::UnknownNode`] if an edge names an id absent from `nodes`.
/// - [`TopoError::Cycle`] if the graph has a back-edge.
pub fn topological_sort<T>(nodes: &[T], edges: &[(T, T)]) -> Result<Vec<T>, TopoError<T>>
where
    T: Eq + Hash + Clone,
{
    let mut seen: HashSet<T> = HashSet::new();
    for n in nodes {
        if !seen.insert(n.clone()) {
            return Err(TopoError::DuplicateNode(n.clone()));
        }
    }

    for (from, to) in edges {
        if !seen.contains(from) {
            return Err(TopoError::UnknownNode(from.clone()));
        }
        if !seen.contains(to) {
            return Err(TopoError::UnknownNode(to.clone()));
        }
    }

    let mut adjacency: HashMap<T, Vec<T>> = HashMap::new();
    let mut in_degree: HashMap<T, usize> = HashMap::new();
    for n in nodes {
        adjacency.entry(n.clone()).or_default();
        in_degree.entry(n.clone()).or_insert(0);
    }
    for (from, to) in edges {
        adjacency.entry(from.clone()).or_default().push(to.clone());
        *in_degree.entry(to.clone()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<T> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(n, _)| n.clone())
        .collect();

    let mut sorted = Vec::with_capacity(nodes.len());
    while let Some(n) = queue.pop_front() {
        sorted.push(n.clone());
        if let Some(neighbours) = adjacency.get(&n) {
            for next in neighbours {
                let deg = in_degree.get_mut(next).expect("seeded above");
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next.clone());
                }
            }
        }
    }

    if sorted.len() != nodes.len() {
        return Err(TopoError::Cycle);
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_sorts_in_order() {
        let nodes = vec!["a", "b", "c"];
        let edges = vec![("a", "b"), ("b", "c")];
        assert_eq!(topological_sort(&nodes, &edges).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_keeps_source_first_and_sink_last() {
        let nodes = vec!["a", "b", "c", "d"];
        let edges = vec![("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")];
        let sorted = topological_sort(&nodes, &edges).unwrap();
        assert_eq!(sorted.first(), Some(&"a"));
        assert_eq!(sorted.last(), Some(&"d"));
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn cycle_is_rejected() {
        let nodes = vec!["a", "b", "c"];
        let edges = vec![("a", "b"), ("b", "c"), ("c", "a")];
        assert_eq!(topological_sort(&nodes, &edges), Err(TopoError::Cycle));
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let nodes = vec!["a"];
        let edges = vec![("a", "ghost")];
        assert_eq!(
            topological_sort(&nodes, &edges),
            Err(TopoError::UnknownNode("ghost"))
        );
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let nodes = vec!["a", "a"];
        assert_eq!(topological_sort::<&str>(&nodes, &[]), Err(TopoError::DuplicateNode("a")));
    }

    #[test]
    fn single_node_is_valid() {
        let nodes = vec!["solo"];
        assert_eq!(topological_sort::<&str>(&nodes, &[]).unwrap(), vec!["solo"]);
    }
}
