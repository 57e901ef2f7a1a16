//! The task dependency graph: construction, cycle detection, and layered
//! topological stage emission (§4.6).
//!
//! Storage is a `petgraph::graph::DiGraph`, the same crate the teacher's
//! `dag/mod.rs` builds its task DAG on; an edge runs from a dependency to
//! its dependent, matching the teacher's `add_dependency(from, to)` shape
//! ("`from` must complete before `to` can start"). The exact-path cycle
//! report and the layered stage emission are this crate's own logic on top
//! of that structure, the way the teacher layers `get_ready_tasks` on top
//! of `neighbors_directed`.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::config::TaskConfig;
use crate::error::{ReginaldError, Result};

struct NodeData {
    id: String,
    task_type: String,
    /// `requires`, in declaration order — kept alongside the graph edges so
    /// cycle reporting can walk dependencies in a deterministic, spec-
    /// meaningful order rather than whatever order petgraph's adjacency
    /// list happens to store them in.
    dependencies: Vec<String>,
}

/// One node of the task graph, as handed back to callers.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub task_type: String,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

/// The constructed, validated task graph for one run.
pub struct TaskGraph {
    graph: DiGraph<NodeData, ()>,
    index: HashMap<String, NodeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

impl TaskGraph {
    /// Build the graph from a flat list of task configs. Every config must
    /// already have a non-empty id (bare-type `requires` normalisation
    /// happens earlier, in the configuration loader) and every `requires`
    /// entry must resolve to a known id.
    pub fn build(configs: &[TaskConfig]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();

        for (position, config) in configs.iter().enumerate() {
            if config.id.is_empty() {
                return Err(ReginaldError::EmptyTaskId(position));
            }
            let idx = graph.add_node(NodeData {
                id: config.id.clone(),
                task_type: config.task_type.clone(),
                dependencies: config.requires.clone(),
            });
            index.insert(config.id.clone(), idx);
        }

        for config in configs {
            let dependent_idx = index[&config.id];
            for dependency in &config.requires {
                let dependency_idx = *index
                    .get(dependency)
                    .ok_or_else(|| ReginaldError::UnknownDependency(dependency.clone()))?;
                graph.add_edge(dependency_idx, dependent_idx, ());
            }
        }

        let task_graph = TaskGraph { graph, index };
        task_graph.detect_cycle()?;
        Ok(task_graph)
    }

    fn detect_cycle(&self) -> Result<()> {
        if !petgraph::algo::is_cyclic_directed(&self.graph) {
            return Ok(());
        }

        // `is_cyclic_directed` only tells us a cycle exists, not which one;
        // walk the declared `requires` edges ourselves, in insertion order,
        // to report the exact path §8 Scenario C expects.
        let mut marks: HashMap<NodeIndex, Mark> = self
            .graph
            .node_indices()
            .map(|idx| (idx, Mark::Unvisited))
            .collect();
        let mut stack: Vec<NodeIndex> = Vec::new();

        let mut ids: Vec<NodeIndex> = self.graph.node_indices().collect();
        ids.sort_by_key(|idx| self.graph[*idx].id.clone());

        for idx in ids {
            if marks[&idx] == Mark::Unvisited {
                self.visit(idx, &mut marks, &mut stack)?;
            }
        }
        // Unreachable in practice: `is_cyclic_directed` already confirmed a
        // cycle exists, so the DFS above must find one.
        Ok(())
    }

    fn visit(
        &self,
        idx: NodeIndex,
        marks: &mut HashMap<NodeIndex, Mark>,
        stack: &mut Vec<NodeIndex>,
    ) -> Result<()> {
        marks.insert(idx, Mark::Visiting);
        stack.push(idx);

        for dependency in &self.graph[idx].dependencies {
            let dep_idx = self.index[dependency];
            match marks.get(&dep_idx) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == dep_idx).unwrap_or(0);
                    let mut cycle: Vec<&str> =
                        stack[start..].iter().map(|i| self.graph[*i].id.as_str()).collect();
                    cycle.push(self.graph[dep_idx].id.as_str());
                    return Err(ReginaldError::CycleDetected(cycle.join(" -> ")));
                }
                Some(Mark::Visited) => continue,
                _ => self.visit(dep_idx, marks, stack)?,
            }
        }

        stack.pop();
        marks.insert(idx, Mark::Visited);
        Ok(())
    }

    /// Kahn's algorithm with a layered twist: each round is one "stage" of
    /// nodes that may run in parallel. Indegree and dependents are read
    /// straight off the petgraph adjacency, the way the teacher's
    /// `get_ready_tasks` walks `neighbors_directed`.
    pub fn stages(&self) -> Vec<Vec<Node>> {
        let mut indegree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let count = self.graph.neighbors_directed(idx, Direction::Incoming).count();
                (idx, count)
            })
            .collect();

        let mut queue: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| indegree[idx] == 0)
            .collect();
        queue.sort_by_key(|idx| self.graph[*idx].id.clone());

        let mut stages = Vec::new();
        let mut total_emitted = 0usize;

        while !queue.is_empty() {
            let stage: Vec<NodeIndex> = std::mem::take(&mut queue);
            total_emitted += stage.len();

            let mut next_queue: Vec<NodeIndex> = Vec::new();
            for &idx in &stage {
                for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                    let entry = indegree.get_mut(&dependent).expect("known node");
                    *entry -= 1;
                    if *entry == 0 {
                        next_queue.push(dependent);
                    }
                }
            }
            next_queue.sort_by_key(|idx| self.graph[*idx].id.clone());
            next_queue.dedup();

            stages.push(stage.into_iter().map(|idx| self.to_node(idx)).collect());
            queue = next_queue;
        }

        debug_assert_eq!(
            total_emitted,
            self.graph.node_count(),
            "cycle survived construction-time detection"
        );

        stages
    }

    fn to_node(&self, idx: NodeIndex) -> Node {
        let data = &self.graph[idx];
        let dependents = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].id.clone())
            .collect();
        Node {
            id: data.id.clone(),
            task_type: data.task_type.clone(),
            dependencies: data.dependencies.clone(),
            dependents,
        }
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.index.get(id).map(|idx| self.to_node(*idx))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, requires: &[&str]) -> TaskConfig {
        TaskConfig {
            id: id.to_string(),
            task_type: "core/run".to_string(),
            options: Default::default(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            platforms: vec![],
        }
    }

    #[test]
    fn stages_respect_dependency_order() {
        let configs = vec![
            config("a", &[]),
            config("b", &[]),
            config("c", &["a", "b"]),
            config("d", &["c"]),
        ];
        let graph = TaskGraph::build(&configs).unwrap();
        let stages = graph.stages();

        let stage_ids: Vec<Vec<String>> = stages
            .iter()
            .map(|s| {
                let mut ids: Vec<String> = s.iter().map(|n| n.id.clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        assert_eq!(
            stage_ids,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn cycle_is_reported_with_full_path() {
        let configs = vec![
            config("t1", &["t2"]),
            config("t2", &["t3"]),
            config("t3", &["t1"]),
        ];
        let err = TaskGraph::build(&configs).unwrap_err();
        assert_eq!(
            err.to_string(),
            "circular task dependencies detected: t1 -> t2 -> t3 -> t1"
        );
    }

    #[test]
    fn unknown_dependency_is_fatal() {
        let configs = vec![config("a", &["ghost"])];
        let err = TaskGraph::build(&configs).unwrap_err();
        assert_eq!(err.to_string(), "unknown dependency \"ghost\"");
    }

    #[test]
    fn empty_id_is_fatal() {
        let configs = vec![config("", &[])];
        let err = TaskGraph::build(&configs).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::EmptyTaskId);
    }

    #[test]
    fn every_edge_respects_stage_ordering() {
        let configs = vec![
            config("a", &[]),
            config("b", &["a"]),
            config("c", &["b"]),
        ];
        let graph = TaskGraph::build(&configs).unwrap();
        let stages = graph.stages();
        let stage_of = |id: &str| stages.iter().position(|s| s.iter().any(|n| n.id == id)).unwrap();
        assert!(stage_of("a") < stage_of("b"));
        assert!(stage_of("b") < stage_of("c"));
    }

    #[test]
    fn node_lookup_returns_dependencies_and_dependents() {
        let configs = vec![config("a", &[]), config("b", &["a"])];
        let graph = TaskGraph::build(&configs).unwrap();
        let a = graph.node("a").unwrap();
        assert_eq!(a.dependents, vec!["b".to_string()]);
        let b = graph.node("b").unwrap();
        assert_eq!(b.dependencies, vec!["a".to_string()]);
    }
}
