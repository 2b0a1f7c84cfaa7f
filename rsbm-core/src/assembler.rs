//! Compiles connections into an evaluation plan.
//!
//! The plan fixes two things for the lifetime of a model run:
//!
//! - the order in which connections are evaluated within a step, a topological
//!   order of the same-step dependency graph in which independent connections
//!   keep their insertion order;
//! - for every reservoir, the connections whose fluxes change it and in which
//!   direction.
//!
//! A connection that declares [`Dependency::Flux`] on another connection is
//! evaluated after it. A connection that declares
//! [`Dependency::UpdatedReservoir`] is evaluated after every other connection
//! touching that reservoir. Any cycle in these constraints is rejected.

use crate::connection::{Connection, Sign};
use crate::errors::{RSBMError, RSBMResult};
use crate::process::Dependency;
use crate::reservoir::{ReservoirIndex, ReservoirRegistry};
use log::debug;
use petgraph::algo::tarjan_scc;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Why one connection must be evaluated before another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyEdge {
    Flux,
    UpdatedReservoir(String),
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyEdge::Flux => write!(f, "flux"),
            DependencyEdge::UpdatedReservoir(name) => write!(f, "updated {name}"),
        }
    }
}

/// Nodes are connection names; node `i` is connection `i`.
pub type DependencyGraph = DiGraph<String, DependencyEdge>;

/// Contribution of a connection to a reservoir
pub type Accumulation = (usize, Sign);

#[derive(Debug, Clone)]
pub struct EvaluationPlan {
    graph: DependencyGraph,
    order: Vec<usize>,
    accumulation: Vec<Vec<Accumulation>>,
    names: HashMap<String, usize>,
}

impl EvaluationPlan {
    pub fn compile(connections: &[Connection], reservoirs: &ReservoirRegistry) -> RSBMResult<Self> {
        let mut names = HashMap::with_capacity(connections.len());
        let mut graph = DependencyGraph::with_capacity(connections.len(), 0);
        for (idx, connection) in connections.iter().enumerate() {
            if names.insert(connection.name().to_string(), idx).is_some() {
                return Err(RSBMError::duplicate("connection", connection.name()));
            }
            graph.add_node(connection.name().to_string());
        }

        for idx in 0..connections.len() {
            for (source, edge) in dependency_edges(connections, reservoirs, &names, idx)? {
                graph.add_edge(NodeIndex::new(source), NodeIndex::new(idx), edge);
            }
        }

        let order = topological_order(&graph, &(0..connections.len()).collect())?;

        let mut accumulation = vec![vec![]; reservoirs.len()];
        for (idx, connection) in connections.iter().enumerate() {
            if let Some(source) = connection.source_index() {
                accumulation[source].push((idx, Sign::Out));
            }
            if let Some(sink) = connection.sink_index() {
                accumulation[sink].push((idx, Sign::In));
            }
        }

        let plan = Self {
            graph,
            order,
            accumulation,
            names,
        };
        debug!("Compiled evaluation order: {:?}", plan.ordered_names());
        Ok(plan)
    }

    /// Re-derives the dependencies of connection `idx` after its bindings changed.
    ///
    /// Only the connection and everything downstream of it is re-sorted; the
    /// relative order of the remaining connections is kept. On error the plan
    /// is left untouched.
    pub fn recompile_connection(
        &mut self,
        connections: &[Connection],
        reservoirs: &ReservoirRegistry,
        idx: usize,
    ) -> RSBMResult<()> {
        let edges = dependency_edges(connections, reservoirs, &self.names, idx)?;
        let node = NodeIndex::new(idx);

        // Every incoming edge of a node stems from that node's own dependencies
        let mut graph = self.graph.clone();
        let mut incoming: Vec<_> = graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        incoming.sort();
        // Removal swaps the last edge into the hole, so go from the back
        for edge in incoming.into_iter().rev() {
            graph.remove_edge(edge);
        }
        for (source, edge) in edges {
            graph.add_edge(NodeIndex::new(source), node, edge);
        }

        let mut affected = BTreeSet::new();
        let mut bfs = Bfs::new(&graph, node);
        while let Some(nx) = bfs.next(&graph) {
            affected.insert(nx.index());
        }
        let resorted = topological_order(&graph, &affected)?;

        let mut order: Vec<usize> = self
            .order
            .iter()
            .filter(|c| !affected.contains(c))
            .copied()
            .collect();
        order.extend(resorted);

        self.graph = graph;
        self.order = order;
        debug!(
            "Recompiled '{}', evaluation order: {:?}",
            connections[idx].name(),
            self.ordered_names()
        );
        Ok(())
    }

    /// Connection indices in evaluation order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn ordered_names(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|idx| self.graph[NodeIndex::new(*idx)].as_str())
            .collect()
    }

    /// Connections that change reservoir `idx`, with their direction
    pub fn accumulation(&self, idx: ReservoirIndex) -> &[Accumulation] {
        &self.accumulation[idx]
    }

    pub fn connection_index(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Create a diagram of the dependency graph.
    ///
    /// Useful for debugging.
    pub fn as_dot(&self) -> Dot<'_, &DependencyGraph> {
        Dot::with_attr_getters(
            &self.graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, er| format!("label = \"{}\"", er.weight()),
            &|_, (_, name)| format!("label = \"{}\"", name.replace('"', "\\\"")),
        )
    }
}

/// Sources of the edges into connection `idx`.
fn dependency_edges(
    connections: &[Connection],
    reservoirs: &ReservoirRegistry,
    names: &HashMap<String, usize>,
    idx: usize,
) -> RSBMResult<Vec<(usize, DependencyEdge)>> {
    let mut edges = vec![];
    for dependency in connections[idx].dependencies() {
        match dependency {
            Dependency::Flux(name) => {
                let source = names
                    .get(&name)
                    .copied()
                    .ok_or_else(|| RSBMError::unknown("connection", &name))?;
                edges.push((source, DependencyEdge::Flux));
            }
            Dependency::UpdatedReservoir(name) => {
                let reservoir = reservoirs.index_of(&name)?;
                edges.extend(
                    connections
                        .iter()
                        .enumerate()
                        .filter(|(other, c)| *other != idx && c.touches(reservoir))
                        .map(|(other, _)| (other, DependencyEdge::UpdatedReservoir(name.clone()))),
                );
            }
        }
    }
    Ok(edges)
}

/// Kahn's algorithm over the nodes in `subset`, ignoring edges from outside it.
///
/// Ready nodes are taken lowest index first so that independent connections
/// keep their insertion order.
fn topological_order(graph: &DependencyGraph, subset: &BTreeSet<usize>) -> RSBMResult<Vec<usize>> {
    let mut in_degree: BTreeMap<usize, usize> = subset
        .iter()
        .map(|idx| {
            let degree = graph
                .edges_directed(NodeIndex::new(*idx), Direction::Incoming)
                .filter(|e| subset.contains(&e.source().index()))
                .count();
            (*idx, degree)
        })
        .collect();
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| *idx)
        .collect();

    let mut order = Vec::with_capacity(subset.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for edge in graph.edges_directed(NodeIndex::new(idx), Direction::Outgoing) {
            let target = edge.target().index();
            if let Some(degree) = in_degree.get_mut(&target) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(target);
                }
            }
        }
    }

    if order.len() < subset.len() {
        return Err(RSBMError::CyclicDependency {
            connections: cycle_members(graph, subset),
        });
    }
    Ok(order)
}

/// Names of the connections taking part in a cycle, in insertion order.
fn cycle_members(graph: &DependencyGraph, subset: &BTreeSet<usize>) -> Vec<String> {
    let mut members: Vec<usize> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|nx| nx.index())
        .filter(|idx| subset.contains(idx))
        .collect();
    members.sort_unstable();
    members
        .into_iter()
        .map(|idx| graph[NodeIndex::new(idx)].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, Endpoint};
    use crate::process::{Process, ProcessParameters};
    use crate::reservoir::Reservoir;
    use crate::species::SpeciesRegistry;

    fn reservoirs(names: &[&str]) -> ReservoirRegistry {
        let carbon = SpeciesRegistry::new()
            .define_species("C", 12.011, None)
            .unwrap();
        let mut registry = ReservoirRegistry::new();
        for name in names {
            registry
                .insert(Reservoir::new(name, carbon.clone(), 1.0, 1.0, None, false, 2).unwrap())
                .unwrap();
        }
        registry
    }

    fn connect(
        reservoirs: &ReservoirRegistry,
        name: &str,
        source: &str,
        sink: &str,
        process: Process,
    ) -> Connection {
        let config = ConnectionConfig::new(Endpoint::reservoir(source), Endpoint::reservoir(sink))
            .with_name(name)
            .with_binding(process);
        Connection::resolve(config, reservoirs).unwrap()
    }

    fn reads_flux(flux: &str) -> Process {
        Process::ScaleWithFlux {
            scale: 1.0,
            flux: flux.to_string(),
        }
    }

    #[test]
    fn independent_connections_keep_insertion_order() {
        let r = reservoirs(&["a", "b", "c"]);
        let connections = vec![
            connect(&r, "x", "a", "b", Process::constant(1.0)),
            connect(&r, "y", "b", "c", Process::constant(1.0)),
            connect(&r, "z", "c", "a", Process::constant(1.0)),
        ];
        let plan = EvaluationPlan::compile(&connections, &r).unwrap();
        assert_eq!(plan.order(), &[0, 1, 2]);
        assert_eq!(plan.accumulation(1), &[(0, Sign::In), (1, Sign::Out)]);
    }

    #[test]
    fn flux_dependency_orders_evaluation() {
        let r = reservoirs(&["a", "b"]);
        let connections = vec![
            connect(&r, "first", "a", "b", reads_flux("second")),
            connect(&r, "second", "b", "a", Process::constant(1.0)),
        ];
        let plan = EvaluationPlan::compile(&connections, &r).unwrap();
        assert_eq!(plan.ordered_names(), vec!["second", "first"]);
    }

    #[test]
    fn updated_reservoir_waits_for_all_touching_connections() {
        let r = reservoirs(&["a", "b", "c"]);
        let reads_b = Process::custom("f", ProcessParameters::new())
            .depending_on(Dependency::UpdatedReservoir("b".to_string()));
        let connections = vec![
            connect(&r, "reader", "b", "c", reads_b),
            connect(&r, "unrelated", "c", "a", Process::constant(1.0)),
            connect(&r, "into_b", "a", "b", Process::constant(1.0)),
        ];
        let plan = EvaluationPlan::compile(&connections, &r).unwrap();
        assert_eq!(plan.ordered_names(), vec!["unrelated", "into_b", "reader"]);
    }

    #[test]
    fn cycles_are_rejected() {
        let r = reservoirs(&["a", "b", "c"]);
        let connections = vec![
            connect(&r, "free", "c", "a", Process::constant(1.0)),
            connect(&r, "x", "a", "b", reads_flux("y")),
            connect(&r, "y", "b", "a", reads_flux("x")),
        ];
        let err = EvaluationPlan::compile(&connections, &r).unwrap_err();
        assert_eq!(
            err,
            RSBMError::CyclicDependency {
                connections: vec!["x".to_string(), "y".to_string()]
            }
        );
    }

    #[test]
    fn reading_own_flux_is_a_cycle() {
        let r = reservoirs(&["a", "b"]);
        let connections = vec![connect(&r, "x", "a", "b", reads_flux("x"))];
        assert!(matches!(
            EvaluationPlan::compile(&connections, &r),
            Err(RSBMError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn unknown_dependency() {
        let r = reservoirs(&["a", "b"]);
        let connections = vec![connect(&r, "x", "a", "b", reads_flux("nope"))];
        assert!(matches!(
            EvaluationPlan::compile(&connections, &r),
            Err(RSBMError::UnknownName { .. })
        ));
    }

    #[test]
    fn recompile_resorts_downstream_only() {
        let r = reservoirs(&["a", "b", "c"]);
        let mut connections = vec![
            connect(&r, "p", "a", "b", Process::constant(1.0)),
            connect(&r, "q", "b", "c", Process::constant(1.0)),
            connect(&r, "s", "c", "a", reads_flux("p")),
        ];
        let mut plan = EvaluationPlan::compile(&connections, &r).unwrap();
        assert_eq!(plan.ordered_names(), vec!["p", "q", "s"]);

        // p now reads q, so q must come first
        connections[0].replace_bindings(vec![reads_flux("q").into()]);
        plan.recompile_connection(&connections, &r, 0).unwrap();
        assert_eq!(plan.ordered_names(), vec!["q", "p", "s"]);
    }

    #[test]
    fn failed_recompile_leaves_plan_unchanged() {
        let r = reservoirs(&["a", "b"]);
        let mut connections = vec![
            connect(&r, "x", "a", "b", Process::constant(1.0)),
            connect(&r, "y", "b", "a", reads_flux("x")),
        ];
        let mut plan = EvaluationPlan::compile(&connections, &r).unwrap();
        let before = plan.ordered_names().join(",");
        let edges_before = plan.graph().edge_count();

        connections[0].replace_bindings(vec![reads_flux("y").into()]);
        let err = plan.recompile_connection(&connections, &r, 0).unwrap_err();
        assert!(matches!(err, RSBMError::CyclicDependency { .. }));
        assert_eq!(plan.ordered_names().join(","), before);
        assert_eq!(plan.graph().edge_count(), edges_before);
    }

    #[test]
    fn dot() {
        let r = reservoirs(&["a", "b"]);
        let connections = vec![
            connect(&r, "x", "a", "b", Process::constant(1.0)),
            connect(&r, "y", "b", "a", reads_flux("x")),
        ];
        let plan = EvaluationPlan::compile(&connections, &r).unwrap();
        let exp = r#"digraph {
    0 [ label = "x"]
    1 [ label = "y"]
    0 -> 1 [ label = "flux"]
}
"#;
        assert_eq!(format!("{:?}", plan.as_dot()), exp);
    }
}
