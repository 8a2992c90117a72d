use crate::{EntityId, Slot, Topology};
use anyhow::{anyhow, Result};
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// Bus/branch view of a single network: buses are nodes, lines, switches and
/// transformers are edges.
#[derive(Debug)]
pub struct ConnectivityGraph {
    pub graph: UnGraph<EntityId, EntityId>,
    index: HashMap<EntityId, NodeIndex>,
}

impl ConnectivityGraph {
    pub fn node(&self, bus: EntityId) -> Option<NodeIndex> {
        self.index.get(&bus).copied()
    }
}

/// Summary statistics (density, degree, connected components) of one network.
#[derive(Debug)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub connected_components: usize,
    pub min_degree: usize,
    pub avg_degree: f64,
    pub max_degree: usize,
    pub density: f64,
}

#[derive(Debug)]
pub struct IslandSummary {
    pub island_id: usize,
    pub node_count: usize,
}

/// Component assignment of a single bus.
#[derive(Debug)]
pub struct NodeAssignment {
    pub bus: EntityId,
    pub label: String,
    pub island_id: usize,
}

#[derive(Debug)]
pub struct IslandAnalysis {
    pub islands: Vec<IslandSummary>,
    pub assignments: Vec<NodeAssignment>,
}

fn branch_slots() -> [Slot; 4] {
    [
        Slot::Lines,
        Slot::Switches,
        Slot::TwoWindingsTransformers,
        Slot::ThreeWindingsTransformers,
    ]
}

/// Build the graph of `network`. Fails if any branch touches a bus of another network.
pub fn connectivity_graph(topology: &Topology, network: EntityId) -> Result<ConnectivityGraph> {
    let mut graph = UnGraph::new_undirected();
    let mut index = HashMap::new();
    for bus in topology.buses(network) {
        index.insert(bus, graph.add_node(bus));
    }
    for slot in branch_slots() {
        for branch in topology.collect(network, slot) {
            let terminals = topology.get(branch).kind().terminals();
            let mut nodes = Vec::with_capacity(terminals.len());
            for bus in terminals {
                let node = index.get(&bus).copied().ok_or_else(|| {
                    anyhow!(
                        "{} '{}' reaches bus '{}' outside network '{}'",
                        topology.get(branch).kind().label(),
                        topology.get(branch).id(),
                        topology.get(bus).id(),
                        topology.get(network).id()
                    )
                })?;
                nodes.push(node);
            }
            // three-winding transformers join every pair of their windings
            for (i, a) in nodes.iter().enumerate() {
                for b in &nodes[i + 1..] {
                    graph.add_edge(*a, *b, branch);
                }
            }
        }
    }
    Ok(ConnectivityGraph { graph, index })
}

/// Branches anywhere in the topology whose terminals live in different networks.
pub fn cross_network_branches(topology: &Topology) -> Vec<EntityId> {
    topology
        .iter()
        .filter(|(id, entity)| {
            let home = topology.network_of(*id);
            entity
                .kind()
                .terminals()
                .into_iter()
                .any(|bus| topology.network_of(bus) != home)
        })
        .map(|(id, _)| id)
        .collect()
}

pub fn graph_stats(topology: &Topology, network: EntityId) -> Result<GraphStats> {
    let conn = connectivity_graph(topology, network)?;
    let graph = &conn.graph;
    let node_count = graph.node_count();
    let edge_count = graph.edge_count();
    let degrees: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.neighbors(node).count())
        .collect();
    let min_degree = *degrees.iter().min().unwrap_or(&0);
    let max_degree = *degrees.iter().max().unwrap_or(&0);
    let avg_degree = if node_count == 0 {
        0.0
    } else {
        degrees.iter().copied().sum::<usize>() as f64 / node_count as f64
    };
    let density = if node_count < 2 {
        0.0
    } else {
        2.0 * edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
    };
    Ok(GraphStats {
        node_count,
        edge_count,
        connected_components: connected_components(graph),
        min_degree,
        avg_degree,
        max_degree,
        density,
    })
}

/// Label connected components of a network with a breadth-first search.
pub fn find_islands(topology: &Topology, network: EntityId) -> Result<IslandAnalysis> {
    let conn = connectivity_graph(topology, network)?;
    let graph = &conn.graph;
    let mut visited = HashSet::new();
    let mut islands = Vec::new();
    let mut assignments = Vec::new();
    let mut island_id = 0;
    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(node);
            for neighbor in graph.neighbors(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        islands.push(IslandSummary {
            island_id,
            node_count: members.len(),
        });
        for node in members {
            let bus = graph[node];
            assignments.push(NodeAssignment {
                bus,
                label: topology.get(bus).id().to_string(),
                island_id,
            });
        }
        island_id += 1;
    }
    assignments.sort_by_key(|assignment| assignment.bus);
    Ok(IslandAnalysis {
        islands,
        assignments,
    })
}

/// Render a network as Graphviz DOT.
pub fn export_dot(topology: &Topology, network: EntityId) -> Result<String> {
    let conn = connectivity_graph(topology, network)?;
    let mut buffer = String::new();
    buffer.push_str(&format!(
        "graph \"{}\" {{\n",
        escape_label(topology.get(network).id())
    ));
    for node in conn.graph.node_indices() {
        let bus = topology.get(conn.graph[node]);
        buffer.push_str(&format!(
            "  n{} [label=\"{}\"];\n",
            node.index(),
            escape_label(bus.name())
        ));
    }
    for edge in conn.graph.edge_references() {
        buffer.push_str(&format!(
            "  n{} -- n{} [label=\"{}\"];\n",
            edge.source().index(),
            edge.target().index(),
            escape_label(topology.get(*edge.weight()).id())
        ));
    }
    buffer.push('}');
    Ok(buffer)
}

fn escape_label(label: &str) -> String {
    label.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementInfo, LineParams, NetworkType};

    fn two_islands() -> Topology {
        let mut topo = Topology::new("MV1", "MV", "sys");
        let root = topo.root();
        let ss = topo.add_substation(root, ElementInfo::new("SS1", "SS1")).unwrap();
        let vl = topo
            .add_voltage_level(root, ElementInfo::new("VL20", "VL20"), 20.0, NetworkType::Mv)
            .unwrap();
        let b: Vec<EntityId> = ["B1", "B2", "B3"]
            .iter()
            .map(|id| topo.add_bus(ss, ElementInfo::new(*id, *id), vl).unwrap())
            .collect();
        topo.add_line(ss, ElementInfo::new("L1", "L1"), b[0], b[1], LineParams::default())
            .unwrap();
        topo
    }

    #[test]
    fn test_stats_and_islands() {
        let topo = two_islands();
        let stats = graph_stats(&topo, topo.root()).unwrap();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.connected_components, 2);

        let islands = find_islands(&topo, topo.root()).unwrap();
        assert_eq!(islands.islands.len(), 2);
        assert_eq!(islands.islands[0].node_count, 2);
        assert_eq!(islands.assignments[2].label, "B3");
    }

    #[test]
    fn test_dot_export() {
        let topo = two_islands();
        let dot = export_dot(&topo, topo.root()).unwrap();
        assert!(dot.starts_with("graph \"MV1\""));
        assert!(dot.contains("n0 -- n1 [label=\"L1\"]"));
    }

    #[test]
    fn test_no_cross_network_branches() {
        let topo = two_islands();
        assert!(cross_network_branches(&topo).is_empty());
    }
}
