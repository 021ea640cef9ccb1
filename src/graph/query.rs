//! Reachability queries over the reference graph.

use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet, VecDeque};

use super::{concept_node, datasource_node, GraphResult, ReferenceGraph};

impl ReferenceGraph {
    /// Node names reachable in one hop, sorted by name.
    pub fn neighbors(&self, name: &str) -> GraphResult<Vec<String>> {
        let index = self.index_of(name)?;
        Ok(self
            .sorted_neighbors(index)
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    fn sorted_neighbors(&self, index: NodeIndex) -> Vec<(String, NodeIndex)> {
        let mut neighbors: Vec<(String, NodeIndex)> = self
            .graph
            .neighbors(index)
            .filter_map(|neighbor| {
                self.graph
                    .node_weight(neighbor)
                    .map(|node| (node.name(), neighbor))
            })
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Find the shortest path between two named nodes.
    ///
    /// Uses BFS, visiting neighbors in name order so equal-length paths are
    /// chosen deterministically. Returns `Ok(None)` when `to` is unreachable.
    pub fn shortest_path(&self, from: &str, to: &str) -> GraphResult<Option<Vec<String>>> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;

        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();

        queue.push_back(from_idx);
        visited.insert(from_idx);

        while let Some(current) = queue.pop_front() {
            if current == to_idx {
                return Ok(Some(self.reconstruct_path(from_idx, to_idx, &parent)));
            }
            for (_, neighbor) in self.sorted_neighbors(current) {
                if visited.insert(neighbor) {
                    parent.insert(neighbor, current);
                    queue.push_back(neighbor);
                }
            }
        }
        Ok(None)
    }

    /// Shortest path from a datasource to a concept.
    pub fn datasource_path(&self, identifier: &str, address: &str) -> GraphResult<Option<Vec<String>>> {
        self.shortest_path(&datasource_node(identifier), &concept_node(address))
    }

    /// Walk the BFS parent map back from `to`.
    fn reconstruct_path(
        &self,
        from_idx: NodeIndex,
        to_idx: NodeIndex,
        parent: &HashMap<NodeIndex, NodeIndex>,
    ) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = to_idx;
        loop {
            if let Some(node) = self.graph.node_weight(current) {
                path.push(node.name());
            }
            if current == from_idx {
                break;
            }
            match parent.get(&current) {
                Some(previous) => current = *previous,
                None => break,
            }
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::EnvironmentBuilder;
    use crate::graph::{GraphError, ReferenceGraph};
    use crate::model::{ColumnAssignment, Concept, DataType, Datasource};

    fn graph() -> ReferenceGraph {
        let k1 = Concept::key("k1", DataType::Integer);
        let x = Concept::property("x", DataType::String, vec![k1.clone()]);
        let y = Concept::property("y", DataType::String, vec![k1.clone()]);
        let mut builder = EnvironmentBuilder::new();
        builder
            .add_datasource(Datasource::table(
                "ds_a",
                vec![
                    ColumnAssignment::new("k1", k1.clone()),
                    ColumnAssignment::new("x", x),
                ],
            ))
            .unwrap();
        builder
            .add_datasource(Datasource::table(
                "ds_b",
                vec![ColumnAssignment::new("k1", k1), ColumnAssignment::new("y", y)],
            ))
            .unwrap();
        ReferenceGraph::from_environment(&builder.build().unwrap())
    }

    #[test]
    fn test_direct_path() {
        let graph = graph();
        let path = graph.datasource_path("ds_a", "local.x").unwrap().unwrap();
        assert_eq!(path, vec!["ds~ds_a", "c~local.x"]);
    }

    #[test]
    fn test_path_through_join_key() {
        let graph = graph();
        let path = graph.datasource_path("ds_a", "local.y").unwrap().unwrap();
        assert_eq!(path, vec!["ds~ds_a", "c~local.k1", "ds~ds_b", "c~local.y"]);
    }

    #[test]
    fn test_missing_node_is_error() {
        let graph = graph();
        let err = graph.datasource_path("ds_z", "local.x").unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound(name) if name == "ds~ds_z"));
    }

    #[test]
    fn test_edges_are_not_duplicated() {
        let graph = graph();
        // 2 datasources, 3 concepts; k1 bound twice
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 8);
        assert_eq!(
            graph.neighbors("c~local.k1").unwrap(),
            vec!["ds~ds_a", "ds~ds_b"]
        );
    }
}
