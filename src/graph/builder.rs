//! Graph construction from a built environment.

use super::{GraphEdge, GraphNode, ReferenceGraph};
use crate::environment::Environment;

impl ReferenceGraph {
    /// Build the reference graph for a catalog.
    ///
    /// Construction happens in two phases:
    /// - Phase 1: datasource nodes and their column concepts, linked both ways
    /// - Phase 2: lineage edges from each derived concept to its sources
    pub fn from_environment(environment: &Environment) -> Self {
        let mut graph = ReferenceGraph::new();

        for datasource in environment.datasources() {
            let ds_index = graph.add_node(GraphNode::Datasource(datasource.identifier.clone()));
            for column in &datasource.columns {
                let concept_index = graph.add_node(GraphNode::Concept(column.concept.address()));
                graph.add_edge(ds_index, concept_index, GraphEdge::Provides);
                graph.add_edge(concept_index, ds_index, GraphEdge::BoundTo);
            }
        }

        for concept in environment.concepts() {
            let concept_index = graph.add_node(GraphNode::Concept(concept.address()));
            for source in concept.concept_arguments() {
                let source_index = graph.add_node(GraphNode::Concept(source.address()));
                graph.add_edge(concept_index, source_index, GraphEdge::DerivesFrom);
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Built reference graph"
        );
        graph
    }
}
