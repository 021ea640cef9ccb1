use grainline::config::{EnvironmentSettings, PlannerSettings};
use grainline::environment::EnvironmentBuilder;
use grainline::graph::{concept_node, datasource_node, ReferenceGraph};
use grainline::model::{ColumnAssignment, Concept, DataType, Datasource, Derivation, Grain};
use grainline::planner::{search_concepts, NodeKind};
use grainline::PlanError;

fn order_id() -> Concept {
    Concept::key("order_id", DataType::Integer)
}

fn customer_id() -> Concept {
    Concept::key("customer_id", DataType::Integer)
}

fn order_date() -> Concept {
    Concept::property("order_date", DataType::Date, vec![order_id()])
}

/// Helper to create an orders/customers catalog.
fn builder() -> EnvironmentBuilder {
    let mut builder = EnvironmentBuilder::new();
    builder
        .add_datasource(
            Datasource::table(
                "orders",
                vec![
                    ColumnAssignment::new("id", order_id()),
                    ColumnAssignment::new("customer_id", customer_id()),
                    ColumnAssignment::new("ordered_on", order_date()),
                ],
            )
            .with_grain(Grain::new(vec![order_id()])),
        )
        .unwrap();
    builder
}

#[test]
fn test_date_parts_are_derived_and_plannable() {
    let env = builder().build().unwrap();
    let month = env.concept("order_date.month").unwrap().clone();
    assert_eq!(month.derivation(), Derivation::Basic);
    assert!(!env.is_materialized(&month.address()));

    let graph = ReferenceGraph::from_environment(&env);
    let node = search_concepts(&[month.clone()], &env, &graph, &PlannerSettings::default()).unwrap();
    assert!(matches!(node.kind, NodeKind::Merge { .. }));
    assert!(node.provides(&month.address()));
    assert_eq!(node.parents.len(), 1);
    assert!(matches!(
        node.parents[0].kind,
        NodeKind::Select { datasource: Some(_) }
    ));
}

#[test]
fn test_date_parts_can_be_disabled() {
    let settings = EnvironmentSettings {
        auto_derive_date_parts: false,
    };
    let env = builder().with_settings(&settings).build().unwrap();
    assert!(!env.contains("order_date.month"));
    let err = env.concept("order_date.month").unwrap_err();
    assert!(matches!(err, PlanError::UndefinedConcept { .. }));
}

#[test]
fn test_graph_links_datasource_columns() {
    let env = builder().build().unwrap();
    let graph = ReferenceGraph::from_environment(&env);
    assert!(graph.contains_node(&datasource_node("orders")));
    assert!(graph.contains_node(&concept_node("local.customer_id")));

    let path = graph
        .datasource_path("orders", "local.customer_id")
        .unwrap()
        .unwrap();
    assert_eq!(
        path,
        vec![datasource_node("orders"), concept_node("local.customer_id")]
    );
}

#[test]
fn test_datasources_keep_declaration_order() {
    let mut builder = builder();
    builder
        .add_datasource(Datasource::table(
            "customers",
            vec![ColumnAssignment::new("id", customer_id())],
        ))
        .unwrap();
    let env = builder.build().unwrap();
    let names: Vec<&str> = env
        .datasources()
        .iter()
        .map(|d| d.identifier.as_str())
        .collect();
    assert_eq!(names, vec!["orders", "customers"]);
    assert!(env.datasource("customers").is_some());
}
