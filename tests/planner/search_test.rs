use grainline::config::PlannerSettings;
use grainline::environment::{Environment, EnvironmentBuilder};
use grainline::error::PlanError;
use grainline::graph::ReferenceGraph;
use grainline::model::{
    AggregateWrapper, AlignClause, AlignItem, ColumnAssignment, ComparisonOperator, Concept, Condition, DataType,
    Datasource, Expr, FilterItem, Function, FunctionType, Grain, JoinType, Lineage, Modifier,
    MultiSelect, OrderItem, Purpose, QueryDatasource, Select, Source, SourceType, WhereClause,
    WindowItem, WindowType,
};
use grainline::planner::{search_concepts, ConceptPlanner, NodeKind};

fn key(name: &str) -> Concept {
    Concept::key(name, DataType::Integer)
}

fn settings() -> PlannerSettings {
    PlannerSettings::default()
}

fn build(concepts: Vec<Concept>, datasources: Vec<Datasource>) -> Environment {
    let mut builder = EnvironmentBuilder::new();
    for concept in concepts {
        builder.add_concept(concept, false).unwrap();
    }
    for datasource in datasources {
        builder.add_datasource(datasource).unwrap();
    }
    builder.build().unwrap()
}

fn table(identifier: &str, concepts: &[Concept]) -> Datasource {
    Datasource::table(
        identifier,
        concepts
            .iter()
            .map(|c| ColumnAssignment::new(c.name.clone(), c.clone()))
            .collect(),
    )
}

fn addresses(concepts: &[Concept]) -> Vec<String> {
    concepts.iter().map(|c| c.address()).collect()
}

// ============================================================================
// Revenue catalog
// ============================================================================

fn amount() -> Concept {
    Concept::property("amount", DataType::Float, vec![key("product_id")])
}

fn total_revenue() -> Concept {
    let sum = Function::new(FunctionType::Sum, vec![Expr::from(amount())]).unwrap();
    Concept::derived("total_revenue", Purpose::Metric, Lineage::Function(sum))
}

/// products(product_id, category_id) at product grain, revenue(product_id, amount).
fn revenue_environment(extra: Vec<Concept>) -> Environment {
    let mut concepts = vec![key("product_id"), key("category_id"), amount(), total_revenue()];
    concepts.extend(extra);
    build(
        concepts,
        vec![
            table("products", &[key("product_id"), key("category_id")])
                .with_grain(Grain::new(vec![key("product_id")])),
            table("revenue", &[key("product_id"), amount()]),
        ],
    )
}

#[test]
fn test_aggregate_alone_groups_a_direct_select() {
    let env = revenue_environment(vec![]);
    let graph = ReferenceGraph::from_environment(&env);
    let concept = env.concept("total_revenue").unwrap().clone();

    let node = search_concepts(&[concept], &env, &graph, &settings()).unwrap();
    assert_eq!(node.kind, NodeKind::Group);
    assert_eq!(node.parents.len(), 1);
    match &node.parents[0].kind {
        NodeKind::Select {
            datasource: Some(datasource),
        } => assert_eq!(datasource.identifier, "revenue"),
        other => panic!("expected a direct select, got {other:?}"),
    }

    let resolved = node.resolve().unwrap();
    assert!(resolved.grain.is_abstract());
    assert_eq!(resolved.source_type, SourceType::Group);
    assert!(resolved.group_required());
}

#[test]
fn test_aggregate_by_category_joins_products() {
    let env = revenue_environment(vec![]);
    let graph = ReferenceGraph::from_environment(&env);
    let request = vec![
        env.concept("category_id").unwrap().clone(),
        env.concept("total_revenue").unwrap().clone(),
    ];

    let node = search_concepts(&request, &env, &graph, &settings()).unwrap();
    assert_eq!(node.kind, NodeKind::Group);
    let resolved = node.resolve().unwrap();
    assert_eq!(resolved.grain, Grain::new(vec![key("category_id")]));
    assert!(resolved
        .output_concepts
        .iter()
        .any(|c| c.address() == "local.total_revenue"));

    let merge = &node.parents[0];
    assert!(matches!(merge.kind, NodeKind::Merge { .. }));
    let merged = merge.resolve().unwrap();
    assert_eq!(merged.datasources.len(), 2);
    assert_eq!(merged.joins.len(), 1);
    assert_eq!(merged.joins[0].join_type, JoinType::LeftOuter);
    assert_eq!(addresses(&merged.joins[0].concepts), vec!["local.product_id"]);
}

#[test]
fn test_window_over_direct_select() {
    let rank = WindowItem::new(WindowType::Rank, key("product_id"))
        .with_order_by(vec![OrderItem::desc(amount())]);
    let product_rank = Concept::derived("product_rank", Purpose::Auto, Lineage::Window(rank));
    let env = revenue_environment(vec![product_rank]);
    let graph = ReferenceGraph::from_environment(&env);
    let concept = env.concept("product_rank").unwrap().clone();

    let node = search_concepts(&[concept], &env, &graph, &settings()).unwrap();
    assert_eq!(node.kind, NodeKind::Window);
    let resolved = node.resolve().unwrap();
    assert_eq!(resolved.source_type, SourceType::Window);
    assert_eq!(resolved.grain, Grain::new(vec![key("product_id")]));
    assert!(resolved
        .output_concepts
        .iter()
        .any(|c| c.address() == "local.product_rank"));
}

fn source_types(query: &QueryDatasource, found: &mut Vec<SourceType>) {
    found.push(query.source_type);
    for source in &query.datasources {
        if let Source::Query(parent) = source {
            source_types(parent, found);
        }
    }
}

#[test]
fn test_window_and_aggregate_at_same_grain_stay_separate() {
    let rank = WindowItem::new(WindowType::Rank, key("product_id"))
        .with_order_by(vec![OrderItem::desc(amount())]);
    let product_rank = Concept::derived("product_rank", Purpose::Auto, Lineage::Window(rank));
    let sum = Function::new(FunctionType::Sum, vec![Expr::from(amount())]).unwrap();
    let rev_by_product = Concept::derived(
        "rev_by_product",
        Purpose::Metric,
        Lineage::Aggregate(AggregateWrapper::new(sum, vec![key("product_id")])),
    );
    let env = revenue_environment(vec![product_rank, rev_by_product]);
    let graph = ReferenceGraph::from_environment(&env);
    let request = vec![
        env.concept("product_rank").unwrap().clone(),
        env.concept("rev_by_product").unwrap().clone(),
    ];

    let node = search_concepts(&request, &env, &graph, &settings()).unwrap();
    let resolved = node.resolve().unwrap();
    for concept in &request {
        assert!(resolved
            .non_partial_concept_addresses()
            .contains(&concept.address()));
    }

    let mut found = Vec::new();
    source_types(&resolved, &mut found);
    assert!(found.contains(&SourceType::Group));
    assert!(found.contains(&SourceType::Window));
}

#[test]
fn test_unbound_concept_has_no_datasource() {
    let env = revenue_environment(vec![key("orphan")]);
    let graph = ReferenceGraph::from_environment(&env);
    let concept = env.concept("orphan").unwrap().clone();

    let err = search_concepts(&[concept], &env, &graph, &settings()).unwrap_err();
    match err {
        PlanError::NoDatasource { concepts } => assert_eq!(concepts, vec!["local.orphan"]),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_history_is_scoped_to_planner() {
    let env = revenue_environment(vec![]);
    let graph = ReferenceGraph::from_environment(&env);
    let concept = env.concept("total_revenue").unwrap().clone();

    let mut planner = ConceptPlanner::new(&env, &graph);
    planner.search_concepts(&[concept.clone()], 0).unwrap();
    assert!(!planner.history().is_empty());

    let fresh = ConceptPlanner::new(&env, &graph);
    assert!(fresh.history().is_empty());

    // a second search of the same request is served from history
    let before = planner.history().len();
    planner.search_concepts(&[concept], 0).unwrap();
    assert_eq!(planner.history().len(), before);
}

// ============================================================================
// Join path selection
// ============================================================================

#[test]
fn test_direct_table_preferred_over_join() {
    let (a, b, k) = (key("a"), key("b"), key("k"));
    let env = build(
        vec![],
        vec![
            table("ds2", &[a.clone(), k.clone()]),
            table("ds3", &[k.clone(), b.clone()]),
            table("ds1", &[a.clone(), b.clone()]),
        ],
    );
    let graph = ReferenceGraph::from_environment(&env);

    let node = search_concepts(&[a, b], &env, &graph, &settings()).unwrap();
    match &node.kind {
        NodeKind::Select {
            datasource: Some(datasource),
        } => assert_eq!(datasource.identifier, "ds1"),
        other => panic!("expected a direct select, got {other:?}"),
    }
}

#[test]
fn test_non_nested_join_paths_are_ambiguous() {
    let (x, y, k1, k2) = (key("x"), key("y"), key("k1"), key("k2"));
    let env = build(
        vec![],
        vec![
            table("ds_a", &[x.clone(), k1.clone(), k2.clone()]),
            table("ds_b", &[k1.clone(), y.clone()]),
            table("ds_c", &[k2.clone(), y.clone()]),
        ],
    );
    let graph = ReferenceGraph::from_environment(&env);

    let err = search_concepts(&[x, y], &env, &graph, &settings()).unwrap_err();
    match &err {
        PlanError::AmbiguousRelationship { candidates } => {
            assert_eq!(
                candidates,
                &vec![
                    vec!["local.k1", "local.x", "local.y"],
                    vec!["local.k2", "local.x", "local.y"],
                ]
            );
        }
        other => panic!("unexpected error {other}"),
    }
    insta::assert_snapshot!(err.to_string(), @"Ambiguous concept join resolution - possible paths = {local.k1, local.x, local.y} | {local.k2, local.x, local.y}. Include an additional concept to disambiguate");
}

// ============================================================================
// Partial coverage
// ============================================================================

/// Two tables that each hold part of the `k` population.
fn partial_environment() -> Environment {
    let k = key("k");
    let a = Concept::property("a", DataType::String, vec![k.clone()]);
    let b = Concept::property("b", DataType::String, vec![k.clone()]);
    build(
        vec![],
        vec![
            Datasource::table(
                "ds_a",
                vec![
                    ColumnAssignment::new("k", k.clone()).with_modifier(Modifier::Partial),
                    ColumnAssignment::new("a", a),
                ],
            ),
            Datasource::table(
                "ds_b",
                vec![
                    ColumnAssignment::new("k", k).with_modifier(Modifier::Partial),
                    ColumnAssignment::new("b", b),
                ],
            ),
        ],
    )
}

#[test]
fn test_partial_column_is_reported() {
    let env = partial_environment();
    let graph = ReferenceGraph::from_environment(&env);
    let k = env.concept("k").unwrap().clone();

    let node = search_concepts(&[k], &env, &graph, &settings()).unwrap();
    let resolved = node.resolve().unwrap();
    assert_eq!(addresses(&resolved.partial_concepts), vec!["local.k"]);
}

#[test]
fn test_complementary_partials_full_join_to_complete() {
    let env = partial_environment();
    let graph = ReferenceGraph::from_environment(&env);
    let request = vec![
        env.concept("k").unwrap().clone(),
        env.concept("a").unwrap().clone(),
        env.concept("b").unwrap().clone(),
    ];

    let node = search_concepts(&request, &env, &graph, &settings()).unwrap();
    let resolved = node.resolve().unwrap();
    assert_eq!(resolved.joins.len(), 1);
    assert_eq!(resolved.joins[0].join_type, JoinType::Full);
    assert!(resolved.partial_concepts.is_empty());
    assert!(resolved
        .non_partial_concept_addresses()
        .contains(&"local.k".to_string()));
}

#[test]
fn test_strict_optional_coverage_selects_root_alone() {
    // b is only reachable from k through a
    let env = build(
        vec![],
        vec![
            table("ds1", &[key("k"), key("a")]),
            table("ds2", &[key("a"), key("b")]),
        ],
    );
    let graph = ReferenceGraph::from_environment(&env);
    let request = vec![key("k"), key("a"), key("b")];

    let lenient = search_concepts(&request, &env, &graph, &settings()).unwrap();
    assert!(matches!(lenient.kind, NodeKind::Merge { .. }));
    assert_eq!(
        addresses(&lenient.parents[0].output_concepts),
        vec!["local.k", "local.a"]
    );

    let strict_settings = settings().with_accept_partial_optional(false);
    let strict = search_concepts(&request, &env, &graph, &strict_settings).unwrap();
    assert!(matches!(strict.kind, NodeKind::Merge { .. }));
    assert_eq!(addresses(&strict.parents[0].output_concepts), vec!["local.k"]);
    let resolved = strict.resolve().unwrap();
    for concept in &request {
        assert!(resolved.non_partial_concept_addresses().contains(&concept.address()));
    }
}

// ============================================================================
// Filters
// ============================================================================

fn filter_environment() -> Environment {
    let k = key("k");
    let y = Concept::property("y", DataType::Integer, vec![k.clone()]);
    let condition = Condition::compare(&y, ComparisonOperator::Gt, Expr::integer(0));
    let x = Concept::derived(
        "x",
        Purpose::Auto,
        Lineage::Filter(FilterItem::new(y.clone(), WhereClause::new(condition))),
    );
    build(vec![x], vec![table("ds", &[k, y])])
}

#[test]
fn test_filter_hides_predicate_column() {
    let env = filter_environment();
    let graph = ReferenceGraph::from_environment(&env);
    let x = env.concept("x").unwrap().clone();

    let node = search_concepts(&[x], &env, &graph, &settings()).unwrap();
    assert_eq!(node.kind, NodeKind::Filter);
    let resolved = node.resolve().unwrap();
    let outputs = addresses(&resolved.output_concepts);
    assert!(outputs.contains(&"local.x".to_string()));
    assert!(!outputs.contains(&"local.y".to_string()));
    assert!(resolved.condition.is_some());
    assert!(resolved.group_required());
}

#[test]
fn test_filter_with_requested_predicate_column() {
    let env = filter_environment();
    let graph = ReferenceGraph::from_environment(&env);
    let request = vec![
        env.concept("x").unwrap().clone(),
        env.concept("y").unwrap().clone(),
    ];

    let node = search_concepts(&request, &env, &graph, &settings()).unwrap();
    let resolved = node.resolve().unwrap();
    let outputs = addresses(&resolved.output_concepts);
    assert!(outputs.contains(&"local.x".to_string()));
    assert!(outputs.contains(&"local.y".to_string()));
}

// ============================================================================
// Multi-select
// ============================================================================

#[test]
fn test_multiselect_full_joins_branches_on_aligned_concept() {
    let order_id = key("order_id");
    let return_id = key("return_id");
    let order_region = Concept::property("order_region", DataType::String, vec![order_id.clone()]);
    let return_region =
        Concept::property("return_region", DataType::String, vec![return_id.clone()]);
    let env = build(
        vec![],
        vec![
            table("orders", &[order_id, order_region.clone()]),
            table("returns", &[return_id, return_region.clone()]),
        ],
    );
    let graph = ReferenceGraph::from_environment(&env);

    let multiselect = MultiSelect::new(
        vec![
            Select::new(vec![order_region.clone()]),
            Select::new(vec![return_region.clone()]),
        ],
        AlignClause {
            items: vec![AlignItem::new("region", vec![order_region, return_region])],
        },
    );
    let region = multiselect.derived_concepts().remove(0);
    assert_eq!(region.address(), "local.region");

    let node = search_concepts(&[region], &env, &graph, &settings()).unwrap();
    assert!(matches!(node.kind, NodeKind::MultiSelect { .. }));
    assert_eq!(node.parents.len(), 2);

    let resolved = node.resolve().unwrap();
    assert_eq!(resolved.source_type, SourceType::Merge);
    assert_eq!(resolved.joins.len(), 1);
    assert_eq!(resolved.joins[0].join_type, JoinType::Full);
    assert_eq!(addresses(&resolved.joins[0].concepts), vec!["local.region"]);
    assert!(resolved.grain.contains("local.region"));
}
