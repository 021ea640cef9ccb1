use std::collections::BTreeSet;

use grainline::compiler::{datasource_to_ctes, process_query};
use grainline::config::PlannerSettings;
use grainline::environment::{Environment, EnvironmentBuilder};
use grainline::graph::ReferenceGraph;
use grainline::model::{
    ColumnAssignment, ComparisonOperator, Concept, Condition, Cte, DataType, Datasource, Expr,
    Function, FunctionType, Grain, Lineage, Purpose, Select, SourceType, WhereClause,
};
use grainline::planner::search_concepts;

fn product_id() -> Concept {
    Concept::key("product_id", DataType::Integer)
}

fn category_id() -> Concept {
    Concept::key("category_id", DataType::Integer)
}

fn amount() -> Concept {
    Concept::property("amount", DataType::Float, vec![product_id()])
}

fn total_revenue() -> Concept {
    let sum = Function::new(FunctionType::Sum, vec![Expr::from(amount())]).unwrap();
    Concept::derived("total_revenue", Purpose::Metric, Lineage::Function(sum))
}

/// Helper to create the products/revenue catalog.
fn environment() -> Environment {
    let mut builder = EnvironmentBuilder::new();
    for concept in [product_id(), category_id(), amount(), total_revenue()] {
        builder.add_concept(concept, false).unwrap();
    }
    builder
        .add_datasource(
            Datasource::table(
                "products",
                vec![
                    ColumnAssignment::new("id", product_id()),
                    ColumnAssignment::new("category_id", category_id()),
                ],
            )
            .with_grain(Grain::new(vec![product_id()])),
        )
        .unwrap();
    builder
        .add_datasource(Datasource::table(
            "revenue",
            vec![
                ColumnAssignment::new("product_id", product_id()),
                ColumnAssignment::new("amount", amount()),
            ],
        ))
        .unwrap();
    builder.build().unwrap()
}

fn output_addresses(concepts: &[Concept]) -> BTreeSet<String> {
    concepts.iter().map(|c| c.address()).collect()
}

#[test]
fn test_ctes_cover_requested_concepts() {
    let env = environment();
    let graph = ReferenceGraph::from_environment(&env);
    let settings = PlannerSettings::default();
    let request = vec![
        env.concept("category_id").unwrap().clone(),
        env.concept("total_revenue").unwrap().clone(),
    ];

    let node = search_concepts(&request, &env, &graph, &settings).unwrap();
    let ctes = datasource_to_ctes(&node.resolve().unwrap(), &settings).unwrap();
    let root = ctes.last().unwrap();
    let outputs = output_addresses(&root.output_columns);
    for concept in &request {
        assert!(outputs.contains(&concept.address()));
    }

    // every parent is rendered before its child
    for (position, cte) in ctes.iter().enumerate() {
        for parent in &cte.parent_ctes {
            let parent_position = ctes.iter().position(|c| &c.name == parent).unwrap();
            assert!(parent_position < position);
        }
    }
}

#[test]
fn test_process_query_groups_revenue_by_category() {
    let env = environment();
    let graph = ReferenceGraph::from_environment(&env);
    let select = Select::new(vec![
        env.concept("category_id").unwrap().clone(),
        env.concept("total_revenue").unwrap().clone(),
    ]);

    let query = process_query(&select, &env, &graph, &PlannerSettings::default()).unwrap();
    assert_eq!(query.grain, Grain::new(vec![category_id()]));
    assert!(query.base.group_to_grain);
    assert_eq!(&query.base, query.ctes.last().unwrap());
    // revenue, products, their join, then the aggregate
    assert_eq!(query.ctes.len(), 4);
    assert_eq!(
        output_addresses(&query.output_columns),
        BTreeSet::from([
            "local.category_id".to_string(),
            "local.total_revenue".to_string()
        ])
    );
    let join_cte = &query.ctes[2];
    assert_eq!(join_cte.joins.len(), 1);
    let joined = BTreeSet::from([
        join_cte.joins[0].left_cte.clone(),
        join_cte.joins[0].right_cte.clone(),
    ]);
    let wrapped = BTreeSet::from([query.ctes[0].name.clone(), query.ctes[1].name.clone()]);
    assert_eq!(joined, wrapped);
}

#[test]
fn test_process_query_attaches_where_to_base() {
    let env = environment();
    let graph = ReferenceGraph::from_environment(&env);
    let category = env.concept("category_id").unwrap().clone();
    let condition = Condition::compare(&category, ComparisonOperator::Eq, Expr::integer(3));
    let select = Select::new(vec![category.clone()])
        .with_where(WhereClause::new(condition.clone()))
        .with_limit(10);

    let query = process_query(&select, &env, &graph, &PlannerSettings::default()).unwrap();
    assert_eq!(query.base.condition, Some(condition));
    assert_eq!(query.limit, Some(10));
    assert!(query.where_clause.is_some());
}

/// Whether `cte` or any CTE it reads from carries `condition`.
fn filtered_by(ctes: &[Cte], cte: &Cte, condition: &Condition) -> bool {
    cte.condition.as_ref() == Some(condition)
        || cte.parent_ctes.iter().any(|name| {
            ctes.iter()
                .find(|c| &c.name == name)
                .is_some_and(|parent| filtered_by(ctes, parent, condition))
        })
}

#[test]
fn test_row_level_where_filters_before_aggregation() {
    let env = environment();
    let graph = ReferenceGraph::from_environment(&env);
    let product = env.concept("product_id").unwrap().clone();
    let condition = Condition::compare(&product, ComparisonOperator::Gt, Expr::integer(3));
    let select = Select::new(vec![
        env.concept("category_id").unwrap().clone(),
        env.concept("total_revenue").unwrap().clone(),
    ])
    .with_where(WhereClause::new(condition.clone()));

    let query = process_query(&select, &env, &graph, &PlannerSettings::default()).unwrap();
    let aggregate = query
        .ctes
        .iter()
        .find(|cte| {
            cte.source.source_type == SourceType::Group
                && output_addresses(&cte.output_columns).contains("local.total_revenue")
        })
        .unwrap();
    assert!(filtered_by(&query.ctes, aggregate, &condition));
    assert_eq!(query.grain, Grain::new(vec![category_id()]));
    assert_eq!(
        output_addresses(&query.output_columns),
        BTreeSet::from([
            "local.category_id".to_string(),
            "local.total_revenue".to_string()
        ])
    );
}

#[test]
fn test_coarser_entity_select_dedupes() {
    let env = environment();
    let graph = ReferenceGraph::from_environment(&env);
    let select = Select::new(vec![env.concept("category_id").unwrap().clone()]);

    let query = process_query(&select, &env, &graph, &PlannerSettings::default()).unwrap();
    assert_eq!(query.ctes.len(), 1);
    assert_eq!(query.base.base_name(), "products");
    assert_eq!(query.base.grain, Grain::new(vec![category_id()]));
    assert!(query.base.group_to_grain);
}

#[test]
fn test_cte_names_are_stable() {
    let env = environment();
    let graph = ReferenceGraph::from_environment(&env);
    let select = Select::new(vec![env.concept("total_revenue").unwrap().clone()]);
    let settings = PlannerSettings::default();

    let first = process_query(&select, &env, &graph, &settings).unwrap();
    let second = process_query(&select, &env, &graph, &settings).unwrap();
    let names = |query: &grainline::model::ProcessedQuery| {
        query.ctes.iter().map(|c| c.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&first), names(&second));
    for name in names(&first) {
        assert!(name.starts_with("cte_"));
        assert!(name.len() <= settings.naming.max_cte_name_length);
    }
}
