use pgql_sqa::query::algebra::AlgebraOp;
use pgql_sqa::query::ast::{AggregateKind, BinaryOp, Connection, Expr, PatternVar};
use pgql_sqa::query::builder::{EdgeSpec, MatchTarget, ProjectionSpec};
use pgql_sqa::{
    GraphQuery, PlanError, PlannerOutput, QueryBuilder, Stage, TranslateError, Translator,
    TranslatorConfig,
};

fn translate(builder: QueryBuilder) -> PlannerOutput {
    builder
        .translate(&Translator::default())
        .expect("translate succeeds")
}

fn translate_err(builder: QueryBuilder) -> TranslateError {
    match builder.translate(&Translator::default()) {
        Err(err) => err,
        Ok(output) => panic!("unexpected plan: {}", output.text),
    }
}

fn vertex(name: &str) -> QueryBuilder {
    QueryBuilder::new().r#match(MatchTarget::var(name))
}

#[test]
fn filtered_seed_then_single_expansion() {
    let output = translate(
        vertex("n")
            .where_edge(EdgeSpec::named("e"), MatchTarget::var("m"))
            .where_var("n", |pred| {
                pred.eq("name", "Woody Allen");
            }),
    );
    assert_eq!(
        output.text,
        "GRAPH::EXPLODE(GRAPH::SELECT( GLOBAL 'name' = 'Woody Allen' ), 0, [ ALL OUTGOING ], \
         {'neighbor'=true} )"
    );
    assert!(matches!(output.root.op, AlgebraOp::Explode { .. }));
    assert_eq!(
        output
            .root
            .count(|op| matches!(op, AlgebraOp::Join { .. } | AlgebraOp::Product)),
        0
    );
    assert_eq!(output.schema.variable_index("e"), Some(1));
    assert_eq!(output.schema.variable_index("m"), Some(2));
}

#[test]
fn disconnected_vertices_are_multiplied() {
    let output = translate(vertex("a").r#match(MatchTarget::var("b")));
    assert_eq!(
        output.text,
        "PRODUCT( GRAPH::SCAN(NODES), GRAPH::SCAN(NODES) )"
    );
    assert_eq!(output.root.count(|op| matches!(op, AlgebraOp::Product)), 1);
    assert_eq!(output.schema.variable_index("a"), Some(0));
    assert_eq!(output.schema.variable_index("b"), Some(1));
}

#[test]
fn count_per_group_key_reads_the_aggregate_column() {
    let output = translate(
        vertex("n")
            .group_by(Expr::prop("n", "year"), "year")
            .select(vec![
                ProjectionSpec::from("year"),
                ProjectionSpec::from((Expr::count(Expr::var("n")), "films")),
            ]),
    );
    assert_eq!(
        output.text,
        "PROJECT(GROUP( GRAPH::GET(GRAPH::SCAN(NODES), 0, [ GLOBAL 'year' ]), [ 1 ], \
         [ COUNT(0) ]), [ 0, 1 ])"
    );
    assert_eq!(output.text.matches("COUNT").count(), 1);
    assert_eq!(output.schema.len(), 2);
}

#[test]
fn repeated_aggregates_share_one_column() {
    let output = translate(
        vertex("n")
            .where_edge(EdgeSpec::named("e"), MatchTarget::var("m"))
            .group_by(Expr::var("n"), "person")
            .select(vec![
                ProjectionSpec::from("person"),
                ProjectionSpec::from(Expr::count(Expr::var("m"))),
            ])
            .order_by(Expr::count(Expr::var("m"))),
    );
    assert_eq!(
        output.text,
        "PROJECT(SORT(GROUP( GRAPH::EXPLODE(GRAPH::SCAN(NODES), 0, [ ALL OUTGOING ], \
         {'neighbor'=true} ), [ 0 ], [ COUNT(2) ]), [ 1 ]), [ 0, 1 ])"
    );
}

#[test]
fn aggregates_without_keys_group_globally() {
    let output = translate(vertex("n").select([ProjectionSpec::count_all()]));
    assert_eq!(
        output.text,
        "PROJECT(GROUP( GRAPH::SCAN(NODES), [  ], [ COUNT(ALL) ]), [ 0 ])"
    );
}

#[test]
fn limit_and_offset_slice_the_result() {
    let both = translate(vertex("n").limit(5).offset(10));
    assert_eq!(both.text, "SLICE( GRAPH::SCAN(NODES), 10, 5 )");
    let limit_only = translate(vertex("n").limit(5));
    assert_eq!(limit_only.text, "SLICE( GRAPH::SCAN(NODES), NULL, 5 )");
    assert_eq!(
        limit_only
            .root
            .count(|op| matches!(op, AlgebraOp::Slice { .. })),
        1
    );
}

#[test]
fn cross_group_predicate_becomes_a_join() {
    let output = translate(
        vertex("a")
            .where_edge(EdgeSpec::named("e1"), MatchTarget::var("b"))
            .r#match(MatchTarget::var("c"))
            .filter(Expr::eq(Expr::prop("a", "age"), Expr::prop("c", "age"))),
    );
    assert_eq!(
        output.text,
        "JOIN( GRAPH::GET(GRAPH::EXPLODE(GRAPH::SCAN(NODES), 0, [ ALL OUTGOING ], \
         {'neighbor'=true} ), 0, [ GLOBAL 'age' ]), GRAPH::GET(GRAPH::SCAN(NODES), 0, \
         [ GLOBAL 'age' ]), ( %3 ) = ( %5 ), {'type'='Inner'} )"
    );
    assert_eq!(output.schema.variable_index("c"), Some(4));
}

#[test]
fn direct_variable_comparison_joins_groups() {
    let output = translate(
        vertex("a")
            .r#match(MatchTarget::var("b"))
            .filter(Expr::ne(Expr::var("a"), Expr::var("b"))),
    );
    assert_eq!(
        output.text,
        "JOIN( GRAPH::SCAN(NODES), GRAPH::SCAN(NODES), ( %0 ) <> ( %1 ), {'type'='Inner'} )"
    );
}

#[test]
fn configuration_changes_the_dialect() {
    let config = TranslatorConfig::from_toml_str(
        "attribute_scope = \"NODE\"\njoin_type = \"LeftOuter\"\n",
    )
    .expect("parse succeeds");
    let translator = Translator::new(config);
    let output = vertex("a")
        .r#match(MatchTarget::var("b"))
        .filter(Expr::lt(Expr::prop("a", "age"), Expr::prop("b", "age")))
        .translate(&translator)
        .expect("translate succeeds");
    assert_eq!(
        output.text,
        "JOIN( GRAPH::GET(GRAPH::SCAN(NODES), 0, [ NODE 'age' ]), \
         GRAPH::GET(GRAPH::SCAN(NODES), 0, [ NODE 'age' ]), ( %1 ) < ( %3 ), \
         {'type'='LeftOuter'} )"
    );
}

#[test]
fn labels_seed_scans_and_filter_edges() {
    let output = translate(
        QueryBuilder::new()
            .r#match(("a", "Person"))
            .where_edge(("e", "knows"), MatchTarget::var("b")),
    );
    assert_eq!(
        output.text,
        "SELECT( GRAPH::GET_TYPE( GRAPH::EXPLODE(GRAPH::SCAN('Person'), 0, [ ALL OUTGOING ], \
         {'neighbor'=true} ), 1 ), ( %3 ) = ( 'knows' ) )"
    );
}

#[test]
fn destination_seed_explodes_ingoing() {
    let output = translate(
        vertex("a")
            .where_edge(EdgeSpec::named("e"), MatchTarget::var("b"))
            .where_var("b", |pred| {
                pred.eq("name", "x");
            }),
    );
    assert_eq!(
        output.text,
        "GRAPH::EXPLODE(GRAPH::SELECT( GLOBAL 'name' = 'x' ), 0, [ ALL INGOING ], \
         {'neighbor'=true} )"
    );
    assert_eq!(output.schema.variable_index("a"), Some(2));
}

#[test]
fn projection_aliases_feed_order_by() {
    let output = translate(
        vertex("n")
            .select([(
                Expr::binary(BinaryOp::Mul, Expr::prop("n", "age"), Expr::int(2)),
                "double",
            )])
            .order_by(Expr::var("double")),
    );
    assert_eq!(
        output.text,
        "PROJECT(SORT(EXTEND( GRAPH::GET(GRAPH::SCAN(NODES), 0, [ GLOBAL 'age' ]), [ STRING ], \
         [ STRING(( %1 ) * ( 2 )) ] ), [ 2 ]), [ 2 ])"
    );
    assert_eq!(output.schema.alias_position("double"), Some(0));
}

#[test]
fn constraints_without_pattern_variables_apply_last() {
    let output = translate(vertex("n").filter(Expr::boolean(true)));
    assert_eq!(output.text, "SELECT( GRAPH::SCAN(NODES), TRUE )");
}

#[test]
fn aggregate_of_attribute_materializes_its_input() {
    let output = translate(vertex("n").select([ProjectionSpec::aggregate(
        AggregateKind::Max,
        Expr::prop("n", "rating"),
        Some("best"),
    )]));
    assert_eq!(
        output.text,
        "PROJECT(GROUP( GRAPH::GET(GRAPH::SCAN(NODES), 0, [ GLOBAL 'rating' ]), [  ], \
         [ MAX(1) ]), [ 0 ])"
    );
    assert_eq!(output.schema.alias_position("best"), Some(0));
}

#[test]
fn unsupported_constructs_name_their_stage() {
    let err = translate_err(vertex("n").order_by_desc(Expr::prop("n", "age")));
    assert_eq!(err.stage(), Some(Stage::OrderBy));
    assert_eq!(
        err.to_string(),
        "translation failed during order by: [UnsupportedConstruct] unsupported descending \
         ORDER BY in `n.age`"
    );

    let err = translate_err(vertex("n").filter(Expr::eq(Expr::prop("n", "age"), Expr::Null)));
    assert_eq!(err.stage(), Some(Stage::GroupTranslation));
    match err.plan_error() {
        Some(PlanError::UnsupportedConstruct { construct, .. }) => {
            assert_eq!(*construct, "null literal")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = translate_err(vertex("n").select([Expr::binary(
        BinaryOp::Mod,
        Expr::prop("n", "age"),
        Expr::int(2),
    )]));
    assert_eq!(err.stage(), Some(Stage::Projection));

    let err = translate_err(vertex("n").group_by(Expr::count(Expr::var("n")), "c"));
    assert_eq!(err.stage(), Some(Stage::GroupBy));
}

#[test]
fn empty_pattern_is_unsatisfiable() {
    let query = GraphQuery {
        vertices: vec![PatternVar::anonymous("anon0")],
        ..GraphQuery::default()
    };
    match Translator::default().translate(&query) {
        Err(TranslateError::Plan {
            stage: Stage::Partition,
            source: PlanError::UnsatisfiablePattern { .. },
        }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn anonymous_connection_variables_still_bind() {
    let query = GraphQuery {
        connections: vec![Connection {
            src: PatternVar::named("a"),
            dst: PatternVar::anonymous("anon1"),
            edge: PatternVar::anonymous("anon0"),
        }],
        ..GraphQuery::default()
    };
    let output = Translator::default()
        .translate(&query)
        .expect("translate succeeds");
    assert_eq!(output.schema.len(), 3);
    assert_eq!(output.schema.variable_index("anon1"), Some(2));
}

#[test]
fn json_documents_translate() {
    let json = r#"{
        "vertices": [{"name": "n"}, {"name": "m"}],
        "connections": [{
            "src": {"name": "n"},
            "dst": {"name": "m"},
            "edge": {"name": "e", "anonymous": true}
        }],
        "constraints": [{
            "kind": "binary", "op": "eq",
            "lhs": {"kind": "prop_access", "var": "n", "prop": "name"},
            "rhs": {"kind": "str", "value": "Woody Allen"}
        }],
        "projection": [{"expr": {"kind": "var_ref", "name": "m"}}]
    }"#;
    let translator = Translator::default();
    let output = translator.translate_json(json).expect("translate succeeds");
    assert_eq!(
        output.text,
        "PROJECT(GRAPH::EXPLODE(GRAPH::SELECT( GLOBAL 'name' = 'Woody Allen' ), 0, \
         [ ALL OUTGOING ], {'neighbor'=true} ), [ 2 ])"
    );
    let explain = output.explain.to_json().expect("explain serializes");
    assert!(explain.contains("\"Explode\""));
    assert_eq!(
        translator
            .translate_json(json)
            .expect("translate succeeds")
            .plan_hash,
        output.plan_hash
    );

    match translator.translate_json("{\"vertices\": 3}") {
        Err(err @ TranslateError::Decode(_)) => assert_eq!(err.stage(), None),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn translations_run_in_parallel() {
    let translator = Translator::default();
    let query = vertex("a")
        .where_edge("KNOWS", MatchTarget::var("b"))
        .build()
        .expect("builder should succeed");
    let expected = translator
        .translate_to_string(&query)
        .expect("translate succeeds");
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| translator.translate_to_string(&query)))
            .collect();
        for handle in handles {
            let text = handle
                .join()
                .expect("thread completes")
                .expect("translate succeeds");
            assert_eq!(text, expected);
        }
    });
}
