#![forbid(unsafe_code)]

//! Aggregate extraction for the GROUP operator.

use tracing::debug;

use crate::config::TranslatorConfig;
use crate::query::{
    algebra::AlgebraPlan,
    analyze::{AnalysisMode, ExpressionInfo},
    ast::{AggregateKind, Expr},
    columns::add_expression_column,
    errors::PlanError,
};

/// One aggregate computed by GROUP.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AggregateInfo {
    source_text: String,
    kind: AggregateKind,
    source_column: Option<usize>,
}

impl AggregateInfo {
    /// Aggregate function.
    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    /// Canonical text of the aggregated expression (`*` for the wildcard).
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Pre-group column holding the aggregated values; `None` for `COUNT(*)`.
    pub fn source_column(&self) -> Option<usize> {
        self.source_column
    }

    /// Identity key, `KIND(subexpr)`.
    pub fn key(&self) -> String {
        format!("{}({})", self.kind, self.source_text)
    }

    /// Aggregate as listed in the GROUP operator.
    pub fn group_expression(&self) -> String {
        match self.source_column {
            Some(col) => format!("{}({col})", self.kind),
            None => format!("{}(ALL)", self.kind),
        }
    }
}

/// Collects every aggregate in `expr` not already in `aggregates`,
/// materializing each aggregated expression as a pre-group column.
///
/// Aggregates are identified by their canonical text, so a repeated
/// `COUNT(n)` across projection and order-by is computed once.
pub fn extract_aggregates(
    expr: &Expr,
    plan: &mut AlgebraPlan,
    aggregates: &mut Vec<AggregateInfo>,
    config: &TranslatorConfig,
) -> Result<(), PlanError> {
    match expr {
        Expr::Aggregate { func, arg } => {
            let key = expr.to_string();
            if aggregates.iter().any(|existing| existing.key() == key) {
                return Ok(());
            }
            let info = match arg {
                None if *func == AggregateKind::Count => AggregateInfo {
                    source_text: "*".to_owned(),
                    kind: *func,
                    source_column: None,
                },
                None => return Err(PlanError::unsupported("wildcard aggregate", expr)),
                Some(arg) => {
                    let arg_info = ExpressionInfo::analyze((**arg).clone(), AnalysisMode::PreGroup);
                    if arg_info.has_aggregates() {
                        return Err(PlanError::unsupported("nested aggregate", expr));
                    }
                    let col = add_expression_column(&arg_info, plan, None, config)?;
                    AggregateInfo {
                        source_text: arg.to_string(),
                        kind: *func,
                        source_column: Some(col),
                    }
                }
            };
            debug!(key = %info.key(), column = ?info.source_column, "extracted aggregate");
            aggregates.push(info);
        }
        Expr::Binary { lhs, rhs, .. } => {
            extract_aggregates(lhs, plan, aggregates, config)?;
            extract_aggregates(rhs, plan, aggregates, config)?;
        }
        Expr::Unary { expr, .. } => extract_aggregates(expr, plan, aggregates, config)?,
        Expr::Call { args, .. } => {
            for arg in args {
                extract_aggregates(arg, plan, aggregates, config)?;
            }
        }
        Expr::VarRef { .. }
        | Expr::PropAccess { .. }
        | Expr::Int { .. }
        | Expr::Decimal { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::Null
        | Expr::HasLabel { .. }
        | Expr::EdgeLabel { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{algebra::AlgebraOp, ast::BinaryOp};

    fn plan() -> AlgebraPlan {
        let mut plan = AlgebraPlan::seed(AlgebraOp::ScanNodes);
        plan.schema.add_variable_column("n");
        plan
    }

    #[test]
    fn extracts_each_aggregate_once() {
        let mut plan = plan();
        let config = TranslatorConfig::default();
        let mut aggregates = Vec::new();
        let expr = Expr::binary(
            BinaryOp::Div,
            Expr::aggregate(AggregateKind::Sum, Expr::prop("n", "price")),
            Expr::count(Expr::var("n")),
        );
        extract_aggregates(&expr, &mut plan, &mut aggregates, &config).expect("extract succeeds");
        extract_aggregates(&Expr::count(Expr::var("n")), &mut plan, &mut aggregates, &config)
            .expect("extract succeeds");
        let listed: Vec<_> = aggregates.iter().map(AggregateInfo::group_expression).collect();
        assert_eq!(listed, vec!["SUM(1)", "COUNT(0)"]);
        assert_eq!(aggregates[0].key(), "SUM(n.price)");
        assert_eq!(
            plan.text(),
            "GRAPH::GET(GRAPH::SCAN(NODES), 0, [ GLOBAL 'price' ])"
        );
    }

    #[test]
    fn wildcard_count_has_no_source_column() {
        let mut plan = plan();
        let mut aggregates = Vec::new();
        extract_aggregates(
            &Expr::count_all(),
            &mut plan,
            &mut aggregates,
            &TranslatorConfig::default(),
        )
        .expect("extract succeeds");
        assert_eq!(aggregates[0].group_expression(), "COUNT(ALL)");
        assert_eq!(aggregates[0].key(), "COUNT(*)");
        assert_eq!(plan.schema.len(), 1);
    }

    #[test]
    fn nested_aggregates_are_rejected() {
        let mut plan = plan();
        let nested = Expr::aggregate(AggregateKind::Max, Expr::count(Expr::var("n")));
        match extract_aggregates(&nested, &mut plan, &mut Vec::new(), &TranslatorConfig::default())
        {
            Err(PlanError::UnsupportedConstruct { construct, .. }) => {
                assert_eq!(construct, "nested aggregate")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
