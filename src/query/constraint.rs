#![forbid(unsafe_code)]

//! Filter constraints and their placement in the plan.
//!
//! A constraint is linked to every group holding one of its variables. A
//! constraint whose variables all live in one group is applied as a `SELECT`
//! as soon as they are bound; one spanning two groups becomes the predicate
//! of the `JOIN` that merges them. A *basic* constraint can instead seed a
//! group's plan as a single scan.

use smallvec::SmallVec;
use tracing::debug;

use crate::config::TranslatorConfig;
use crate::query::{
    algebra::{AlgebraOp, AlgebraPlan, ScanComparison, ScanValue},
    analyze::{AnalysisMode, ExpressionInfo},
    ast::{BinaryOp, Expr},
    compile::compile,
    errors::PlanError,
    partition::{ConnectionGroup, GroupId},
    registry::VariableRegistry,
};

/// One filter expression with its group linkage.
#[derive(Clone, Debug)]
pub struct Constraint {
    info: ExpressionInfo,
    linked: SmallVec<[GroupId; 2]>,
}

impl Constraint {
    /// Analyzes a filter expression.
    ///
    /// Bare references to pattern variables count as variable uses.
    /// Aggregates cannot appear in filters.
    pub fn new(expr: Expr, registry: &VariableRegistry) -> Result<Self, PlanError> {
        let mut info = ExpressionInfo::analyze(expr, AnalysisMode::PreGroup);
        if info.has_aggregates() {
            return Err(PlanError::unsupported("aggregate in filter", info.expr()));
        }
        info.promote_pattern_refs(registry);
        Ok(Self {
            info,
            linked: SmallVec::new(),
        })
    }

    /// Filter expression.
    pub fn expr(&self) -> &Expr {
        self.info.expr()
    }

    /// Analysis of the filter expression.
    pub fn info(&self) -> &ExpressionInfo {
        &self.info
    }

    /// The single variable the constraint touches, if there is exactly one.
    pub fn subject(&self) -> Option<&str> {
        match self.info.variables().len() {
            1 => self.info.first_variable().map(|(name, _)| name),
            _ => None,
        }
    }

    /// Returns true if the constraint can seed a plan on its own.
    pub fn is_basic(&self) -> bool {
        self.seed_op("GLOBAL").is_some()
    }

    /// Seed plan for a basic constraint: a label scan or an attribute-filtered
    /// scan binding the subject variable.
    pub fn basic_seed(&self, config: &TranslatorConfig) -> Option<AlgebraPlan> {
        let op = self.seed_op(&config.attribute_scope)?;
        let var = self.subject()?;
        let mut plan = AlgebraPlan::seed(op);
        plan.schema.add_variable_column(var);
        Some(plan)
    }

    fn seed_op(&self, scope: &str) -> Option<AlgebraOp> {
        let (_, usage) = self.info.first_variable()?;
        if self.info.variables().len() != 1 || self.info.labels().len() > 1 {
            return None;
        }
        match self.info.expr() {
            Expr::HasLabel { label, .. } => Some(AlgebraOp::ScanLabel {
                label: label.clone(),
            }),
            Expr::Binary { op, lhs, rhs }
                if self.info.labels().is_empty()
                    && !usage.label_checked
                    && usage.attributes.len() == 1 =>
            {
                let Expr::PropAccess { prop, .. } = &**lhs else {
                    return None;
                };
                Some(AlgebraOp::SelectAttribute {
                    scope: scope.to_owned(),
                    attr: prop.clone(),
                    op: scan_comparison(*op)?,
                    value: scan_value(rhs)?,
                })
            }
            _ => None,
        }
    }

    /// Recomputes the groups holding the constraint's variables.
    pub fn link_groups(&mut self, groups: &[ConnectionGroup]) {
        self.linked = groups
            .iter()
            .filter(|group| {
                self.info
                    .variables()
                    .keys()
                    .any(|var| group.contains_variable(var))
            })
            .map(|group| group.id)
            .collect();
    }

    /// Linked groups in group order.
    pub fn linked_groups(&self) -> &[GroupId] {
        &self.linked
    }

    /// Points references to `absorbed` at `survivor` instead.
    ///
    /// Constraints not linked to `absorbed` are left untouched; `survivor` is
    /// never listed twice.
    pub fn replace_group(&mut self, absorbed: GroupId, survivor: GroupId) {
        let Some(pos) = self.linked.iter().position(|&id| id == absorbed) else {
            return;
        };
        if self.linked.contains(&survivor) {
            self.linked.remove(pos);
        } else {
            self.linked[pos] = survivor;
        }
    }

    /// Records newly bound variables.
    pub fn mark_available(&mut self, vars: &[String]) {
        self.info.mark_available(vars);
    }

    /// Referenced variables not yet bound.
    pub fn pending_variable_count(&self) -> usize {
        self.info.pending_variable_count()
    }

    /// Filters `plan` by the constraint.
    pub fn apply(&self, plan: &mut AlgebraPlan, config: &TranslatorConfig) -> Result<(), PlanError> {
        self.info.add_missing_columns(plan, &config.attribute_scope);
        let predicate = compile(self.info.expr(), &plan.schema, None)?;
        debug!(constraint = %self.info.expr(), %predicate, "applying constraint");
        plan.wrap(AlgebraOp::Select { predicate });
        Ok(())
    }

    /// Joins `right` into `left` using the constraint as join predicate.
    ///
    /// `right`'s columns follow `left`'s in the joined schema.
    pub fn apply_join(
        &self,
        left: &mut AlgebraPlan,
        mut right: AlgebraPlan,
        config: &TranslatorConfig,
    ) -> Result<(), PlanError> {
        self.info.add_missing_columns(left, &config.attribute_scope);
        self.info.add_missing_columns(&mut right, &config.attribute_scope);
        let predicate = compile(self.info.expr(), &left.schema, Some(&right.schema))?;
        debug!(constraint = %self.info.expr(), %predicate, "joining plans");
        let (right_root, right_schema) = right.into_parts();
        left.schema.add_columns_data(&right_schema)?;
        left.combine(
            AlgebraOp::Join {
                predicate,
                join_type: config.join_type.clone(),
            },
            right_root,
        );
        Ok(())
    }
}

fn scan_comparison(op: BinaryOp) -> Option<ScanComparison> {
    match op {
        BinaryOp::Eq => Some(ScanComparison::Eq),
        BinaryOp::Ne => Some(ScanComparison::Ne),
        BinaryOp::Gt => Some(ScanComparison::Gt),
        BinaryOp::Ge => Some(ScanComparison::Ge),
        BinaryOp::Lt => Some(ScanComparison::Lt),
        BinaryOp::Le => Some(ScanComparison::Le),
        _ => None,
    }
}

fn scan_value(expr: &Expr) -> Option<ScanValue> {
    match expr {
        Expr::Str { value } => Some(ScanValue::Str(value.clone())),
        Expr::Int { value } => Some(ScanValue::Int(*value)),
        Expr::Decimal { value } => Some(ScanValue::Decimal(*value)),
        Expr::Bool { value } => Some(ScanValue::Bool(*value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{
        ast::{Connection, PatternVar},
        registry::VariableKind,
    };

    fn registry() -> VariableRegistry {
        let mut registry = VariableRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .register(name, false, VariableKind::Node)
                .expect("register node");
        }
        registry
            .register("e", false, VariableKind::Edge)
            .expect("register edge");
        registry
    }

    fn constraint(expr: Expr) -> Constraint {
        Constraint::new(expr, &registry()).expect("constraint analyzes")
    }

    fn groups() -> Vec<ConnectionGroup> {
        vec![
            ConnectionGroup::from_connection(
                GroupId(0),
                Connection {
                    src: PatternVar::named("a"),
                    dst: PatternVar::named("c"),
                    edge: PatternVar::named("e"),
                },
            ),
            ConnectionGroup::node_only(GroupId(1), "b"),
        ]
    }

    #[test]
    fn basic_constraints_seed_scans() {
        let config = TranslatorConfig::default();
        let label = constraint(Expr::has_label("a", "Person"));
        assert!(label.is_basic());
        let plan = label.basic_seed(&config).expect("label seed");
        assert_eq!(plan.text(), "GRAPH::SCAN('Person')");
        assert_eq!(plan.schema.variable_index("a"), Some(0));

        let attr = constraint(Expr::ge(Expr::prop("e", "weight"), Expr::decimal(0.5)));
        assert_eq!(attr.subject(), Some("e"));
        let plan = attr.basic_seed(&config).expect("attribute seed");
        assert_eq!(plan.text(), "GRAPH::SELECT( GLOBAL 'weight' >= 0.5F )");
    }

    #[test]
    fn compound_constraints_are_not_basic() {
        for expr in [
            Expr::eq(Expr::prop("a", "x"), Expr::prop("a", "y")),
            Expr::eq(Expr::int(3), Expr::prop("a", "x")),
            Expr::eq(Expr::prop("a", "x"), Expr::prop("b", "x")),
            Expr::and(Expr::has_label("a", "P"), Expr::has_label("a", "Q")),
            Expr::eq(Expr::var("a"), Expr::var("b")),
            Expr::not(Expr::has_label("a", "P")),
        ] {
            let c = constraint(expr);
            assert!(!c.is_basic(), "{} should not be basic", c.expr());
            assert!(c.basic_seed(&TranslatorConfig::default()).is_none());
        }
    }

    #[test]
    fn linking_and_group_replacement() {
        let groups = groups();
        let mut join = constraint(Expr::eq(Expr::prop("a", "x"), Expr::prop("b", "x")));
        join.link_groups(&groups);
        assert_eq!(join.linked_groups(), &[GroupId(0), GroupId(1)]);
        join.replace_group(GroupId(1), GroupId(0));
        assert_eq!(join.linked_groups(), &[GroupId(0)]);

        let mut local = constraint(Expr::has_label("c", "City"));
        local.link_groups(&groups);
        local.replace_group(GroupId(1), GroupId(0));
        assert_eq!(local.linked_groups(), &[GroupId(0)]);

        let mut other = constraint(Expr::has_label("b", "City"));
        other.link_groups(&groups);
        other.replace_group(GroupId(1), GroupId(7));
        assert_eq!(other.linked_groups(), &[GroupId(7)]);

        let mut free = constraint(Expr::eq(Expr::var("year"), Expr::int(3)));
        free.link_groups(&groups);
        assert!(free.linked_groups().is_empty());
        assert_eq!(free.pending_variable_count(), 0);
    }

    #[test]
    fn apply_fetches_columns_then_filters() {
        let mut plan = AlgebraPlan::seed(AlgebraOp::ScanNodes);
        plan.schema.add_variable_column("a");
        let c = constraint(Expr::gt(Expr::prop("a", "age"), Expr::int(30)));
        c.apply(&mut plan, &TranslatorConfig::default())
            .expect("apply succeeds");
        assert_eq!(
            plan.text(),
            "SELECT( GRAPH::GET(GRAPH::SCAN(NODES), 0, [ GLOBAL 'age' ]), ( %1 ) > ( 30 ) )"
        );
    }

    #[test]
    fn join_appends_right_columns() {
        let config = TranslatorConfig::default();
        let mut left = AlgebraPlan::seed(AlgebraOp::ScanNodes);
        left.schema.add_variable_column("a");
        let mut right = AlgebraPlan::seed(AlgebraOp::ScanLabel {
            label: "City".into(),
        });
        right.schema.add_variable_column("b");
        let c = constraint(Expr::eq(Expr::prop("a", "city"), Expr::prop("b", "name")));
        c.apply_join(&mut left, right, &config)
            .expect("join succeeds");
        assert_eq!(
            left.text(),
            "JOIN( GRAPH::GET(GRAPH::SCAN(NODES), 0, [ GLOBAL 'city' ]), \
             GRAPH::GET(GRAPH::SCAN('City'), 0, [ GLOBAL 'name' ]), ( %1 ) = ( %3 ), \
             {'type'='Inner'} )"
        );
        assert_eq!(left.schema.variable_index("b"), Some(2));
        assert_eq!(left.schema.attribute_index("b", "name"), Some(3));
    }

    #[test]
    fn aggregates_are_rejected_in_filters() {
        match Constraint::new(
            Expr::gt(Expr::count(Expr::var("a")), Expr::int(1)),
            &registry(),
        ) {
            Err(PlanError::UnsupportedConstruct { construct, .. }) => {
                assert_eq!(construct, "aggregate in filter")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
